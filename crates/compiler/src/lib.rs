//! lua2cpp compiler library
//!
//! Translates Lua 5.x source to C++17 against a small hand-written
//! runtime. The pipeline per module: parse -> four-pass type inference
//! -> validation -> C++ emission. Project mode additionally resolves
//! `require` edges and emits modules in topological order, plus a
//! project state header and a main driver.
//!
//! # Example
//!
//! ```rust,ignore
//! use l2c::{transpile_single_file, CompilerConfig};
//!
//! let config = CompilerConfig::new().with_output_dir("build");
//! let build = transpile_single_file(Path::new("script.lua"), &config)?;
//! for file in &build.files {
//!     println!("generated {}", file.name);
//! }
//! ```

pub mod ast;
pub mod codegen;
pub mod config;
pub mod infer;
pub mod libraries;
pub mod parser;
pub mod propagation;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod types;
pub mod validate;
pub mod visit;

pub use codegen::{CodeGen, CodeGenError, Mode, ModuleOutput};
pub use config::CompilerConfig;
pub use infer::{Analysis, TypeInference};
pub use registry::FunctionRegistry;
pub use resolver::DependencyGraph;
pub use types::{Type, TypeKind};
pub use validate::{Diagnostic, DiagnosticsConfig, Severity};

use codegen::state::{
    collect_globals, detect_library_usage, generate_state_header, GlobalDecl, GlobalFunctionDecl,
    LibraryUsage, StateLayout,
};
use codegen::{naming, program};
use std::path::{Path, PathBuf};

/// Directories skipped during project discovery.
const SKIP_DIRS: [&str; 7] = [
    ".git",
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    "build",
    "dist",
];

/// One generated output file (name relative to the output directory).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub name: String,
    pub content: String,
}

/// Result of one transpiler invocation, before anything touches disk.
#[derive(Debug)]
pub struct BuildOutput {
    /// Generated files, in emission order.
    pub files: Vec<GeneratedFile>,
    /// Pass-4 diagnostics across all modules.
    pub diagnostics: Vec<Diagnostic>,
    /// Verbose statistics blocks (registry, type distribution).
    pub statistics: Vec<String>,
}

/// Transpile a single Lua source string.
///
/// `module_name` is the output basename (usually the file stem).
pub fn transpile_single_source(
    source: &str,
    module_name: &str,
    config: &CompilerConfig,
) -> Result<BuildOutput, String> {
    let module_name = naming::sanitize_path(module_name, false);
    if module_name.is_empty() {
        return Err("empty module name".to_string());
    }

    let chunk = parser::parse(source)?;
    let analysis = TypeInference::run(&chunk)?;
    let diagnostics = validate::validate(&analysis, &config.diagnostics);

    let mode = if config.as_library {
        Mode::Library
    } else {
        Mode::Standalone
    };
    let mut generator = CodeGen::new(&analysis, mode, &module_name, &module_name);
    let module = generator
        .emit_module(&chunk, &format!("{}.lua", module_name))
        .map_err(|e| e.to_string())?;

    let usage = detect_library_usage(&chunk);
    let (globals, functions) = collect_globals(&analysis);
    let layout = StateLayout {
        name: module_name.clone(),
        include_arg: !config.as_library,
        include_module_registry: false,
        globals,
        functions,
        usage: usage.clone(),
    };

    let mut files = vec![
        GeneratedFile {
            name: format!("{}_state.hpp", module_name),
            content: generate_state_header(&layout),
        },
        GeneratedFile {
            name: format!("{}_module.hpp", module_name),
            content: module.hpp,
        },
        GeneratedFile {
            name: format!("{}_module.cpp", module_name),
            content: module.cpp,
        },
    ];
    if !config.as_library {
        files.push(GeneratedFile {
            name: format!("{}_main.cpp", module_name),
            content: program::generate_standalone_main(&module_name, &usage),
        });
    }

    let statistics = if config.verbose {
        let mut blocks = vec![
            analysis.registry.format_statistics(),
            analysis.format_statistics(),
        ];
        if !analysis.propagation_log.is_empty() {
            blocks.push(analysis.propagation_log.format_summary());
        }
        blocks
    } else {
        Vec::new()
    };

    Ok(BuildOutput {
        files,
        diagnostics,
        statistics,
    })
}

/// Transpile a single Lua file. Output basename defaults to the input
/// file stem.
pub fn transpile_single_file(
    input: &Path,
    config: &CompilerConfig,
) -> Result<BuildOutput, String> {
    let source = std::fs::read_to_string(input)
        .map_err(|e| format!("failed to read {}: {}", input.display(), e))?;
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| format!("input file has no name: {}", input.display()))?;
    let module_name = config.output_name.clone().unwrap_or(stem);
    transpile_single_source(&source, &module_name, config)
        .map_err(|e| format!("{}: {}", input.display(), e))
}

/// Find every `.lua` file under `root`, skipping build and VCS
/// directories. Paths come back relative to `root`, sorted.
pub fn discover_lua_files(root: &Path) -> Result<Vec<PathBuf>, String> {
    fn walk(dir: &Path, root: &Path, found: &mut Vec<PathBuf>) -> Result<(), String> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| format!("failed to read directory {}: {}", dir.display(), e))?;
        for entry in entries {
            let entry =
                entry.map_err(|e| format!("failed to read entry in {}: {}", dir.display(), e))?;
            let path = entry.path();
            if path.is_dir() {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if SKIP_DIRS.contains(&name.as_ref()) {
                    continue;
                }
                walk(&path, root, found)?;
            } else if path.extension().map(|e| e == "lua").unwrap_or(false) {
                let relative = path
                    .strip_prefix(root)
                    .map_err(|e| format!("path outside project root: {}", e))?;
                found.push(relative.to_path_buf());
            }
        }
        Ok(())
    }

    let mut files = Vec::new();
    walk(root, root, &mut files)?;
    files.sort();
    Ok(files)
}

/// Transpile a whole project rooted at the main file's directory.
///
/// Resolution and the topological sort run before any module is
/// emitted: a cycle or an unresolved `require` fails the build with no
/// output.
pub fn transpile_project(main_file: &Path, config: &CompilerConfig) -> Result<BuildOutput, String> {
    if !main_file.exists() {
        return Err(format!("main file not found: {}", main_file.display()));
    }
    let project_root = main_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let project_name = project_root
        .file_name()
        .map(|n| project_identifier(&n.to_string_lossy()))
        .filter(|n| !n.is_empty())
        .or_else(|| {
            main_file
                .file_stem()
                .map(|s| project_identifier(&s.to_string_lossy()))
        })
        .filter(|n| !n.is_empty())
        .ok_or_else(|| format!("cannot derive a project name from {}", main_file.display()))?;

    let lua_files = discover_lua_files(&project_root)?;
    if lua_files.is_empty() {
        return Err(format!("no .lua files found in {}", project_root.display()));
    }

    let main_relative = main_file
        .strip_prefix(&project_root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(main_file.file_name().expect("checked exists")));
    let main_module = resolver::path_to_module_name(&main_relative);

    // Resolve and sort before emitting anything.
    let modules = resolver::resolve_project(&project_root, &lua_files)?;
    let graph = DependencyGraph::build(&modules);
    let order = graph.topological_sort()?;

    let mut files = Vec::new();
    let mut diagnostics = Vec::new();
    let mut statistics = Vec::new();
    let mut usage = LibraryUsage::default();
    let mut globals: Vec<GlobalDecl> = Vec::new();
    let mut functions: Vec<GlobalFunctionDecl> = Vec::new();

    for module_name in &order {
        let module = modules
            .iter()
            .find(|m| &m.module_name == module_name)
            .expect("topological order only contains resolved modules");

        let source = std::fs::read_to_string(&module.file_path)
            .map_err(|e| format!("failed to read {}: {}", module.file_path.display(), e))?;
        let chunk = parser::parse(&source)
            .map_err(|e| format!("{}: {}", module.relative_path.display(), e))?;
        let analysis = TypeInference::run(&chunk)
            .map_err(|e| format!("{}: {}", module.relative_path.display(), e))?;

        diagnostics.extend(validate::validate(&analysis, &config.diagnostics));
        if config.verbose {
            statistics.push(format!(
                "--- {} ---\n{}",
                module.module_name,
                analysis.format_statistics()
            ));
        }

        usage.merge(&detect_library_usage(&chunk));
        let (module_globals, module_functions) = collect_globals(&analysis);
        for global in module_globals {
            match globals.iter_mut().find(|g| g.name == global.name) {
                Some(existing) => {
                    existing.inferred = match (&existing.inferred, &global.inferred) {
                        (Some(a), Some(b)) => Some(a.join(b)),
                        (Some(a), None) => Some(a.clone()),
                        (None, other) => other.clone(),
                    };
                }
                None => globals.push(global),
            }
        }
        for function in module_functions {
            if !functions.iter().any(|f| f.name == function.name) {
                functions.push(function);
            }
        }

        let mut generator = CodeGen::new(&analysis, Mode::Project, module_name, &project_name);
        let output = generator
            .emit_module(&chunk, &module.relative_path.display().to_string())
            .map_err(|e| format!("{}: {}", module.relative_path.display(), e))?;

        files.push(GeneratedFile {
            name: format!("{}_module.hpp", module_name),
            content: output.hpp,
        });
        files.push(GeneratedFile {
            name: format!("{}_module.cpp", module_name),
            content: output.cpp,
        });
    }

    let layout = StateLayout {
        name: project_name.clone(),
        include_arg: true,
        include_module_registry: true,
        globals,
        functions,
        usage: usage.clone(),
    };
    files.push(GeneratedFile {
        name: format!("{}_state.hpp", project_name),
        content: generate_state_header(&layout),
    });
    files.push(GeneratedFile {
        name: format!("{}_main.cpp", project_name),
        content: program::generate_project_main(&project_name, &main_module, &order, &usage),
    });

    Ok(BuildOutput {
        files,
        diagnostics,
        statistics,
    })
}

/// Turn a directory name into a usable C++ identifier stem: any
/// character outside `[A-Za-z0-9_]` becomes `_`, and a leading digit
/// gets an underscore prefix.
fn project_identifier(name: &str) -> String {
    let mut cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let cleaned_trimmed = cleaned.trim_matches('_');
    if !cleaned_trimmed.is_empty() {
        cleaned = cleaned_trimmed.to_string();
    }
    if cleaned.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        cleaned.insert(0, '_');
    }
    cleaned
}

/// Write generated files into the output directory, creating it if
/// needed. Returns the written paths.
pub fn write_output(output_dir: &Path, files: &[GeneratedFile]) -> Result<Vec<PathBuf>, String> {
    std::fs::create_dir_all(output_dir).map_err(|e| {
        format!(
            "cannot create output directory {}: {}",
            output_dir.display(),
            e
        )
    })?;
    let mut written = Vec::new();
    for file in files {
        let path = output_dir.join(&file.name);
        std::fs::write(&path, &file.content)
            .map_err(|e| format!("failed to write {}: {}", path.display(), e))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_single_file_output_set() {
        let config = CompilerConfig::new();
        let build =
            transpile_single_source("local x = 1\nlocal y = x + 2", "demo", &config).unwrap();
        let names: Vec<&str> = build.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "demo_state.hpp",
                "demo_module.hpp",
                "demo_module.cpp",
                "demo_main.cpp"
            ]
        );
        let module_cpp = &build.files[2].content;
        assert!(module_cpp.contains("double y = x + 2;"));
    }

    #[test]
    fn test_library_mode_omits_main() {
        let config = CompilerConfig::new().with_library_mode(true);
        let build = transpile_single_source("local x = 1", "demo", &config).unwrap();
        assert!(!build.files.iter().any(|f| f.name.ends_with("_main.cpp")));
        let state = &build.files[0].content;
        assert!(!state.contains("arg;"));
    }

    #[test]
    fn test_diagnostics_surface_warnings() {
        let config = CompilerConfig::new();
        let build = transpile_single_source(
            "local t = {}\nt[1] = 10\nt.name = \"x\"",
            "demo",
            &config,
        )
        .unwrap();
        assert!(build
            .diagnostics
            .iter()
            .any(|d| d.check == "mixed_usage" && d.severity == Severity::Warning));
    }

    #[test]
    fn test_verbose_statistics() {
        let config = CompilerConfig::new().with_verbose(true);
        let build = transpile_single_source("local x = 1", "demo", &config).unwrap();
        assert!(!build.statistics.is_empty());
    }

    #[test]
    fn test_dashes_sanitized_in_module_name() {
        let config = CompilerConfig::new();
        let build = transpile_single_source("local x = 1", "spectral-norm", &config).unwrap();
        assert!(build.files[0].name.starts_with("spectral_norm"));
        assert!(build.files[2]
            .content
            .contains("_l2c__spectral_norm_export"));
    }

    #[test]
    fn test_deterministic_build() {
        let source = "local t = {}\nt[1] = 1\nprint(t)";
        let config = CompilerConfig::new();
        let first = transpile_single_source(source, "demo", &config).unwrap();
        let second = transpile_single_source(source, "demo", &config).unwrap();
        assert_eq!(first.files, second.files);
    }

    #[test]
    fn test_discover_skips_build_dirs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.lua"), "local x = 1").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/mod.lua"), "local y = 2").unwrap();
        fs::create_dir(dir.path().join("build")).unwrap();
        fs::write(dir.path().join("build/skip.lua"), "local z = 3").unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/also.lua"), "local z = 3").unwrap();

        let files = discover_lua_files(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("main.lua"), PathBuf::from("sub/mod.lua")]
        );
    }

    #[test]
    fn test_project_emits_in_topological_order() {
        // helper <- utils <- main.
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("main.lua"),
            "local utils = require(\"utils\")\nprint(\"go\")",
        )
        .unwrap();
        fs::write(
            dir.path().join("utils.lua"),
            "local helper = require(\"helper\")\nreturn {}",
        )
        .unwrap();
        fs::write(dir.path().join("helper.lua"), "return {}").unwrap();

        let config = CompilerConfig::new();
        let build = transpile_project(&dir.path().join("main.lua"), &config).unwrap();

        let cpp_order: Vec<&str> = build
            .files
            .iter()
            .filter(|f| f.name.ends_with("_module.cpp"))
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(
            cpp_order,
            vec!["helper_module.cpp", "utils_module.cpp", "main_module.cpp"]
        );

        let main_cpp = &build
            .files
            .iter()
            .find(|f| f.name.ends_with("_main.cpp"))
            .unwrap()
            .content;
        let helper = main_cpp.find("state.modules[\"helper\"]").unwrap();
        let utils = main_cpp.find("state.modules[\"utils\"]").unwrap();
        let main_pos = main_cpp.find("state.modules[\"main\"]").unwrap();
        assert!(helper < utils && utils < main_pos);
    }

    #[test]
    fn test_project_cycle_fails_without_output() {
        // a and b require each other.
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.lua"), "local b = require(\"b\")").unwrap();
        fs::write(dir.path().join("b.lua"), "local a = require(\"a\")").unwrap();

        let config = CompilerConfig::new();
        let err = transpile_project(&dir.path().join("a.lua"), &config).unwrap_err();
        assert!(err.contains("circular"));
        assert!(
            err.contains("a -> b -> a") || err.contains("b -> a -> b"),
            "cycle spelled out: {}",
            err
        );
    }

    #[test]
    fn test_project_unresolved_require_fails() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.lua"), "local m = require(\"missing\")").unwrap();
        let config = CompilerConfig::new();
        let err = transpile_project(&dir.path().join("main.lua"), &config).unwrap_err();
        assert!(err.contains("missing"));
        assert!(err.contains("doesn't exist"));
    }

    #[test]
    fn test_project_module_uses_registry_dispatch() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("main.lua"),
            "local utils = require(\"utils\")",
        )
        .unwrap();
        fs::write(dir.path().join("utils.lua"), "return {}").unwrap();

        let config = CompilerConfig::new();
        let build = transpile_project(&dir.path().join("main.lua"), &config).unwrap();
        let main_module = build
            .files
            .iter()
            .find(|f| f.name == "main_module.cpp")
            .unwrap();
        assert!(main_module
            .content
            .contains("state->modules[\"utils\"](state)"));
    }

    #[test]
    fn test_write_output_creates_directory() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("nested").join("out");
        let files = vec![GeneratedFile {
            name: "x.hpp".to_string(),
            content: "// x\n".to_string(),
        }];
        let written = write_output(&out, &files).unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(fs::read_to_string(&written[0]).unwrap(), "// x\n");
    }

    #[test]
    fn test_subdirectory_module_names() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(
            dir.path().join("main.lua"),
            "local h = require(\"lib.helper\")",
        )
        .unwrap();
        fs::write(dir.path().join("lib/helper.lua"), "return {}").unwrap();

        let config = CompilerConfig::new();
        let build = transpile_project(&dir.path().join("main.lua"), &config).unwrap();
        assert!(build
            .files
            .iter()
            .any(|f| f.name == "lib__helper_module.cpp"));
        let main_cpp = build
            .files
            .iter()
            .find(|f| f.name.ends_with("_main.cpp"))
            .unwrap();
        assert!(main_cpp
            .content
            .contains("state.modules[\"lib__helper\"] = &_l2c__lib__helper_export;"));
    }
}
