//! Module dependency resolution for multi-file projects
//!
//! Extracts `require("literal")` edges from parsed modules, validates
//! that every required module exists in the project, and topologically
//! sorts the module graph (Kahn's algorithm) so emission and module
//! registration run dependencies-first. A cycle fails resolution with
//! the concrete cycle in the message.
//!
//! `require` with a non-literal argument is rejected here rather than
//! guessed at.

use crate::ast::{Chunk, Expr};
use crate::parser;
use crate::visit::{walk_chunk, Visit};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// One `require()` edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDependency {
    pub module_name: String,
    pub line: usize,
}

/// A discovered Lua module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub module_name: String,
    pub file_path: PathBuf,
    pub relative_path: PathBuf,
    pub dependencies: Vec<ModuleDependency>,
}

/// Derive the canonical module name from a project-relative path:
/// `utils.lua` -> `utils`, `subdir/helper.lua` -> `subdir__helper`.
pub fn path_to_module_name(relative: &Path) -> String {
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match relative.parent().and_then(|p| p.file_name()) {
        Some(parent) => format!("{}__{}", parent.to_string_lossy(), stem),
        None => stem,
    }
}

/// Map a `require` path literal to a module name:
/// `"utils"` -> `utils`, `"subdir.helper"` -> `subdir__helper`.
pub fn require_to_module_name(require_path: &str) -> String {
    require_path.replace('.', "__")
}

/// Collects `require("literal")` edges during a chunk walk.
struct RequireCollector {
    deps: Vec<ModuleDependency>,
}

impl Visit for RequireCollector {
    fn visit_expr(&mut self, expr: &Expr) -> Result<(), String> {
        let Expr::Call { func, args, line } = expr else {
            return Ok(());
        };
        if func.as_name() != Some("require") {
            return Ok(());
        }
        match args.first() {
            Some(Expr::Str(path)) => {
                self.deps.push(ModuleDependency {
                    module_name: require_to_module_name(path),
                    line: *line,
                });
                Ok(())
            }
            _ => Err(format!(
                "line {}: require() with a non-literal argument cannot be resolved",
                line
            )),
        }
    }
}

/// Collect every `require("literal")` in a chunk, in source order.
/// A `require` with a non-literal argument is an error.
pub fn extract_requires(chunk: &Chunk) -> Result<Vec<ModuleDependency>, String> {
    let mut collector = RequireCollector { deps: Vec::new() };
    walk_chunk(&mut collector, chunk)?;
    Ok(collector.deps)
}

/// Resolve a whole project: read and parse each file, extract require
/// edges, and validate that every edge lands on a known module.
///
/// Modules come back in the order of `lua_files`.
pub fn resolve_project(
    project_root: &Path,
    lua_files: &[PathBuf],
) -> Result<Vec<ModuleInfo>, String> {
    let mut modules = Vec::new();
    let mut known = HashSet::new();

    for relative in lua_files {
        let module_name = path_to_module_name(relative);
        if !known.insert(module_name.clone()) {
            return Err(format!(
                "duplicate module name '{}' (from {})",
                module_name,
                relative.display()
            ));
        }
        modules.push(ModuleInfo {
            module_name,
            file_path: project_root.join(relative),
            relative_path: relative.clone(),
            dependencies: Vec::new(),
        });
    }

    for module in &mut modules {
        let source = std::fs::read_to_string(&module.file_path)
            .map_err(|e| format!("failed to read {}: {}", module.file_path.display(), e))?;
        let chunk = parser::parse(&source)
            .map_err(|e| format!("{}: {}", module.relative_path.display(), e))?;
        module.dependencies = extract_requires(&chunk)
            .map_err(|e| format!("{}: {}", module.relative_path.display(), e))?;
    }

    for module in &modules {
        for dep in &module.dependencies {
            if !known.contains(&dep.module_name) {
                return Err(format!(
                    "module '{}' requires '{}' (line {}) but it doesn't exist in the project",
                    module.module_name, dep.module_name, dep.line
                ));
            }
        }
    }

    Ok(modules)
}

/// Module graph with forward and reverse edges.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// module -> modules it depends on (insertion order, de-duplicated)
    dependencies: HashMap<String, Vec<String>>,
    /// module -> modules that depend on it
    dependents: HashMap<String, Vec<String>>,
    /// all modules, in insertion order
    modules: Vec<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        DependencyGraph::default()
    }

    /// Build the graph from resolved module info, preserving module
    /// order.
    pub fn build(modules: &[ModuleInfo]) -> Self {
        let mut graph = DependencyGraph::new();
        for module in modules {
            graph.add_module(&module.module_name);
        }
        for module in modules {
            for dep in &module.dependencies {
                graph.add_dependency(&module.module_name, &dep.module_name);
            }
        }
        graph
    }

    pub fn add_module(&mut self, name: &str) {
        if !self.dependencies.contains_key(name) {
            self.dependencies.insert(name.to_string(), Vec::new());
            self.dependents.insert(name.to_string(), Vec::new());
            self.modules.push(name.to_string());
        }
    }

    /// `from` requires `to`; `to` must be emitted first.
    pub fn add_dependency(&mut self, from: &str, to: &str) {
        self.add_module(from);
        self.add_module(to);
        let deps = self.dependencies.get_mut(from).expect("added above");
        if !deps.iter().any(|d| d == to) {
            deps.push(to.to_string());
            self.dependents
                .get_mut(to)
                .expect("added above")
                .push(from.to_string());
        }
    }

    pub fn modules(&self) -> &[String] {
        &self.modules
    }

    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.dependencies.get(name).map(|d| d.as_slice()).unwrap_or(&[])
    }

    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.dependents.get(name).map(|d| d.as_slice()).unwrap_or(&[])
    }

    /// Kahn's algorithm. Every module appears strictly after all of its
    /// dependencies; ties at the same frontier follow insertion order.
    /// A residual cycle fails with one concrete cycle spelled out.
    pub fn topological_sort(&self) -> Result<Vec<String>, String> {
        let mut in_degree: HashMap<&str, usize> = self
            .modules
            .iter()
            .map(|m| (m.as_str(), self.dependencies[m].len()))
            .collect();

        let mut queue: VecDeque<&str> = self
            .modules
            .iter()
            .map(|m| m.as_str())
            .filter(|m| in_degree[m] == 0)
            .collect();

        let mut result = Vec::new();
        while let Some(module) = queue.pop_front() {
            result.push(module.to_string());
            for dependent in &self.dependents[module] {
                let degree = in_degree.get_mut(dependent.as_str()).expect("known module");
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if result.len() != self.modules.len() {
            let cycle = self.find_cycle();
            return Err(format!(
                "circular module dependency detected: {}",
                cycle.join(" -> ")
            ));
        }

        Ok(result)
    }

    /// DFS for one concrete cycle, reported as `a -> b -> ... -> a`.
    fn find_cycle(&self) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut path = Vec::new();

        for start in &self.modules {
            if visited.contains(start.as_str()) {
                continue;
            }
            if let Some(cycle) = self.dfs_cycle(start, &mut visited, &mut path) {
                return cycle;
            }
        }
        Vec::new()
    }

    fn dfs_cycle<'a>(
        &'a self,
        module: &'a str,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = path.iter().position(|m| *m == module) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|m| m.to_string()).collect();
            cycle.push(module.to_string());
            return Some(cycle);
        }
        if visited.contains(module) {
            return None;
        }
        visited.insert(module);
        path.push(module);
        for dep in self.dependencies_of(module) {
            if let Some(cycle) = self.dfs_cycle(dep, visited, path) {
                return Some(cycle);
            }
        }
        path.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_path_to_module_name() {
        assert_eq!(path_to_module_name(Path::new("utils.lua")), "utils");
        assert_eq!(
            path_to_module_name(Path::new("subdir/helper.lua")),
            "subdir__helper"
        );
    }

    #[test]
    fn test_require_to_module_name() {
        assert_eq!(require_to_module_name("utils"), "utils");
        assert_eq!(require_to_module_name("subdir.helper"), "subdir__helper");
    }

    #[test]
    fn test_extract_requires_in_source_order() {
        let chunk = crate::parser::parse(
            "local a = require(\"alpha\")\nif x then local b = require(\"nested.beta\") end",
        )
        .unwrap();
        let deps = extract_requires(&chunk).unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].module_name, "alpha");
        assert_eq!(deps[0].line, 1);
        assert_eq!(deps[1].module_name, "nested__beta");
        assert_eq!(deps[1].line, 2);
    }

    #[test]
    fn test_non_literal_require_rejected() {
        let chunk = crate::parser::parse("local name = \"x\"\nlocal m = require(name)").unwrap();
        let err = extract_requires(&chunk).unwrap_err();
        assert!(err.contains("non-literal"));
        assert!(err.contains("line 2"));
    }

    #[test]
    fn test_resolve_project_validates_requires() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.lua"), "local u = require(\"utils\")\n").unwrap();
        let err = resolve_project(dir.path(), &[PathBuf::from("main.lua")]).unwrap_err();
        assert!(err.contains("main"));
        assert!(err.contains("utils"));
        assert!(err.contains("line 1"));
        assert!(err.contains("doesn't exist"));
    }

    #[test]
    fn test_resolve_project_collects_dependencies() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.lua"), "local u = require(\"utils\")\n").unwrap();
        fs::write(dir.path().join("utils.lua"), "return {}\n").unwrap();
        let modules = resolve_project(
            dir.path(),
            &[PathBuf::from("main.lua"), PathBuf::from("utils.lua")],
        )
        .unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].module_name, "main");
        assert_eq!(modules[0].dependencies[0].module_name, "utils");
        assert!(modules[1].dependencies.is_empty());
    }

    #[test]
    fn test_topological_order() {
        // main -> utils -> helper must come out helper, utils, main.
        let mut graph = DependencyGraph::new();
        graph.add_module("main");
        graph.add_module("utils");
        graph.add_module("helper");
        graph.add_dependency("main", "utils");
        graph.add_dependency("utils", "helper");
        let order = graph.topological_sort().unwrap();
        assert_eq!(order, vec!["helper", "utils", "main"]);
    }

    #[test]
    fn test_topological_correctness_property() {
        let mut graph = DependencyGraph::new();
        for module in ["a", "b", "c", "d"] {
            graph.add_module(module);
        }
        graph.add_dependency("a", "b");
        graph.add_dependency("a", "c");
        graph.add_dependency("b", "d");
        graph.add_dependency("c", "d");
        let order = graph.topological_sort().unwrap();
        let index =
            |m: &str| order.iter().position(|o| o == m).expect("module in order");
        for module in ["a", "b", "c", "d"] {
            for dep in graph.dependencies_of(module) {
                assert!(index(dep) < index(module), "{} before {}", dep, module);
            }
        }
    }

    #[test]
    fn test_frontier_follows_insertion_order() {
        let mut graph = DependencyGraph::new();
        graph.add_module("zeta");
        graph.add_module("alpha");
        graph.add_module("mid");
        let order = graph.topological_sort().unwrap();
        assert_eq!(order, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_cycle_detection_names_the_cycle() {
        // a requires b, b requires a.
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "b");
        graph.add_dependency("b", "a");
        let err = graph.topological_sort().unwrap_err();
        assert!(err.contains("circular"));
        assert!(err.contains("a -> b -> a"), "got: {}", err);
    }

    #[test]
    fn test_self_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("a", "a");
        let err = graph.topological_sort().unwrap_err();
        assert!(err.contains("a -> a"));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency("top", "left");
        graph.add_dependency("top", "right");
        graph.add_dependency("left", "base");
        graph.add_dependency("right", "base");
        assert!(graph.topological_sort().is_ok());
    }

    #[test]
    fn test_duplicate_module_name_rejected() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("utils")).unwrap();
        fs::write(dir.path().join("utils.lua"), "return {}\n").unwrap();
        // Different files can collide after name mangling; both named
        // `utils` here.
        let err = resolve_project(
            dir.path(),
            &[PathBuf::from("utils.lua"), PathBuf::from("utils.lua")],
        )
        .unwrap_err();
        assert!(err.contains("duplicate module name"));
    }

    #[test]
    fn test_build_graph_from_modules() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.lua"), "local u = require(\"utils\")\n").unwrap();
        fs::write(dir.path().join("utils.lua"), "local h = require(\"helper\")\n").unwrap();
        fs::write(dir.path().join("helper.lua"), "return {}\n").unwrap();
        let modules = resolve_project(
            dir.path(),
            &[
                PathBuf::from("main.lua"),
                PathBuf::from("utils.lua"),
                PathBuf::from("helper.lua"),
            ],
        )
        .unwrap();
        let graph = DependencyGraph::build(&modules);
        let order = graph.topological_sort().unwrap();
        assert_eq!(order, vec!["helper", "utils", "main"]);
        assert_eq!(graph.dependents_of("helper"), &["utils".to_string()]);
    }
}
