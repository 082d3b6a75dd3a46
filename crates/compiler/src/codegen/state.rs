//! Project State Header Generation
//!
//! Every build gets one `<name>_lua_State` aggregate holding, in this
//! order: the special `arg` global, user-defined globals, standalone
//! shim pointers, per-library shim structs (alphabetical), global
//! Lua-function pointers, and (project mode only) the module registry
//! keyed by module name.
//!
//! The struct only carries what the program touches: library usage is
//! detected per module and merged across the project.

use crate::ast::{Chunk, Expr};
use crate::infer::Analysis;
use crate::libraries;
use crate::types::Type;
use crate::visit::{walk_chunk, Visit};
use std::collections::{BTreeMap, BTreeSet};

/// Which standard-library members and standalone functions a program
/// uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryUsage {
    /// library -> member names referenced
    pub libraries: BTreeMap<String, BTreeSet<String>>,
    /// standalone shims referenced (`print`, `tonumber`)
    pub standalone: BTreeSet<String>,
    /// the program reads the `arg` global
    pub uses_arg: bool,
}

impl LibraryUsage {
    /// Union with another module's usage (project mode).
    pub fn merge(&mut self, other: &LibraryUsage) {
        for (lib, members) in &other.libraries {
            self.libraries
                .entry(lib.clone())
                .or_default()
                .extend(members.iter().cloned());
        }
        self.standalone.extend(other.standalone.iter().cloned());
        self.uses_arg |= other.uses_arg;
    }

    fn record_member(&mut self, lib: &str, member: &str) {
        self.libraries
            .entry(lib.to_string())
            .or_default()
            .insert(member.to_string());
    }
}

impl Visit for LibraryUsage {
    fn visit_expr(&mut self, expr: &Expr) -> Result<(), String> {
        match expr {
            Expr::Name(name) if name == "arg" => self.uses_arg = true,
            Expr::Field { value, field } => {
                if let Some(lib) = value.as_name() {
                    if libraries::is_library_module(lib)
                        && libraries::is_library_member(lib, field)
                    {
                        self.record_member(lib, field);
                    }
                }
            }
            Expr::Call { func, .. } => {
                if let Some(name) = func.as_name() {
                    if libraries::is_standalone_function(name) {
                        self.standalone.insert(name.to_string());
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Scan a module for library references, standalone shim calls, and
/// `arg` usage.
pub fn detect_library_usage(chunk: &Chunk) -> LibraryUsage {
    let mut usage = LibraryUsage::default();
    walk_chunk(&mut usage, chunk).expect("usage scan never fails");
    usage
}

/// A user-defined global with its inferred type, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDecl {
    pub name: String,
    pub inferred: Option<Type>,
}

/// A global Lua function that becomes a state-struct function pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalFunctionDecl {
    pub name: String,
    /// C++ parameter types after `state*`.
    pub params: Vec<String>,
}

/// Everything needed to emit the state struct.
#[derive(Debug, Clone, Default)]
pub struct StateLayout {
    pub name: String,
    pub include_arg: bool,
    pub include_module_registry: bool,
    pub globals: Vec<GlobalDecl>,
    pub functions: Vec<GlobalFunctionDecl>,
    pub usage: LibraryUsage,
}

/// Collect user-defined data globals and global functions from one
/// module's analysis.
pub fn collect_globals(analysis: &Analysis) -> (Vec<GlobalDecl>, Vec<GlobalFunctionDecl>) {
    let mut globals = Vec::new();
    let mut functions = Vec::new();
    for symbol in analysis.scopes.global_symbols() {
        if symbol.is_function {
            let params = analysis
                .registry
                .signature(&symbol.name)
                .map(|s| {
                    (0..s.num_params())
                        .map(|i| super::param_cpp_type(analysis, &symbol.name, i))
                        .collect()
                })
                .unwrap_or_default();
            functions.push(GlobalFunctionDecl {
                name: symbol.name.clone(),
                params,
            });
        } else {
            globals.push(GlobalDecl {
                name: symbol.name.clone(),
                inferred: symbol.inferred_type.clone(),
            });
        }
    }
    (globals, functions)
}

/// Emit `<name>_state.hpp`.
pub fn generate_state_header(layout: &StateLayout) -> String {
    let state_type = format!("{}_lua_State", layout.name);
    let mut lines = vec![
        "#pragma once".to_string(),
        String::new(),
        "#include \"l2c_runtime.hpp\"".to_string(),
        "#include <unordered_map>".to_string(),
        String::new(),
        format!("struct {} {{", state_type),
    ];

    if layout.include_arg {
        lines.push("    // Special globals".to_string());
        lines.push("    luaArray<luaValue> arg;".to_string());
        lines.push(String::new());
    }

    let mut globals = layout.globals.clone();
    globals.sort_by(|a, b| a.name.cmp(&b.name));
    if !globals.is_empty() {
        for global in &globals {
            lines.push(format!("    // {} (user-defined)", global.name));
            let cpp = global
                .inferred
                .as_ref()
                .filter(|t| t.can_specialize())
                .map(|t| t.cpp_type())
                .unwrap_or("luaValue");
            lines.push(format!("    {} {};", cpp, global.name));
        }
        lines.push(String::new());
    }

    let standalone: Vec<&String> = layout.usage.standalone.iter().collect();
    if !standalone.is_empty() {
        lines.push("    // Standalone functions".to_string());
        for name in standalone {
            if let Some(signature) = libraries::signature(name) {
                lines.push(format!("    {};", signature.member_decl(name)));
            }
        }
        lines.push(String::new());
    }

    let mut functions = layout.functions.clone();
    functions.sort_by(|a, b| a.name.cmp(&b.name));
    if !functions.is_empty() {
        lines.push("    // Global functions".to_string());
        for function in &functions {
            let mut params = vec![format!("{}*", state_type)];
            params.extend(function.params.iter().cloned());
            lines.push(format!(
                "    luaValue (*{})({});",
                function.name,
                params.join(", ")
            ));
        }
        lines.push(String::new());
    }

    for lib in libraries::KNOWN_LIBRARIES {
        let Some(used) = layout.usage.libraries.get(lib) else {
            continue;
        };
        let members: Vec<&str> = libraries::typed_module_functions(lib)
            .into_iter()
            .filter(|m| used.contains(*m))
            .collect();
        if members.is_empty() {
            continue;
        }
        lines.push(format!("    // {} library", capitalize(lib)));
        lines.push("    struct {".to_string());
        for member in members {
            let signature = libraries::signature(&format!("{}.{}", lib, member))
                .expect("typed members have signatures");
            lines.push(format!("        {};", signature.member_decl(member)));
        }
        lines.push(format!("    }} {};", lib));
        lines.push(String::new());
    }

    if layout.include_module_registry {
        lines.push("    // Module registry (for require() dispatch)".to_string());
        lines.push(format!(
            "    std::unordered_map<std::string, luaValue(*)({}*)> modules;",
            state_type
        ));
    }

    while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines.push("};".to_string());
    lines.push(String::new());
    lines.join("\n")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
