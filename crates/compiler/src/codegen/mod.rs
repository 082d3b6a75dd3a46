//! C++ Code Generation
//!
//! Lowers a Lua module, together with its frozen analysis, to one C++
//! translation unit and its forward-declaration header. Expression and
//! statement lowering live in `expr.rs` and `statements.rs`; call-site
//! strategy selection in `calls.rs`; the project state header and the
//! main driver in `state.rs` and `program.rs`.
//!
//! The emitter reads the analysis, never writes it, and its output is a
//! deterministic function of that state: same analysis, same options,
//! byte-identical text.

pub mod error;
pub mod naming;
pub mod program;
pub mod state;

mod calls;
mod expr;
mod statements;

pub use error::CodeGenError;

use crate::ast::{Chunk, FuncBody, Stmt};
use crate::infer::Analysis;
use crate::scope::ScopeStack;
use crate::types::TypeKind;
use std::collections::HashMap;

/// Emission mode. Decides how globals resolve and whether `require`
/// dispatches through the module registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Single file with a generated `main` translation unit.
    Standalone,
    /// Single file, embeddable: no main, no `arg` member.
    Library,
    /// One module of a multi-module project.
    Project,
}

/// Generated text for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOutput {
    pub cpp: String,
    pub hpp: String,
}

/// Per-module C++ code generator.
pub struct CodeGen<'a> {
    pub(crate) analysis: &'a Analysis,
    pub(crate) mode: Mode,
    /// Canonical module name (resolver scheme, e.g. `subdir__helper`).
    pub(crate) module_name: String,
    /// Basename of the state struct: `<state_name>_lua_State`.
    pub(crate) state_name: String,
    /// Emission-time scope tracking for local/global decisions.
    pub(crate) scopes: ScopeStack,
    string_pool: Vec<String>,
    string_index: HashMap<String, usize>,
    temp_counter: usize,
    /// True while lowering the body of a `...` function; `...` then
    /// refers to the function's vararg vector.
    pub(crate) in_vararg_function: bool,
}

impl<'a> CodeGen<'a> {
    pub fn new(analysis: &'a Analysis, mode: Mode, module_name: &str, state_name: &str) -> Self {
        CodeGen {
            analysis,
            mode,
            module_name: module_name.to_string(),
            state_name: state_name.to_string(),
            scopes: ScopeStack::new(),
            string_pool: Vec::new(),
            string_index: HashMap::new(),
            temp_counter: 0,
            in_vararg_function: false,
        }
    }

    /// C++ type name of the state struct.
    pub(crate) fn state_type(&self) -> String {
        format!("{}_lua_State", self.state_name)
    }

    /// Intern a string literal into the per-module pool, returning its
    /// index.
    pub(crate) fn intern_string(&mut self, value: &str) -> usize {
        if let Some(&index) = self.string_index.get(value) {
            return index;
        }
        let index = self.string_pool.len();
        self.string_pool.push(value.to_string());
        self.string_index.insert(value.to_string(), index);
        index
    }

    pub(crate) fn fresh_temp(&mut self, stem: &str) -> String {
        let name = format!("_l2c_{}_{}", stem, self.temp_counter);
        self.temp_counter += 1;
        name
    }

    /// Emit the complete module translation unit and header.
    pub fn emit_module(
        &mut self,
        chunk: &Chunk,
        source_label: &str,
    ) -> Result<ModuleOutput, CodeGenError> {
        // The module and state names become C++ symbols; a name that
        // survived sanitization but still isn't an identifier (e.g. a
        // leading digit) must fail here, not in the C++ compiler.
        for name in [&self.module_name, &self.state_name] {
            if !naming::is_valid_identifier(name) {
                return Err(CodeGenError::Logic(format!(
                    "'{}' is not a valid C++ identifier",
                    name
                )));
            }
        }

        // Top-level function names are visible to every statement, the
        // way the forward declarations make them visible to C++.
        for stmt in &chunk.block.stmts {
            match stmt {
                Stmt::LocalFunction { name, .. } => {
                    let _ = self.scopes.define_function(name, false);
                }
                Stmt::Function { name, .. } => {
                    let _ = self.scopes.define_function(name, true);
                }
                _ => {}
            }
        }

        let mut forward_decls = Vec::new();
        let mut function_defs = Vec::new();
        for stmt in &chunk.block.stmts {
            if let Stmt::LocalFunction { name, body, .. } | Stmt::Function { name, body, .. } =
                stmt
            {
                let (decl, def) = self.emit_function(name, body)?;
                forward_decls.push(decl);
                function_defs.push(def);
            }
        }

        let body = self.emit_export_body(chunk)?;

        let mut cpp = String::new();
        cpp.push_str(&format!("// Generated from {} by l2c\n\n", source_label));
        cpp.push_str(&format!("#include \"{}_state.hpp\"\n", self.state_name));
        cpp.push_str(&format!("#include \"{}_module.hpp\"\n\n", self.module_name));

        cpp.push_str(&self.emit_string_pool());
        cpp.push('\n');

        if !forward_decls.is_empty() {
            cpp.push_str("// Forward declarations\n");
            for decl in &forward_decls {
                cpp.push_str(decl);
                cpp.push('\n');
            }
            cpp.push('\n');
        }

        for def in &function_defs {
            cpp.push_str(def);
            cpp.push_str("\n\n");
        }

        let export_name = naming::module_export_name(&self.module_name);
        cpp.push_str(&format!("// Module export: {}\n", export_name));
        cpp.push_str(&format!(
            "luaValue {}({}* state) {{\n",
            export_name,
            self.state_type()
        ));
        cpp.push_str(&body);
        cpp.push_str("}\n");

        let hpp = program::module_header(&self.module_name, &self.state_name);

        Ok(ModuleOutput { cpp, hpp })
    }

    /// Lower one top-level function definition. Returns its forward
    /// declaration and its definition.
    fn emit_function(
        &mut self,
        name: &str,
        body: &FuncBody,
    ) -> Result<(String, String), CodeGenError> {
        let mangled = naming::function_name(&self.module_name, name);
        let mut params = vec![format!("{}* state", self.state_type())];
        for (index, param) in body.params.iter().enumerate() {
            params.push(format!("{} {}", self.param_cpp_type(name, index), param));
        }
        if body.is_vararg {
            params.push("const std::vector<luaValue>& _l2c_varargs".to_string());
        }
        let signature = format!("static luaValue {}({})", mangled, params.join(", "));

        self.scopes.push();
        for (index, param) in body.params.iter().enumerate() {
            let shape = self
                .analysis
                .registry
                .signature(name)
                .and_then(|s| s.param_table_info.get(&index))
                .filter(|s| {
                    s.is_array && (!s.numeric_keys.is_empty() || !s.string_keys.is_empty())
                })
                .cloned();
            if let Ok(symbol) = self.scopes.define_parameter(param, index) {
                // Array-container parameters keep their shape so body
                // accesses use container operations.
                symbol.table_info = shape;
            }
        }
        let was_vararg = self.in_vararg_function;
        self.in_vararg_function = body.is_vararg;
        let mut lines = Vec::new();
        self.emit_block_statements(&body.body, 1, &mut lines)?;
        if !matches!(body.body.stmts.last(), Some(Stmt::Return { .. })) {
            lines.push("    return luaValue();".to_string());
        }
        self.in_vararg_function = was_vararg;
        self.scopes.pop().map_err(CodeGenError::Logic)?;

        let def = format!("{} {{\n{}\n}}", signature, lines.join("\n"));
        Ok((format!("{};", signature), def))
    }

    /// C++ parameter type for one function parameter, driven by the
    /// inference results.
    pub(crate) fn param_cpp_type(&self, function: &str, index: usize) -> String {
        param_cpp_type(self.analysis, function, index)
    }

    /// Lower the module body (everything except top-level function
    /// definitions) into the export function.
    fn emit_export_body(&mut self, chunk: &Chunk) -> Result<String, CodeGenError> {
        let mut lines = Vec::new();
        for stmt in &chunk.block.stmts {
            match stmt {
                Stmt::LocalFunction { .. } => {}
                Stmt::Function { name, .. } => {
                    // Global functions become state members; the module
                    // installs the pointer where the definition appears.
                    let mangled = naming::function_name(&self.module_name, name);
                    lines.push(format!("    state->{} = &{};", name, mangled));
                }
                other => self.emit_statement(other, 1, &mut lines)?,
            }
        }
        if !matches!(chunk.block.stmts.last(), Some(Stmt::Return { .. })) {
            lines.push("    return luaValue();".to_string());
        }
        let mut body = lines.join("\n");
        body.push('\n');
        Ok(body)
    }

    /// Interned literals come out as named constants
    /// (`_l2c__string_<index>`) collected into the `string_pool` array
    /// the generated expressions index into.
    fn emit_string_pool(&self) -> String {
        if self.string_pool.is_empty() {
            return "static const char* string_pool[] = {nullptr};\n".to_string();
        }
        let mut out = String::new();
        for (index, value) in self.string_pool.iter().enumerate() {
            out.push_str(&format!(
                "static const char* {} = \"{}\";  /* {} */\n",
                naming::string_literal_name(index),
                escape_cpp_string(value),
                index
            ));
        }
        out.push_str("static const char* string_pool[] = {\n");
        for index in 0..self.string_pool.len() {
            out.push_str(&format!("    {},\n", naming::string_literal_name(index)));
        }
        out.push_str("    nullptr\n};\n");
        out
    }
}

/// C++ parameter type for one function parameter, driven by the frozen
/// inference results: the array container for parameters indexed as
/// contiguous tables, native scalars for specialized parameters, and a
/// boxed reference otherwise.
pub(crate) fn param_cpp_type(analysis: &Analysis, function: &str, index: usize) -> String {
    let Some(signature) = analysis.registry.signature(function) else {
        return "luaValue&".to_string();
    };

    if let Some(shape) = signature.param_table_info.get(&index) {
        // The parameter was indexed as a table inside the body.
        if !shape.numeric_keys.is_empty() || !shape.string_keys.is_empty() {
            if shape.is_array {
                let element = shape
                    .value_type
                    .as_ref()
                    .filter(|t| t.can_specialize())
                    .map(|t| t.cpp_type())
                    .unwrap_or("luaValue");
                return format!("luaArray<{}>&", element);
            }
            return "luaValue&".to_string();
        }
    }

    match signature.param_type(index) {
        Some(t) if t.can_specialize() => match t.kind {
            TypeKind::Number => "double".to_string(),
            TypeKind::Boolean => "bool".to_string(),
            TypeKind::String => "const std::string&".to_string(),
            _ => "luaValue&".to_string(),
        },
        _ => "luaValue&".to_string(),
    }
}

/// Escape a Rust string for inclusion in a C++ string literal.
pub(crate) fn escape_cpp_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out
}

/// Format a Lua number as a C++ literal. Integral values print without
/// a fractional part.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::TypeInference;
    use crate::parser::parse;

    fn emit(source: &str) -> ModuleOutput {
        let chunk = parse(source).unwrap();
        let analysis = TypeInference::run(&chunk).unwrap();
        let mut codegen = CodeGen::new(&analysis, Mode::Standalone, "demo", "demo");
        codegen.emit_module(&chunk, "demo.lua").unwrap()
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(0.25), "0.25");
    }

    #[test]
    fn test_escape_cpp_string() {
        assert_eq!(escape_cpp_string("a\"b\\c\nd"), "a\\\"b\\\\c\\nd");
    }

    #[test]
    fn test_module_layout() {
        let output = emit("local x = 1\nlocal function f(a) return a end\nf(x)");
        assert!(output.cpp.starts_with("// Generated from demo.lua by l2c"));
        assert!(output.cpp.contains("#include \"demo_state.hpp\""));
        assert!(output.cpp.contains("#include \"demo_module.hpp\""));
        assert!(output.cpp.contains("static luaValue _l2c__demo_f("));
        assert!(output.cpp.contains("luaValue _l2c__demo_export(demo_lua_State* state)"));
        // Forward declaration appears before the definition.
        let decl = output.cpp.find("static luaValue _l2c__demo_f(").unwrap();
        let export = output.cpp.find("_l2c__demo_export").unwrap();
        assert!(decl < export);
        assert!(output.hpp.contains("#pragma once"));
        assert!(output.hpp.contains("_l2c__demo_export"));
    }

    #[test]
    fn test_export_body_returns_boxed_nil() {
        let output = emit("local x = 1");
        assert!(output.cpp.contains("return luaValue();"));
    }

    #[test]
    fn test_native_double_declaration() {
        // Both locals specialize; no boxing around the arithmetic.
        let output = emit("local x = 1\nlocal y = x + 2");
        assert!(output.cpp.contains("double x = 1;"));
        assert!(output.cpp.contains("double y = x + 2;"));
        assert!(!output.cpp.contains("luaValue(x + 2)"));
    }

    #[test]
    fn test_specialized_parameter() {
        // f takes a native double after propagation.
        let output = emit("local function f(a) return a + 1 end\nlocal x = 3\nf(x)");
        assert!(
            output.cpp.contains("static luaValue _l2c__demo_f(demo_lua_State* state, double a)"),
            "got:\n{}",
            output.cpp
        );
    }

    #[test]
    fn test_variant_parameter_stays_boxed() {
        // Conflicting call sites degrade the parameter to boxed.
        let output = emit(
            "local function f(a) end\nlocal n = 1\nlocal s = \"hello\"\nf(n)\nf(s)",
        );
        assert!(
            output
                .cpp
                .contains("static luaValue _l2c__demo_f(demo_lua_State* state, luaValue& a)"),
            "got:\n{}",
            output.cpp
        );
    }

    #[test]
    fn test_deterministic_output() {
        let source = "local t = {}\nt[1] = \"a\"\nt.k = 1\nlocal function f(a) return a end\nf(t)\nprint(\"done\")";
        let chunk = parse(source).unwrap();
        let analysis = TypeInference::run(&chunk).unwrap();
        let first = CodeGen::new(&analysis, Mode::Standalone, "demo", "demo")
            .emit_module(&chunk, "demo.lua")
            .unwrap();
        let second = CodeGen::new(&analysis, Mode::Standalone, "demo", "demo")
            .emit_module(&chunk, "demo.lua")
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_string_pool_named_entries() {
        let output = emit("local s = \"hello\"\nlocal t = \"hello\"\nlocal u = \"world\"");
        assert!(output
            .cpp
            .contains("static const char* _l2c__string_0 = \"hello\";  /* 0 */"));
        assert!(output
            .cpp
            .contains("static const char* _l2c__string_1 = \"world\";  /* 1 */"));
        assert!(output.cpp.contains("static const char* string_pool[] = {"));
        assert!(output.cpp.contains("    _l2c__string_0,"));
        assert!(output.cpp.contains("    _l2c__string_1,"));
        assert!(output.cpp.contains("nullptr"));
    }

    #[test]
    fn test_empty_string_pool() {
        let output = emit("local x = 1");
        assert!(output
            .cpp
            .contains("static const char* string_pool[] = {nullptr};"));
    }

    #[test]
    fn test_invalid_module_identifier_rejected() {
        let chunk = parse("local x = 1").unwrap();
        let analysis = TypeInference::run(&chunk).unwrap();
        let mut codegen = CodeGen::new(&analysis, Mode::Standalone, "3d", "3d");
        let err = codegen.emit_module(&chunk, "3d.lua").unwrap_err();
        assert!(err.to_string().contains("not a valid C++ identifier"));
    }

    #[test]
    fn test_global_function_installed_on_state() {
        let output = emit("function helper() return 1 end");
        assert!(output.cpp.contains("state->helper = &_l2c__demo_helper;"));
        assert!(output.cpp.contains("static luaValue _l2c__demo_helper(demo_lua_State* state)"));
    }
}
