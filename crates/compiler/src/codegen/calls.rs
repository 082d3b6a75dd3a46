//! Call-Site Strategy Selection
//!
//! Every call is classified and dispatched by a small strategy set:
//!
//! | strategy         | emitted shape                                  |
//! |------------------|------------------------------------------------|
//! | local function   | `_l2c__mod_f(state, args...)` with temporaries |
//! | global function  | `state->f(state, args...)`                     |
//! | static library   | `state->math.sqrt(args...)` typed arguments    |
//! | variadic library | `state->io.write({boxed args...})`             |
//! | require          | `state->modules["mod"](state)` (project mode)  |
//! | default fallback | `(callee)({boxed args...})`                    |
//!
//! Temporaries let literal and compound arguments bind to the reference
//! parameters of generated functions. In statement position they are
//! emitted as a prelude; in expression position the whole call is
//! wrapped in an immediately-invoked lambda so the temporaries stay
//! scoped to the call.

use super::{naming, CodeGen, CodeGenError, Mode};
use crate::ast::Expr;
use crate::libraries;
use crate::resolver::require_to_module_name;
use crate::types::TypeKind;

/// A lowered call: optional temporary declarations plus the call
/// expression itself.
pub(super) struct CallCode {
    pub prelude: Vec<String>,
    pub expr: String,
}

impl CallCode {
    pub fn simple(expr: String) -> Self {
        CallCode {
            prelude: Vec::new(),
            expr,
        }
    }

    /// Collapse into a single expression, wrapping temporaries into an
    /// immediately-invoked lambda when present.
    pub fn into_expression(self) -> String {
        if self.prelude.is_empty() {
            self.expr
        } else {
            format!(
                "([&]() {{ {} return {}; }})()",
                self.prelude.join(" "),
                self.expr
            )
        }
    }
}

/// Expected native kind for a C++ parameter type of a shim signature.
fn expected_kind_from_cpp(param_type: &str) -> Option<TypeKind> {
    if param_type.contains("std::vector") || param_type.contains("luaValue") {
        None
    } else if param_type.contains("std::string") {
        Some(TypeKind::String)
    } else if param_type.contains("double") {
        Some(TypeKind::Number)
    } else if param_type.contains("bool") {
        Some(TypeKind::Boolean)
    } else {
        None
    }
}

impl<'a> CodeGen<'a> {
    /// Classify and lower one call.
    pub(super) fn emit_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
    ) -> Result<CallCode, CodeGenError> {
        // require("literal") dispatches through the module registry.
        if func.as_name() == Some("require") && self.scopes.lookup("require").is_none() {
            return self.emit_require(args);
        }

        // Library method reference: io.write, math.sqrt, ...
        if let Some(path) = self.library_path_of_call(func) {
            return self.emit_library_call(&path, args);
        }

        // User-defined function known to the registry.
        if let Some(name) = func.as_name() {
            let symbol = self
                .scopes
                .lookup(name)
                .map(|s| (s.is_function, s.is_global));
            if let Some((true, is_global)) = symbol {
                return self.emit_function_call(name, is_global, args);
            }
            // Standalone shims (print, tonumber) unless shadowed.
            if symbol.is_none() && libraries::is_standalone_function(name) {
                return self.emit_standalone_call(name, args);
            }
        }

        // Default fallback: dynamic callee, boxed argument vector.
        let callee = self.emit_expr(func)?;
        let mut boxed = Vec::new();
        for arg in args {
            boxed.push(self.emit_boxed(arg)?);
        }
        Ok(CallCode::simple(format!(
            "({})({{{}}})",
            callee,
            boxed.join(", ")
        )))
    }

    fn library_path_of_call(&self, func: &Expr) -> Option<String> {
        self.library_path(func)
    }

    fn emit_require(&mut self, args: &[Expr]) -> Result<CallCode, CodeGenError> {
        let Some(Expr::Str(path)) = args.first() else {
            return Err(CodeGenError::Unsupported(
                "require() with a non-literal argument".to_string(),
            ));
        };
        if self.mode != Mode::Project {
            return Err(CodeGenError::Unsupported(
                "require() outside project mode".to_string(),
            ));
        }
        let module = require_to_module_name(path);
        Ok(CallCode::simple(format!(
            "state->modules[\"{}\"](state)",
            module
        )))
    }

    /// Call to a function defined in this module (local or global).
    ///
    /// Arguments follow the parameter types the inference settled on;
    /// literal and compound arguments are materialized into temporaries
    /// so reference parameters bind.
    fn emit_function_call(
        &mut self,
        name: &str,
        is_global: bool,
        args: &[Expr],
    ) -> Result<CallCode, CodeGenError> {
        let callee = if is_global {
            format!("state->{}", name)
        } else {
            naming::function_name(&self.module_name, name)
        };

        let mut prelude = Vec::new();
        let mut lowered = vec!["state".to_string()];
        for (index, arg) in args.iter().enumerate() {
            let param_type = self.param_cpp_type(name, index);
            lowered.push(self.emit_function_argument(arg, &param_type, &mut prelude)?);
        }

        Ok(CallCode {
            prelude,
            expr: format!("{}({})", callee, lowered.join(", ")),
        })
    }

    fn emit_function_argument(
        &mut self,
        arg: &Expr,
        param_type: &str,
        prelude: &mut Vec<String>,
    ) -> Result<String, CodeGenError> {
        // Bare names pass through: locals are lvalues, and dynamic
        // global lookup yields a reference.
        if arg.as_name().is_some() {
            return self.emit_expr(arg);
        }

        // By-value native parameters take the expression directly.
        if param_type == "double" || param_type == "bool" || param_type == "const std::string&" {
            let expected = match param_type {
                "double" => TypeKind::Number,
                "bool" => TypeKind::Boolean,
                _ => TypeKind::String,
            };
            return self.emit_expr_expecting(arg, expected);
        }

        // Reference parameters need an lvalue: materialize a temporary.
        let temp = self.fresh_temp("tmp_arg");
        let decl = match arg {
            Expr::Number(_) => {
                format!("double {} = {};", temp, self.emit_expr(arg)?)
            }
            Expr::Str(_) => {
                format!("std::string {} = {};", temp, self.emit_expr(arg)?)
            }
            _ => format!("auto {} = {};", temp, self.emit_boxed(arg)?),
        };
        prelude.push(decl);
        Ok(temp)
    }

    /// Calls on `lib.member` references.
    fn emit_library_call(&mut self, path: &str, args: &[Expr]) -> Result<CallCode, CodeGenError> {
        let Some(signature) = libraries::signature(path) else {
            // Known library member without a typed shim: dynamic call.
            let mut boxed = Vec::new();
            for arg in args {
                boxed.push(self.emit_boxed(arg)?);
            }
            return Ok(CallCode::simple(format!(
                "(state->get_global(\"{}\"))({{{}}})",
                path,
                boxed.join(", ")
            )));
        };

        if signature.variadic {
            // string.format keeps its format string as a separate typed
            // first argument; the rest travel in the boxed vector.
            let takes_format_string = signature
                .param_types
                .first()
                .map(|p| p.contains("std::string"))
                .unwrap_or(false);
            if takes_format_string && !args.is_empty() {
                let format_arg = self.emit_expr_expecting(&args[0], TypeKind::String)?;
                let mut rest = Vec::new();
                for arg in &args[1..] {
                    rest.push(self.emit_boxed(arg)?);
                }
                return Ok(CallCode::simple(format!(
                    "state->{}({}, {{{}}})",
                    path,
                    format_arg,
                    rest.join(", ")
                )));
            }
            let mut boxed = Vec::new();
            for arg in args {
                boxed.push(self.emit_boxed(arg)?);
            }
            return Ok(CallCode::simple(format!(
                "state->{}({{{}}})",
                path,
                boxed.join(", ")
            )));
        }

        // Fully typed shim: propagate the parameter types onto the
        // arguments.
        let mut lowered = Vec::new();
        for (index, arg) in args.iter().enumerate() {
            let code = match signature
                .param_types
                .get(index)
                .and_then(|p| expected_kind_from_cpp(p))
            {
                Some(expected) => self.emit_expr_expecting(arg, expected)?,
                None => self.emit_boxed(arg)?,
            };
            lowered.push(code);
        }
        Ok(CallCode::simple(format!(
            "state->{}({})",
            path,
            lowered.join(", ")
        )))
    }

    /// `print` and `tonumber` live directly on the state struct.
    fn emit_standalone_call(
        &mut self,
        name: &str,
        args: &[Expr],
    ) -> Result<CallCode, CodeGenError> {
        let signature = libraries::signature(name)
            .ok_or_else(|| CodeGenError::Logic(format!("no shim signature for '{}'", name)))?;

        if signature.variadic {
            let mut boxed = Vec::new();
            for arg in args {
                boxed.push(self.emit_boxed(arg)?);
            }
            return Ok(CallCode::simple(format!(
                "state->{}({{{}}})",
                name,
                boxed.join(", ")
            )));
        }

        let mut lowered = Vec::new();
        for arg in args {
            lowered.push(self.emit_boxed(arg)?);
        }
        Ok(CallCode::simple(format!(
            "state->{}({})",
            name,
            lowered.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::ModuleOutput;
    use crate::infer::TypeInference;
    use crate::parser::parse;

    fn emit_mode(source: &str, mode: Mode) -> ModuleOutput {
        let chunk = parse(source).unwrap();
        let analysis = TypeInference::run(&chunk).unwrap();
        let mut codegen = CodeGen::new(&analysis, mode, "demo", "demo");
        codegen.emit_module(&chunk, "demo.lua").unwrap()
    }

    fn emit(source: &str) -> ModuleOutput {
        emit_mode(source, Mode::Standalone)
    }

    #[test]
    fn test_local_call_passes_state_and_name_args() {
        let output = emit("local function f(a) return a end\nlocal x = 1\nf(x)");
        assert!(output.cpp.contains("_l2c__demo_f(state, x);"));
    }

    #[test]
    fn test_local_call_literal_to_native_param() {
        // The parameter specialized to double, so the literal passes
        // directly by value.
        let output = emit("local function f(a) return a + 1 end\nlocal x = 1\nf(x)\nf(2)");
        assert!(output.cpp.contains("_l2c__demo_f(state, 2);"));
    }

    #[test]
    fn test_local_call_boxed_literal_needs_temporary() {
        // Untyped parameter -> luaValue& -> the literal argument is
        // materialized into a temporary.
        let output = emit("local function f(a) end\nf(true)");
        assert!(output.cpp.contains("auto _l2c_tmp_arg_0 = luaValue(true);"));
        assert!(output.cpp.contains("_l2c__demo_f(state, _l2c_tmp_arg_0);"));
    }

    #[test]
    fn test_call_in_expression_wraps_temporaries() {
        let output = emit("local function f(a) end\nlocal r = f({})");
        assert!(
            output.cpp.contains("([&]() {")
                && output.cpp.contains("return _l2c__demo_f(state, _l2c_tmp_arg_0); })()"),
            "got:\n{}",
            output.cpp
        );
    }

    #[test]
    fn test_variadic_library_call() {
        let output = emit("io.write(\"a\", 1)");
        assert!(output
            .cpp
            .contains("state->io.write({luaValue(string_pool[0]), luaValue(1)});"));
    }

    #[test]
    fn test_print_is_variadic() {
        let output = emit("print(\"hi\", 2)");
        assert!(output
            .cpp
            .contains("state->print({luaValue(string_pool[0]), luaValue(2)});"));
    }

    #[test]
    fn test_string_format_first_argument_separate() {
        let output = emit("local s = string.format(\"%d\", 42)");
        assert!(output
            .cpp
            .contains("state->string.format(string_pool[0], {luaValue(42)})"));
    }

    #[test]
    fn test_static_library_call_propagates_types() {
        let output = emit("local r = math.sqrt(16)");
        assert!(output.cpp.contains("state->math.sqrt(16)"));
        assert!(!output.cpp.contains("math.sqrt(luaValue(16))"));
    }

    #[test]
    fn test_tonumber_takes_boxed_argument() {
        let output = emit("local n = tonumber(\"42\")");
        assert!(output
            .cpp
            .contains("state->tonumber(luaValue(string_pool[0]))"));
    }

    #[test]
    fn test_require_in_project_mode() {
        let output = emit_mode("local utils = require(\"subdir.utils\")", Mode::Project);
        assert!(output
            .cpp
            .contains("state->modules[\"subdir__utils\"](state)"));
    }

    #[test]
    fn test_require_rejected_outside_project_mode() {
        let chunk = parse("local u = require(\"utils\")").unwrap();
        let analysis = TypeInference::run(&chunk).unwrap();
        let mut codegen = CodeGen::new(&analysis, Mode::Standalone, "demo", "demo");
        let err = codegen.emit_module(&chunk, "demo.lua").unwrap_err();
        assert!(err.to_string().contains("require"));
    }

    #[test]
    fn test_unknown_callee_falls_back_to_boxed_vector() {
        let output = emit("mystery(1, \"a\")");
        assert!(output
            .cpp
            .contains("(state->get_global(\"mystery\"))({luaValue(1), luaValue(string_pool[0])});"));
    }

    #[test]
    fn test_untyped_library_member_dynamic_call() {
        let output = emit("local r = string.gsub(\"a\", \"b\", \"c\")");
        assert!(output.cpp.contains("(state->get_global(\"string.gsub\"))({"));
    }

    #[test]
    fn test_global_function_called_through_state() {
        let output = emit("function helper(n) return n end\nlocal x = 1\nhelper(x)");
        assert!(output.cpp.contains("state->helper(state, x);"));
    }

    #[test]
    fn test_shadowed_print_is_a_local_call() {
        let output = emit("local function print(x) end\nlocal v = 1\nprint(v)");
        assert!(output.cpp.contains("_l2c__demo_print(state, v);"));
        assert!(!output.cpp.contains("state->print("));
    }
}
