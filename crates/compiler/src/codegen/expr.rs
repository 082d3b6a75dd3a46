//! Expression Lowering
//!
//! Lowers Lua expressions to C++ expression text, driven by the frozen
//! type information: arithmetic over two `Number` operands uses native
//! operators, everything else goes through the runtime coercion
//! helpers; `and`/`or` preserve Lua's returns-an-operand semantics; and
//! string literals are interned into the per-module pool.

use super::{format_number, CodeGen, CodeGenError, Mode};
use crate::ast::{BinOp, Expr, TableEntry, UnOp};
use crate::libraries;
use crate::types::{Type, TypeKind};

/// C++ operator precedence for re-parenthesizing nested binaries.
fn precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Pow => 10,
        BinOp::Mul | BinOp::Div | BinOp::FloorDiv | BinOp::Mod => 9,
        BinOp::Add | BinOp::Sub => 8,
        BinOp::Concat => 7,
        BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 6,
        BinOp::And => 5,
        BinOp::Or => 4,
    }
}

impl<'a> CodeGen<'a> {
    /// Static type of an expression, re-derived from the frozen
    /// analysis. Mirrors the inference rules without mutating anything.
    pub(super) fn expr_type(&self, expr: &Expr) -> Type {
        match expr {
            Expr::Nil => Type::constant(TypeKind::Nil),
            Expr::True | Expr::False => Type::constant(TypeKind::Boolean),
            Expr::Number(_) => Type::constant(TypeKind::Number),
            Expr::Str(_) => Type::constant(TypeKind::String),
            Expr::Name(name) => self.analysis.type_of(name),
            Expr::Table(_) => Type::new(TypeKind::Table),
            Expr::Function(_) => Type::new(TypeKind::Function),
            Expr::Varargs
            | Expr::Call { .. }
            | Expr::MethodCall { .. }
            | Expr::Index { .. }
            | Expr::Field { .. } => Type::unknown(),
            Expr::Binary { op, lhs, rhs } => {
                let left = self.expr_type(lhs);
                let right = self.expr_type(rhs);
                match op {
                    _ if op.is_arithmetic() => {
                        if left.kind == TypeKind::Number && right.kind == TypeKind::Number {
                            Type::new(TypeKind::Number)
                        } else {
                            Type::unknown()
                        }
                    }
                    BinOp::Concat => Type::new(TypeKind::String),
                    _ if op.is_comparison() => Type::new(TypeKind::Boolean),
                    BinOp::And | BinOp::Or => left.join(&right),
                    _ => Type::unknown(),
                }
            }
            Expr::Unary { op, operand } => match op {
                UnOp::Neg => self.expr_type(operand),
                UnOp::Not => Type::new(TypeKind::Boolean),
                UnOp::Len => Type::new(TypeKind::Number),
            },
        }
    }

    /// Lower an expression in its natural representation: native text
    /// for specializable expressions, boxed or dynamic text otherwise.
    pub(super) fn emit_expr(&mut self, expr: &Expr) -> Result<String, CodeGenError> {
        match expr {
            Expr::Nil => Ok("luaValue()".to_string()),
            Expr::True => Ok("true".to_string()),
            Expr::False => Ok("false".to_string()),
            Expr::Number(n) => Ok(format_number(*n)),
            Expr::Str(s) => {
                let index = self.intern_string(s);
                Ok(format!("string_pool[{}]", index))
            }
            Expr::Varargs => Ok(self.emit_varargs()),
            Expr::Name(name) => Ok(self.emit_name(name)),
            Expr::Index { .. } | Expr::Field { .. } => self.emit_read_access(expr),
            Expr::Call { func, args, .. } => {
                let call = self.emit_call(func, args)?;
                Ok(call.into_expression())
            }
            Expr::MethodCall {
                object,
                method,
                args,
                ..
            } => self.emit_method_call(object, method, args),
            Expr::Table(entries) => self.emit_table_constructor(entries),
            Expr::Function(_) => Ok("luaValue::new_closure()".to_string()),
            Expr::Binary { op, lhs, rhs } => self.emit_binary(*op, lhs, rhs),
            Expr::Unary { op, operand } => self.emit_unary(*op, operand),
        }
    }

    /// Lower an expression and guarantee the result is a boxed value.
    pub(super) fn emit_boxed(&mut self, expr: &Expr) -> Result<String, CodeGenError> {
        let code = self.emit_expr(expr)?;
        let inferred = self.expr_type(expr);
        if inferred.can_specialize() && !code.starts_with("luaValue(") {
            Ok(format!("luaValue({})", code))
        } else {
            Ok(code)
        }
    }

    /// Lower an expression where the surrounding context expects a
    /// concrete kind (a typed shim parameter, a specialized
    /// declaration). Literals of the expected kind lower natively; any
    /// mismatch falls back to the natural form.
    pub(super) fn emit_expr_expecting(
        &mut self,
        expr: &Expr,
        expected: TypeKind,
    ) -> Result<String, CodeGenError> {
        match (expr, expected) {
            (Expr::Number(n), TypeKind::Number) => Ok(format_number(*n)),
            (Expr::Str(s), TypeKind::String) => {
                let index = self.intern_string(s);
                Ok(format!("string_pool[{}]", index))
            }
            (Expr::True, TypeKind::Boolean) => Ok("true".to_string()),
            (Expr::False, TypeKind::Boolean) => Ok("false".to_string()),
            _ => self.emit_expr(expr),
        }
    }

    /// Lower a condition expression. Boolean-typed expressions are used
    /// directly; anything else goes through Lua truthiness.
    pub(super) fn emit_condition(&mut self, expr: &Expr) -> Result<String, CodeGenError> {
        if self.expr_type(expr).kind == TypeKind::Boolean {
            self.emit_expr(expr)
        } else {
            let boxed = self.emit_boxed(expr)?;
            Ok(format!("({}).is_truthy()", boxed))
        }
    }

    fn emit_varargs(&self) -> String {
        if self.in_vararg_function {
            "luaValue(_l2c_varargs)".to_string()
        } else if self.mode == Mode::Library {
            // Library modules have no `arg` member to forward.
            "luaValue()".to_string()
        } else {
            "luaValue(state->arg)".to_string()
        }
    }

    /// Variable reference. Locals are plain names; globals resolve via
    /// the state struct in project mode and via dynamic lookup in
    /// single-file mode.
    pub(super) fn emit_name(&mut self, name: &str) -> String {
        if self.scopes.lookup(name).map(|s| !s.is_global).unwrap_or(false) {
            return name.to_string();
        }
        let known_global = self
            .analysis
            .scopes
            .global_symbols()
            .any(|s| s.name == name);
        if known_global && self.mode == Mode::Project {
            format!("state->{}", name)
        } else {
            format!("state->get_global(\"{}\")", name)
        }
    }

    /// Indexing and field reads. Library references become state
    /// members; array-shaped tables use the array container; everything
    /// else is dynamic boxed indexing.
    fn emit_read_access(&mut self, expr: &Expr) -> Result<String, CodeGenError> {
        if let Some(path) = self.library_path(expr) {
            return Ok(self.emit_library_reference(&path));
        }
        match expr {
            Expr::Index { value, key } => {
                if let Some(name) = self.array_table_name(value) {
                    let key_code = self.emit_expr_expecting(key, TypeKind::Number)?;
                    return Ok(format!("{}.get({} - 1)", name, key_code));
                }
                let table = self.emit_expr(value)?;
                let key = self.emit_boxed(key)?;
                Ok(format!("({})[{}]", table, key))
            }
            Expr::Field { value, field } => {
                let table = self.emit_expr(value)?;
                let index = self.intern_string(field);
                Ok(format!("({})[string_pool[{}]]", table, index))
            }
            _ => Err(CodeGenError::Logic(
                "emit_read_access called on a non-access expression".to_string(),
            )),
        }
    }

    /// `lib.member` when `lib` is an unshadowed standard library name.
    pub(super) fn library_path(&self, expr: &Expr) -> Option<String> {
        let Expr::Field { value, field } = expr else {
            return None;
        };
        let lib = value.as_name()?;
        if !libraries::is_library_module(lib) || !libraries::is_library_member(lib, field) {
            return None;
        }
        // A local shadowing the library name wins.
        if self.scopes.lookup(lib).map(|s| !s.is_global).unwrap_or(false) {
            return None;
        }
        Some(format!("{}.{}", lib, field))
    }

    /// A reference to a library function: typed shims live on the state
    /// struct, untyped members fall back to dynamic lookup.
    pub(super) fn emit_library_reference(&self, path: &str) -> String {
        if libraries::signature(path).is_some() {
            format!("state->{}", path)
        } else {
            format!("state->get_global(\"{}\")", path)
        }
    }

    /// Named local that was declared as the array container. The shape
    /// is attached to the emission-scope symbol at declaration time, so
    /// tables that were declared boxed (e.g. initialized from a call)
    /// never get container operations.
    pub(super) fn array_table_name(&self, expr: &Expr) -> Option<String> {
        let name = expr.as_name()?;
        let symbol = self.scopes.lookup(name)?;
        if symbol.is_global {
            return None;
        }
        let shape = symbol.table_info.as_ref()?;
        if shape.is_array {
            Some(name.to_string())
        } else {
            None
        }
    }

    /// `obj:method(args)` lowers to `obj["method"](obj, args...)`.
    fn emit_method_call(
        &mut self,
        object: &Expr,
        method: &str,
        args: &[Expr],
    ) -> Result<String, CodeGenError> {
        let object_code = self.emit_expr(object)?;
        let object_boxed = self.emit_boxed(object)?;
        let index = self.intern_string(method);
        let mut call_args = vec![object_boxed];
        for arg in args {
            call_args.push(self.emit_boxed(arg)?);
        }
        Ok(format!(
            "({})[string_pool[{}]]({{{}}})",
            object_code,
            index,
            call_args.join(", ")
        ))
    }

    /// Table constructors: the empty constructor is a bare table; a
    /// populated one builds the table in an immediately-invoked lambda
    /// so it stays an expression.
    fn emit_table_constructor(&mut self, entries: &[TableEntry]) -> Result<String, CodeGenError> {
        if entries.is_empty() {
            return Ok("luaValue::new_table()".to_string());
        }
        let mut parts = vec!["[&]() { auto _l2c_t = luaValue::new_table();".to_string()];
        let mut next_index: u64 = 1;
        for entry in entries {
            let line = match entry {
                TableEntry::Item(value) => {
                    let value = self.emit_boxed(value)?;
                    let line = format!(" _l2c_t[luaValue({})] = {};", next_index, value);
                    next_index += 1;
                    line
                }
                TableEntry::Named(field, value) => {
                    let index = self.intern_string(field);
                    let value = self.emit_boxed(value)?;
                    format!(" _l2c_t[string_pool[{}]] = {};", index, value)
                }
                TableEntry::Keyed(key, value) => {
                    let key = self.emit_boxed(key)?;
                    let value = self.emit_boxed(value)?;
                    format!(" _l2c_t[{}] = {};", key, value)
                }
            };
            parts.push(line);
        }
        parts.push(" return _l2c_t; }()".to_string());
        Ok(parts.concat())
    }

    fn emit_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<String, CodeGenError> {
        match op {
            _ if op.is_arithmetic() => self.emit_arithmetic(op, lhs, rhs),
            BinOp::Concat => {
                let left = self.emit_boxed(lhs)?;
                let right = self.emit_boxed(rhs)?;
                Ok(format!("l2c_concat({}, {})", left, right))
            }
            _ if op.is_comparison() => {
                let symbol = match op {
                    BinOp::Eq => "==",
                    BinOp::Ne => "!=",
                    BinOp::Lt => "<",
                    BinOp::Le => "<=",
                    BinOp::Gt => ">",
                    BinOp::Ge => ">=",
                    _ => unreachable!("comparison arm"),
                };
                let left = self.emit_operand(lhs, op)?;
                let right = self.emit_operand(rhs, op)?;
                Ok(format!("{} {} {}", left, symbol, right))
            }
            BinOp::And | BinOp::Or => self.emit_logical(op, lhs, rhs),
            _ => unreachable!("all binary operators handled"),
        }
    }

    fn emit_arithmetic(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<String, CodeGenError> {
        let native = self.expr_type(lhs).kind == TypeKind::Number
            && self.expr_type(rhs).kind == TypeKind::Number;

        if native {
            let left = self.emit_operand(lhs, op)?;
            let right = self.emit_operand(rhs, op)?;
            return Ok(match op {
                BinOp::Add => format!("{} + {}", left, right),
                BinOp::Sub => format!("{} - {}", left, right),
                BinOp::Mul => format!("{} * {}", left, right),
                BinOp::Div => format!("{} / {}", left, right),
                BinOp::Mod => format!("std::fmod({}, {})", left, right),
                BinOp::FloorDiv => format!("l2c_floor_div({}, {})", left, right),
                BinOp::Pow => format!("l2c_pow({}, {})", left, right),
                _ => unreachable!("arithmetic arm"),
            });
        }

        // Mixed or unknown operands: the runtime helper applies Lua's
        // string-to-number coercion.
        let helper = match op {
            BinOp::Add => "l2c_add",
            BinOp::Sub => "l2c_sub",
            BinOp::Mul => "l2c_mul",
            BinOp::Div => "l2c_div",
            BinOp::Mod => "l2c_mod",
            BinOp::FloorDiv => "l2c_floor_div",
            BinOp::Pow => "l2c_pow",
            _ => unreachable!("arithmetic arm"),
        };
        let left = self.emit_boxed(lhs)?;
        let right = self.emit_boxed(rhs)?;
        Ok(format!("{}({}, {})", helper, left, right))
    }

    /// `and`/`or` return one of their operands. Pure operands use a
    /// ternary; operands with side effects evaluate once inside an
    /// immediately-invoked lambda.
    fn emit_logical(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<String, CodeGenError> {
        let impure = self.has_side_effects(lhs) || self.has_side_effects(rhs);
        let left = self.emit_boxed(lhs)?;
        let right = self.emit_boxed(rhs)?;

        if impure {
            let pick = match op {
                BinOp::And => "_l2c_tmp_left.is_truthy() ? _l2c_tmp_right : _l2c_tmp_left",
                BinOp::Or => "_l2c_tmp_left.is_truthy() ? _l2c_tmp_left : _l2c_tmp_right",
                _ => unreachable!("logical arm"),
            };
            return Ok(format!(
                "[&]() {{ auto _l2c_tmp_left = {}; auto _l2c_tmp_right = {}; return {}; }}()",
                left, right, pick
            ));
        }

        Ok(match op {
            BinOp::And => format!("({}).is_truthy() ? ({}) : ({})", left, right, left),
            BinOp::Or => format!("({}).is_truthy() ? ({}) : ({})", left, left, right),
            _ => unreachable!("logical arm"),
        })
    }

    fn emit_unary(&mut self, op: UnOp, operand: &Expr) -> Result<String, CodeGenError> {
        match op {
            UnOp::Neg => {
                let code = if self.expr_type(operand).kind == TypeKind::Number {
                    self.emit_expr(operand)?
                } else {
                    self.emit_boxed(operand)?
                };
                Ok(format!("-({})", code))
            }
            UnOp::Not => {
                let boxed = self.emit_boxed(operand)?;
                Ok(format!("!({}).is_truthy()", boxed))
            }
            UnOp::Len => {
                let boxed = self.emit_boxed(operand)?;
                Ok(format!("l2c_len({})", boxed))
            }
        }
    }

    /// Emit a binary operand, parenthesized when its operator binds
    /// looser than the parent.
    fn emit_operand(&mut self, expr: &Expr, parent: BinOp) -> Result<String, CodeGenError> {
        let code = self.emit_expr(expr)?;
        if let Expr::Binary { op, .. } = expr {
            if precedence(*op) < precedence(parent) {
                return Ok(format!("({})", code));
            }
        }
        Ok(code)
    }

    /// Conservative side-effect check for double-evaluation decisions:
    /// calls always; global reads (dynamic lookup) too.
    pub(super) fn has_side_effects(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Call { .. } | Expr::MethodCall { .. } => true,
            Expr::Name(name) => !self
                .scopes
                .lookup(name)
                .map(|s| !s.is_global)
                .unwrap_or(false),
            Expr::Index { value, .. } | Expr::Field { value, .. } => self.has_side_effects(value),
            Expr::Binary { lhs, rhs, .. } => {
                self.has_side_effects(lhs) || self.has_side_effects(rhs)
            }
            Expr::Unary { operand, .. } => self.has_side_effects(operand),
            Expr::Table(entries) => entries.iter().any(|entry| match entry {
                TableEntry::Item(v) | TableEntry::Named(_, v) => self.has_side_effects(v),
                TableEntry::Keyed(k, v) => self.has_side_effects(k) || self.has_side_effects(v),
            }),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::ModuleOutput;
    use crate::infer::TypeInference;
    use crate::parser::parse;

    fn emit(source: &str) -> ModuleOutput {
        let chunk = parse(source).unwrap();
        let analysis = TypeInference::run(&chunk).unwrap();
        let mut codegen = CodeGen::new(&analysis, Mode::Standalone, "demo", "demo");
        codegen.emit_module(&chunk, "demo.lua").unwrap()
    }

    fn emit_project(source: &str) -> ModuleOutput {
        let chunk = parse(source).unwrap();
        let analysis = TypeInference::run(&chunk).unwrap();
        let mut codegen = CodeGen::new(&analysis, Mode::Project, "demo", "proj");
        codegen.emit_module(&chunk, "demo.lua").unwrap()
    }

    #[test]
    fn test_native_arithmetic_without_boxing() {
        let output = emit("local x = 1\nlocal y = x * 2 + 1");
        assert!(output.cpp.contains("double y = x * 2 + 1;"));
    }

    #[test]
    fn test_precedence_parentheses() {
        let output = emit("local x = 1\nlocal y = (x + 1) * 2");
        assert!(output.cpp.contains("double y = (x + 1) * 2;"));
    }

    #[test]
    fn test_unknown_operands_use_helper() {
        let output = emit("local u\nlocal y = u + 1");
        assert!(output.cpp.contains("l2c_add(u, luaValue(1))"));
    }

    #[test]
    fn test_concat_uses_helper() {
        let output = emit("local s = \"a\" .. \"b\"");
        assert!(output
            .cpp
            .contains("l2c_concat(luaValue(string_pool[0]), luaValue(string_pool[1]))"));
        assert!(output.cpp.contains("std::string s ="));
    }

    #[test]
    fn test_logical_pure_uses_ternary() {
        let output = emit("local a = 1\nlocal b = 2\nlocal c = a and b");
        assert!(output.cpp.contains(".is_truthy() ?"));
        assert!(!output.cpp.contains("_l2c_tmp_left"));
    }

    #[test]
    fn test_logical_with_side_effects_uses_lambda() {
        let output = emit("local function f() return 1 end\nlocal c = f() or 2");
        assert!(output.cpp.contains("_l2c_tmp_left"));
        assert!(output.cpp.contains("_l2c_tmp_right"));
        assert!(output
            .cpp
            .contains("_l2c_tmp_left.is_truthy() ? _l2c_tmp_left : _l2c_tmp_right"));
    }

    #[test]
    fn test_not_and_length() {
        let output = emit("local s = \"abc\"\nlocal a = not s\nlocal n = #s");
        assert!(output.cpp.contains("!(luaValue(s)).is_truthy()"));
        assert!(output.cpp.contains("l2c_len(luaValue(s))"));
    }

    #[test]
    fn test_library_reference_is_state_member() {
        let output = emit("io.write(\"hi\")");
        assert!(output.cpp.contains("state->io.write("));
    }

    #[test]
    fn test_untyped_library_member_is_dynamic() {
        let output = emit("local r = string.gsub(\"a\", \"b\", \"c\")");
        assert!(output.cpp.contains("state->get_global(\"string.gsub\")"));
    }

    #[test]
    fn test_global_read_by_mode() {
        let single = emit("g = 1\nlocal x = g");
        assert!(single.cpp.contains("state->get_global(\"g\")"));
        let project = emit_project("g = 1\nlocal x = g");
        assert!(project.cpp.contains("state->g"));
    }

    #[test]
    fn test_array_read_uses_container() {
        let output = emit("local t = {}\nt[1] = 5\nlocal v = t[1]");
        assert!(output.cpp.contains("t.get(1 - 1)"));
    }

    #[test]
    fn test_map_read_uses_boxed_indexing() {
        let output = emit("local t = {}\nt.name = 1\nt[1] = 2\nlocal v = t[1]");
        assert!(output.cpp.contains("(t)[luaValue(1)]"));
    }

    #[test]
    fn test_field_read_through_string_pool() {
        let output = emit("local t = {}\nt.name = 1\nlocal v = t.name");
        assert!(output.cpp.contains("(t)[string_pool["));
    }

    #[test]
    fn test_method_call_shape() {
        let output = emit("local obj = {}\nobj.x = 1\nobj:greet(\"hi\")");
        // obj["greet"]({obj, "hi"})
        assert!(
            output.cpp.contains("(obj)[string_pool[")
                && output.cpp.contains("]({obj, luaValue(string_pool["),
            "got:\n{}",
            output.cpp
        );
    }

    #[test]
    fn test_table_constructor_lowering() {
        let output = emit("local t = { 1, name = \"x\" }\nt.other = 2");
        assert!(output.cpp.contains("auto _l2c_t = luaValue::new_table();"));
        assert!(output.cpp.contains("_l2c_t[luaValue(1)] = luaValue(1);"));
        assert!(output.cpp.contains("return _l2c_t; }()"));
    }

    #[test]
    fn test_empty_table_constructor() {
        let output = emit("local t = {}\nt.name = 1");
        assert!(output.cpp.contains("luaValue t = luaValue::new_table();"));
    }

    #[test]
    fn test_string_pool_dedup() {
        let output = emit("local a = \"same\"\nlocal b = \"same\"");
        assert_eq!(output.cpp.matches("/* 0 */").count(), 1);
        assert!(!output.cpp.contains("/* 1 */"));
    }
}
