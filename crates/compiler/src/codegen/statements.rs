//! Statement Lowering
//!
//! Lowers Lua statements to C++ statements. Declarations pick the
//! concrete C++ type when the inference permits: `double`/`bool`/
//! `std::string` for specialized scalars, the array container for
//! tables whose shape finalized as contiguous, and the boxed value for
//! everything else.
//!
//! The numeric `for` lowers to a native loop whose condition follows
//! the sign of a literal step; a non-literal step is hoisted and
//! checked through a runtime helper.

use super::{format_number, CodeGen, CodeGenError, Mode};
use crate::ast::{Block, Expr, Stmt, TableEntry};
use crate::types::{TableShape, Type, TypeKind};

fn indentation(indent: usize) -> String {
    "    ".repeat(indent)
}

impl<'a> CodeGen<'a> {
    pub(super) fn emit_block_statements(
        &mut self,
        block: &Block,
        indent: usize,
        out: &mut Vec<String>,
    ) -> Result<(), CodeGenError> {
        for stmt in &block.stmts {
            self.emit_statement(stmt, indent, out)?;
        }
        Ok(())
    }

    /// Lower one statement into `out`, one line per entry.
    pub(super) fn emit_statement(
        &mut self,
        stmt: &Stmt,
        indent: usize,
        out: &mut Vec<String>,
    ) -> Result<(), CodeGenError> {
        let pad = indentation(indent);
        match stmt {
            Stmt::LocalAssign { names, values, .. } => {
                for (i, name) in names.iter().enumerate() {
                    self.emit_local_declaration(name, values.get(i), indent, out)?;
                }
                for value in values.iter().skip(names.len()) {
                    if self.has_side_effects(value) {
                        let code = self.emit_expr(value)?;
                        out.push(format!("{}{};", pad, code));
                    }
                }
            }
            Stmt::Assign {
                targets, values, ..
            } => {
                for (i, target) in targets.iter().enumerate() {
                    self.emit_assignment(target, values.get(i), indent, out)?;
                }
                for value in values.iter().skip(targets.len()) {
                    if self.has_side_effects(value) {
                        let code = self.emit_expr(value)?;
                        out.push(format!("{}{};", pad, code));
                    }
                }
            }
            Stmt::LocalFunction { name, line, .. } | Stmt::Function { name, line, .. } => {
                return Err(CodeGenError::Unsupported(format!(
                    "line {}: nested function definition '{}' (functions must be top-level)",
                    line, name
                )));
            }
            Stmt::CallStmt { call, .. } => match call {
                Expr::Call { func, args, .. } => {
                    let lowered = self.emit_call(func, args)?;
                    for decl in &lowered.prelude {
                        out.push(format!("{}{}", pad, decl));
                    }
                    out.push(format!("{}{};", pad, lowered.expr));
                }
                other => {
                    let code = self.emit_expr(other)?;
                    out.push(format!("{}{};", pad, code));
                }
            },
            Stmt::If {
                cond,
                then_body,
                elseifs,
                else_body,
                ..
            } => {
                let cond_code = self.emit_condition(cond)?;
                out.push(format!("{}if ({}) {{", pad, cond_code));
                self.emit_scoped_block(then_body, indent + 1, out)?;
                for elseif in elseifs {
                    let cond_code = self.emit_condition(&elseif.cond)?;
                    out.push(format!("{}}} else if ({}) {{", pad, cond_code));
                    self.emit_scoped_block(&elseif.body, indent + 1, out)?;
                }
                if let Some(body) = else_body {
                    out.push(format!("{}}} else {{", pad));
                    self.emit_scoped_block(body, indent + 1, out)?;
                }
                out.push(format!("{}}}", pad));
            }
            Stmt::While { cond, body, .. } => {
                let cond_code = self.emit_condition(cond)?;
                out.push(format!("{}while ({}) {{", pad, cond_code));
                self.emit_scoped_block(body, indent + 1, out)?;
                out.push(format!("{}}}", pad));
            }
            Stmt::Repeat { body, until, .. } => {
                out.push(format!("{}do {{", pad));
                // The until expression sees the body's scope.
                self.scopes.push();
                self.emit_block_statements(body, indent + 1, out)?;
                let cond_code = self.emit_condition(until)?;
                self.scopes.pop().map_err(CodeGenError::Logic)?;
                out.push(format!("{}}} while (!({}));", pad, cond_code));
            }
            Stmt::NumericFor {
                var,
                start,
                stop,
                step,
                body,
                ..
            } => self.emit_numeric_for(var, start, stop, step.as_ref(), body, indent, out)?,
            Stmt::GenericFor {
                names, exprs, body, ..
            } => self.emit_generic_for(names, exprs, body, indent, out)?,
            Stmt::Return { values, .. } => match values.as_slice() {
                [] => out.push(format!("{}return luaValue();", pad)),
                [single] => {
                    let code = self.emit_boxed(single)?;
                    out.push(format!("{}return {};", pad, code));
                }
                multiple => {
                    let mut boxed = Vec::new();
                    for value in multiple {
                        boxed.push(self.emit_boxed(value)?);
                    }
                    out.push(format!(
                        "{}return luaValue::multi({{{}}});",
                        pad,
                        boxed.join(", ")
                    ));
                }
            },
            Stmt::Break { .. } => out.push(format!("{}break;", pad)),
            Stmt::Do { body, .. } => {
                out.push(format!("{}{{", pad));
                self.emit_scoped_block(body, indent + 1, out)?;
                out.push(format!("{}}}", pad));
            }
        }
        Ok(())
    }

    fn emit_scoped_block(
        &mut self,
        block: &Block,
        indent: usize,
        out: &mut Vec<String>,
    ) -> Result<(), CodeGenError> {
        self.scopes.push();
        self.emit_block_statements(block, indent, out)?;
        self.scopes.pop().map_err(CodeGenError::Logic)?;
        Ok(())
    }

    /// `local name = value`, with the declaration type driven by the
    /// analysis.
    fn emit_local_declaration(
        &mut self,
        name: &str,
        value: Option<&Expr>,
        indent: usize,
        out: &mut Vec<String>,
    ) -> Result<(), CodeGenError> {
        let pad = indentation(indent);
        let inferred = self.analysis.type_of(name);
        let shape = self.analysis.table_shape(name).cloned();

        // Table-shaped locals initialized from a constructor use the
        // concrete container when the shape allows it.
        if let (Some(shape), Some(Expr::Table(entries))) = (&shape, value) {
            if shape.is_array {
                let element = array_element_type(shape);
                out.push(format!("{}luaArray<{}> {};", pad, element, name));
                self.emit_array_constructor_entries(name, shape, entries, indent, out)?;
                self.define_container_local(name, shape);
                return Ok(());
            }
            let code = self.emit_expr(value.expect("matched above"))?;
            out.push(format!("{}luaValue {} = {};", pad, name, code));
            let _ = self.scopes.define_local(name);
            return Ok(());
        }
        if let (Some(shape), None) = (&shape, value) {
            if shape.is_array {
                let element = array_element_type(shape);
                out.push(format!("{}luaArray<{}> {};", pad, element, name));
                self.define_container_local(name, shape);
                return Ok(());
            }
        }

        let line = match value {
            Some(value) if inferred.can_specialize() => {
                let code = self.emit_expr_expecting(value, inferred.kind)?;
                format!("{}{} {} = {};", pad, decl_cpp_type(&inferred), name, code)
            }
            Some(value) => {
                let code = self.emit_boxed(value)?;
                format!("{}luaValue {} = {};", pad, name, code)
            }
            None => format!("{}luaValue {} = luaValue();", pad, name),
        };
        out.push(line);
        let _ = self.scopes.define_local(name);
        Ok(())
    }

    /// Define a local declared as `luaArray<T>`, remembering the shape
    /// on the symbol so later accesses use container operations.
    fn define_container_local(&mut self, name: &str, shape: &TableShape) {
        if let Ok(symbol) = self.scopes.define_local(name) {
            symbol.table_info = Some(shape.clone());
        }
    }

    fn emit_array_constructor_entries(
        &mut self,
        name: &str,
        shape: &TableShape,
        entries: &[TableEntry],
        indent: usize,
        out: &mut Vec<String>,
    ) -> Result<(), CodeGenError> {
        let pad = indentation(indent);
        let element_specialized = shape
            .value_type
            .as_ref()
            .map(|t| t.can_specialize())
            .unwrap_or(false);
        let mut next_index: u64 = 1;
        for entry in entries {
            match entry {
                TableEntry::Item(value) => {
                    let code = if element_specialized {
                        self.emit_expr_expecting(
                            value,
                            shape.value_type.as_ref().expect("checked above").kind,
                        )?
                    } else {
                        self.emit_boxed(value)?
                    };
                    out.push(format!("{}{}.set({} - 1, {});", pad, name, next_index, code));
                    next_index += 1;
                }
                TableEntry::Keyed(Expr::Number(n), value) => {
                    let code = if element_specialized {
                        self.emit_expr_expecting(
                            value,
                            shape.value_type.as_ref().expect("checked above").kind,
                        )?
                    } else {
                        self.emit_boxed(value)?
                    };
                    out.push(format!(
                        "{}{}.set({} - 1, {});",
                        pad,
                        name,
                        format_number(*n),
                        code
                    ));
                }
                other => {
                    return Err(CodeGenError::Logic(format!(
                        "array-shaped table '{}' has a non-array constructor entry: {:?}",
                        name, other
                    )));
                }
            }
        }
        Ok(())
    }

    /// One target of an assignment statement.
    fn emit_assignment(
        &mut self,
        target: &Expr,
        value: Option<&Expr>,
        indent: usize,
        out: &mut Vec<String>,
    ) -> Result<(), CodeGenError> {
        let pad = indentation(indent);
        match target {
            Expr::Name(name) => {
                let is_local = self
                    .scopes
                    .lookup(name)
                    .map(|s| !s.is_global)
                    .unwrap_or(false);
                let inferred = self.analysis.type_of(name);

                let Some(value) = value else {
                    // Multiple assignment ran out of values: the target
                    // becomes nil. Specialized targets cannot hold nil,
                    // and inference would have degraded them had the
                    // program ever done this.
                    if !inferred.can_specialize() {
                        let lhs = self.assignment_lhs(name, is_local)?;
                        out.push(format!("{}{} = luaValue();", pad, lhs));
                    }
                    return Ok(());
                };

                // Globals in single-file mode live behind dynamic
                // lookup and stay boxed; project-mode globals are typed
                // state members.
                let typed_target = is_local || self.mode == Mode::Project;
                let lhs = self.assignment_lhs(name, is_local)?;
                let rhs = if typed_target && inferred.can_specialize() {
                    self.emit_expr_expecting(value, inferred.kind)?
                } else {
                    self.emit_boxed(value)?
                };
                out.push(format!("{}{} = {};", pad, lhs, rhs));
            }
            Expr::Index { value: table, key } => {
                let Some(value) = value else { return Ok(()) };
                if let Some(name) = self.array_table_name(table) {
                    let shape = self
                        .analysis
                        .table_shape(&name)
                        .cloned()
                        .expect("array name implies a shape");
                    let key_code = self.emit_expr_expecting(key, TypeKind::Number)?;
                    let value_code = match &shape.value_type {
                        Some(t) if t.can_specialize() => {
                            self.emit_expr_expecting(value, t.kind)?
                        }
                        _ => self.emit_boxed(value)?,
                    };
                    out.push(format!(
                        "{}{}.set({} - 1, {});",
                        pad, name, key_code, value_code
                    ));
                    return Ok(());
                }
                let table_code = self.emit_expr(table)?;
                let key_code = self.emit_boxed(key)?;
                let value_code = self.emit_boxed(value)?;
                out.push(format!(
                    "{}({})[{}] = {};",
                    pad, table_code, key_code, value_code
                ));
            }
            Expr::Field {
                value: table,
                field,
            } => {
                let Some(value) = value else { return Ok(()) };
                let table_code = self.emit_expr(table)?;
                let index = self.intern_string(field);
                let value_code = self.emit_boxed(value)?;
                out.push(format!(
                    "{}({})[string_pool[{}]] = {};",
                    pad, table_code, index, value_code
                ));
            }
            other => {
                return Err(CodeGenError::Unsupported(format!(
                    "assignment target {:?}",
                    other
                )));
            }
        }
        Ok(())
    }

    /// Left-hand side for a plain-name assignment.
    fn assignment_lhs(&mut self, name: &str, is_local: bool) -> Result<String, CodeGenError> {
        if is_local {
            return Ok(name.to_string());
        }
        Ok(self.emit_name(name))
    }

    /// Numeric `for`. The loop variable is always a native double; the
    /// condition direction follows the sign of a literal step, and a
    /// non-literal step falls back to a runtime helper.
    #[allow(clippy::too_many_arguments)]
    fn emit_numeric_for(
        &mut self,
        var: &str,
        start: &Expr,
        stop: &Expr,
        step: Option<&Expr>,
        body: &Block,
        indent: usize,
        out: &mut Vec<String>,
    ) -> Result<(), CodeGenError> {
        let pad = indentation(indent);
        let start_code = self.emit_expr_expecting(start, TypeKind::Number)?;
        let stop_code = self.emit_expr_expecting(stop, TypeKind::Number)?;

        let (cond, incr) = match step {
            None => (
                format!("{} <= {}", var, stop_code),
                format!("{} = {} + 1", var, var),
            ),
            Some(Expr::Number(n)) => {
                let step_code = if *n < 0.0 {
                    format!("({})", format_number(*n))
                } else {
                    format_number(*n)
                };
                let comparison = if *n < 0.0 { ">=" } else { "<=" };
                (
                    format!("{} {} {}", var, comparison, stop_code),
                    format!("{} = {} + {}", var, var, step_code),
                )
            }
            Some(step_expr) => {
                let temp = self.fresh_temp("step");
                let step_code = self.emit_expr_expecting(step_expr, TypeKind::Number)?;
                out.push(format!("{}double {} = {};", pad, temp, step_code));
                (
                    format!("l2c_for_continue({}, {}, {})", var, stop_code, temp),
                    format!("{} = {} + {}", var, var, temp),
                )
            }
        };

        out.push(format!(
            "{}for (double {} = {}; {}; {}) {{",
            pad, var, start_code, cond, incr
        ));
        self.scopes.push();
        let _ = self.scopes.define_local(var);
        self.emit_block_statements(body, indent + 1, out)?;
        self.scopes.pop().map_err(CodeGenError::Logic)?;
        out.push(format!("{}}}", pad));
        Ok(())
    }

    /// Generic `for` over the runtime iteration protocol. `pairs(x)`
    /// and `ipairs(x)` iterate `x` directly.
    fn emit_generic_for(
        &mut self,
        names: &[String],
        exprs: &[Expr],
        body: &Block,
        indent: usize,
        out: &mut Vec<String>,
    ) -> Result<(), CodeGenError> {
        if names.len() > 2 {
            return Err(CodeGenError::Unsupported(
                "generic for with more than two loop variables".to_string(),
            ));
        }
        let pad = indentation(indent);

        let iterable = match exprs.first() {
            Some(Expr::Call { func, args, .. })
                if matches!(func.as_name(), Some("pairs") | Some("ipairs"))
                    && args.len() == 1 =>
            {
                self.emit_boxed(&args[0])?
            }
            Some(first) => self.emit_boxed(first)?,
            None => {
                return Err(CodeGenError::Logic(
                    "generic for without an iterator expression".to_string(),
                ));
            }
        };

        out.push(format!(
            "{}for (auto& _l2c_entry : l2c_iter({})) {{",
            pad, iterable
        ));
        self.scopes.push();
        let inner = indentation(indent + 1);
        if let Some(key) = names.first() {
            out.push(format!("{}luaValue {} = _l2c_entry.key();", inner, key));
            let _ = self.scopes.define_local(key);
        }
        if let Some(value) = names.get(1) {
            out.push(format!("{}luaValue {} = _l2c_entry.value();", inner, value));
            let _ = self.scopes.define_local(value);
        }
        self.emit_block_statements(body, indent + 1, out)?;
        self.scopes.pop().map_err(CodeGenError::Logic)?;
        out.push(format!("{}}}", pad));
        Ok(())
    }
}

/// Element type of an array container.
fn array_element_type(shape: &TableShape) -> &'static str {
    shape
        .value_type
        .as_ref()
        .filter(|t| t.can_specialize())
        .map(|t| t.cpp_type())
        .unwrap_or("luaValue")
}

/// Owning C++ type for a specialized local declaration.
fn decl_cpp_type(inferred: &Type) -> &'static str {
    match inferred.kind {
        TypeKind::Number => "double",
        TypeKind::Boolean => "bool",
        TypeKind::String => "std::string",
        _ => "luaValue",
    }
}
