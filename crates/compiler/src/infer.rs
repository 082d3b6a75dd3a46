//! Multi-pass type inference
//!
//! Four passes over one module:
//!
//! 1. signature collection — every top-level function definition is
//!    registered with its parameter names;
//! 2. intra-procedural inference — a full walk of the statement tree
//!    computing expression types, merging assignment types into the
//!    per-symbol map, feeding the table-shape records, and recording
//!    call sites;
//! 3. inter-procedural fixed point — argument types flow into parameter
//!    records and back until nothing changes (or the iteration cap);
//! 4. finalization — table shapes are decided, parameter type vectors
//!    are filled, and results are copied onto the symbols.
//!
//! Traversal order is insertion order throughout so results, and the
//! C++ text derived from them, are identical across runs.

use crate::ast::{BinOp, Block, Chunk, Expr, FuncBody, Stmt, TableEntry, UnOp};
use crate::propagation::{Direction, PropagationLog};
use crate::registry::FunctionRegistry;
use crate::scope::ScopeStack;
use crate::types::{TableShape, Type, TypeKind};
use std::collections::BTreeMap;
use std::collections::HashMap;

/// Caller name used for call sites in top-level module code.
pub const CHUNK_CALLER: &str = "<chunk>";

/// Fixed-point iteration cap for pass 3.
const MAX_PROPAGATION_ITERATIONS: usize = 10;

/// Frozen result of the four inference passes. The validator and the
/// emitter read this and never write it.
#[derive(Debug)]
pub struct Analysis {
    pub inferred_types: BTreeMap<String, Type>,
    pub table_info: BTreeMap<String, TableShape>,
    pub registry: FunctionRegistry,
    pub scopes: ScopeStack,
    /// Number of pass-3 iterations actually run (for verbose output).
    pub propagation_iterations: usize,
    /// Event log of what pass 3 propagated and merged.
    pub propagation_log: PropagationLog,
}

impl Analysis {
    /// Inferred type of a symbol; `Unknown` when nothing was learned.
    pub fn type_of(&self, name: &str) -> Type {
        self.inferred_types
            .get(name)
            .cloned()
            .unwrap_or_else(Type::unknown)
    }

    pub fn table_shape(&self, name: &str) -> Option<&TableShape> {
        self.table_info.get(name)
    }

    /// Formatted post-inference type distribution for `--verbose`.
    pub fn format_statistics(&self) -> String {
        let mut counts: BTreeMap<TypeKind, usize> = BTreeMap::new();
        for t in self.inferred_types.values() {
            *counts.entry(t.kind).or_insert(0) += 1;
        }
        let mut lines = vec![
            "=== Type Resolution ===".to_string(),
            format!("Total symbols: {}", self.inferred_types.len()),
        ];
        for (kind, count) in &counts {
            lines.push(format!("  {}: {}", kind, count));
        }
        lines.push(format!(
            "Propagation iterations: {}",
            self.propagation_iterations
        ));
        lines.join("\n")
    }
}

/// The inference engine. Owns the scope stack, the function registry,
/// and the table-shape store for one module.
pub struct TypeInference {
    scopes: ScopeStack,
    registry: FunctionRegistry,
    inferred_types: BTreeMap<String, Type>,
    /// Type kinds observed per symbol, in observation order, de-duplicated.
    /// Drives the variant construction of `merge_type`.
    seen_kinds: HashMap<String, Vec<TypeKind>>,
    table_info: BTreeMap<String, TableShape>,
    /// Enclosing function names, innermost last.
    function_stack: Vec<String>,
    propagation_iterations: usize,
    propagation_log: PropagationLog,
}

impl Default for TypeInference {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeInference {
    pub fn new() -> Self {
        TypeInference {
            scopes: ScopeStack::new(),
            registry: FunctionRegistry::new(),
            inferred_types: BTreeMap::new(),
            seen_kinds: HashMap::new(),
            table_info: BTreeMap::new(),
            function_stack: Vec::new(),
            propagation_iterations: 0,
            propagation_log: PropagationLog::new(),
        }
    }

    /// Run all four passes and freeze the result.
    pub fn run(chunk: &Chunk) -> Result<Analysis, String> {
        let mut engine = TypeInference::new();
        engine.collect_signatures(chunk)?;
        engine.infer_block_statements(&chunk.block);
        engine.propagate();
        engine.finalize();
        Ok(Analysis {
            inferred_types: engine.inferred_types,
            table_info: engine.table_info,
            registry: engine.registry,
            scopes: engine.scopes,
            propagation_iterations: engine.propagation_iterations,
            propagation_log: engine.propagation_log,
        })
    }

    // ------------------------------------------------------------------
    // Pass 1: signature collection
    // ------------------------------------------------------------------

    /// Register every top-level function definition before any inference
    /// runs, so forward references and recursion resolve.
    fn collect_signatures(&mut self, chunk: &Chunk) -> Result<(), String> {
        for stmt in &chunk.block.stmts {
            match stmt {
                Stmt::LocalFunction { name, body, line } => {
                    self.registry
                        .register(name, &body.params, true)
                        .map_err(|e| format!("line {}: {}", line, e))?;
                }
                Stmt::Function { name, body, line } => {
                    self.registry
                        .register(name, &body.params, false)
                        .map_err(|e| format!("line {}: {}", line, e))?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pass 2: intra-procedural inference
    // ------------------------------------------------------------------

    fn infer_block(&mut self, block: &Block) {
        self.scopes.push();
        self.infer_block_statements(block);
        self.scopes.pop().expect("pushed above");
    }

    fn infer_block_statements(&mut self, block: &Block) {
        for stmt in &block.stmts {
            self.infer_statement(stmt);
        }
    }

    fn infer_statement(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::LocalAssign { names, values, .. } => {
                for (i, name) in names.iter().enumerate() {
                    // Redeclaration in the same scope is legal Lua; the
                    // existing binding is reused.
                    let _ = self.scopes.define_local(name);
                    match values.get(i) {
                        Some(value) => {
                            let value_type = self.infer_expr(value);
                            self.merge_type(name, &value_type);
                            self.observe_table_constructor(name, value);
                        }
                        None => self.merge_type(name, &Type::constant(TypeKind::Nil)),
                    }
                }
            }
            Stmt::Assign { targets, values, .. } => {
                for (i, target) in targets.iter().enumerate() {
                    match target {
                        Expr::Name(name) => {
                            if self.scopes.lookup(name).is_none() {
                                let _ = self.scopes.define_global(name);
                            }
                            if let Some(value) = values.get(i) {
                                let value_type = self.infer_expr(value);
                                self.merge_type(name, &value_type);
                                self.observe_table_constructor(name, value);
                            }
                        }
                        Expr::Index { .. } | Expr::Field { .. } => {
                            self.observe_table_access(target, values.get(i));
                        }
                        other => {
                            // Not assignable; the parser rejects these,
                            // but stay total.
                            self.infer_expr(other);
                        }
                    }
                }
                for value in values.iter().skip(targets.len()) {
                    self.infer_expr(value);
                }
            }
            Stmt::LocalFunction { name, body, .. } => {
                let _ = self.scopes.define_function(name, false);
                self.merge_type(name, &Type::new(TypeKind::Function));
                self.infer_function_body(name, body);
            }
            Stmt::Function { name, body, .. } => {
                if self.scopes.lookup(name).is_none() {
                    let _ = self.scopes.define_function(name, true);
                }
                self.merge_type(name, &Type::new(TypeKind::Function));
                self.infer_function_body(name, body);
            }
            Stmt::CallStmt { call, .. } => {
                self.infer_expr(call);
            }
            Stmt::If {
                cond,
                then_body,
                elseifs,
                else_body,
                ..
            } => {
                self.infer_expr(cond);
                self.infer_block(then_body);
                for elseif in elseifs {
                    self.infer_expr(&elseif.cond);
                    self.infer_block(&elseif.body);
                }
                if let Some(body) = else_body {
                    self.infer_block(body);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.infer_expr(cond);
                self.infer_block(body);
            }
            Stmt::Repeat { body, until, .. } => {
                // The until expression sees the body's scope.
                self.scopes.push();
                self.infer_block_statements(body);
                self.infer_expr(until);
                self.scopes.pop().expect("pushed above");
            }
            Stmt::NumericFor {
                var,
                start,
                stop,
                step,
                body,
                ..
            } => {
                self.infer_expr(start);
                self.infer_expr(stop);
                if let Some(step) = step {
                    self.infer_expr(step);
                }
                self.scopes.push();
                let _ = self.scopes.define_local(var);
                self.merge_type(var, &Type::new(TypeKind::Number));
                self.infer_block_statements(body);
                self.scopes.pop().expect("pushed above");
            }
            Stmt::GenericFor {
                names, exprs, body, ..
            } => {
                for expr in exprs {
                    self.infer_expr(expr);
                }
                self.scopes.push();
                for name in names {
                    let _ = self.scopes.define_local(name);
                }
                self.infer_block_statements(body);
                self.scopes.pop().expect("pushed above");
            }
            Stmt::Return { values, .. } => {
                let types: Vec<Type> = values.iter().map(|v| self.infer_expr(v)).collect();
                if let (Some(function), [single]) =
                    (self.function_stack.last().cloned(), types.as_slice())
                {
                    if let Some(signature) = self.registry.signature_mut(&function) {
                        signature.return_type = Some(match &signature.return_type {
                            Some(existing) => existing.join(single),
                            None => single.clone(),
                        });
                    }
                }
            }
            Stmt::Break { .. } => {}
            Stmt::Do { body, .. } => self.infer_block(body),
        }
    }

    fn infer_function_body(&mut self, name: &str, body: &FuncBody) {
        // Nested definitions are not in the pass-1 registry; add them so
        // their call sites and parameters participate.
        if !self.registry.has_function(name) {
            let _ = self.registry.register(name, &body.params, true);
        }

        self.function_stack.push(name.to_string());
        self.scopes.push();
        for (index, param) in body.params.iter().enumerate() {
            let _ = self.scopes.define_parameter(param, index);
        }
        self.infer_block_statements(&body.body);

        // Parameters used as tables feed the signature's per-parameter
        // shape records before the body scope goes away.
        for (index, param) in body.params.iter().enumerate() {
            if let Some(shape) = self.table_info.get(param) {
                self.registry
                    .update_param_table_info(name, index, shape.clone());
            }
        }

        self.scopes.pop().expect("pushed above");
        self.function_stack.pop();
    }

    fn infer_expr(&mut self, expr: &Expr) -> Type {
        match expr {
            Expr::Nil => Type::constant(TypeKind::Nil),
            Expr::True | Expr::False => Type::constant(TypeKind::Boolean),
            Expr::Number(_) => Type::constant(TypeKind::Number),
            Expr::Str(_) => Type::constant(TypeKind::String),
            Expr::Varargs => Type::unknown(),
            Expr::Name(name) => self
                .inferred_types
                .get(name.as_str())
                .cloned()
                .unwrap_or_else(Type::unknown),
            Expr::Call { func, args, line } => {
                self.infer_expr(func);
                for arg in args {
                    self.infer_expr(arg);
                }
                if let Some(callee) = func.as_name() {
                    let caller = self
                        .function_stack
                        .last()
                        .cloned()
                        .unwrap_or_else(|| CHUNK_CALLER.to_string());
                    let arg_symbols = args
                        .iter()
                        .map(|a| a.as_name().map(|n| n.to_string()))
                        .collect();
                    self.registry
                        .record_call_site(&caller, callee, arg_symbols, Some(*line));
                }
                Type::unknown()
            }
            Expr::MethodCall { object, args, .. } => {
                self.infer_expr(object);
                for arg in args {
                    self.infer_expr(arg);
                }
                Type::unknown()
            }
            Expr::Table(entries) => {
                for entry in entries {
                    match entry {
                        TableEntry::Item(value) | TableEntry::Named(_, value) => {
                            self.infer_expr(value);
                        }
                        TableEntry::Keyed(key, value) => {
                            self.infer_expr(key);
                            self.infer_expr(value);
                        }
                    }
                }
                Type::new(TypeKind::Table)
            }
            Expr::Index { .. } | Expr::Field { .. } => {
                self.observe_table_access(expr, None);
                Type::unknown()
            }
            Expr::Function(body) => {
                self.scopes.push();
                for (index, param) in body.params.iter().enumerate() {
                    let _ = self.scopes.define_parameter(param, index);
                }
                self.infer_block_statements(&body.body);
                self.scopes.pop().expect("pushed above");
                Type::new(TypeKind::Function)
            }
            Expr::Binary { op, lhs, rhs } => {
                let left = self.infer_expr(lhs);
                let right = self.infer_expr(rhs);
                match op {
                    _ if op.is_arithmetic() => {
                        // Lua coerces numeric strings; anything but
                        // Number x Number loses specialization.
                        if left.kind == TypeKind::Number && right.kind == TypeKind::Number {
                            Type::new(TypeKind::Number)
                        } else {
                            Type::unknown()
                        }
                    }
                    BinOp::Concat => Type::new(TypeKind::String),
                    _ if op.is_comparison() => Type::new(TypeKind::Boolean),
                    // `and`/`or` return one of their operands, not a bool.
                    BinOp::And | BinOp::Or => left.join(&right),
                    _ => Type::unknown(),
                }
            }
            Expr::Unary { op, operand } => {
                let operand_type = self.infer_expr(operand);
                match op {
                    UnOp::Neg => operand_type,
                    UnOp::Not => Type::new(TypeKind::Boolean),
                    UnOp::Len => Type::new(TypeKind::Number),
                }
            }
        }
    }

    /// Merge a newly observed type into the per-symbol map.
    ///
    /// `Nil` alone does not upgrade a symbol past `Unknown` — a
    /// nil-initialized local is treated as "still unknown" until a real
    /// value arrives. Once several concrete kinds have been seen the
    /// symbol becomes a variant over them, in observation order.
    fn merge_type(&mut self, name: &str, new_type: &Type) {
        let seen = self.seen_kinds.entry(name.to_string()).or_default();
        if new_type.kind != TypeKind::Unknown
            && new_type.kind != TypeKind::Variant
            && !seen.contains(&new_type.kind)
        {
            seen.push(new_type.kind);
        }
        for kind in new_type.kinds() {
            if new_type.kind == TypeKind::Variant && !seen.contains(&kind) {
                seen.push(kind);
            }
        }

        let merged = match seen.as_slice() {
            [] => Type::unknown(),
            [TypeKind::Nil] => Type::unknown(),
            [kind] => Type::new(*kind),
            kinds => Type::variant(kinds.to_vec()),
        };
        self.inferred_types.insert(name.to_string(), merged);
    }

    /// Type of an expression without walking it (the caller has already
    /// run `infer_expr` over the tree). Literals and known names only.
    fn quick_type(&self, expr: &Expr) -> Option<Type> {
        match expr {
            Expr::Nil => Some(Type::constant(TypeKind::Nil)),
            Expr::True | Expr::False => Some(Type::constant(TypeKind::Boolean)),
            Expr::Number(_) => Some(Type::constant(TypeKind::Number)),
            Expr::Str(_) => Some(Type::constant(TypeKind::String)),
            Expr::Name(name) => self.inferred_types.get(name.as_str()).cloned(),
            _ => None,
        }
    }

    /// Feed the shape record of `name` from a table-constructor
    /// initializer: positional items become contiguous numeric keys,
    /// named and string-keyed entries become string keys. The entry
    /// expressions themselves were already walked by `infer_expr`.
    fn observe_table_constructor(&mut self, name: &str, value: &Expr) {
        let Expr::Table(entries) = value else {
            return;
        };
        let mut value_types = Vec::new();
        {
            let shape = self.table_info.entry(name.to_string()).or_default();
            let mut next_index: u64 = 1;
            for entry in entries {
                let item = match entry {
                    TableEntry::Item(item) => {
                        shape.record_numeric_key(next_index);
                        next_index += 1;
                        item
                    }
                    TableEntry::Named(field, item) => {
                        shape.record_string_key(field);
                        item
                    }
                    TableEntry::Keyed(key, item) => {
                        match key {
                            Expr::Number(n) if n.fract() == 0.0 && *n >= 0.0 => {
                                shape.record_numeric_key(*n as u64);
                            }
                            Expr::Str(s) => shape.record_string_key(s),
                            _ => {}
                        }
                        item
                    }
                };
                value_types.push(item.clone());
            }
        }
        for item in value_types {
            if let Some(item_type) = self.quick_type(&item) {
                if let Some(shape) = self.table_info.get_mut(name) {
                    shape.merge_value_type(&item_type);
                }
            }
        }
    }

    /// Record an index or field access on a named table, updating its
    /// shape record; `assigned` carries the right-hand side when the
    /// access is an assignment target.
    fn observe_table_access(&mut self, target: &Expr, assigned: Option<&Expr>) {
        let (root, key): (&Expr, Option<&Expr>) = match target {
            Expr::Index { value, key } => (value, Some(key)),
            Expr::Field { value, .. } => (value, None),
            _ => return,
        };

        // Walk computed keys regardless of whether the root is tracked.
        if let Some(key) = key {
            self.infer_expr(key);
        }

        let Some(name) = root.as_name().map(|n| n.to_string()) else {
            self.infer_expr(root);
            if let Some(value) = assigned {
                self.infer_expr(value);
            }
            return;
        };

        // `io.write`-style library references are not user tables.
        if crate::libraries::is_library_module(&name) && self.scopes.lookup(&name).is_none() {
            if let Some(value) = assigned {
                self.infer_expr(value);
            }
            return;
        }

        {
            let shape = self.table_info.entry(name.clone()).or_default();
            match target {
                Expr::Index { key, .. } => match key.as_ref() {
                    Expr::Number(n) if n.fract() == 0.0 && *n >= 0.0 => {
                        shape.record_numeric_key(*n as u64);
                    }
                    Expr::Str(s) => shape.record_string_key(s),
                    _ => {}
                },
                Expr::Field { field, .. } => shape.record_string_key(field),
                _ => {}
            }
        }

        if let Some(value) = assigned {
            let value_type = self.infer_expr(value);
            if let Some(shape) = self.table_info.get_mut(&name) {
                shape.merge_value_type(&value_type);
            }
        }
    }

    // ------------------------------------------------------------------
    // Pass 3: inter-procedural fixed point
    // ------------------------------------------------------------------

    fn propagate(&mut self) {
        let mut iteration = 0;
        loop {
            iteration += 1;
            self.propagation_log.start_iteration(iteration);
            let mut changed = false;
            // Arg -> param must complete before param -> arg within one
            // iteration.
            changed |= self.propagate_args_to_params();
            changed |= self.propagate_params_to_args();
            if !changed || iteration >= MAX_PROPAGATION_ITERATIONS {
                break;
            }
        }
        self.propagation_iterations = iteration;
    }

    fn propagate_args_to_params(&mut self) -> bool {
        let mut changed = false;
        let functions: Vec<String> = self.registry.functions().map(String::from).collect();

        for function in functions {
            let num_params = self
                .registry
                .signature(&function)
                .map(|s| s.num_params())
                .unwrap_or(0);
            let call_sites = self.registry.call_sites(&function).to_vec();

            for call_site in call_sites {
                for (index, arg_symbol) in call_site.arg_symbols.iter().enumerate() {
                    if index >= num_params {
                        break;
                    }
                    let Some(symbol) = arg_symbol else {
                        continue;
                    };
                    let Some(arg_type) = self.inferred_types.get(symbol).cloned() else {
                        continue;
                    };
                    if arg_type.kind == TypeKind::Unknown {
                        continue;
                    }

                    let param_label = format!(
                        "{}.{}",
                        function,
                        self.registry
                            .param_name(&function, index)
                            .unwrap_or("<param>")
                    );
                    match self.registry.param_table_info(&function, index) {
                        None => {
                            let mut info = TableShape {
                                is_array: true,
                                ..TableShape::default()
                            };
                            info.value_type = Some(arg_type.clone());
                            self.registry.update_param_table_info(&function, index, info);
                            self.propagation_log.log_flow(
                                symbol,
                                &param_label,
                                &arg_type,
                                Direction::ArgsToParams,
                            );
                            changed = true;
                        }
                        Some(existing) => {
                            let merged = match &existing.value_type {
                                Some(current) => current.join(&arg_type),
                                None => arg_type.clone(),
                            };
                            if existing.value_type.as_ref() != Some(&merged) {
                                if let Some(current) = &existing.value_type {
                                    if merged.kind == TypeKind::Variant {
                                        self.propagation_log.log_conflict(
                                            &param_label,
                                            current,
                                            &arg_type,
                                            &merged,
                                        );
                                    }
                                }
                                let mut updated = existing.clone();
                                updated.value_type = Some(merged.clone());
                                self.registry
                                    .update_param_table_info(&function, index, updated);
                                self.propagation_log.log_flow(
                                    symbol,
                                    &param_label,
                                    &merged,
                                    Direction::ArgsToParams,
                                );
                                changed = true;
                            }
                        }
                    }
                }
            }
        }

        changed
    }

    fn propagate_params_to_args(&mut self) -> bool {
        let mut changed = false;
        let functions: Vec<String> = self.registry.functions().map(String::from).collect();

        for function in functions {
            let Some(signature) = self.registry.signature(&function) else {
                continue;
            };
            let num_params = signature.num_params();

            for index in 0..num_params {
                let Some(param_type) = signature.param_type(index).cloned() else {
                    continue;
                };
                let param_label = format!("{}.{}", function, signature.param_names[index]);

                for call_site in &signature.call_sites {
                    let Some(symbol) = call_site.arg_symbol(index) else {
                        continue;
                    };
                    match self.inferred_types.get(symbol) {
                        None => {
                            self.inferred_types
                                .insert(symbol.to_string(), param_type.clone());
                            self.propagation_log.log_flow(
                                &param_label,
                                symbol,
                                &param_type,
                                Direction::ParamsToArgs,
                            );
                            changed = true;
                        }
                        Some(existing) => {
                            let merged = existing.join(&param_type);
                            if &merged != existing {
                                if merged.kind == TypeKind::Variant
                                    && existing.kind != TypeKind::Variant
                                {
                                    self.propagation_log.log_conflict(
                                        symbol,
                                        existing,
                                        &param_type,
                                        &merged,
                                    );
                                }
                                self.propagation_log.log_flow(
                                    &param_label,
                                    symbol,
                                    &merged,
                                    Direction::ParamsToArgs,
                                );
                                self.inferred_types.insert(symbol.to_string(), merged);
                                changed = true;
                            }
                        }
                    }
                }
            }
        }

        changed
    }

    // ------------------------------------------------------------------
    // Pass 4: finalization
    // ------------------------------------------------------------------

    /// Decide every table shape, fill the registries' parameter type
    /// vectors, and copy results onto the symbols. After this the state
    /// is frozen; the validator and emitter only read it.
    fn finalize(&mut self) {
        for shape in self.table_info.values_mut() {
            shape.finalize();
        }
        for function in self
            .registry
            .functions()
            .map(String::from)
            .collect::<Vec<_>>()
        {
            if let Some(signature) = self.registry.signature_mut(&function) {
                for shape in signature.param_table_info.values_mut() {
                    if !shape.numeric_keys.is_empty() || !shape.string_keys.is_empty() {
                        shape.finalize();
                    }
                }
            }
        }
        self.registry.finalize_param_types();

        for symbol in self.scopes.all_symbols_mut() {
            if let Some(inferred) = self.inferred_types.get(&symbol.name) {
                symbol.inferred_type = Some(inferred.clone());
            }
            if let Some(shape) = self.table_info.get(&symbol.name) {
                symbol.table_info = Some(shape.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn analyze(source: &str) -> Analysis {
        let chunk = parse(source).expect("test source parses");
        TypeInference::run(&chunk).expect("inference succeeds")
    }

    #[test]
    fn test_pure_arithmetic_specialization() {
        let analysis = analyze("local x = 1\nlocal y = x + 2");
        assert_eq!(analysis.type_of("x").kind, TypeKind::Number);
        assert_eq!(analysis.type_of("y").kind, TypeKind::Number);
    }

    #[test]
    fn test_array_shape() {
        let analysis = analyze(
            "local t = {}\nt[1] = \"a\"\nt[2] = \"b\"\nt[3] = \"c\"",
        );
        let shape = analysis.table_shape("t").unwrap();
        assert!(shape.is_array);
        assert_eq!(shape.value_type.as_ref().unwrap().kind, TypeKind::String);
    }

    #[test]
    fn test_mixed_table_demoted_to_map() {
        let analysis = analyze("local t = {}\nt[1] = 10\nt.name = \"x\"");
        let shape = analysis.table_shape("t").unwrap();
        assert!(!shape.is_array);
        assert!(shape.is_mixed());
    }

    #[test]
    fn test_interprocedural_propagation() {
        let analysis = analyze("local function f(a) return a + 1 end\nlocal x = 3\nf(x)");
        let param = analysis.registry.param_type("f", 0).unwrap();
        assert_eq!(param.kind, TypeKind::Number);
    }

    #[test]
    fn test_conflicting_call_sites_yield_variant() {
        let analysis = analyze("local function f(a) end\nlocal n = 1\nlocal s = \"hello\"\nf(n)\nf(s)");
        let param = analysis.registry.param_type("f", 0).unwrap();
        assert_eq!(param.kind, TypeKind::Variant);
        assert_eq!(
            param.kinds(),
            vec![TypeKind::Number, TypeKind::String],
            "variant subtypes follow observation order"
        );
    }

    #[test]
    fn test_call_site_symmetry_after_convergence() {
        let analysis = analyze("local function f(a) return a + 1 end\nlocal x = 3\nf(x)");
        let param = analysis.registry.param_type("f", 0).unwrap().clone();
        let arg = analysis.type_of("x");
        assert_eq!(arg.join(&param), arg);
        assert_eq!(param.join(&arg), param);
    }

    #[test]
    fn test_param_type_flows_back_to_argument() {
        // `n` gets no local type; the parameter's type (from the other
        // call site) flows back into it.
        let analysis = analyze(
            "local function f(a) end\nlocal x = 1\nf(x)\nlocal n\nf(n)",
        );
        assert_eq!(analysis.type_of("n").kind, TypeKind::Number);
    }

    #[test]
    fn test_nil_does_not_upgrade() {
        let analysis = analyze("local a = nil\nlocal b = nil\nb = 5");
        assert_eq!(analysis.type_of("a").kind, TypeKind::Unknown);
        assert_eq!(analysis.type_of("b").kind, TypeKind::Number);
    }

    #[test]
    fn test_nil_participates_in_variants() {
        let analysis = analyze("local a = 1\na = nil");
        let t = analysis.type_of("a");
        assert_eq!(t.kind, TypeKind::Variant);
        assert_eq!(t.kinds(), vec![TypeKind::Number, TypeKind::Nil]);
    }

    #[test]
    fn test_and_or_join_operands() {
        let analysis = analyze(
            "local n = 1\nlocal s = \"x\"\nlocal both = n or s\nlocal same = n and n",
        );
        assert_eq!(analysis.type_of("both").kind, TypeKind::Variant);
        assert_eq!(analysis.type_of("same").kind, TypeKind::Number);
    }

    #[test]
    fn test_concat_comparison_length() {
        let analysis = analyze(
            "local s = \"a\" .. \"b\"\nlocal c = 1 < 2\nlocal l = #s\nlocal notted = not s",
        );
        assert_eq!(analysis.type_of("s").kind, TypeKind::String);
        assert_eq!(analysis.type_of("c").kind, TypeKind::Boolean);
        assert_eq!(analysis.type_of("l").kind, TypeKind::Number);
        assert_eq!(analysis.type_of("notted").kind, TypeKind::Boolean);
    }

    #[test]
    fn test_arithmetic_on_unknown_degrades() {
        let analysis = analyze("local u\nlocal y = u + 1");
        assert_eq!(analysis.type_of("y").kind, TypeKind::Unknown);
    }

    #[test]
    fn test_unary_minus_preserves_type() {
        let analysis = analyze("local x = 3\nlocal y = -x");
        assert_eq!(analysis.type_of("y").kind, TypeKind::Number);
    }

    #[test]
    fn test_numeric_for_variable_is_number() {
        let analysis = analyze("for i = 1, 10 do local j = i end");
        assert_eq!(analysis.type_of("i").kind, TypeKind::Number);
        assert_eq!(analysis.type_of("j").kind, TypeKind::Number);
    }

    #[test]
    fn test_function_type_and_return_type() {
        let analysis = analyze("local function f() return 42 end");
        assert_eq!(analysis.type_of("f").kind, TypeKind::Function);
        let signature = analysis.registry.signature("f").unwrap();
        assert_eq!(signature.return_type.as_ref().unwrap().kind, TypeKind::Number);
    }

    #[test]
    fn test_table_constructor_seeds_shape() {
        let analysis = analyze("local t = { \"a\", \"b\", \"c\" }");
        let shape = analysis.table_shape("t").unwrap();
        assert!(shape.is_array);
        assert_eq!(shape.numeric_keys.len(), 3);
        assert_eq!(shape.value_type.as_ref().unwrap().kind, TypeKind::String);
    }

    #[test]
    fn test_table_constructor_named_entries_make_map() {
        let analysis = analyze("local cfg = { name = \"x\", size = 3 }");
        let shape = analysis.table_shape("cfg").unwrap();
        assert!(!shape.is_array);
        assert_eq!(shape.string_keys.len(), 2);
    }

    #[test]
    fn test_param_used_as_table_feeds_signature() {
        let analysis = analyze(
            "local function head(items) return items[1] end",
        );
        let signature = analysis.registry.signature("head").unwrap();
        assert!(signature.has_param_info(0));
    }

    #[test]
    fn test_global_assignment_defines_global() {
        let analysis = analyze("counter = 0");
        let symbol = analysis.scopes.lookup("counter").unwrap();
        assert!(symbol.is_global);
        assert_eq!(analysis.type_of("counter").kind, TypeKind::Number);
    }

    #[test]
    fn test_call_sites_recorded_with_lines() {
        let analysis = analyze("local function f(a) end\nlocal x = 1\nf(x)\nf(2 + 3)");
        let sites = analysis.registry.call_sites("f");
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].arg_symbol(0), Some("x"));
        assert_eq!(sites[0].line, Some(3));
        assert_eq!(sites[1].arg_symbol(0), None, "expressions are not symbols");
    }

    #[test]
    fn test_expression_arguments_do_not_propagate() {
        let analysis = analyze("local function f(a) end\nf(1 + 2)");
        assert!(analysis.registry.param_type("f", 0).is_none());
    }

    #[test]
    fn test_idempotent_inference() {
        let source = "local function f(a) return a + 1 end\n\
                      local x = 3\n\
                      f(x)\n\
                      local t = {}\n\
                      t[1] = \"a\"\n\
                      t.name = \"b\"";
        let chunk = parse(source).unwrap();
        let first = TypeInference::run(&chunk).unwrap();
        let second = TypeInference::run(&chunk).unwrap();
        assert_eq!(first.inferred_types, second.inferred_types);
        assert_eq!(first.table_info, second.table_info);
        assert_eq!(
            first.registry.param_type("f", 0),
            second.registry.param_type("f", 0)
        );
    }

    #[test]
    fn test_propagation_terminates_within_cap() {
        // Mutual recursion keeps the call graph cyclic; the fixed point
        // must still settle.
        let analysis = analyze(
            "local function even(n) return odd(n - 1) end\n\
             local function odd(n) return even(n - 1) end\n\
             local k = 4\n\
             even(k)",
        );
        assert!(analysis.propagation_iterations <= MAX_PROPAGATION_ITERATIONS);
        assert_eq!(
            analysis.registry.param_type("even", 0).unwrap().kind,
            TypeKind::Number
        );
    }

    #[test]
    fn test_duplicate_parameter_names_fail_pass1() {
        let chunk = parse("local function f(a, a) end").unwrap();
        let result = TypeInference::run(&chunk);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("duplicate parameter"));
    }

    #[test]
    fn test_types_copied_onto_symbols() {
        let analysis = analyze("local x = 1\nlocal t = {}\nt[1] = 2");
        let symbols: Vec<_> = analysis.scopes.all_symbols().collect();
        let x = symbols.iter().find(|s| s.name == "x").unwrap();
        assert_eq!(x.inferred_type.as_ref().unwrap().kind, TypeKind::Number);
        let t = symbols.iter().find(|s| s.name == "t").unwrap();
        assert!(t.table_info.is_some());
    }
}
