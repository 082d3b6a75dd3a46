//! Function-signature registry for inter-procedural type analysis
//!
//! Tracks every function definition with its parameter list, the type
//! information discovered for each parameter, and all call sites where
//! the function is invoked. The reverse call graph (callee -> callers)
//! is derived from the call sites.
//!
//! Traversal order matters: the fixed-point propagation pass walks
//! functions and call sites in insertion order so the emitted output is
//! byte-identical across runs. Signatures therefore live in a vector,
//! with a name index on the side.

use crate::types::{TableShape, Type};
use std::collections::HashMap;

/// One concrete invocation of a function.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    /// Name of the function making the call (the chunk pseudo-function
    /// for top-level code).
    pub caller: String,
    /// Per-argument symbol names; `None` when the argument is not a bare
    /// identifier. This is what makes bidirectional propagation possible.
    pub arg_symbols: Vec<Option<String>>,
    pub line: Option<usize>,
}

impl CallSite {
    /// Symbol name of the argument at `param_index`, if it was a bare name.
    pub fn arg_symbol(&self, param_index: usize) -> Option<&str> {
        self.arg_symbols
            .get(param_index)
            .and_then(|s| s.as_deref())
    }
}

/// Signature and accumulated type information for one function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: String,
    pub param_names: Vec<String>,
    /// Per-parameter type, finalized after inference (index-aligned with
    /// `param_names`). Empty until `finalize_param_types` runs.
    pub param_types: Vec<Type>,
    /// Per-parameter shape/type information discovered during passes 2-3.
    /// Keyed by parameter index; a sparse map because most parameters
    /// never accumulate information.
    pub param_table_info: HashMap<usize, TableShape>,
    pub return_type: Option<Type>,
    pub is_local: bool,
    pub call_sites: Vec<CallSite>,
}

impl FunctionSignature {
    pub fn num_params(&self) -> usize {
        self.param_names.len()
    }

    pub fn param_index(&self, param_name: &str) -> Option<usize> {
        self.param_names.iter().position(|p| p == param_name)
    }

    pub fn has_param_info(&self, param_index: usize) -> bool {
        self.param_table_info.contains_key(&param_index)
    }

    /// The propagated type of a parameter, if any call site or usage has
    /// supplied one.
    pub fn param_type(&self, param_index: usize) -> Option<&Type> {
        self.param_table_info
            .get(&param_index)
            .and_then(|info| info.value_type.as_ref())
    }
}

/// Registry of all functions in one module.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    /// Signatures in registration order.
    signatures: Vec<FunctionSignature>,
    index: HashMap<String, usize>,
    /// callee -> callers, both in first-observation order.
    call_graph: HashMap<String, Vec<String>>,
}

/// Summary counters for `--verbose` reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStatistics {
    pub total_functions: usize,
    pub total_parameters: usize,
    pub typed_parameters: usize,
    pub total_call_sites: usize,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry::default()
    }

    /// Register a function signature.
    ///
    /// Duplicate parameter names fail; re-registering an existing name
    /// silently replaces the prior signature (keeping its position in the
    /// traversal order).
    pub fn register(
        &mut self,
        name: &str,
        param_names: &[String],
        is_local: bool,
    ) -> Result<(), String> {
        for (i, param) in param_names.iter().enumerate() {
            if param_names[..i].contains(param) {
                return Err(format!(
                    "function '{}' has duplicate parameter name '{}'",
                    name, param
                ));
            }
        }

        let signature = FunctionSignature {
            name: name.to_string(),
            param_names: param_names.to_vec(),
            param_types: Vec::new(),
            param_table_info: HashMap::new(),
            return_type: None,
            is_local,
            call_sites: Vec::new(),
        };

        match self.index.get(name) {
            Some(&pos) => self.signatures[pos] = signature,
            None => {
                self.index.insert(name.to_string(), self.signatures.len());
                self.signatures.push(signature);
            }
        }
        self.call_graph.entry(name.to_string()).or_default();
        Ok(())
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn signature(&self, name: &str) -> Option<&FunctionSignature> {
        self.index.get(name).map(|&pos| &self.signatures[pos])
    }

    pub fn signature_mut(&mut self, name: &str) -> Option<&mut FunctionSignature> {
        let pos = *self.index.get(name)?;
        Some(&mut self.signatures[pos])
    }

    /// Record that `caller` invoked `callee`.
    ///
    /// A callee seen here before its definition is auto-registered as a
    /// zero-parameter stub; a later real registration replaces the stub.
    pub fn record_call_site(
        &mut self,
        caller: &str,
        callee: &str,
        arg_symbols: Vec<Option<String>>,
        line: Option<usize>,
    ) {
        if !self.has_function(callee) {
            self.register(callee, &[], false)
                .expect("stub registration has no parameters");
        }

        let signature = self.signature_mut(callee).expect("registered above");
        signature.call_sites.push(CallSite {
            caller: caller.to_string(),
            arg_symbols,
            line,
        });

        let callers = self.call_graph.entry(callee.to_string()).or_default();
        if !callers.iter().any(|c| c == caller) {
            callers.push(caller.to_string());
        }
    }

    pub fn param_name(&self, func: &str, param_index: usize) -> Option<&str> {
        self.signature(func)?
            .param_names
            .get(param_index)
            .map(|s| s.as_str())
    }

    pub fn param_type(&self, func: &str, param_index: usize) -> Option<&Type> {
        self.signature(func)?.param_type(param_index)
    }

    pub fn param_table_info(&self, func: &str, param_index: usize) -> Option<&TableShape> {
        self.signature(func)?.param_table_info.get(&param_index)
    }

    /// Set or replace shape information for one parameter.
    pub fn update_param_table_info(
        &mut self,
        func: &str,
        param_index: usize,
        info: TableShape,
    ) -> bool {
        let Some(signature) = self.signature_mut(func) else {
            return false;
        };
        if param_index >= signature.param_names.len() {
            return false;
        }
        signature.param_table_info.insert(param_index, info);
        true
    }

    pub fn call_sites(&self, func: &str) -> &[CallSite] {
        self.signature(func)
            .map(|s| s.call_sites.as_slice())
            .unwrap_or(&[])
    }

    pub fn callers(&self, func: &str) -> &[String] {
        self.call_graph
            .get(func)
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    /// Function names in registration order.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.signatures.iter().map(|s| s.name.as_str())
    }

    /// Signatures in registration order.
    pub fn signatures(&self) -> impl Iterator<Item = &FunctionSignature> {
        self.signatures.iter()
    }

    /// Names of functions that accumulated parameter type information,
    /// in registration order.
    pub fn functions_with_param_info(&self) -> Vec<&str> {
        self.signatures
            .iter()
            .filter(|s| !s.param_table_info.is_empty())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Fill `param_types` for every signature so that
    /// `|param_names| == |param_types|` holds after inference.
    pub fn finalize_param_types(&mut self) {
        for signature in &mut self.signatures {
            signature.param_types = (0..signature.param_names.len())
                .map(|i| {
                    signature
                        .param_table_info
                        .get(&i)
                        .and_then(|info| info.value_type.clone())
                        .unwrap_or_else(Type::unknown)
                })
                .collect();
        }
    }

    pub fn statistics(&self) -> RegistryStatistics {
        RegistryStatistics {
            total_functions: self.signatures.len(),
            total_parameters: self.signatures.iter().map(|s| s.param_names.len()).sum(),
            typed_parameters: self
                .signatures
                .iter()
                .map(|s| s.param_table_info.len())
                .sum(),
            total_call_sites: self.signatures.iter().map(|s| s.call_sites.len()).sum(),
        }
    }

    /// Formatted statistics block for `--verbose` output.
    pub fn format_statistics(&self) -> String {
        let stats = self.statistics();
        let mut lines = vec![
            "=== Function Signature Registry ===".to_string(),
            format!("Total functions: {}", stats.total_functions),
            format!("Total parameters: {}", stats.total_parameters),
            format!("  Typed parameters: {}", stats.typed_parameters),
            format!(
                "  Untyped parameters: {}",
                stats.total_parameters - stats.typed_parameters
            ),
            format!("Total call sites: {}", stats.total_call_sites),
        ];

        let typed = self.functions_with_param_info();
        if !typed.is_empty() {
            lines.push(format!("Functions with typed parameters ({}):", typed.len()));
            for name in typed {
                let signature = self.signature(name).expect("listed above");
                let mut indices: Vec<usize> =
                    signature.param_table_info.keys().copied().collect();
                indices.sort_unstable();
                lines.push(format!("  {}: params {:?}", name, indices));
            }
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeKind;

    fn params(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_register_and_query() {
        let mut registry = FunctionRegistry::new();
        registry.register("foo", &params(&["x", "y"]), true).unwrap();
        let signature = registry.signature("foo").unwrap();
        assert_eq!(signature.num_params(), 2);
        assert!(signature.is_local);
        assert_eq!(registry.param_name("foo", 1), Some("y"));
        assert_eq!(signature.param_index("y"), Some(1));
    }

    #[test]
    fn test_duplicate_param_names_fail() {
        let mut registry = FunctionRegistry::new();
        let result = registry.register("bad", &params(&["a", "a"]), true);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("duplicate parameter"));
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut registry = FunctionRegistry::new();
        registry.register("f", &params(&[]), false).unwrap();
        registry.register("g", &params(&[]), false).unwrap();
        registry.register("f", &params(&["a"]), true).unwrap();
        assert_eq!(registry.signature("f").unwrap().num_params(), 1);
        // Position in traversal order is preserved.
        let order: Vec<&str> = registry.functions().collect();
        assert_eq!(order, vec!["f", "g"]);
    }

    #[test]
    fn test_call_site_auto_registers_stub() {
        let mut registry = FunctionRegistry::new();
        registry.record_call_site("main", "later", vec![Some("x".to_string())], Some(3));
        let signature = registry.signature("later").unwrap();
        assert_eq!(signature.num_params(), 0);
        assert!(!signature.is_local);
        assert_eq!(signature.call_sites.len(), 1);
        assert_eq!(signature.call_sites[0].arg_symbol(0), Some("x"));
        assert_eq!(signature.call_sites[0].line, Some(3));
    }

    #[test]
    fn test_call_graph_dedupes_callers() {
        let mut registry = FunctionRegistry::new();
        registry.register("f", &params(&["a"]), true).unwrap();
        registry.record_call_site("main", "f", vec![None], None);
        registry.record_call_site("main", "f", vec![None], None);
        registry.record_call_site("other", "f", vec![None], None);
        assert_eq!(registry.callers("f"), &["main", "other"]);
        assert_eq!(registry.call_sites("f").len(), 3);
    }

    #[test]
    fn test_update_param_table_info_bounds() {
        let mut registry = FunctionRegistry::new();
        registry.register("f", &params(&["a"]), true).unwrap();
        let mut info = TableShape::new();
        info.merge_value_type(&Type::new(TypeKind::Number));
        assert!(registry.update_param_table_info("f", 0, info.clone()));
        assert!(!registry.update_param_table_info("f", 1, info.clone()));
        assert!(!registry.update_param_table_info("missing", 0, info));
        assert_eq!(
            registry.param_type("f", 0).unwrap().kind,
            TypeKind::Number
        );
    }

    #[test]
    fn test_finalize_param_types_aligns_lengths() {
        let mut registry = FunctionRegistry::new();
        registry.register("f", &params(&["a", "b"]), true).unwrap();
        let mut info = TableShape::new();
        info.merge_value_type(&Type::new(TypeKind::String));
        registry.update_param_table_info("f", 1, info);
        registry.finalize_param_types();
        let signature = registry.signature("f").unwrap();
        assert_eq!(signature.param_types.len(), signature.param_names.len());
        assert_eq!(signature.param_types[0].kind, TypeKind::Unknown);
        assert_eq!(signature.param_types[1].kind, TypeKind::String);
    }

    #[test]
    fn test_statistics() {
        let mut registry = FunctionRegistry::new();
        registry.register("f", &params(&["a", "b"]), true).unwrap();
        registry.register("g", &params(&["c"]), true).unwrap();
        let mut info = TableShape::new();
        info.merge_value_type(&Type::new(TypeKind::Number));
        registry.update_param_table_info("f", 0, info);
        registry.record_call_site("main", "f", vec![None, None], None);

        let stats = registry.statistics();
        assert_eq!(stats.total_functions, 2);
        assert_eq!(stats.total_parameters, 3);
        assert_eq!(stats.typed_parameters, 1);
        assert_eq!(stats.total_call_sites, 1);

        let report = registry.format_statistics();
        assert!(report.contains("Total functions: 2"));
        assert!(report.contains("f: params [0]"));
    }

    #[test]
    fn test_functions_insertion_order() {
        let mut registry = FunctionRegistry::new();
        registry.register("zeta", &params(&[]), true).unwrap();
        registry.register("alpha", &params(&[]), true).unwrap();
        let order: Vec<&str> = registry.functions().collect();
        assert_eq!(order, vec!["zeta", "alpha"]);
    }
}
