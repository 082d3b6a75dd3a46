//! Post-inference validation (pass 4 reporting)
//!
//! Walks the frozen analysis and surfaces issues at three severities.
//! Info and Warning never abort compilation; Error is reserved in the
//! taxonomy and only reachable through a severity override in the
//! diagnostics config.
//!
//! Severities are configurable per check via a TOML file:
//!
//! ```toml
//! max_issues = 20
//!
//! [severity]
//! mixed_usage = "error"
//! no_param_info = "off"
//! ```

use crate::infer::Analysis;
use crate::types::TypeKind;
use serde::Deserialize;
use std::collections::HashMap;

/// Severity of one diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

/// Check identifiers, with their default severities.
const CHECK_DEFAULTS: [(&str, Severity); 8] = [
    ("type_gap", Severity::Info),
    ("undetermined_table", Severity::Info),
    ("mixed_usage", Severity::Warning),
    ("sparse_array", Severity::Warning),
    ("incomplete_array", Severity::Warning),
    ("no_param_info", Severity::Info),
    ("conflicting_param", Severity::Warning),
    ("mixed_variant", Severity::Warning),
];

/// One issue found during validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub symbol: Option<String>,
    pub check: &'static str,
    pub message: String,
    pub suggestion: Option<String>,
    pub line: Option<usize>,
}

impl Diagnostic {
    /// Formatted single-issue line(s) for the report.
    pub fn format(&self) -> String {
        let symbol = self
            .symbol
            .as_ref()
            .map(|s| format!("[{}] ", s))
            .unwrap_or_default();
        let mut out = format!("  {}: {}{}", self.severity.label(), symbol, self.message);
        if let Some(suggestion) = &self.suggestion {
            out.push_str(&format!("\n    -> {}", suggestion));
        }
        out
    }
}

/// Severity overrides loaded from TOML. Unknown check names are rejected
/// so typos do not silently disable anything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnosticsConfig {
    /// check name -> "off" | "info" | "warning" | "error"
    #[serde(default)]
    pub severity: HashMap<String, String>,
    /// Display cap for the report; all issues are still collected.
    #[serde(default)]
    pub max_issues: Option<usize>,
}

impl DiagnosticsConfig {
    pub fn from_toml(content: &str) -> Result<Self, String> {
        let config: DiagnosticsConfig =
            toml::from_str(content).map_err(|e| format!("invalid diagnostics config: {}", e))?;
        for (check, level) in &config.severity {
            if !CHECK_DEFAULTS.iter().any(|(name, _)| name == check) {
                return Err(format!(
                    "diagnostics config names unknown check '{}'",
                    check
                ));
            }
            if !matches!(level.as_str(), "off" | "info" | "warning" | "error") {
                return Err(format!(
                    "diagnostics config: invalid severity '{}' for check '{}'",
                    level, check
                ));
            }
        }
        Ok(config)
    }

    /// Effective severity for a check; `None` means the check is off.
    fn resolve(&self, check: &str) -> Option<Severity> {
        let default = CHECK_DEFAULTS
            .iter()
            .find(|(name, _)| *name == check)
            .map(|(_, severity)| *severity)
            .expect("checks are enumerated in CHECK_DEFAULTS");
        match self.severity.get(check).map(|s| s.as_str()) {
            None => Some(default),
            Some("off") => None,
            Some("info") => Some(Severity::Info),
            Some("warning") => Some(Severity::Warning),
            Some("error") => Some(Severity::Error),
            Some(_) => Some(default),
        }
    }
}

/// Validates the frozen analysis of one module.
pub struct Validator<'a> {
    analysis: &'a Analysis,
    config: &'a DiagnosticsConfig,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Validator<'a> {
    pub fn new(analysis: &'a Analysis, config: &'a DiagnosticsConfig) -> Self {
        Validator {
            analysis,
            config,
            diagnostics: Vec::new(),
        }
    }

    /// Run every check and return the collected issues.
    pub fn validate_all(mut self) -> Vec<Diagnostic> {
        self.check_type_gaps();
        self.check_table_consistency();
        self.check_propagation_completeness();
        self.check_conflicting_params();
        self.check_function_param_types();
        self.check_variant_types();
        self.diagnostics
    }

    fn push(
        &mut self,
        check: &'static str,
        symbol: Option<String>,
        message: String,
        suggestion: &str,
    ) {
        let Some(severity) = self.config.resolve(check) else {
            return;
        };
        self.diagnostics.push(Diagnostic {
            severity,
            symbol,
            check,
            message,
            suggestion: Some(suggestion.to_string()),
            line: None,
        });
    }

    /// Symbols that never received a concrete type, and tables whose
    /// usage decided nothing.
    fn check_type_gaps(&mut self) {
        for (name, inferred) in &self.analysis.inferred_types {
            if inferred.kind == TypeKind::Unknown {
                self.push(
                    "type_gap",
                    Some(name.clone()),
                    format!("No inferred type for symbol '{}'", name),
                    "Symbol will use the boxed value in generated code. \
                     Initialize it with a concrete value to enable specialization.",
                );
            }
        }
        for (name, shape) in &self.analysis.table_info {
            if !shape.is_array && shape.numeric_keys.is_empty() && shape.string_keys.is_empty() {
                self.push(
                    "undetermined_table",
                    Some(name.clone()),
                    format!(
                        "Table '{}' usage doesn't clearly indicate array or map structure",
                        name
                    ),
                    "Table will be generated as a boxed value. \
                     Add explicit indexing or assignments to clarify usage.",
                );
            }
        }
    }

    /// Tables used both as arrays and as maps, and sparse numeric-key
    /// tables.
    fn check_table_consistency(&mut self) {
        for (name, shape) in &self.analysis.table_info {
            if shape.is_mixed() {
                self.push(
                    "mixed_usage",
                    Some(name.clone()),
                    format!(
                        "Table '{}' used as both array and map (numeric keys: {}, string keys: {})",
                        name,
                        shape.numeric_keys.len(),
                        shape.string_keys.len()
                    ),
                    "Will be generated as the map container. \
                     Consider separate arrays and maps for clarity.",
                );
            }
            if shape.is_sparse() {
                let keys: Vec<u64> = shape.numeric_keys.iter().take(10).copied().collect();
                self.push(
                    "sparse_array",
                    Some(name.clone()),
                    format!(
                        "Table '{}' appears to be a sparse array with non-contiguous keys: {:?}",
                        name, keys
                    ),
                    "Sparse arrays fall back to the map container. \
                     Consider a map with explicit keys instead.",
                );
            }
        }
    }

    /// Parameters that are array-typed but whose element type is still
    /// unknown after propagation.
    fn check_propagation_completeness(&mut self) {
        for signature in self.analysis.registry.signatures() {
            for index in 0..signature.num_params() {
                let Some(info) = signature.param_table_info.get(&index) else {
                    continue;
                };
                if info.is_array && info.value_type.is_none() {
                    let param = &signature.param_names[index];
                    self.push(
                        "incomplete_array",
                        Some(format!("{}.{}", signature.name, param)),
                        format!(
                            "Parameter '{}' in '{}' is array-typed but element type unknown",
                            param, signature.name
                        ),
                        "Array elements will use the boxed value. \
                         Ensure the parameter sees consistent element types.",
                    );
                }
            }
        }
    }

    /// Parameters whose call sites disagreed on a concrete type: the
    /// propagation joined them into a variant and the parameter stays
    /// boxed.
    fn check_conflicting_params(&mut self) {
        let mut found = Vec::new();
        for signature in self.analysis.registry.signatures() {
            for index in 0..signature.num_params() {
                let Some(param_type) = signature.param_type(index) else {
                    continue;
                };
                if param_type.kind == TypeKind::Variant {
                    let kinds: Vec<String> = param_type
                        .kinds()
                        .iter()
                        .map(|k| k.to_string())
                        .collect();
                    found.push((
                        format!("{}.{}", signature.name, signature.param_names[index]),
                        format!(
                            "Parameter '{}' in '{}' receives conflicting argument types ({})",
                            signature.param_names[index],
                            signature.name,
                            kinds.join(", ")
                        ),
                    ));
                }
            }
        }
        for (symbol, message) in found {
            self.push(
                "conflicting_param",
                Some(symbol),
                message,
                "The parameter stays a boxed value. \
                 Pass consistent argument types to enable specialization.",
            );
        }
    }

    /// Called functions whose parameters stayed untyped even though some
    /// call sites passed typed arguments.
    fn check_function_param_types(&mut self) {
        for signature in self.analysis.registry.signatures() {
            if signature.call_sites.is_empty() {
                continue;
            }
            for (index, param) in signature.param_names.iter().enumerate() {
                if signature.param_table_info.contains_key(&index) {
                    continue;
                }
                let typed_args = signature
                    .call_sites
                    .iter()
                    .filter_map(|site| site.arg_symbol(index))
                    .filter(|symbol| {
                        self.analysis
                            .inferred_types
                            .get(*symbol)
                            .map(|t| t.kind != TypeKind::Unknown)
                            .unwrap_or(false)
                    })
                    .count();
                if typed_args > 0 {
                    self.push(
                        "no_param_info",
                        Some(format!("{}.{}", signature.name, param)),
                        format!(
                            "Parameter '{}' in '{}' has no type info ({} typed args provided)",
                            param, signature.name, typed_args
                        ),
                        "Parameter will take a boxed reference. \
                         Type propagation may improve this.",
                    );
                }
            }
        }
    }

    /// Variants combining kinds that cannot share a representation.
    fn check_variant_types(&mut self) {
        for (name, inferred) in &self.analysis.inferred_types {
            if inferred.kind != TypeKind::Variant {
                continue;
            }
            let kinds = inferred.kinds();
            if kinds.contains(&TypeKind::Table) && kinds.contains(&TypeKind::Number) {
                self.push(
                    "mixed_variant",
                    Some(name.clone()),
                    format!(
                        "Symbol '{}' has VARIANT type with incompatible kinds (TABLE and NUMBER)",
                        name
                    ),
                    "The boxed value carries this at runtime. \
                     Review the code for consistent usage.",
                );
            }
        }
    }
}

/// Convenience: run the validator with a config.
pub fn validate(analysis: &Analysis, config: &DiagnosticsConfig) -> Vec<Diagnostic> {
    Validator::new(analysis, config).validate_all()
}

pub fn has_warnings(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == Severity::Warning)
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == Severity::Error)
}

/// Formatted issue report, grouped by severity (most severe first),
/// truncated to `max_issues` when set.
pub fn format_report(diagnostics: &[Diagnostic], max_issues: Option<usize>) -> String {
    if diagnostics.is_empty() {
        return "No validation issues found.".to_string();
    }

    let shown: &[Diagnostic] = match max_issues {
        Some(max) if diagnostics.len() > max => &diagnostics[..max],
        _ => diagnostics,
    };

    let mut lines = vec!["=== Type Validation Issues ===".to_string()];
    for severity in [Severity::Error, Severity::Warning, Severity::Info] {
        let group: Vec<&Diagnostic> = shown.iter().filter(|d| d.severity == severity).collect();
        if group.is_empty() {
            continue;
        }
        lines.push(format!("{} ({}):", severity.label(), group.len()));
        for diagnostic in group {
            lines.push(diagnostic.format());
        }
    }

    if shown.len() < diagnostics.len() {
        lines.push(format!(
            "... ({} more issues hidden)",
            diagnostics.len() - shown.len()
        ));
    }

    lines.join("\n")
}

/// Summary counts by severity and by check.
pub fn format_summary(diagnostics: &[Diagnostic]) -> String {
    let count = |severity: Severity| {
        diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    };
    let mut lines = vec![
        "=== Type Validation Summary ===".to_string(),
        format!("Total issues: {}", diagnostics.len()),
        format!("  Errors: {}", count(Severity::Error)),
        format!("  Warnings: {}", count(Severity::Warning)),
        format!("  Info: {}", count(Severity::Info)),
    ];

    let mut by_check: Vec<(&str, usize)> = Vec::new();
    for diagnostic in diagnostics {
        match by_check.iter_mut().find(|(check, _)| *check == diagnostic.check) {
            Some((_, n)) => *n += 1,
            None => by_check.push((diagnostic.check, 1)),
        }
    }
    by_check.sort_by_key(|(check, _)| *check);
    if !by_check.is_empty() {
        lines.push("Issues by check:".to_string());
        for (check, n) in by_check {
            lines.push(format!("  {}: {}", check, n));
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::TypeInference;
    use crate::parser::parse;

    fn diagnostics_for(source: &str) -> Vec<Diagnostic> {
        let chunk = parse(source).unwrap();
        let analysis = TypeInference::run(&chunk).unwrap();
        validate(&analysis, &DiagnosticsConfig::default())
    }

    #[test]
    fn test_mixed_usage_warning() {
        let diagnostics = diagnostics_for("local t = {}\nt[1] = 10\nt.name = \"x\"");
        let issue = diagnostics
            .iter()
            .find(|d| d.check == "mixed_usage")
            .expect("mixed usage reported");
        assert_eq!(issue.severity, Severity::Warning);
        assert!(issue.message.contains("both array and map"));
        assert_eq!(issue.symbol.as_deref(), Some("t"));
    }

    #[test]
    fn test_sparse_array_warning() {
        let diagnostics = diagnostics_for("local t = {}\nt[1] = 1\nt[5] = 2");
        assert!(diagnostics.iter().any(|d| d.check == "sparse_array"
            && d.severity == Severity::Warning));
    }

    #[test]
    fn test_clean_array_has_no_table_warnings() {
        let diagnostics = diagnostics_for("local t = {}\nt[1] = 1\nt[2] = 2");
        assert!(!diagnostics
            .iter()
            .any(|d| d.check == "mixed_usage" || d.check == "sparse_array"));
    }

    #[test]
    fn test_type_gap_info() {
        let diagnostics = diagnostics_for("local maybe");
        let issue = diagnostics
            .iter()
            .find(|d| d.check == "type_gap")
            .expect("type gap reported");
        assert_eq!(issue.severity, Severity::Info);
        assert_eq!(issue.symbol.as_deref(), Some("maybe"));
    }

    #[test]
    fn test_mixed_variant_warning() {
        let diagnostics = diagnostics_for("local v = {}\nv = 5");
        assert!(diagnostics
            .iter()
            .any(|d| d.check == "mixed_variant" && d.severity == Severity::Warning));
    }

    #[test]
    fn test_conflicting_call_sites_warn() {
        // f sees a Number and a String across its call sites.
        let diagnostics =
            diagnostics_for("local function f(a) end\nlocal n = 1\nlocal s = \"x\"\nf(n)\nf(s)");
        let issue = diagnostics
            .iter()
            .find(|d| d.check == "conflicting_param")
            .expect("conflicting parameter reported");
        assert_eq!(issue.severity, Severity::Warning);
        assert!(issue.message.contains("NUMBER, STRING"));
        assert_eq!(issue.symbol.as_deref(), Some("f.a"));
    }

    #[test]
    fn test_severity_override_off() {
        let chunk = parse("local t = {}\nt[1] = 10\nt.name = \"x\"").unwrap();
        let analysis = TypeInference::run(&chunk).unwrap();
        let config = DiagnosticsConfig::from_toml("[severity]\nmixed_usage = \"off\"").unwrap();
        let diagnostics = validate(&analysis, &config);
        assert!(!diagnostics.iter().any(|d| d.check == "mixed_usage"));
    }

    #[test]
    fn test_severity_override_error() {
        let chunk = parse("local t = {}\nt[1] = 10\nt.name = \"x\"").unwrap();
        let analysis = TypeInference::run(&chunk).unwrap();
        let config = DiagnosticsConfig::from_toml("[severity]\nmixed_usage = \"error\"").unwrap();
        let diagnostics = validate(&analysis, &config);
        assert!(has_errors(&diagnostics));
    }

    #[test]
    fn test_config_rejects_unknown_check() {
        let err = DiagnosticsConfig::from_toml("[severity]\nno_such_check = \"off\"").unwrap_err();
        assert!(err.contains("unknown check"));
    }

    #[test]
    fn test_config_rejects_invalid_level() {
        let err = DiagnosticsConfig::from_toml("[severity]\nmixed_usage = \"loud\"").unwrap_err();
        assert!(err.contains("invalid severity"));
    }

    #[test]
    fn test_report_groups_by_severity() {
        let diagnostics = diagnostics_for("local t = {}\nt[1] = 10\nt.name = \"x\"\nlocal u");
        let report = format_report(&diagnostics, None);
        let warning_pos = report.find("WARNING").unwrap();
        let info_pos = report.find("INFO").unwrap();
        assert!(warning_pos < info_pos, "warnings come before info");
    }

    #[test]
    fn test_report_truncation() {
        let diagnostics = diagnostics_for("local a\nlocal b\nlocal c");
        assert!(diagnostics.len() >= 3);
        let report = format_report(&diagnostics, Some(1));
        assert!(report.contains("more issues hidden"));
    }

    #[test]
    fn test_empty_report() {
        assert_eq!(format_report(&[], None), "No validation issues found.");
    }

    #[test]
    fn test_summary_counts() {
        let diagnostics = diagnostics_for("local t = {}\nt[1] = 10\nt.name = \"x\"\nlocal u");
        let summary = format_summary(&diagnostics);
        assert!(summary.contains("Total issues:"));
        assert!(summary.contains("mixed_usage: 1"));
    }
}
