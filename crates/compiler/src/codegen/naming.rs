//! C++ identifier naming scheme
//!
//! Generated symbols link across the emitted headers and translation
//! units, so these functions must be byte-for-byte stable:
//!
//! - module export: `_l2c__<sanitized>_export`
//! - module function: `_l2c__<sanitized_module>_<function>`
//! - string pool entry: `_l2c__string_<index>`

pub const PREFIX: &str = "_l2c__";
const EXPORT_SUFFIX: &str = "_export";

/// Convert a filesystem path to a C++-identifier-safe string.
///
/// Path separators become `__`, dashes become `_`, leading/trailing
/// underscores are stripped, and runs of three or more underscores
/// collapse to `__`. The result gets a `__` prefix iff the input
/// contained a separator (or the caller asks for one).
pub fn sanitize_path(path: &str, add_prefix: bool) -> String {
    if path.is_empty() {
        return String::new();
    }

    let marked: String = path
        .chars()
        .map(|c| if c == '/' || c == '\\' { '\0' } else { c })
        .collect();
    let had_separator = marked.contains('\0');
    let dashed = marked.replace('-', "_");
    let normalized = dashed.replace('\0', "__");
    let trimmed = normalized.trim_matches('_');
    let collapsed = collapse_underscore_runs(trimmed);

    if !collapsed.is_empty() && (had_separator || add_prefix) {
        format!("__{}", collapsed)
    } else {
        collapsed
    }
}

/// Collapse every run of three or more underscores to exactly two.
fn collapse_underscore_runs(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut run = 0usize;
    for c in input.chars() {
        if c == '_' {
            run += 1;
        } else {
            match run {
                0 => {}
                n if n >= 3 => out.push_str("__"),
                n => out.push_str(&"_".repeat(n)),
            }
            run = 0;
            out.push(c);
        }
    }
    match run {
        0 => {}
        n if n >= 3 => out.push_str("__"),
        n => out.push_str(&"_".repeat(n)),
    }
    out
}

/// Export function name for a module: `_l2c__utils_export`.
pub fn module_export_name(module: &str) -> String {
    format!("{}{}{}", PREFIX, sanitize_path(module, false), EXPORT_SUFFIX)
}

/// Function symbol within a module: `_l2c__utils_myFunction`.
pub fn function_name(module: &str, function: &str) -> String {
    format!(
        "{}{}_{}",
        PREFIX,
        sanitize_path(module, false),
        function.replace('-', "_")
    )
}

/// Named string-pool constant: `_l2c__string_42`.
pub fn string_literal_name(index: usize) -> String {
    format!("{}string_{}", PREFIX, index)
}

/// True when `name` is usable as a C++ identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_plain_name() {
        assert_eq!(sanitize_path("utils", false), "utils");
        assert_eq!(sanitize_path("spectral-norm", false), "spectral_norm");
    }

    #[test]
    fn test_sanitize_path_separators() {
        assert_eq!(sanitize_path("src/core/utils", false), "__src__core__utils");
        assert_eq!(sanitize_path("a\\b", false), "__a__b");
    }

    #[test]
    fn test_sanitize_strips_and_collapses() {
        assert_eq!(sanitize_path("_name_", false), "name");
        assert_eq!(sanitize_path("a___b", false), "a__b");
        assert_eq!(sanitize_path("a____b", false), "a__b");
        assert_eq!(sanitize_path("a__b", false), "a__b");
    }

    #[test]
    fn test_sanitize_explicit_prefix() {
        assert_eq!(sanitize_path("utils", true), "__utils");
        assert_eq!(sanitize_path("", true), "");
    }

    #[test]
    fn test_export_name() {
        assert_eq!(module_export_name("utils"), "_l2c__utils_export");
        assert_eq!(module_export_name("subdir__helper"), "_l2c__subdir__helper_export");
    }

    #[test]
    fn test_function_name() {
        assert_eq!(function_name("utils", "my-func"), "_l2c__utils_my_func");
    }

    #[test]
    fn test_string_literal_name() {
        assert_eq!(string_literal_name(42), "_l2c__string_42");
    }

    #[test]
    fn test_module_name_round_trip() {
        // Path -> module name (resolver scheme) -> export symbol -> back.
        for module in ["utils", "subdir__helper", "my_mod"] {
            let symbol = module_export_name(module);
            let recovered = symbol
                .strip_prefix(PREFIX)
                .and_then(|s| s.strip_suffix(EXPORT_SUFFIX))
                .unwrap();
            assert_eq!(recovered, module);
        }
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("foo"));
        assert!(is_valid_identifier("_foo1"));
        assert!(!is_valid_identifier("1foo"));
        assert!(!is_valid_identifier("foo-bar"));
        assert!(!is_valid_identifier(""));
    }
}
