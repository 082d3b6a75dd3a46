//! Type lattice for the transpiler
//!
//! A small closed lattice over Lua value kinds. `join` merges the types a
//! binding has been observed with; incompatible concrete kinds collapse
//! into a flat, de-duplicated `Variant`. `Unknown` is the identity of the
//! join, so the lattice has finite height and fixed-point propagation
//! terminates.
//!
//! Variant subtype order is insertion order and is never reordered after
//! construction: the emitted C++ type name must be stable across runs.

use std::collections::BTreeSet;

/// Numeric table keys above this are not tracked literally.
pub const MAX_LITERAL_KEY: u64 = 10_000;

/// Type categories for Lua values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeKind {
    /// Cannot be determined
    Unknown,
    /// nil only
    Nil,
    /// bool only
    Boolean,
    /// double only
    Number,
    /// std::string only
    String,
    /// array or map container
    Table,
    /// callable value
    Function,
    /// union of concrete kinds
    Variant,
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TypeKind::Unknown => "UNKNOWN",
            TypeKind::Nil => "NIL",
            TypeKind::Boolean => "BOOLEAN",
            TypeKind::Number => "NUMBER",
            TypeKind::String => "STRING",
            TypeKind::Table => "TABLE",
            TypeKind::Function => "FUNCTION",
            TypeKind::Variant => "VARIANT",
        };
        write!(f, "{}", name)
    }
}

/// Type information for symbols and expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: TypeKind,
    /// Set on literal-origin types; enables constant-folding decisions.
    pub is_constant: bool,
    /// Subtypes of a `Variant`, in insertion order. Empty otherwise.
    pub subtypes: Vec<Type>,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Type {
            kind,
            is_constant: false,
            subtypes: Vec::new(),
        }
    }

    /// A literal-origin type.
    pub fn constant(kind: TypeKind) -> Self {
        Type {
            kind,
            is_constant: true,
            subtypes: Vec::new(),
        }
    }

    pub fn unknown() -> Self {
        Type::new(TypeKind::Unknown)
    }

    /// Build a variant from kinds in observation order.
    ///
    /// A single distinct kind collapses back to that kind; an empty list
    /// is `Unknown`.
    pub fn variant(kinds: Vec<TypeKind>) -> Self {
        let mut seen = Vec::new();
        for kind in kinds {
            debug_assert!(kind != TypeKind::Variant, "variants must be flat");
            if kind != TypeKind::Unknown && !seen.contains(&kind) {
                seen.push(kind);
            }
        }
        match seen.len() {
            0 => Type::unknown(),
            1 => Type::new(seen[0]),
            _ => Type {
                kind: TypeKind::Variant,
                is_constant: false,
                subtypes: seen.into_iter().map(Type::new).collect(),
            },
        }
    }

    /// The concrete kinds this type covers, in insertion order.
    pub fn kinds(&self) -> Vec<TypeKind> {
        if self.kind == TypeKind::Variant {
            self.subtypes.iter().map(|t| t.kind).collect()
        } else {
            vec![self.kind]
        }
    }

    /// True when the emitter may use a concrete C++ type for this binding.
    pub fn can_specialize(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Number | TypeKind::String | TypeKind::Boolean
        )
    }

    /// The C++ type name used when declaring a binding of this type.
    pub fn cpp_type(&self) -> &'static str {
        match self.kind {
            TypeKind::Number => "double",
            TypeKind::String => "std::string",
            TypeKind::Boolean => "bool",
            TypeKind::Variant => "luaValue",
            TypeKind::Unknown
            | TypeKind::Nil
            | TypeKind::Table
            | TypeKind::Function => "auto",
        }
    }

    /// Lattice join.
    ///
    /// `join(T, T) = T`, `Unknown` is the identity, and anything else
    /// produces a flat de-duplicated `Variant` whose subtype order is the
    /// order of first observation (left operand first).
    pub fn join(&self, other: &Type) -> Type {
        if self.kind == TypeKind::Unknown {
            return other.clone();
        }
        if other.kind == TypeKind::Unknown {
            return self.clone();
        }
        if self.kind == other.kind && self.kind != TypeKind::Variant {
            return Type::new(self.kind);
        }
        let mut kinds = self.kinds();
        kinds.extend(other.kinds());
        Type::variant(kinds)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.kind == TypeKind::Variant {
            let inner: Vec<String> = self.subtypes.iter().map(|t| t.to_string()).collect();
            write!(f, "VARIANT({})", inner.join(", "))
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

/// Observed usage of one table-bound symbol.
///
/// The inference pass feeds every literal index and indexed assignment
/// into this record; `finalize` makes the array-versus-map decision the
/// emitter reads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableShape {
    /// Observed positive integer literal keys (bounded by
    /// [`MAX_LITERAL_KEY`]; larger keys are not tracked).
    pub numeric_keys: BTreeSet<u64>,
    /// Observed string literal keys.
    pub string_keys: BTreeSet<String>,
    /// Join of all assigned value types.
    pub value_type: Option<Type>,
    /// Cached array decision; valid once `finalize` has run.
    pub is_array: bool,
}

impl TableShape {
    pub fn new() -> Self {
        TableShape::default()
    }

    /// Record a literal numeric key. Keys outside `1..=MAX_LITERAL_KEY`
    /// are treated as non-literal and not tracked.
    pub fn record_numeric_key(&mut self, key: u64) {
        if (1..=MAX_LITERAL_KEY).contains(&key) {
            self.numeric_keys.insert(key);
        }
    }

    pub fn record_string_key(&mut self, key: &str) {
        self.string_keys.insert(key.to_string());
    }

    /// Merge the type of an assigned value into the element type.
    pub fn merge_value_type(&mut self, value: &Type) {
        self.value_type = Some(match &self.value_type {
            Some(existing) => existing.join(value),
            None => value.clone(),
        });
    }

    /// The array-versus-map rule, without caching:
    /// array iff there are no string keys and the numeric keys form the
    /// contiguous range `1..n` (an empty table defaults to array).
    pub fn classify_array(&self) -> bool {
        if !self.string_keys.is_empty() {
            return false;
        }
        if self.numeric_keys.is_empty() {
            return true;
        }
        let min = *self.numeric_keys.iter().next().unwrap();
        let max = *self.numeric_keys.iter().next_back().unwrap();
        min == 1 && max == self.numeric_keys.len() as u64
    }

    /// Decide and cache the array flag. The emitter must only query
    /// `is_array` after this has run.
    pub fn finalize(&mut self) -> bool {
        self.is_array = self.classify_array();
        self.is_array
    }

    /// True when the table saw both numeric and string keys.
    pub fn is_mixed(&self) -> bool {
        !self.numeric_keys.is_empty() && !self.string_keys.is_empty()
    }

    /// True when numeric keys exist but do not form `1..n`.
    pub fn is_sparse(&self) -> bool {
        if self.numeric_keys.is_empty() || !self.string_keys.is_empty() {
            return false;
        }
        !self.classify_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_set(t: &Type) -> BTreeSet<TypeKind> {
        t.kinds().into_iter().collect()
    }

    #[test]
    fn test_join_identity() {
        let number = Type::new(TypeKind::Number);
        assert_eq!(number.join(&Type::unknown()), number);
        assert_eq!(Type::unknown().join(&number), number);
    }

    #[test]
    fn test_join_idempotent() {
        let string = Type::new(TypeKind::String);
        assert_eq!(string.join(&string).kind, TypeKind::String);
    }

    #[test]
    fn test_join_conflict_builds_variant() {
        let joined = Type::new(TypeKind::Number).join(&Type::new(TypeKind::String));
        assert_eq!(joined.kind, TypeKind::Variant);
        assert_eq!(
            joined.kinds(),
            vec![TypeKind::Number, TypeKind::String],
            "subtype order is observation order"
        );
    }

    #[test]
    fn test_join_commutative_as_set() {
        let a = Type::new(TypeKind::Number);
        let b = Type::new(TypeKind::Table);
        assert_eq!(kind_set(&a.join(&b)), kind_set(&b.join(&a)));
    }

    #[test]
    fn test_join_flattens_and_dedupes() {
        let variant = Type::new(TypeKind::Number).join(&Type::new(TypeKind::String));
        let joined = variant.join(&Type::new(TypeKind::Number));
        assert_eq!(joined.kind, TypeKind::Variant);
        assert_eq!(joined.kinds(), vec![TypeKind::Number, TypeKind::String]);
        for sub in &joined.subtypes {
            assert_ne!(sub.kind, TypeKind::Variant, "no nested variants");
        }
    }

    #[test]
    fn test_join_associative_as_set() {
        let a = Type::new(TypeKind::Number);
        let b = Type::new(TypeKind::String);
        let c = Type::new(TypeKind::Boolean);
        assert_eq!(kind_set(&a.join(&b).join(&c)), kind_set(&a.join(&b.join(&c))));
    }

    #[test]
    fn test_cpp_type_mapping() {
        assert_eq!(Type::new(TypeKind::Number).cpp_type(), "double");
        assert_eq!(Type::new(TypeKind::String).cpp_type(), "std::string");
        assert_eq!(Type::new(TypeKind::Boolean).cpp_type(), "bool");
        assert_eq!(Type::new(TypeKind::Nil).cpp_type(), "auto");
        assert_eq!(Type::new(TypeKind::Table).cpp_type(), "auto");
        assert_eq!(Type::unknown().cpp_type(), "auto");
        let variant = Type::new(TypeKind::Number).join(&Type::new(TypeKind::String));
        assert_eq!(variant.cpp_type(), "luaValue");
    }

    #[test]
    fn test_can_specialize() {
        assert!(Type::new(TypeKind::Number).can_specialize());
        assert!(Type::new(TypeKind::String).can_specialize());
        assert!(Type::new(TypeKind::Boolean).can_specialize());
        assert!(!Type::new(TypeKind::Table).can_specialize());
        assert!(!Type::unknown().can_specialize());
        let variant = Type::new(TypeKind::Number).join(&Type::new(TypeKind::String));
        assert!(!variant.can_specialize());
    }

    #[test]
    fn test_variant_single_kind_collapses() {
        let t = Type::variant(vec![TypeKind::Number, TypeKind::Number]);
        assert_eq!(t.kind, TypeKind::Number);
    }

    #[test]
    fn test_table_shape_contiguous_array() {
        let mut shape = TableShape::new();
        for key in 1..=3 {
            shape.record_numeric_key(key);
        }
        assert!(shape.finalize());
    }

    #[test]
    fn test_table_shape_empty_defaults_to_array() {
        let mut shape = TableShape::new();
        assert!(shape.finalize());
    }

    #[test]
    fn test_table_shape_string_keys_make_map() {
        let mut shape = TableShape::new();
        shape.record_numeric_key(1);
        shape.record_string_key("name");
        assert!(!shape.finalize());
        assert!(shape.is_mixed());
    }

    #[test]
    fn test_table_shape_sparse_is_map() {
        let mut shape = TableShape::new();
        shape.record_numeric_key(1);
        shape.record_numeric_key(3);
        assert!(!shape.finalize());
        assert!(shape.is_sparse());
    }

    #[test]
    fn test_table_shape_zero_based_is_map() {
        let mut shape = TableShape::new();
        shape.record_numeric_key(0);
        shape.record_numeric_key(1);
        // Key 0 is outside the tracked range, so only {1} remains: array.
        assert!(shape.finalize());
    }

    #[test]
    fn test_table_shape_huge_keys_ignored() {
        let mut shape = TableShape::new();
        shape.record_numeric_key(1);
        shape.record_numeric_key(MAX_LITERAL_KEY + 5);
        assert_eq!(shape.numeric_keys.len(), 1);
    }

    #[test]
    fn test_value_type_merging() {
        let mut shape = TableShape::new();
        shape.merge_value_type(&Type::new(TypeKind::String));
        assert_eq!(shape.value_type.as_ref().unwrap().kind, TypeKind::String);
        shape.merge_value_type(&Type::new(TypeKind::Number));
        assert_eq!(shape.value_type.as_ref().unwrap().kind, TypeKind::Variant);
    }
}
