//! Standard-library shim metadata
//!
//! Two layers, mirroring how calls are classified:
//!
//! - a broad membership table listing which names belong to which Lua
//!   standard library, used to recognize `io.write`-style references and
//!   to detect which libraries a module touches;
//! - a signature table for the shim functions the generated C++ can call
//!   directly, including their C++ parameter types and whether they take
//!   a boxed argument vector (variadic).
//!
//! A library member with no signature entry is still recognized as a
//! library reference, but calls to it fall back to the dynamic calling
//! convention.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Library modules carried by the runtime, in the canonical (alphabetical)
/// order used when emitting state-struct members.
pub const KNOWN_LIBRARIES: [&str; 5] = ["io", "math", "os", "string", "table"];

/// Functions that live directly in the global namespace rather than in a
/// library table.
pub const STANDALONE_FUNCTIONS: [&str; 2] = ["print", "tonumber"];

/// C++-level signature of one shim function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimSignature {
    pub return_type: &'static str,
    pub param_types: &'static [&'static str],
    /// Arguments are collected into a boxed `std::vector<luaValue>`.
    /// `string.format` additionally passes its first argument separately.
    pub variadic: bool,
}

impl ShimSignature {
    /// Function-pointer declaration for a state-struct member,
    /// e.g. `double(*sqrt)(double);`
    pub fn member_decl(&self, name: &str) -> String {
        format!(
            "{}(*{})({})",
            self.return_type,
            name,
            self.param_types.join(", ")
        )
    }
}

/// Which member names each library is known to carry. Broad on purpose:
/// references to these resolve as library accesses even when no typed
/// shim exists.
static LIBRARY_MEMBERS: LazyLock<HashMap<&'static str, &'static [&'static str]>> =
    LazyLock::new(|| {
        let mut members: HashMap<&'static str, &'static [&'static str]> = HashMap::new();
        members.insert(
            "io",
            &["write", "read", "open", "close", "flush", "lines", "type"][..],
        );
        members.insert(
            "string",
            &[
                "format", "sub", "upper", "lower", "rep", "find", "match", "gmatch", "gsub",
                "byte", "char", "len", "reverse",
            ][..],
        );
        members.insert(
            "math",
            &[
                "abs", "acos", "asin", "atan", "ceil", "cos", "deg", "exp", "floor", "fmod",
                "huge", "log", "max", "min", "modf", "pi", "rad", "random", "randomseed", "sin",
                "sqrt", "tan",
            ][..],
        );
        members.insert(
            "table",
            &["insert", "remove", "concat", "sort", "pack", "unpack"][..],
        );
        members.insert("os", &["clock", "date", "difftime", "time"][..]);
        members
    });

const BOXED_VEC: &[&str] = &["const std::vector<luaValue>&"];
const ONE_DOUBLE: &[&str] = &["double"];
const TWO_DOUBLE: &[&str] = &["double", "double"];
const NO_PARAMS: &[&str] = &[];

/// Typed shim signatures keyed by dotted path (`io.write`) or bare name
/// (`print`).
static SHIM_SIGNATURES: LazyLock<HashMap<&'static str, ShimSignature>> = LazyLock::new(|| {
    let mut sigs = HashMap::new();

    let fixed = |ret: &'static str, params: &'static [&'static str]| ShimSignature {
        return_type: ret,
        param_types: params,
        variadic: false,
    };
    let variadic = |ret: &'static str, params: &'static [&'static str]| ShimSignature {
        return_type: ret,
        param_types: params,
        variadic: true,
    };

    // io
    sigs.insert("io.write", variadic("void", BOXED_VEC));
    sigs.insert("io.read", fixed("std::string", &["const std::string&"]));
    sigs.insert("io.flush", fixed("void", NO_PARAMS));

    // string
    sigs.insert(
        "string.format",
        variadic(
            "std::string",
            &["const std::string&", "const std::vector<luaValue>&"],
        ),
    );
    sigs.insert("string.len", fixed("double", &["const std::string&"]));
    sigs.insert(
        "string.sub",
        fixed("std::string", &["const std::string&", "double", "double"]),
    );
    sigs.insert("string.upper", fixed("std::string", &["const std::string&"]));
    sigs.insert("string.lower", fixed("std::string", &["const std::string&"]));
    sigs.insert(
        "string.rep",
        fixed("std::string", &["const std::string&", "double"]),
    );

    // math
    for name in [
        "math.sqrt",
        "math.abs",
        "math.floor",
        "math.ceil",
        "math.sin",
        "math.cos",
        "math.tan",
        "math.log",
        "math.exp",
    ] {
        sigs.insert(name, fixed("double", ONE_DOUBLE));
    }
    sigs.insert("math.min", fixed("double", TWO_DOUBLE));
    sigs.insert("math.max", fixed("double", TWO_DOUBLE));
    sigs.insert("math.fmod", fixed("double", TWO_DOUBLE));
    sigs.insert("math.random", fixed("double", NO_PARAMS));
    sigs.insert("math.randomseed", fixed("double", ONE_DOUBLE));

    // table
    sigs.insert("table.insert", variadic("void", BOXED_VEC));
    sigs.insert("table.remove", variadic("luaValue", BOXED_VEC));
    sigs.insert("table.concat", variadic("std::string", BOXED_VEC));
    sigs.insert("table.unpack", variadic("luaValue", BOXED_VEC));

    // os
    sigs.insert("os.clock", fixed("double", NO_PARAMS));
    sigs.insert("os.time", fixed("double", NO_PARAMS));
    sigs.insert("os.date", fixed("std::string", &["const std::string&"]));

    // standalone
    sigs.insert("print", variadic("void", BOXED_VEC));
    sigs.insert("tonumber", fixed("double", &["const luaValue&"]));

    sigs
});

pub fn is_library_module(name: &str) -> bool {
    KNOWN_LIBRARIES.contains(&name)
}

/// True when `lib.member` is a known library reference (typed or not).
pub fn is_library_member(lib: &str, member: &str) -> bool {
    LIBRARY_MEMBERS
        .get(lib)
        .map(|members| members.contains(&member))
        .unwrap_or(false)
}

pub fn is_standalone_function(name: &str) -> bool {
    STANDALONE_FUNCTIONS.contains(&name)
}

/// Signature lookup by dotted path (`math.sqrt`) or bare name (`print`).
pub fn signature(path: &str) -> Option<&'static ShimSignature> {
    SHIM_SIGNATURES.get(path)
}

/// Members of `lib` that have typed shims, sorted by name (state-struct
/// field order).
pub fn typed_module_functions(lib: &str) -> Vec<&'static str> {
    let prefix = format!("{}.", lib);
    let mut names: Vec<&'static str> = SHIM_SIGNATURES
        .keys()
        .filter(|key| key.starts_with(&prefix))
        .map(|key| &key[prefix.len()..])
        .collect();
    names.sort_unstable();
    names
}

/// The runtime symbol the shim is installed from, e.g. `l2c::io_write`.
pub fn cpp_symbol(path: &str) -> String {
    format!("l2c::{}", path.replace('.', "_"))
}
