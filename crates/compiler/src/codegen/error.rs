//! Code generation error types.

/// Error type for code generation operations.
///
/// Allows `?` propagation for both logical errors (unsupported
/// constructs, inconsistent analysis state) and formatting errors from
/// writing into the output buffer.
#[derive(Debug)]
pub enum CodeGenError {
    /// An AST construct the emitter does not lower. The emitter never
    /// silently skips a node; it aborts the module with this.
    Unsupported(String),
    /// An internal inconsistency (e.g. missing analysis data).
    Logic(String),
    /// A formatting error while writing output.
    Format(std::fmt::Error),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Unsupported(s) => write!(f, "unsupported construct: {}", s),
            CodeGenError::Logic(s) => write!(f, "{}", s),
            CodeGenError::Format(e) => write!(f, "C++ generation error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}

impl From<std::fmt::Error> for CodeGenError {
    fn from(e: std::fmt::Error) -> Self {
        CodeGenError::Format(e)
    }
}
