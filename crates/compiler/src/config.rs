//! Compiler configuration
//!
//! Options that reach the pipeline from the CLI. Builder-style setters
//! so embedding projects can drive the transpiler programmatically.

use crate::validate::DiagnosticsConfig;
use std::path::{Path, PathBuf};

/// Configuration for one transpiler invocation.
#[derive(Debug, Clone, Default)]
pub struct CompilerConfig {
    /// Library mode: no main translation unit, no `arg` state member.
    pub as_library: bool,
    /// Output basename override (single-file mode).
    pub output_name: Option<String>,
    /// Destination directory for generated files.
    pub output_dir: PathBuf,
    /// Progress and statistics output.
    pub verbose: bool,
    /// Severity overrides for the pass-4 diagnostics.
    pub diagnostics: DiagnosticsConfig,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig {
            output_dir: PathBuf::from("."),
            ..CompilerConfig::default()
        }
    }

    pub fn with_library_mode(mut self, as_library: bool) -> Self {
        self.as_library = as_library;
        self
    }

    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsConfig) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Load the diagnostics config from a TOML file.
    pub fn load_diagnostics(mut self, path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read diagnostics config {}: {}", path.display(), e))?;
        self.diagnostics = DiagnosticsConfig::from_toml(&content)?;
        Ok(self)
    }
}
