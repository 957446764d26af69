//! Copybook resolution configuration.
//!
//! A [`CopybookConfig`] is built by the caller (or loaded from a TOML file)
//! and borrowed read-only for the whole preprocessing run.
//!
//! ```toml
//! format = "FIXED"
//! copybook_files = ["copy/SPECIAL.cpy"]
//! copybook_directories = ["copy", "/opt/shared/copylib"]
//! copybook_extensions = ["cpy", "cbl"]
//! max_depth = 32
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PreprocessError, Result};

/// COBOL source format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceFormat {
    /// Columns 1-6 sequence, 7 indicator, 8-72 code, 73-80 identification.
    #[default]
    Fixed,
    /// No column restrictions; `*>` starts a comment.
    Free,
    /// Like fixed, but the code area runs to the end of the line.
    Variable,
}

impl SourceFormat {
    /// Upper-case name used in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            SourceFormat::Fixed => "FIXED",
            SourceFormat::Free => "FREE",
            SourceFormat::Variable => "VARIABLE",
        }
    }

    /// Whether the format has sequence and indicator areas.
    pub fn has_indicator_area(self) -> bool {
        matches!(self, SourceFormat::Fixed | SourceFormat::Variable)
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceFormat {
    type Err = PreprocessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FIXED" => Ok(SourceFormat::Fixed),
            "FREE" => Ok(SourceFormat::Free),
            "VARIABLE" => Ok(SourceFormat::Variable),
            _ => Err(PreprocessError::InvalidFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for SourceFormat {
    type Error = PreprocessError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SourceFormat> for String {
    fn from(format: SourceFormat) -> Self {
        format.name().to_string()
    }
}

/// Where copybooks are looked up, and how source lines are laid out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopybookConfig {
    /// Column layout of every unit in the run.
    pub format: SourceFormat,
    /// Explicit copybook files, checked first and in order.
    pub copybook_files: Vec<PathBuf>,
    /// Directories searched recursively, in order, after the explicit files.
    pub copybook_directories: Vec<PathBuf>,
    /// Extensions tried when a COPY name has none (leading dot optional).
    pub copybook_extensions: Vec<String>,
    /// Optional guard rail on copybook nesting depth.
    pub max_depth: Option<usize>,
    /// Treat `D` indicator lines as code instead of comments.
    pub debugging_lines: bool,
}

impl CopybookConfig {
    /// Create an empty configuration for fixed-format source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the source format.
    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = format;
        self
    }

    /// Limit copybook nesting depth.
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Compile debugging (`D`) lines.
    pub fn with_debugging_lines(mut self, enabled: bool) -> Self {
        self.debugging_lines = enabled;
        self
    }

    /// Append an explicit copybook file.
    pub fn add_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.copybook_files.push(path.into());
        self
    }

    /// Append a copybook search directory.
    pub fn add_directory(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.copybook_directories.push(path.into());
        self
    }

    /// Append a default extension (`"cpy"` and `".cpy"` are equivalent).
    pub fn add_extension(&mut self, extension: impl AsRef<str>) -> &mut Self {
        self.copybook_extensions
            .push(extension.as_ref().trim_start_matches('.').to_string());
        self
    }

    /// Default extensions in configured order, without leading dots.
    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.copybook_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.'))
            .filter(|ext| !ext.is_empty())
    }

    /// Parse a configuration from TOML text.
    ///
    /// Relative paths are kept as written.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PreprocessError::ConfigFile {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })
    }

    /// Load a configuration from a TOML file.
    ///
    /// Relative copybook paths are taken relative to the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| PreprocessError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|e| PreprocessError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if let Some(base) = path.parent() {
            for entry in config
                .copybook_files
                .iter_mut()
                .chain(config.copybook_directories.iter_mut())
            {
                if entry.is_relative() {
                    *entry = base.join(&*entry);
                }
            }
        }

        tracing::debug!(
            config = %path.display(),
            files = config.copybook_files.len(),
            directories = config.copybook_directories.len(),
            format = %config.format,
            "Loaded copybook configuration"
        );
        Ok(config)
    }
}
