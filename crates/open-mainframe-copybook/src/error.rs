//! Fatal preprocessing errors.
//!
//! Only configuration problems abort a run. Everything that can go wrong
//! while expanding a program (missing copybooks, cycles, malformed lines) is
//! reported through [`crate::diagnostic::Diagnostic`] instead, alongside the
//! best-effort output.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type for operations that can fail fatally.
pub type Result<T> = std::result::Result<T, PreprocessError>;

/// Errors that abort a preprocessing run before any output is produced.
#[derive(Debug, Error, Diagnostic)]
pub enum PreprocessError {
    /// The root source file could not be read.
    #[error("cannot read source file {}", .path.display())]
    #[diagnostic(code(copybook::root_unreadable))]
    RootUnreadable {
        /// Path of the root file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        cause: std::io::Error,
    },

    /// A source format name was not one of FIXED, FREE or VARIABLE.
    #[error("invalid source format '{0}'")]
    #[diagnostic(
        code(copybook::invalid_format),
        help("valid formats are FIXED, FREE and VARIABLE")
    )]
    InvalidFormat(String),

    /// A configuration file could not be read or parsed.
    #[error("invalid copybook configuration {}: {reason}", .path.display())]
    #[diagnostic(code(copybook::config_file))]
    ConfigFile {
        /// Path of the configuration file.
        path: PathBuf,
        /// Why loading failed.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_format_message() {
        let err = PreprocessError::InvalidFormat("TANDEM".to_string());
        assert_eq!(err.to_string(), "invalid source format 'TANDEM'");
    }

    #[test]
    fn test_root_unreadable_keeps_source() {
        let err = PreprocessError::RootUnreadable {
            path: PathBuf::from("MAIN.cbl"),
            cause: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(err.to_string(), "cannot read source file MAIN.cbl");
        assert!(std::error::Error::source(&err).is_some());
    }
}
