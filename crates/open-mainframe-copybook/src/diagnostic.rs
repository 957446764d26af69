//! Recoverable problems found during a preprocessing run.
//!
//! A run never stops at the first problem. Each one is recorded as a
//! [`Diagnostic`] and the run continues with a best-effort result; the
//! collected diagnostics are returned next to the output.

use std::fmt;
use std::path::PathBuf;

use crate::provenance::SourceLocation;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// The output is incomplete or wrong at this point.
    Error,
    /// The output is still usable.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// A recoverable preprocessing problem.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum Diagnostic {
    /// A physical line could not be normalized as written.
    #[error("{location}: {detail}")]
    #[diagnostic(code(copybook::normalization))]
    Normalization {
        location: SourceLocation,
        detail: String,
    },

    /// No copybook matched a COPY name.
    #[error("{location}: copybook '{identifier}' not found")]
    #[diagnostic(
        code(copybook::unresolved),
        help("add the copybook's directory or file to the search configuration")
    )]
    UnresolvedCopy {
        identifier: String,
        location: SourceLocation,
    },

    /// A copybook would include itself, directly or indirectly.
    #[error("{location}: circular COPY of '{identifier}' ({})", .chain.join(" -> "))]
    #[diagnostic(code(copybook::circular))]
    CircularInclusion {
        identifier: String,
        /// Names from the outermost copybook down to the repeated one.
        chain: Vec<String>,
        location: SourceLocation,
    },

    /// Nesting would go deeper than the configured limit.
    #[error("{location}: COPY of '{identifier}' exceeds the nesting limit of {limit}")]
    #[diagnostic(code(copybook::depth_exceeded))]
    DepthExceeded {
        identifier: String,
        limit: usize,
        location: SourceLocation,
    },

    /// A search directory (or part of it) could not be listed.
    #[error("cannot list copybook directory {}: {reason}", .directory.display())]
    #[diagnostic(code(copybook::directory), severity(Warning))]
    DirectoryEnumeration { directory: PathBuf, reason: String },

    /// A COPY statement could not be parsed.
    #[error("{location}: malformed COPY statement: {detail}")]
    #[diagnostic(code(copybook::malformed))]
    MalformedDirective {
        detail: String,
        location: SourceLocation,
    },

    /// A copybook was found but could not be read.
    #[error("{location}: cannot read copybook '{identifier}' at {}: {reason}", .path.display())]
    #[diagnostic(code(copybook::unreadable))]
    CopyReadFailed {
        identifier: String,
        path: PathBuf,
        reason: String,
        location: SourceLocation,
    },
}

impl Diagnostic {
    /// Severity of this diagnostic.
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::DirectoryEnumeration { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Where the problem was found, if it has a source position.
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Diagnostic::Normalization { location, .. }
            | Diagnostic::UnresolvedCopy { location, .. }
            | Diagnostic::CircularInclusion { location, .. }
            | Diagnostic::DepthExceeded { location, .. }
            | Diagnostic::MalformedDirective { location, .. }
            | Diagnostic::CopyReadFailed { location, .. } => Some(location),
            Diagnostic::DirectoryEnumeration { .. } => None,
        }
    }

    /// Whether this is an error rather than a warning.
    pub fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }
}

/// Diagnostics collected during one run, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity() {
            Severity::Error => tracing::debug!(%diagnostic, "Preprocessing error"),
            Severity::Warning => tracing::warn!(%diagnostic, "Preprocessing warning"),
        }
        self.items.push(diagnostic);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether any error-severity diagnostic was recorded.
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    /// Number of error-severity diagnostics.
    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
