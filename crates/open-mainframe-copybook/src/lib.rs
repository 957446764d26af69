//! COBOL source preprocessing for OpenMainframe.
//!
//! Turns a COBOL program in FIXED, FREE or VARIABLE format into a single,
//! lexer-ready text buffer:
//!
//! - **Normalization**: sequence, indicator and identification areas are
//!   stripped, comment lines dropped, continuation lines joined
//!   ([`format`])
//! - **COPY resolution**: copybook names are looked up in explicit files,
//!   then search directories, with default extensions ([`CopybookResolver`])
//! - **REPLACING**: pseudo-text, word, LEADING and TRAILING substitution
//!   ([`replacing`])
//! - **Expansion**: nested COPY statements are expanded depth-first with
//!   cycle detection ([`Preprocessor`])
//! - **Provenance**: every byte of the output maps back to a file, line and
//!   column ([`ProvenanceIndex`])
//!
//! # Example
//!
//! ```no_run
//! use open_mainframe_copybook::{CopybookConfig, Preprocessor, SourceFormat};
//!
//! let mut config = CopybookConfig::new().with_format(SourceFormat::Fixed);
//! config.add_directory("copy").add_extension("cpy");
//!
//! let result = Preprocessor::new(config).process_file("src/PAYROLL.cbl")?;
//! for diagnostic in &result.diagnostics {
//!     eprintln!("{diagnostic}");
//! }
//! if let Some(location) = result.location(0) {
//!     println!("output starts at {location}");
//! }
//! # Ok::<(), open_mainframe_copybook::PreprocessError>(())
//! ```

pub mod assemble;
pub mod config;
pub mod diagnostic;
pub mod directive;
pub mod error;
pub mod expand;
pub mod format;
pub mod provenance;
pub mod replacing;
pub mod resolver;
pub mod source;

pub use assemble::Assembler;
pub use config::{CopybookConfig, SourceFormat};
pub use diagnostic::{Diagnostic, Diagnostics, Severity};
pub use directive::{find_copy_statements, CopyStatement, LocatedCopy};
pub use error::{PreprocessError, Result};
pub use expand::{ForwardedDirective, PreprocessedSource, Preprocessor};
pub use format::{normalize, CompilerDirective, LogicalLine, Normalized};
pub use provenance::{
    ExpansionId, ExpansionRecord, MappedText, Origin, ProvenanceEntry, ProvenanceIndex,
    SourceLocation,
};
pub use replacing::{apply_replacements, parse_replacing_clause, substitute, MatchMode, Replacement};
pub use resolver::{CopybookResolver, ResolutionOrigin, ResolvedCopybook};
pub use source::{SourceCache, SourceUnit, UnitId};
