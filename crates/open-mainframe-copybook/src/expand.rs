//! COPY expansion.
//!
//! [`Preprocessor`] drives a run: it normalizes the root unit, finds its COPY
//! statements, resolves and expands each copybook depth-first (applying any
//! REPLACING pairs to the copybook text first), and feeds everything to the
//! [`Assembler`].
//!
//! The only fatal error is an unreadable root file. A COPY that cannot be
//! expanded (unresolved, circular, too deep, unreadable or malformed) is
//! recorded as a diagnostic and contributes no text.

use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::assemble::Assembler;
use crate::config::CopybookConfig;
use crate::diagnostic::{Diagnostic, Diagnostics};
use crate::directive::{find_copy_statements, CopyStatement};
use crate::error::{PreprocessError, Result};
use crate::format::normalize;
use crate::provenance::{
    ExpansionId, ExpansionRecord, MappedText, Origin, ProvenanceIndex, SourceLocation,
};
use crate::replacing::substitute;
use crate::resolver::CopybookResolver;
use crate::source::{SourceCache, UnitId};

/// COBOL copybook preprocessor.
///
/// Holds only the configuration, so one preprocessor can serve any number
/// of runs, including runs on different threads.
#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: CopybookConfig,
}

impl Preprocessor {
    pub fn new(config: CopybookConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CopybookConfig {
        &self.config
    }

    /// Preprocess a source file.
    pub fn process_file(&self, path: impl AsRef<Path>) -> Result<PreprocessedSource> {
        let path = path.as_ref();
        let mut cache = SourceCache::new(self.config.format);
        let root = cache
            .load(path)
            .map_err(|cause| PreprocessError::RootUnreadable {
                path: path.to_path_buf(),
                cause,
            })?;
        Ok(Expansion::new(&self.config, cache).run(root))
    }

    /// Preprocess in-memory source text.
    ///
    /// `logical_path` names the text in provenance and diagnostics; it does
    /// not need to exist.
    pub fn process_text(&self, text: &str, logical_path: impl AsRef<Path>) -> PreprocessedSource {
        let mut cache = SourceCache::new(self.config.format);
        let root = cache.insert(logical_path.as_ref(), text);
        Expansion::new(&self.config, cache).run(root)
    }
}

/// A compiler-directive line removed during normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedDirective {
    /// File the line is in.
    pub path: PathBuf,
    /// Physical line (1-indexed).
    pub line: u32,
    /// Directive text, trimmed.
    pub text: String,
}

/// Result of a preprocessing run.
#[derive(Debug, Clone)]
pub struct PreprocessedSource {
    /// The expanded, lexer-ready text.
    pub text: String,
    /// Where every byte of `text` came from.
    pub provenance: ProvenanceIndex,
    /// Problems found, in the order they were found.
    pub diagnostics: Diagnostics,
    /// Compiler-directive lines from every unit, in the order units were
    /// first normalized.
    pub directives: Vec<ForwardedDirective>,
    /// Paths of every unit read, root first.
    pub units: Vec<PathBuf>,
    dependencies: Vec<PathBuf>,
}

impl PreprocessedSource {
    /// Original location of output byte `offset`.
    pub fn location(&self, offset: usize) -> Option<SourceLocation> {
        self.provenance.locate(&self.text, offset)
    }

    /// Location of `offset` followed by the COPY statements that led to it,
    /// innermost first.
    pub fn trail(&self, offset: usize) -> Vec<SourceLocation> {
        self.provenance.trail(&self.text, offset)
    }

    /// Resolved copybook paths, in order of first use.
    pub fn dependencies(&self) -> &[PathBuf] {
        &self.dependencies
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

/// A unit being expanded.
#[derive(Debug)]
struct Frame {
    unit: UnitId,
    /// COPY name that opened the frame; `None` for the root.
    identifier: Option<String>,
}

/// State of one run.
struct Expansion<'a> {
    config: &'a CopybookConfig,
    cache: SourceCache,
    resolver: CopybookResolver<'a>,
    normalized: HashMap<UnitId, Rc<MappedText>>,
    stack: Vec<Frame>,
    assembler: Assembler,
    diagnostics: Diagnostics,
    directives: Vec<ForwardedDirective>,
    dependencies: Vec<PathBuf>,
    /// Line break held back in front of a COPY that occupies a whole line;
    /// dropped if the COPY produces no text.
    pending_break: Option<(ExpansionId, MappedText)>,
}

impl<'a> Expansion<'a> {
    fn new(config: &'a CopybookConfig, cache: SourceCache) -> Self {
        Self {
            config,
            cache,
            resolver: CopybookResolver::new(config),
            normalized: HashMap::new(),
            stack: Vec::new(),
            assembler: Assembler::new(),
            diagnostics: Diagnostics::new(),
            directives: Vec::new(),
            dependencies: Vec::new(),
            pending_break: None,
        }
    }

    fn run(mut self, root: UnitId) -> PreprocessedSource {
        let root_path = self.cache.unit(root).path.clone();
        tracing::debug!(root = %root_path.display(), format = %self.config.format, "Preprocessing");

        let expansion = self.assembler.open_expansion(ExpansionRecord {
            unit: root,
            identifier: None,
            parent: None,
            directive: None,
        });
        let text = self.normalized_text(root);
        self.stack.push(Frame {
            unit: root,
            identifier: None,
        });
        self.expand_unit(&text, expansion);
        self.stack.pop();

        let units = self.cache.paths();
        let (text, provenance) = self.assembler.finish(units.clone());
        tracing::debug!(
            root = %root_path.display(),
            bytes = text.len(),
            units = units.len(),
            diagnostics = self.diagnostics.len(),
            "Preprocessing complete"
        );

        PreprocessedSource {
            text,
            provenance,
            diagnostics: self.diagnostics,
            directives: self.directives,
            units,
            dependencies: self.dependencies,
        }
    }

    /// Normalized text of a unit, computed once per run.
    ///
    /// Normalization problems and compiler directives are reported the first
    /// time only.
    fn normalized_text(&mut self, id: UnitId) -> Rc<MappedText> {
        if let Some(text) = self.normalized.get(&id) {
            return Rc::clone(text);
        }

        let unit = self.cache.unit(id);
        let normalized = normalize(&unit.text, unit.format, self.config.debugging_lines);

        for issue in &normalized.issues {
            self.diagnostics.push(Diagnostic::Normalization {
                location: SourceLocation::new(unit.path.clone(), issue.line, issue.column),
                detail: issue.detail.clone(),
            });
        }
        self.directives
            .extend(normalized.directives.iter().map(|d| ForwardedDirective {
                path: unit.path.clone(),
                line: d.line,
                text: d.text.clone(),
            }));

        let text = Rc::new(normalized.joined());
        self.normalized.insert(id, Rc::clone(&text));
        text
    }

    /// Emit `text`, expanding its COPY statements in place.
    fn expand_unit(&mut self, text: &MappedText, expansion: ExpansionId) {
        let source = text.text();
        let mut last = 0;

        for located in find_copy_statements(source) {
            let range = located.range.clone();
            let whole_line = whole_line(source, &range);

            match whole_line {
                Some((line_start, _)) if line_start > last => {
                    self.emit(expansion, &text.slice(last..line_start - 1));
                    self.hold_break(expansion, text.slice(line_start - 1..line_start));
                }
                Some(_) => {}
                None => self.emit(expansion, &text.slice(last..range.start)),
            }

            let emitted = self.assembler.len();
            let origin = text.origin_at(range.start).unwrap_or_default();
            let location = self.location(origin.line, origin.column);

            match located.statement {
                Ok(statement) => self.expand_copy(&statement, expansion, origin, location),
                Err(detail) => self
                    .diagnostics
                    .push(Diagnostic::MalformedDirective { detail, location }),
            }

            last = match whole_line {
                Some((_, line_end)) if self.assembler.len() == emitted => {
                    if matches!(self.pending_break, Some((owner, _)) if owner == expansion) {
                        self.pending_break = None;
                        line_end
                    } else if source[line_end..].starts_with('\n') {
                        line_end + 1
                    } else {
                        line_end
                    }
                }
                Some((_, line_end)) => line_end,
                None => range.end,
            };
        }

        self.emit(expansion, &text.slice(last..source.len()));
    }

    /// Expand one COPY statement found in the current frame.
    fn expand_copy(
        &mut self,
        statement: &CopyStatement,
        parent: ExpansionId,
        origin: Origin,
        location: SourceLocation,
    ) {
        let identifier = statement.name.as_str();
        if let Some(library) = &statement.library {
            tracing::trace!(identifier, library = %library, "Ignoring COPY library qualifier");
        }

        let Some(found) = self.resolver.resolve(identifier, &mut self.diagnostics) else {
            self.diagnostics.push(Diagnostic::UnresolvedCopy {
                identifier: identifier.to_string(),
                location,
            });
            return;
        };

        let cache = &self.cache;
        let cyclic = self.stack.iter().any(|frame| {
            frame
                .identifier
                .as_deref()
                .is_some_and(|open| open.eq_ignore_ascii_case(identifier))
                || cache.unit(frame.unit).path == found.path
        });
        if cyclic {
            let mut chain: Vec<String> = self
                .stack
                .iter()
                .filter_map(|frame| frame.identifier.clone())
                .collect();
            chain.push(identifier.to_string());
            self.diagnostics.push(Diagnostic::CircularInclusion {
                identifier: identifier.to_string(),
                chain,
                location,
            });
            return;
        }

        // The root frame is depth zero.
        let depth = self.stack.len();
        if let Some(limit) = self.config.max_depth {
            if depth > limit {
                self.diagnostics.push(Diagnostic::DepthExceeded {
                    identifier: identifier.to_string(),
                    limit,
                    location,
                });
                return;
            }
        }

        let unit = match self.cache.load(&found.path) {
            Ok(unit) => unit,
            Err(e) => {
                self.diagnostics.push(Diagnostic::CopyReadFailed {
                    identifier: identifier.to_string(),
                    path: found.path.clone(),
                    reason: e.to_string(),
                    location,
                });
                return;
            }
        };
        if !self.dependencies.contains(&found.path) {
            self.dependencies.push(found.path.clone());
        }

        tracing::debug!(
            identifier,
            path = %found.path.display(),
            depth,
            replacements = statement.replacements.len(),
            "Expanding copybook"
        );

        let normalized = self.normalized_text(unit);
        let text = if statement.replacements.is_empty() {
            normalized
        } else {
            Rc::new(substitute(&normalized, &statement.replacements))
        };

        let expansion = self.assembler.open_expansion(ExpansionRecord {
            unit,
            identifier: Some(identifier.to_string()),
            parent: Some(parent),
            directive: Some(origin),
        });
        self.stack.push(Frame {
            unit,
            identifier: Some(identifier.to_string()),
        });
        self.expand_unit(&text, expansion);
        self.stack.pop();
    }

    /// Location in the unit of the innermost frame.
    fn location(&self, line: u32, column: u32) -> SourceLocation {
        let path = self
            .stack
            .last()
            .and_then(|frame| self.cache.get(frame.unit))
            .map(|unit| unit.path.clone())
            .unwrap_or_default();
        SourceLocation::new(path, line, column)
    }

    fn emit(&mut self, expansion: ExpansionId, fragment: &MappedText) {
        if fragment.is_empty() {
            return;
        }
        self.flush_break();
        self.assembler.emit(expansion, fragment);
    }

    fn hold_break(&mut self, expansion: ExpansionId, line_break: MappedText) {
        self.flush_break();
        self.pending_break = Some((expansion, line_break));
    }

    fn flush_break(&mut self) {
        if let Some((owner, line_break)) = self.pending_break.take() {
            self.assembler.emit(owner, &line_break);
        }
    }
}

/// If the statement at `range` is alone on its line, the line's bounds
/// (start, and the offset of its `\n` or the end of the text).
fn whole_line(text: &str, range: &Range<usize>) -> Option<(usize, usize)> {
    let line_start = text[..range.start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = text[range.end..]
        .find('\n')
        .map_or(text.len(), |i| range.end + i);
    let alone = text[line_start..range.start].trim().is_empty()
        && text[range.end..line_end].trim().is_empty();
    alone.then_some((line_start, line_end))
}
