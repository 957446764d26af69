//! Provenance tracking from preprocessed text back to original source.
//!
//! Text flows through the preprocessor as [`MappedText`]: a string plus a
//! list of [`Segment`]s saying which physical line and column each run of
//! characters came from. Normalization, REPLACING and assembly all keep the
//! segments up to date, so the final [`ProvenanceIndex`] can answer "where
//! did output offset N come from" for every byte of the output.

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

use crate::source::UnitId;

/// A resolved position in an original source file (1-indexed).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// File the position is in.
    pub path: PathBuf,
    /// Physical line number.
    pub line: u32,
    /// Column, counted in characters after tab expansion.
    pub column: u32,
}

impl SourceLocation {
    /// Create a new location.
    pub fn new(path: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path.display(), self.line, self.column)
    }
}

/// Origin of the first character of a run of text within one unit.
///
/// For ordinary text, each following character maps to the next column.
/// Text inserted by REPLACING is `replaced`: every character of it maps to
/// the position where the replaced match started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Origin {
    /// Physical line (1-indexed).
    pub line: u32,
    /// Column (1-indexed).
    pub column: u32,
    /// Whether the text was produced by a substitution.
    pub replaced: bool,
}

impl Origin {
    /// Origin of text copied from the source.
    pub const fn new(line: u32, column: u32) -> Self {
        Self {
            line,
            column,
            replaced: false,
        }
    }

    /// The same position, marked as substituted text.
    pub const fn as_replaced(self) -> Self {
        Self {
            replaced: true,
            ..self
        }
    }

    /// Origin of the character `chars` positions further on.
    pub fn advanced(self, chars: usize) -> Self {
        if self.replaced {
            self
        } else {
            Self {
                column: self.column + chars as u32,
                ..self
            }
        }
    }

    /// Whether text starting at `next` directly continues a run that
    /// started at `self` and is `chars` characters long.
    fn continues(self, chars: usize, next: Origin) -> bool {
        match (self.replaced, next.replaced) {
            (false, false) => self.advanced(chars) == next,
            (true, true) => self == next,
            _ => false,
        }
    }
}

/// A run of text with a single origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Byte range within the owning text.
    pub range: Range<usize>,
    /// Where the first character came from.
    pub origin: Origin,
}

/// Text that remembers where each character came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedText {
    text: String,
    segments: Vec<Segment>,
}

impl MappedText {
    /// Create empty mapped text.
    pub fn new() -> Self {
        Self::default()
    }

    /// The plain text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The segments, in text order, covering the text without gaps.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether the text is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Append text originating at `origin`.
    pub fn push(&mut self, s: &str, origin: Origin) {
        if s.is_empty() {
            return;
        }
        let start = self.text.len();
        self.text.push_str(s);
        let end = self.text.len();

        if let Some(last) = self.segments.last_mut() {
            let chars = self.text[last.range.clone()].chars().count();
            if last.origin.continues(chars, origin) {
                last.range.end = end;
                return;
            }
        }
        self.segments.push(Segment {
            range: start..end,
            origin,
        });
    }

    /// Append another mapped text, keeping its origins.
    pub fn append(&mut self, other: &MappedText) {
        for seg in &other.segments {
            self.push(&other.text[seg.range.clone()], seg.origin);
        }
    }

    fn segment_index(&self, offset: usize) -> Option<usize> {
        let idx = self.segments.partition_point(|s| s.range.end <= offset);
        (idx < self.segments.len() && self.segments[idx].range.start <= offset).then_some(idx)
    }

    /// Origin of the character at byte `offset`.
    pub fn origin_at(&self, offset: usize) -> Option<Origin> {
        let seg = &self.segments[self.segment_index(offset)?];
        let prefix = self.text.get(seg.range.start..offset)?;
        Some(seg.origin.advanced(prefix.chars().count()))
    }

    /// Origin just past the last character.
    pub fn end_origin(&self) -> Option<Origin> {
        let seg = self.segments.last()?;
        Some(
            seg.origin
                .advanced(self.text[seg.range.clone()].chars().count()),
        )
    }

    /// Copy a byte range (on char boundaries) with its origins.
    pub fn slice(&self, range: Range<usize>) -> MappedText {
        let mut out = MappedText::new();
        for seg in &self.segments {
            let start = seg.range.start.max(range.start);
            let end = seg.range.end.min(range.end);
            if start >= end {
                continue;
            }
            let origin = seg
                .origin
                .advanced(self.text[seg.range.start..start].chars().count());
            out.push(&self.text[start..end], origin);
        }
        out
    }

    /// Copy with trailing whitespace removed.
    pub fn trim_end(&self) -> MappedText {
        self.slice(0..self.text.trim_end().len())
    }
}

/// Handle to an [`ExpansionRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExpansionId(pub u32);

/// One expansion of a unit: the root, or one COPY of a copybook.
///
/// Records link to their parent, which gives the include trail for any
/// position in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionRecord {
    /// The unit that was expanded.
    pub unit: UnitId,
    /// COPY name that pulled the unit in (`None` for the root).
    pub identifier: Option<String>,
    /// Expansion containing the COPY statement.
    pub parent: Option<ExpansionId>,
    /// Position of the COPY statement in the parent unit.
    pub directive: Option<Origin>,
}

/// Maps a range of the output to its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceEntry {
    /// Byte range in the output text.
    pub range: Range<usize>,
    /// Expansion the text was emitted from.
    pub expansion: ExpansionId,
    /// Position of the first character in that expansion's unit.
    pub origin: Origin,
}

/// Ordered, gap-free mapping from output ranges to original positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceIndex {
    entries: Vec<ProvenanceEntry>,
    expansions: Vec<ExpansionRecord>,
    files: Vec<PathBuf>,
}

impl ProvenanceIndex {
    pub(crate) fn new(
        entries: Vec<ProvenanceEntry>,
        expansions: Vec<ExpansionRecord>,
        files: Vec<PathBuf>,
    ) -> Self {
        Self {
            entries,
            expansions,
            files,
        }
    }

    /// All entries in output order.
    pub fn entries(&self) -> &[ProvenanceEntry] {
        &self.entries
    }

    /// All expansion records; the first one is the root.
    pub fn expansions(&self) -> &[ExpansionRecord] {
        &self.expansions
    }

    /// Get an expansion record.
    pub fn expansion(&self, id: ExpansionId) -> Option<&ExpansionRecord> {
        self.expansions.get(id.0 as usize)
    }

    /// Path of a unit.
    pub fn file(&self, unit: UnitId) -> Option<&PathBuf> {
        self.files.get(unit.0 as usize)
    }

    /// The entry covering output byte `offset`.
    pub fn entry_at(&self, offset: usize) -> Option<&ProvenanceEntry> {
        let idx = self.entries.partition_point(|e| e.range.end <= offset);
        self.entries
            .get(idx)
            .filter(|e| e.range.start <= offset)
    }

    /// Whether the entries cover `0..len` exactly, in order, with no gap or
    /// overlap.
    pub fn covers(&self, len: usize) -> bool {
        let mut expected = 0;
        for entry in &self.entries {
            if entry.range.start != expected || entry.range.is_empty() {
                return false;
            }
            expected = entry.range.end;
        }
        expected == len
    }

    /// Original location of output byte `offset` of `text`.
    ///
    /// `text` must be the output this index was built for.
    pub fn locate(&self, text: &str, offset: usize) -> Option<SourceLocation> {
        let entry = self.entry_at(offset)?;
        let prefix = text.get(entry.range.start..offset)?;
        let origin = entry.origin.advanced(prefix.chars().count());
        let unit = self.expansion(entry.expansion)?.unit;
        Some(SourceLocation::new(self.file(unit)?.clone(), origin.line, origin.column))
    }

    /// Location of `offset` followed by the COPY statements that led to it,
    /// innermost first and ending in the root file.
    pub fn trail(&self, text: &str, offset: usize) -> Vec<SourceLocation> {
        let mut trail = Vec::new();
        let Some(first) = self.locate(text, offset) else {
            return trail;
        };
        trail.push(first);

        let mut current = self
            .entry_at(offset)
            .and_then(|e| self.expansion(e.expansion));
        while let Some(record) = current {
            let (Some(parent_id), Some(directive)) = (record.parent, record.directive) else {
                break;
            };
            let Some(parent) = self.expansion(parent_id) else {
                break;
            };
            if let Some(path) = self.file(parent.unit) {
                trail.push(SourceLocation::new(path.clone(), directive.line, directive.column));
            }
            current = Some(parent);
        }
        trail
    }
}
