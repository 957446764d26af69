//! Output assembly.
//!
//! The [`Assembler`] is the append-only output buffer of a run. Text is
//! emitted in depth-first expansion order, each fragment tagged with the
//! expansion it came from, and [`Assembler::finish`] hands back the final
//! text with its [`ProvenanceIndex`].

use std::path::PathBuf;

use crate::provenance::{
    ExpansionId, ExpansionRecord, MappedText, Origin, ProvenanceEntry, ProvenanceIndex,
};

#[derive(Debug, Default)]
pub struct Assembler {
    text: String,
    entries: Vec<ProvenanceEntry>,
    expansions: Vec<ExpansionRecord>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expansion (the root, or one COPY) and get its handle.
    pub fn open_expansion(&mut self, record: ExpansionRecord) -> ExpansionId {
        let id = ExpansionId(self.expansions.len() as u32);
        self.expansions.push(record);
        id
    }

    /// Append text emitted by `expansion`.
    pub fn emit(&mut self, expansion: ExpansionId, fragment: &MappedText) {
        for seg in fragment.segments() {
            self.push(expansion, &fragment.text()[seg.range.clone()], seg.origin);
        }
    }

    fn push(&mut self, expansion: ExpansionId, s: &str, origin: Origin) {
        if s.is_empty() {
            return;
        }
        let start = self.text.len();
        self.text.push_str(s);
        let end = self.text.len();

        // Merge with the previous entry when this directly continues it.
        if let Some(last) = self.entries.last_mut() {
            if last.expansion == expansion {
                let chars = self.text[last.range.clone()].chars().count();
                let continues = if origin.replaced {
                    last.origin == origin
                } else {
                    !last.origin.replaced && last.origin.advanced(chars) == origin
                };
                if continues {
                    last.range.end = end;
                    return;
                }
            }
        }

        self.entries.push(ProvenanceEntry {
            range: start..end,
            expansion,
            origin,
        });
    }

    /// Bytes emitted so far.
    pub(crate) fn len(&self) -> usize {
        self.text.len()
    }

    /// Consume the assembler. `files` maps unit ids to paths.
    pub fn finish(self, files: Vec<PathBuf>) -> (String, ProvenanceIndex) {
        tracing::trace!(
            bytes = self.text.len(),
            entries = self.entries.len(),
            expansions = self.expansions.len(),
            "Assembled output"
        );
        let index = ProvenanceIndex::new(self.entries, self.expansions, files);
        (self.text, index)
    }
}
