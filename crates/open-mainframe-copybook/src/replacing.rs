//! REPLACING clause parsing and text substitution.
//!
//! Supports:
//! - `==pseudo-text== BY ==pseudo-text==`, matched anywhere, with any run of
//!   whitespace in the pattern matching any run of whitespace in the text
//! - `word BY word` and `"literal" BY "literal"`, matched as whole text words
//! - `LEADING ==x== BY ==y==` and `TRAILING ==x== BY ==y==`, matched at the
//!   start or end of a text word
//!
//! Matching is case-insensitive. Pairs apply in order; each pair rewrites the
//! output of the previous one and never rescans its own replacements.

use std::ops::Range;

use crate::directive::{is_separator, is_separator_period, tokenize, Token, TokenKind};
use crate::provenance::MappedText;

/// How a pattern is matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Pseudo-text: anywhere in the text.
    PseudoText,
    /// A word or literal: only as a whole text word.
    Word,
    /// Only at the start of a text word.
    Leading,
    /// Only at the end of a text word.
    Trailing,
}

/// One `pattern BY replacement` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// Pattern, without `==` delimiters and trimmed.
    pub from: String,
    /// Replacement text. Empty means delete.
    pub to: String,
    pub mode: MatchMode,
}

impl Replacement {
    /// A pseudo-text pair.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::with_mode(from, to, MatchMode::PseudoText)
    }

    pub fn with_mode(from: impl Into<String>, to: impl Into<String>, mode: MatchMode) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            mode,
        }
    }

    /// Byte ranges of every non-overlapping match in `text`, left to right.
    pub fn find_matches(&self, text: &str) -> Vec<Range<usize>> {
        let pieces: Vec<&str> = match self.mode {
            MatchMode::PseudoText => self.from.split_whitespace().collect(),
            _ => vec![self.from.as_str()],
        };
        if pieces.iter().all(|p| p.is_empty()) {
            return Vec::new();
        }

        let mut matches = Vec::new();
        let mut pos = 0;
        while pos < text.len() {
            if let Some(end) = self.match_at(text, pos, &pieces) {
                if end > pos {
                    matches.push(pos..end);
                    pos = end;
                    continue;
                }
            }
            pos += text[pos..].chars().next().map_or(1, char::len_utf8);
        }
        matches
    }

    fn match_at(&self, text: &str, start: usize, pieces: &[&str]) -> Option<usize> {
        let needs_word_start = matches!(self.mode, MatchMode::Word | MatchMode::Leading);
        let needs_word_end = matches!(self.mode, MatchMode::Word | MatchMode::Trailing);

        if needs_word_start && !at_word_start(text, start) {
            return None;
        }

        let mut pos = start;
        for (i, piece) in pieces.iter().enumerate() {
            if i > 0 {
                let blanks = text[pos..]
                    .char_indices()
                    .find(|(_, c)| !c.is_whitespace())
                    .map_or(text.len() - pos, |(idx, _)| idx);
                if blanks == 0 {
                    return None;
                }
                pos += blanks;
            }
            pos = match_piece(text, pos, piece)?;
        }

        if needs_word_end && !at_word_end(text, pos) {
            return None;
        }
        Some(pos)
    }
}

/// Match `piece` case-insensitively at byte `pos`, returning the end.
fn match_piece(text: &str, pos: usize, piece: &str) -> Option<usize> {
    let mut chars = text[pos..].char_indices();
    for expected in piece.chars() {
        let (_, actual) = chars.next()?;
        if !actual.eq_ignore_ascii_case(&expected) {
            return None;
        }
    }
    Some(chars.next().map_or(text.len(), |(idx, _)| pos + idx))
}

fn at_word_start(text: &str, pos: usize) -> bool {
    text[..pos]
        .chars()
        .next_back()
        .map_or(true, |c| is_separator(c) || c == '.')
}

fn at_word_end(text: &str, pos: usize) -> bool {
    match text[pos..].chars().next() {
        None => true,
        Some('.') => is_separator_period(text, pos),
        Some(c) => is_separator(c),
    }
}

/// Apply `pairs` to plain text.
pub fn apply_replacements(text: &str, pairs: &[Replacement]) -> String {
    let mut current = text.to_string();
    for pair in pairs {
        let matches = pair.find_matches(&current);
        if matches.is_empty() {
            continue;
        }
        let mut out = String::with_capacity(current.len());
        let mut last = 0;
        for m in matches {
            out.push_str(&current[last..m.start]);
            out.push_str(&pair.to);
            last = m.end;
        }
        out.push_str(&current[last..]);
        current = out;
    }
    current
}

/// Apply `pairs` to origin-mapped text.
///
/// Untouched characters keep their origins; every character of a
/// replacement maps to where its match started.
pub fn substitute(text: &MappedText, pairs: &[Replacement]) -> MappedText {
    let mut current = text.clone();
    for pair in pairs {
        let matches = pair.find_matches(current.text());
        if matches.is_empty() {
            continue;
        }
        let mut out = MappedText::new();
        let mut last = 0;
        for m in matches {
            out.append(&current.slice(last..m.start));
            let origin = current.origin_at(m.start).unwrap_or_default().as_replaced();
            out.push(&pair.to, origin);
            last = m.end;
        }
        out.append(&current.slice(last..current.len()));
        current = out;
    }
    current
}

/// Parse a REPLACING operand list such as `==A== BY ==B== X BY Y`.
///
/// A trailing period is allowed.
pub fn parse_replacing_clause(clause: &str) -> Result<Vec<Replacement>, String> {
    let mut tokens = tokenize(clause);
    if tokens.last().is_some_and(|t| t.kind == TokenKind::Period) {
        tokens.pop();
    }
    parse_replacements(clause, &tokens)
}

/// Parse replacement pairs from tokens of `text`.
pub(crate) fn parse_replacements(text: &str, tokens: &[Token]) -> Result<Vec<Replacement>, String> {
    let mut pairs = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let mut mode = None;
        if tokens[i].is_word(text, "LEADING") || tokens[i].is_word(text, "TRAILING") {
            if tokens
                .get(i + 1)
                .is_some_and(|t| matches!(t.kind, TokenKind::PseudoText { .. }))
            {
                mode = Some(if tokens[i].is_word(text, "LEADING") {
                    MatchMode::Leading
                } else {
                    MatchMode::Trailing
                });
                i += 1;
            }
        }

        let (from, operand_mode) = operand(text, &tokens[i])?;
        let mode = mode.unwrap_or(operand_mode);
        if from.is_empty() {
            return Err("REPLACING pattern is empty".to_string());
        }
        if matches!(mode, MatchMode::Leading | MatchMode::Trailing) && from.contains(char::is_whitespace) {
            return Err(format!("LEADING/TRAILING pattern '{from}' must be a single word"));
        }

        match tokens.get(i + 1) {
            Some(tok) if tok.is_word(text, "BY") => {}
            Some(tok) => {
                return Err(format!("expected BY after '{from}', found '{}'", tok.text(text)));
            }
            None => return Err(format!("expected BY after '{from}'")),
        }

        let to_tok = tokens
            .get(i + 2)
            .ok_or_else(|| format!("missing replacement for '{from}'"))?;
        let (to, _) = operand(text, to_tok)?;

        pairs.push(Replacement::with_mode(from, to, mode));
        i += 3;
    }

    if pairs.is_empty() {
        return Err("REPLACING has no operands".to_string());
    }
    Ok(pairs)
}

/// Text and match mode of one operand.
fn operand(text: &str, tok: &Token) -> Result<(String, MatchMode), String> {
    match tok.kind {
        TokenKind::PseudoText { terminated: false } => {
            Err("pseudo-text is not terminated by '=='".to_string())
        }
        TokenKind::PseudoText { .. } => {
            let inner = tok.pseudo_text(text).unwrap_or_default();
            Ok((inner.trim().to_string(), MatchMode::PseudoText))
        }
        TokenKind::Word | TokenKind::Literal => Ok((tok.text(text).to_string(), MatchMode::Word)),
        TokenKind::Period => Err("unexpected period in REPLACING".to_string()),
    }
}
