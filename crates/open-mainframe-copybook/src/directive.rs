//! COPY statement scanning.
//!
//! Finds `COPY` statements in normalized unit text and parses them:
//!
//! ```text
//! COPY name [IN|OF library] [SUPPRESS] [REPLACING operand BY operand ...].
//! ```
//!
//! The name and library may be words or quoted literals. A statement may
//! span several logical lines. `COPY` inside a literal or pseudo-text is not
//! a statement.

use std::ops::Range;

use crate::replacing::{parse_replacements, Replacement};

/// Kind of a source token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    /// A character-string word such as `COPY` or `WS-NAME`.
    Word,
    /// A quoted alphanumeric literal, quotes included.
    Literal,
    /// `==...==` pseudo-text, delimiters included.
    PseudoText { terminated: bool },
    /// A separator period.
    Period,
}

/// A token and its byte range in the scanned text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub range: Range<usize>,
}

impl Token {
    pub fn text<'t>(&self, text: &'t str) -> &'t str {
        &text[self.range.clone()]
    }

    pub fn is_word(&self, text: &str, word: &str) -> bool {
        self.kind == TokenKind::Word && self.text(text).eq_ignore_ascii_case(word)
    }

    /// Content between the `==` delimiters, for pseudo-text tokens.
    pub fn pseudo_text<'t>(&self, text: &'t str) -> Option<&'t str> {
        match self.kind {
            TokenKind::PseudoText { terminated } => {
                let end = if terminated {
                    self.range.end - 2
                } else {
                    self.range.end
                };
                Some(&text[self.range.start + 2..end])
            }
            _ => None,
        }
    }
}

/// Whether `ch` separates words (the period is handled separately).
pub(crate) fn is_separator(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, ',' | ';' | '(' | ')')
}

/// Whether the `.` at byte `idx` is a separator period: followed by
/// whitespace or the end of the text.
pub(crate) fn is_separator_period(text: &str, idx: usize) -> bool {
    text[idx..].starts_with('.')
        && text[idx + 1..]
            .chars()
            .next()
            .map_or(true, char::is_whitespace)
}

/// Split text into tokens.
///
/// Separators other than the period are dropped. An unterminated literal
/// runs to the end of its line; unterminated pseudo-text runs to the end of
/// the text.
pub(crate) fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while let Some(ch) = text[pos..].chars().next() {
        if is_separator(ch) {
            pos += ch.len_utf8();
            continue;
        }

        let start = pos;
        let kind = if text[pos..].starts_with("==") {
            match text[pos + 2..].find("==") {
                Some(rel) => {
                    pos += 2 + rel + 2;
                    TokenKind::PseudoText { terminated: true }
                }
                None => {
                    pos = text.len();
                    TokenKind::PseudoText { terminated: false }
                }
            }
        } else if ch == '"' || ch == '\'' {
            pos = literal_end(text, pos);
            TokenKind::Literal
        } else if is_separator_period(text, pos) {
            pos += 1;
            TokenKind::Period
        } else {
            pos = word_end(text, pos);
            TokenKind::Word
        };

        tokens.push(Token {
            kind,
            range: start..pos,
        });
    }

    tokens
}

/// End of the literal opening at `start`; doubled quotes are escapes.
fn literal_end(text: &str, start: usize) -> usize {
    let bytes = text.as_bytes();
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => return i,
            b if b == quote => {
                if bytes.get(i + 1) == Some(&quote) {
                    i += 2;
                    continue;
                }
                return i + 1;
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// End of the word starting at `start`.
///
/// Quotes inside a word (`X'FF'`) take the literal along with them.
fn word_end(text: &str, start: usize) -> usize {
    let mut pos = start;
    while let Some(ch) = text[pos..].chars().next() {
        if is_separator(ch) || text[pos..].starts_with("==") || is_separator_period(text, pos) {
            break;
        }
        pos = if ch == '"' || ch == '\'' {
            literal_end(text, pos)
        } else {
            pos + ch.len_utf8()
        };
    }
    pos
}

/// A parsed COPY statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyStatement {
    /// Copybook name, quotes removed.
    pub name: String,
    /// `IN`/`OF` library name, if given.
    pub library: Option<String>,
    /// `SUPPRESS` was given.
    pub suppress: bool,
    /// Ordered REPLACING pairs.
    pub replacements: Vec<Replacement>,
}

/// A COPY statement found in unit text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedCopy {
    /// Byte range from `COPY` through the terminating period.
    pub range: Range<usize>,
    /// The parsed statement, or why it could not be parsed.
    pub statement: Result<CopyStatement, String>,
}

/// Find every COPY statement in `text`, in order.
pub fn find_copy_statements(text: &str) -> Vec<LocatedCopy> {
    let tokens = tokenize(text);
    let mut found = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if !tokens[i].is_word(text, "COPY") {
            i += 1;
            continue;
        }

        let start = tokens[i].range.start;
        let period = tokens[i + 1..]
            .iter()
            .position(|t| t.kind == TokenKind::Period)
            .map(|rel| i + 1 + rel);

        match period {
            Some(end) => {
                found.push(LocatedCopy {
                    range: start..tokens[end].range.end,
                    statement: parse_statement(text, &tokens[i + 1..end]),
                });
                i = end + 1;
            }
            None => {
                // Without a period the statement is taken to end with its line.
                let line_end = text[start..].find('\n').map_or(text.len(), |rel| start + rel);
                found.push(LocatedCopy {
                    range: start..line_end,
                    statement: Err("COPY statement is not terminated by a period".to_string()),
                });
                while i < tokens.len() && tokens[i].range.start < line_end {
                    i += 1;
                }
            }
        }
    }

    found
}

/// Parse the tokens between `COPY` and the period.
fn parse_statement(text: &str, tokens: &[Token]) -> Result<CopyStatement, String> {
    let mut iter = tokens.iter().peekable();

    let name = match iter.next() {
        Some(tok) => name_operand(text, tok).ok_or_else(|| {
            format!("expected a copybook name, found '{}'", tok.text(text))
        })?,
        None => return Err("missing copybook name".to_string()),
    };

    let mut library = None;
    if let Some(tok) = iter.next_if(|t| t.is_word(text, "IN") || t.is_word(text, "OF")) {
        let lib = iter
            .next()
            .and_then(|t| name_operand(text, t))
            .ok_or_else(|| format!("missing library name after {}", tok.text(text)))?;
        library = Some(lib);
    }

    let suppress = iter.next_if(|t| t.is_word(text, "SUPPRESS")).is_some();

    let mut replacements = Vec::new();
    if iter.next_if(|t| t.is_word(text, "REPLACING")).is_some() {
        let rest: Vec<Token> = iter.by_ref().cloned().collect();
        replacements = parse_replacements(text, &rest)?;
    }

    if let Some(tok) = iter.next() {
        return Err(format!("unexpected '{}' in COPY statement", tok.text(text)));
    }

    Ok(CopyStatement {
        name,
        library,
        suppress,
        replacements,
    })
}

/// A copybook or library name: a word, or a literal without its quotes.
fn name_operand(text: &str, tok: &Token) -> Option<String> {
    let raw = tok.text(text);
    match tok.kind {
        TokenKind::Word => Some(raw.to_string()),
        TokenKind::Literal => {
            let quote = raw.chars().next()?;
            let inner = raw.strip_prefix(quote)?.strip_suffix(quote)?;
            let doubled = format!("{quote}{quote}");
            let name = inner.replace(&doubled, &quote.to_string());
            (!name.is_empty()).then_some(name)
        }
        _ => None,
    }
}
