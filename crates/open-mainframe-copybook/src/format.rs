//! Column-format normalization.
//!
//! Turns the physical lines of a unit into logical lines:
//! - FIXED: columns 1-6 sequence area, column 7 indicator, columns 8-72
//!   code, columns 73+ identification area (dropped)
//! - VARIABLE: as FIXED, but the code area runs to the end of the line
//! - FREE: no column areas; `*>` comments, `>>` compiler directives
//!
//! Comment lines are dropped, compiler-directive lines are forwarded as
//! [`CompilerDirective`] metadata, and continuation lines are joined onto the
//! preceding code line. Every character of a logical line keeps the
//! physical line and column it came from.

use crate::config::SourceFormat;
use crate::provenance::{MappedText, Origin};

/// 0-indexed column of the indicator area (column 7).
pub const INDICATOR_COLUMN: usize = 6;
/// 0-indexed column where the code area starts (column 8).
pub const CODE_START: usize = 7;
/// 0-indexed end (exclusive) of the FIXED code area (column 72).
pub const FIXED_CODE_END: usize = 72;
/// Tab stops are every 8 columns.
pub const TAB_WIDTH: usize = 8;

/// Indicator area values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    /// Space or anything unrecognized.
    Normal,
    /// `*`
    Comment,
    /// `-`
    Continuation,
    /// `/` or `$`
    Directive,
    /// `D` or `d`
    Debug,
}

impl Indicator {
    /// Classify an indicator character.
    pub fn from_char(ch: char) -> Self {
        match ch {
            '*' => Indicator::Comment,
            '-' => Indicator::Continuation,
            '/' | '$' => Indicator::Directive,
            'D' | 'd' => Indicator::Debug,
            _ => Indicator::Normal,
        }
    }
}

/// A continuation-joined, comment-free line of code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    /// Code text with origins; right-trimmed.
    pub text: MappedText,
    /// First physical line (1-indexed).
    pub first_line: u32,
    /// Last physical line, including continuation lines.
    pub last_line: u32,
}

impl LogicalLine {
    /// The plain text.
    pub fn as_str(&self) -> &str {
        self.text.text()
    }
}

/// A compiler-directive line removed from the code stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerDirective {
    /// Physical line (1-indexed).
    pub line: u32,
    /// Directive text, trimmed.
    pub text: String,
}

/// A malformed line found during normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationIssue {
    /// Physical line (1-indexed).
    pub line: u32,
    /// Column (1-indexed).
    pub column: u32,
    /// What is wrong.
    pub detail: String,
}

/// Result of normalizing one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    /// Logical lines in source order.
    pub lines: Vec<LogicalLine>,
    /// Compiler-directive lines in source order.
    pub directives: Vec<CompilerDirective>,
    /// Problems found; the affected lines are kept unextended.
    pub issues: Vec<NormalizationIssue>,
}

impl Normalized {
    /// The logical lines joined with `\n`.
    ///
    /// Each `\n` maps to the position just past the end of its line.
    pub fn joined(&self) -> MappedText {
        let mut out = MappedText::new();
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                let origin = out.end_origin().unwrap_or_default();
                out.push("\n", origin);
            }
            out.append(&line.text);
        }
        out
    }
}

/// Classification of one physical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Code,
    Continuation,
    Comment,
    Directive,
    Blank,
}

#[derive(Debug)]
struct PhysicalLine {
    kind: LineKind,
    /// Code area characters (tabs expanded, identification area removed).
    content: String,
    /// 1-indexed column of the first content character.
    column: u32,
    /// Directive text, when `kind` is `Directive`.
    directive: Option<String>,
}

/// Normalize the text of one unit.
///
/// `text` must use `\n` line endings.
pub fn normalize(text: &str, format: SourceFormat, debugging_lines: bool) -> Normalized {
    let mut builder = Builder::new(format);

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx as u32 + 1;
        let physical = classify(raw, format, debugging_lines);

        match physical.kind {
            LineKind::Blank | LineKind::Comment => {}
            LineKind::Directive => builder.out.directives.push(CompilerDirective {
                line: line_no,
                text: physical.directive.unwrap_or_default(),
            }),
            LineKind::Code => builder.start(line_no, &physical.content, physical.column),
            LineKind::Continuation => builder.continue_with(line_no, &physical),
        }
    }

    builder.finish()
}

/// Accumulates logical lines.
struct Builder {
    format: SourceFormat,
    out: Normalized,
    pending: Option<Pending>,
}

/// The logical line currently being built.
struct Pending {
    text: MappedText,
    first_line: u32,
    last_line: u32,
    /// Quote character of an alphanumeric literal left open at the end.
    open_literal: Option<char>,
    /// Content characters contributed by the last physical line.
    last_chars: usize,
    /// Origin of the first of those characters.
    last_origin: Origin,
}

impl Builder {
    fn new(format: SourceFormat) -> Self {
        Self {
            format,
            out: Normalized::default(),
            pending: None,
        }
    }

    /// Begin a new logical line with an ordinary code line.
    fn start(&mut self, line_no: u32, content: &str, column: u32) {
        self.flush();

        let (code, open_literal) = strip_floating_comment(content, None);
        let origin = Origin::new(line_no, column);
        let mut text = MappedText::new();
        text.push(code, origin);

        self.pending = Some(Pending {
            text,
            first_line: line_no,
            last_line: line_no,
            open_literal,
            last_chars: code.chars().count(),
            last_origin: origin,
        });
    }

    /// Join a continuation line onto the pending logical line.
    fn continue_with(&mut self, line_no: u32, physical: &PhysicalLine) {
        let content = physical.content.as_str();
        let body = content.trim_start();
        let body_column = physical.column + (content.chars().count() - body.chars().count()) as u32;

        let Some(pending) = self.pending.as_mut() else {
            self.issue(
                line_no,
                INDICATOR_COLUMN as u32 + 1,
                "continuation line has no preceding line to continue",
            );
            self.start(line_no, content, physical.column);
            return;
        };

        match pending.open_literal {
            Some(quote) => {
                let Some(rest) = body.strip_prefix(quote) else {
                    self.issue(
                        line_no,
                        body_column,
                        "continuation of an alphanumeric literal must start with a quotation mark",
                    );
                    self.start(line_no, content, physical.column);
                    return;
                };

                // The literal runs to the end of the code area of the
                // previous line, counted from where that piece started.
                if self.format == SourceFormat::Fixed {
                    let width = (FIXED_CODE_END + 1)
                        .saturating_sub(pending.last_origin.column as usize);
                    if pending.last_chars < width {
                        let pad = " ".repeat(width - pending.last_chars);
                        pending
                            .text
                            .push(&pad, pending.last_origin.advanced(pending.last_chars));
                    }
                }

                let (code, open) = strip_floating_comment(rest, Some(quote));
                let origin = Origin::new(line_no, body_column + 1);
                pending.text.push(code, origin);
                pending.open_literal = open;
                pending.last_chars = code.chars().count();
                pending.last_origin = origin;
            }
            None => {
                let (code, open) = strip_floating_comment(body, None);
                let origin = Origin::new(line_no, body_column);
                pending.text = pending.text.trim_end();
                pending.text.push(code, origin);
                pending.open_literal = open;
                pending.last_chars = code.chars().count();
                pending.last_origin = origin;
            }
        }
        pending.last_line = line_no;
    }

    fn flush(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.open_literal.is_some() {
            let column = pending.last_origin.advanced(pending.last_chars).column;
            self.issue(
                pending.last_line,
                column,
                "alphanumeric literal is not terminated and the next line is not a continuation",
            );
        }

        let text = pending.text.trim_end();
        if !text.is_empty() {
            self.out.lines.push(LogicalLine {
                text,
                first_line: pending.first_line,
                last_line: pending.last_line,
            });
        }
    }

    fn issue(&mut self, line: u32, column: u32, detail: &str) {
        self.out.issues.push(NormalizationIssue {
            line,
            column,
            detail: detail.to_string(),
        });
    }

    fn finish(mut self) -> Normalized {
        self.flush();
        self.out
    }
}

/// Split a physical line into its areas and classify it.
fn classify(raw: &str, format: SourceFormat, debugging_lines: bool) -> PhysicalLine {
    let chars: Vec<char> = expand_tabs(raw).chars().collect();

    if !format.has_indicator_area() {
        let content: String = chars.iter().collect();
        return classify_code(content, 1);
    }

    // Only a sequence area: nothing to see.
    if chars.len() <= INDICATOR_COLUMN {
        return PhysicalLine {
            kind: LineKind::Blank,
            content: String::new(),
            column: CODE_START as u32 + 1,
            directive: None,
        };
    }

    let end = match format {
        SourceFormat::Fixed => chars.len().min(FIXED_CODE_END),
        SourceFormat::Free | SourceFormat::Variable => chars.len(),
    };
    let content: String = chars.get(CODE_START..end).unwrap_or_default().iter().collect();
    let column = CODE_START as u32 + 1;
    let indicator_char = chars[INDICATOR_COLUMN];

    match Indicator::from_char(indicator_char) {
        Indicator::Comment => PhysicalLine {
            kind: LineKind::Comment,
            content,
            column,
            directive: None,
        },
        Indicator::Directive => {
            let text = format!("{indicator_char}{content}").trim().to_string();
            PhysicalLine {
                kind: LineKind::Directive,
                content,
                column,
                directive: Some(text),
            }
        }
        Indicator::Continuation => PhysicalLine {
            kind: LineKind::Continuation,
            content,
            column,
            directive: None,
        },
        Indicator::Debug if !debugging_lines => PhysicalLine {
            kind: LineKind::Comment,
            content,
            column,
            directive: None,
        },
        Indicator::Debug | Indicator::Normal => classify_code(content, column),
    }
}

/// Classify the code area of a non-continuation line.
fn classify_code(content: String, column: u32) -> PhysicalLine {
    let trimmed = content.trim_start();
    let kind = if trimmed.is_empty() {
        LineKind::Blank
    } else if trimmed.starts_with("*>") {
        LineKind::Comment
    } else if trimmed.starts_with(">>") {
        LineKind::Directive
    } else {
        LineKind::Code
    };
    let directive = (kind == LineKind::Directive).then(|| trimmed.trim_end().to_string());

    PhysicalLine {
        kind,
        content,
        column,
        directive,
    }
}

/// Expand tabs to the next multiple of [`TAB_WIDTH`].
fn expand_tabs(line: &str) -> String {
    if !line.contains('\t') {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + TAB_WIDTH);
    let mut col = 0;
    for ch in line.chars() {
        if ch == '\t' {
            let spaces = TAB_WIDTH - col % TAB_WIDTH;
            out.extend(std::iter::repeat(' ').take(spaces));
            col += spaces;
        } else {
            out.push(ch);
            col += 1;
        }
    }
    out
}

/// Cut a floating `*>` comment off `code` and report the literal state at
/// the end of what remains.
///
/// `open` is the quote character if `code` starts inside a literal.
fn strip_floating_comment(code: &str, mut open: Option<char>) -> (&str, Option<char>) {
    let mut chars = code.char_indices().peekable();
    while let Some((idx, ch)) = chars.next() {
        match open {
            Some(quote) if ch == quote => open = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => open = Some(ch),
            None if ch == '*' && matches!(chars.peek(), Some((_, '>'))) => {
                return (&code[..idx], None);
            }
            None => {}
        }
    }
    (code, open)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(n: &Normalized) -> Vec<&str> {
        n.lines.iter().map(|l| l.as_str()).collect()
    }

    #[test]
    fn test_fixed_strips_sequence_and_identification_areas() {
        let src = format!("000100 {:<65}HELLO001", "IDENTIFICATION DIVISION.");
        let n = normalize(&src, SourceFormat::Fixed, false);

        assert_eq!(texts(&n), vec!["IDENTIFICATION DIVISION."]);
        assert_eq!(n.lines[0].text.origin_at(0), Some(Origin::new(1, 8)));
        assert!(n.issues.is_empty());
    }

    #[test]
    fn test_variable_keeps_long_lines() {
        let long = format!("000100 MOVE A TO B{}X.", " ".repeat(70));
        let n = normalize(&long, SourceFormat::Variable, false);
        assert!(n.lines[0].as_str().ends_with("X."));

        let fixed = normalize(&long, SourceFormat::Fixed, false);
        assert_eq!(texts(&fixed), vec!["MOVE A TO B"]);
    }

    #[test]
    fn test_comment_and_blank_lines_dropped() {
        let src = "      * a comment\n\n      \n       DISPLAY 'HI'.\n      *> floating";
        let n = normalize(src, SourceFormat::Fixed, false);
        assert_eq!(texts(&n), vec!["DISPLAY 'HI'."]);
        assert_eq!(n.lines[0].first_line, 4);
    }

    #[test]
    fn test_directive_lines_forwarded() {
        let src = "      $SET ANS85\n      /\n       >>SOURCE FORMAT IS FIXED\n       MOVE 1 TO X.";
        let n = normalize(src, SourceFormat::Fixed, false);

        assert_eq!(texts(&n), vec!["MOVE 1 TO X."]);
        assert_eq!(
            n.directives,
            vec![
                CompilerDirective { line: 1, text: "$SET ANS85".to_string() },
                CompilerDirective { line: 2, text: "/".to_string() },
                CompilerDirective { line: 3, text: ">>SOURCE FORMAT IS FIXED".to_string() },
            ]
        );
    }

    #[test]
    fn test_debug_lines() {
        let src = "      D    DISPLAY 'DEBUG'.\n           DISPLAY 'RUN'.";
        let off = normalize(src, SourceFormat::Fixed, false);
        assert_eq!(texts(&off), vec!["    DISPLAY 'RUN'."]);

        let on = normalize(src, SourceFormat::Fixed, true);
        assert_eq!(texts(&on), vec!["    DISPLAY 'DEBUG'.", "    DISPLAY 'RUN'."]);
    }

    #[test]
    fn test_short_lines_never_fail() {
        let n = normalize("12\n123456\n1234567\n       X.", SourceFormat::Fixed, false);
        assert_eq!(texts(&n), vec!["X."]);
        assert!(n.issues.is_empty());
    }

    #[test]
    fn test_tabs_expand_before_slicing() {
        // A leading tab reaches column 9, inside the code area.
        let n = normalize("\tMOVE A TO B.", SourceFormat::Fixed, false);
        assert_eq!(texts(&n), vec![" MOVE A TO B."]);
        assert_eq!(n.lines[0].text.origin_at(1), Some(Origin::new(1, 9)));
    }

    #[test]
    fn test_word_continuation() {
        let src = "       MOVE WS-CUST\n      -    OMER-NAME TO X.";
        let n = normalize(src, SourceFormat::Fixed, false);

        assert_eq!(texts(&n), vec!["MOVE WS-CUSTOMER-NAME TO X."]);
        assert_eq!(n.lines[0].first_line, 1);
        assert_eq!(n.lines[0].last_line, 2);
        // "OMER" starts in column 12 of line 2.
        assert_eq!(n.lines[0].text.origin_at(12), Some(Origin::new(2, 12)));
    }

    #[test]
    fn test_literal_continuation_fixed() {
        let first = format!("       DISPLAY \"{}", "A".repeat(49));
        assert_eq!(first.chars().count(), 65);
        let src = format!("{first}\n      -    \"BCD\".");
        let n = normalize(&src, SourceFormat::Fixed, false);

        // Line 1 code area is 58 characters; the literal is padded to 65.
        let expected = format!("DISPLAY \"{}{}BCD\".", "A".repeat(49), " ".repeat(7));
        assert_eq!(texts(&n), vec![expected.as_str()]);
        assert!(n.issues.is_empty());
    }

    #[test]
    fn test_literal_continued_over_three_lines() {
        let first = format!("       DISPLAY \"{}", "A".repeat(56));
        assert_eq!(first.chars().count(), 72);
        let src = format!("{first}\n      -    \"BBB\n      -    \"CC\".");
        let n = normalize(&src, SourceFormat::Fixed, false);
        assert!(n.issues.is_empty());

        // The middle piece starts in column 13, so it pads to 60 characters.
        let expected = format!("DISPLAY \"{}BBB{}CC\".", "A".repeat(56), " ".repeat(57));
        assert_eq!(texts(&n), vec![expected.as_str()]);
        let literal = &expected["DISPLAY \"".len()..expected.len() - 2];
        assert_eq!(literal.len(), 118);
    }

    #[test]
    fn test_literal_continuation_variable_has_no_padding() {
        let src = "       DISPLAY 'ABC\n      -    'DEF'.";
        let n = normalize(src, SourceFormat::Variable, false);
        assert_eq!(texts(&n), vec!["DISPLAY 'ABCDEF'."]);
    }

    #[test]
    fn test_continuation_on_first_line_is_reported() {
        let n = normalize("      -    MOVE A TO B.", SourceFormat::Fixed, false);

        assert_eq!(n.issues.len(), 1);
        assert_eq!(n.issues[0].line, 1);
        assert_eq!(n.issues[0].column, 7);
        assert_eq!(texts(&n), vec!["    MOVE A TO B."]);
    }

    #[test]
    fn test_literal_continuation_without_quote_is_reported() {
        let src = "       DISPLAY 'ABC\n      -    DEF.";
        let n = normalize(src, SourceFormat::Variable, false);

        // The broken literal is reported once for the missing quote and once
        // for being left open.
        assert_eq!(n.issues.len(), 2);
        assert!(n.issues.iter().any(|i| i.detail.contains("quotation mark")));
        assert_eq!(texts(&n), vec!["DISPLAY 'ABC", "    DEF."]);
    }

    #[test]
    fn test_unterminated_literal_is_reported() {
        let n = normalize("       DISPLAY 'ABC\n       STOP RUN.", SourceFormat::Fixed, false);
        assert_eq!(n.issues.len(), 1);
        assert_eq!(n.issues[0].line, 1);
        assert_eq!(texts(&n), vec!["DISPLAY 'ABC", "STOP RUN."]);
    }

    #[test]
    fn test_continuation_skips_comment_lines() {
        let src = "       MOVE A\n      * note\n      -    B TO C.";
        let n = normalize(src, SourceFormat::Fixed, false);
        assert_eq!(texts(&n), vec!["MOVE AB TO C."]);
    }

    #[test]
    fn test_free_format() {
        let src = "*> header\nIDENTIFICATION DIVISION.\n  >>DEFINE X AS 1\n  DISPLAY \"*> kept\". *> dropped\n- not a continuation";
        let n = normalize(src, SourceFormat::Free, false);

        assert_eq!(
            texts(&n),
            vec![
                "IDENTIFICATION DIVISION.",
                "  DISPLAY \"*> kept\".",
                "- not a continuation",
            ]
        );
        assert_eq!(n.directives[0].text, ">>DEFINE X AS 1");
        assert_eq!(n.lines[0].text.origin_at(0), Some(Origin::new(2, 1)));
    }

    #[test]
    fn test_joined_maps_newlines() {
        let n = normalize("       A.\n      * c\n       B.", SourceFormat::Fixed, false);
        let joined = n.joined();

        assert_eq!(joined.text(), "A.\nB.");
        assert_eq!(joined.origin_at(2), Some(Origin::new(1, 10)));
        assert_eq!(joined.origin_at(3), Some(Origin::new(3, 8)));
    }

    #[test]
    fn test_indicator_from_char() {
        assert_eq!(Indicator::from_char('*'), Indicator::Comment);
        assert_eq!(Indicator::from_char('-'), Indicator::Continuation);
        assert_eq!(Indicator::from_char('/'), Indicator::Directive);
        assert_eq!(Indicator::from_char('$'), Indicator::Directive);
        assert_eq!(Indicator::from_char('d'), Indicator::Debug);
        assert_eq!(Indicator::from_char(' '), Indicator::Normal);
    }
}
