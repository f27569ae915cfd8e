//! Mapping absolute document positions to line numbers.
//!
//! Positions are measured in UTF-16 code units, the unit the editor surface
//! reports chunk offsets in. Rust strings are UTF-8, so every length used
//! for the running totals below goes through [`utf16_len`]; byte offsets are
//! only used to slice line text back out of the document.
//!
//! ## Boundary policy
//!
//! The canonical lookup is [`line_at`]: walking the lines in order, a
//! position belongs to the first line whose running total (line length plus
//! line-ending length, summed over all lines so far) is strictly greater
//! than the position. A position equal to a running total, just past a line
//! ending, therefore belongs to the *next* line. Positions past the end of
//! the document clamp to the last line.
//!
//! [`find_line_index`] is the zero-based view of the same policy that reports
//! out-of-range positions as `None` instead of clamping. [`LineIndex`]
//! precomputes the running totals once for callers issuing many lookups
//! against one document, and agrees with [`line_at`] on every position.

use crate::error::{Error, Result};
use mlua::prelude::*;
use std::ops::Range;

/// Length of `text` in UTF-16 code units.
#[inline]
#[must_use]
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// The delimiter used to split a document into lines.
///
/// Never empty. Caches its own UTF-16 length since it is added once per
/// line on every lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEnding {
    text: String,
    units: usize,
}

impl LineEnding {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(Error::EmptyLineEnding);
        }
        let units = utf16_len(&text);
        Ok(Self { text, units })
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[inline]
    #[must_use]
    pub fn utf16_len(&self) -> usize {
        self.units
    }
}

impl Default for LineEnding {
    fn default() -> Self {
        Self {
            text: "\n".to_string(),
            units: 1,
        }
    }
}

impl FromLua for LineEnding {
    fn from_lua(value: LuaValue, lua: &Lua) -> LuaResult<Self> {
        Ok(Self::new(String::from_lua(value, lua)?)?)
    }
}

/// A single line of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// 1-based line number.
    pub number: usize,

    /// The line's text, without its line ending.
    pub text: &'a str,
}

/// Returns the line containing `position`.
///
/// Positions past the end of the document clamp to the last line. Runs in
/// O(n) over the document; use [`LineIndex`] for repeated lookups.
#[must_use]
pub fn line_at<'a>(text: &'a str, position: usize, ending: &LineEnding) -> Line<'a> {
    let mut total = 0;
    let mut line = Line { number: 1, text: "" };

    for (i, piece) in text.split(ending.as_str()).enumerate() {
        total += utf16_len(piece) + ending.utf16_len();
        line = Line {
            number: i + 1,
            text: piece,
        };
        if position < total {
            return line;
        }
    }

    line
}

/// Returns the zero-based index of the line containing `position`, or
/// `None` when `position` lies past the end of the document.
///
/// For any `position <= utf16_len(text)` this is `line_at(..).number - 1`.
#[must_use]
pub fn find_line_index(text: &str, position: usize, ending: &LineEnding) -> Option<usize> {
    if position > utf16_len(text) {
        return None;
    }

    let mut total = 0;
    for (i, piece) in text.split(ending.as_str()).enumerate() {
        total += utf16_len(piece) + ending.utf16_len();
        if total > position {
            return Some(i);
        }
    }

    None
}

/// Running line totals for one document, computed once.
///
/// Lookups are a binary search over the totals and return exactly what
/// [`line_at`] would.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    len: usize,
    /// Running UTF-16 total at the end of each line, line ending included.
    ends: Vec<usize>,
    /// Byte span of each line's text within `text`.
    spans: Vec<Range<usize>>,
}

impl<'a> LineIndex<'a> {
    #[must_use]
    pub fn new(text: &'a str, ending: &LineEnding) -> Self {
        let mut ends = Vec::new();
        let mut spans = Vec::new();
        let mut total = 0;
        let mut byte = 0;
        let mut len = 0;

        for piece in text.split(ending.as_str()) {
            let units = utf16_len(piece);
            len += units;
            total += units + ending.utf16_len();
            ends.push(total);
            spans.push(byte..byte + piece.len());
            byte += piece.len() + ending.as_str().len();
        }
        // Every line but the last is followed by an ending.
        len += ending.utf16_len() * (ends.len() - 1);

        Self {
            text,
            len,
            ends,
            spans,
        }
    }

    /// Document length in UTF-16 code units.
    #[inline]
    #[must_use]
    pub fn utf16_len(&self) -> usize {
        self.len
    }

    /// Number of lines; an empty document has one (empty) line.
    #[inline]
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.ends.len()
    }

    #[must_use]
    pub fn line_at(&self, position: usize) -> Line<'a> {
        let idx = self
            .ends
            .partition_point(|&end| end <= position)
            .min(self.ends.len() - 1);

        Line {
            number: idx + 1,
            text: &self.text[self.spans[idx].clone()],
        }
    }
}

impl IntoLua for Line<'_> {
    fn into_lua(self, lua: &Lua) -> LuaResult<LuaValue> {
        let table = lua.create_table()?;
        table.set("number", self.number)?;
        table.set("text", self.text)?;
        Ok(LuaValue::Table(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "line1\nline2\nline3";

    fn lf() -> LineEnding {
        LineEnding::default()
    }

    #[test]
    fn first_line_at_start() {
        let line = line_at(DOC, 0, &lf());
        assert_eq!(line.number, 1);
        assert_eq!(line.text, "line1");
    }

    #[test]
    fn position_on_line_ending_stays_on_line() {
        // Offset 5 is the '\n' after "line1".
        assert_eq!(line_at(DOC, 5, &lf()).number, 1);
    }

    #[test]
    fn position_after_line_ending_is_next_line() {
        let line = line_at(DOC, 6, &lf());
        assert_eq!(line.number, 2);
        assert_eq!(line.text, "line2");
    }

    #[test]
    fn end_of_document_is_last_line() {
        let line = line_at(DOC, DOC.len(), &lf());
        assert_eq!(line.number, 3);
        assert_eq!(line.text, "line3");
    }

    #[test]
    fn past_end_clamps_to_last_line() {
        let far = line_at(DOC, 10_000, &lf());
        let end = line_at(DOC, utf16_len(DOC), &lf());
        assert_eq!(far, end);
        assert_eq!(far.number, 3);
    }

    #[test]
    fn empty_document_has_one_line() {
        let line = line_at("", 0, &lf());
        assert_eq!(line.number, 1);
        assert_eq!(line.text, "");
        assert_eq!(line_at("", 42, &lf()).number, 1);
    }

    #[test]
    fn trailing_newline_adds_empty_line() {
        let line = line_at("a\n", 2, &lf());
        assert_eq!(line.number, 2);
        assert_eq!(line.text, "");
    }

    #[test]
    fn crlf_ending_counts_two_units() {
        let crlf = LineEnding::new("\r\n").unwrap();
        let doc = "ab\r\ncd";
        assert_eq!(line_at(doc, 3, &crlf).number, 1);
        let line = line_at(doc, 4, &crlf);
        assert_eq!(line.number, 2);
        assert_eq!(line.text, "cd");
    }

    #[test]
    fn positions_are_utf16_units() {
        // The emoji is one char, four UTF-8 bytes, two UTF-16 units.
        let doc = "😀\nx";
        assert_eq!(utf16_len(doc), 4);
        assert_eq!(line_at(doc, 2, &lf()).number, 1);
        let line = line_at(doc, 3, &lf());
        assert_eq!(line.number, 2);
        assert_eq!(line.text, "x");
    }

    #[test]
    fn empty_line_ending_rejected() {
        assert!(matches!(LineEnding::new(""), Err(Error::EmptyLineEnding)));
    }

    #[test]
    fn find_line_index_is_zero_based() {
        assert_eq!(find_line_index(DOC, 0, &lf()), Some(0));
        assert_eq!(find_line_index(DOC, 6, &lf()), Some(1));
        assert_eq!(find_line_index(DOC, DOC.len(), &lf()), Some(2));
    }

    #[test]
    fn find_line_index_past_end_is_none() {
        assert_eq!(find_line_index(DOC, DOC.len() + 1, &lf()), None);
        let crlf = LineEnding::new("\r\n").unwrap();
        assert_eq!(find_line_index("ab\r\ncd", 7, &crlf), None);
    }

    #[test]
    fn find_line_index_agrees_with_line_at() {
        for pos in 0..=utf16_len(DOC) {
            assert_eq!(
                find_line_index(DOC, pos, &lf()).map(|i| i + 1),
                Some(line_at(DOC, pos, &lf()).number),
                "position {pos}"
            );
        }
    }

    #[test]
    fn index_agrees_with_line_at() {
        let crlf = LineEnding::new("\r\n").unwrap();
        let cases = [
            (DOC, lf()),
            ("", lf()),
            ("\n\n", lf()),
            ("a\n", lf()),
            ("😀\nxé\n\nz", lf()),
            ("one\r\ntwo\r\n\r\nfour", crlf),
        ];

        for (doc, ending) in &cases {
            let index = LineIndex::new(doc, ending);
            assert_eq!(index.utf16_len(), utf16_len(doc));
            for pos in 0..utf16_len(doc) + 4 {
                assert_eq!(
                    index.line_at(pos),
                    line_at(doc, pos, ending),
                    "doc {doc:?} position {pos}"
                );
            }
        }
    }

    #[test]
    fn index_counts_lines() {
        assert_eq!(LineIndex::new(DOC, &lf()).line_count(), 3);
        assert_eq!(LineIndex::new("", &lf()).line_count(), 1);
        assert_eq!(LineIndex::new("x\n", &lf()).line_count(), 2);
    }
}
