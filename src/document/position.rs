// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Offset to LSP position mapping.
//!
//! Offsets are UTF-8 byte offsets into the document text. Positions are
//! zero-based `(line, character)` pairs where `character` counts UTF-16 code
//! units from the start of the line, which is the default LSP position
//! encoding. Lines end at `\n`, `\r\n` or a lone `\r`.

use lsp_types::{Position, Range};
use thiserror::Error;

/// Errors produced when an offset or position does not address the text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PositionError {
    /// The offset lies past the end of the text.
    #[error("offset {offset} is past the end of the text (length {len})")]
    OutOfBounds {
        /// Requested offset.
        offset: usize,
        /// Text length in bytes.
        len: usize,
    },
    /// The offset splits a multi-byte character.
    #[error("offset {0} is not on a character boundary")]
    NotCharBoundary(usize),
    /// The line number is past the last line.
    #[error("line {line} is out of range (text has {lines} lines)")]
    LineOutOfRange {
        /// Requested line.
        line: u32,
        /// Number of lines in the text.
        lines: usize,
    },
    /// The character lands between the two halves of a surrogate pair.
    #[error("character {character} on line {line} splits a surrogate pair")]
    InsideSurrogatePair {
        /// Requested line.
        line: u32,
        /// Requested UTF-16 character.
        character: u32,
    },
}

/// Line table for one immutable text snapshot.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    /// Byte offset of the first character of every line. Always starts with 0.
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    /// Builds the line table for `text`.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        let bytes = text.as_bytes();
        let mut line_starts = vec![0];
        let mut i = 0;

        while i < bytes.len() {
            match bytes[i] {
                b'\n' => line_starts.push(i + 1),
                b'\r' if bytes.get(i + 1) == Some(&b'\n') => {
                    line_starts.push(i + 2);
                    i += 1;
                }
                b'\r' => line_starts.push(i + 1),
                _ => {}
            }
            i += 1;
        }

        Self { text, line_starts }
    }

    /// Number of lines, counting a final empty line after a trailing terminator.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Maps a byte offset to a position.
    ///
    /// `offset == text.len()` is valid and maps to the end of the last line.
    /// The offset between the `\r` and `\n` of a CRLF pair maps to the end of
    /// the line's content, like the `\r` itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the offset is past the end or splits a character.
    pub fn position(&self, offset: usize) -> Result<Position, PositionError> {
        if offset > self.text.len() {
            return Err(PositionError::OutOfBounds {
                offset,
                len: self.text.len(),
            });
        }
        if !self.text.is_char_boundary(offset) {
            return Err(PositionError::NotCharBoundary(offset));
        }

        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let (start, content_end) = self.line_content(line);
        let character = self.text[start..offset.min(content_end)]
            .encode_utf16()
            .count();

        Ok(Position::new(to_u32(line), to_u32(character)))
    }

    /// Maps a position back to a byte offset.
    ///
    /// A character past the end of the line clamps to the end of the line's
    /// content, before its terminator.
    ///
    /// # Errors
    ///
    /// Returns an error if the line does not exist or the character falls
    /// inside a surrogate pair.
    pub fn offset(&self, position: Position) -> Result<usize, PositionError> {
        let line = position.line as usize;
        if line >= self.line_count() {
            return Err(PositionError::LineOutOfRange {
                line: position.line,
                lines: self.line_count(),
            });
        }
        let (start, content_end) = self.line_content(line);

        let wanted = position.character as usize;
        let mut units = 0;
        for (idx, ch) in self.text[start..content_end].char_indices() {
            if units == wanted {
                return Ok(start + idx);
            }
            units += ch.len_utf16();
            if units > wanted {
                return Err(PositionError::InsideSurrogatePair {
                    line: position.line,
                    character: position.character,
                });
            }
        }

        Ok(content_end)
    }

    /// Byte offsets of the start of `line` and the end of its content.
    fn line_content(&self, line: usize) -> (usize, usize) {
        let start = self.line_starts[line];
        let end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(self.text.len());
        (start, start + content_len(&self.text[start..end]))
    }

    /// Maps a byte span to a range.
    ///
    /// # Errors
    ///
    /// Returns an error if either end does not address the text.
    pub fn range(&self, start: usize, end: usize) -> Result<Range, PositionError> {
        Ok(Range::new(self.position(start)?, self.position(end)?))
    }
}

/// Length of a line slice without its terminator.
fn content_len(line: &str) -> usize {
    line.strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .or_else(|| line.strip_suffix('\r'))
        .unwrap_or(line)
        .len()
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests use unwrap for clear failure messages"
)]
mod tests {
    use super::*;

    fn pos(line: u32, character: u32) -> Position {
        Position::new(line, character)
    }

    #[test]
    fn test_single_line() {
        let index = LineIndex::new("foo badword1 bar");
        assert_eq!(index.line_count(), 1);
        assert_eq!(index.position(4).unwrap(), pos(0, 4));
        assert_eq!(index.position(12).unwrap(), pos(0, 12));
    }

    #[test]
    fn test_second_line_is_not_line_zero() {
        let text = "foo badword1 bar\nbadword2 baz";
        let index = LineIndex::new(text);
        let start = text.find("badword2").unwrap();

        assert_eq!(index.position(start).unwrap(), pos(1, 0));
        assert_eq!(index.position(start + 8).unwrap(), pos(1, 8));
    }

    #[test]
    fn test_all_terminators() {
        let text = "a\nb\r\nc\rd";
        let index = LineIndex::new(text);
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.position(text.find('b').unwrap()).unwrap(), pos(1, 0));
        assert_eq!(index.position(text.find('c').unwrap()).unwrap(), pos(2, 0));
        assert_eq!(index.position(text.find('d').unwrap()).unwrap(), pos(3, 0));
    }

    #[test]
    fn test_end_of_text_is_valid() {
        let index = LineIndex::new("abc");
        assert_eq!(index.position(3).unwrap(), pos(0, 3));

        let index = LineIndex::new("abc\n");
        assert_eq!(index.line_count(), 2);
        assert_eq!(index.position(4).unwrap(), pos(1, 0));

        let index = LineIndex::new("");
        assert_eq!(index.position(0).unwrap(), pos(0, 0));
    }

    #[test]
    fn test_utf16_columns() {
        // 'é' is 2 bytes / 1 unit, '😀' is 4 bytes / 2 units
        let text = "é😀x";
        let index = LineIndex::new(text);
        assert_eq!(index.position(2).unwrap(), pos(0, 1));
        assert_eq!(index.position(6).unwrap(), pos(0, 3));
        assert_eq!(index.position(7).unwrap(), pos(0, 4));
    }

    #[test]
    fn test_offset_errors() {
        let index = LineIndex::new("😀");
        assert_eq!(
            index.position(5),
            Err(PositionError::OutOfBounds { offset: 5, len: 4 })
        );
        assert_eq!(index.position(1), Err(PositionError::NotCharBoundary(1)));
        assert_eq!(
            index.offset(pos(0, 1)),
            Err(PositionError::InsideSurrogatePair {
                line: 0,
                character: 1
            })
        );
        assert_eq!(
            index.offset(pos(3, 0)),
            Err(PositionError::LineOutOfRange { line: 3, lines: 1 })
        );
    }

    #[test]
    fn test_reverse_clamps_to_line_content() {
        let index = LineIndex::new("ab\r\ncd");
        assert_eq!(index.offset(pos(0, 99)).unwrap(), 2);
        assert_eq!(index.offset(pos(1, 99)).unwrap(), 6);
    }

    #[test]
    fn test_one_past_content_stops_before_terminator() {
        let index = LineIndex::new("ab\r\ncd");
        assert_eq!(index.offset(pos(0, 3)).unwrap(), 2);
        assert_eq!(index.offset(pos(0, 4)).unwrap(), 2);

        let index = LineIndex::new("ab\ncd");
        assert_eq!(index.offset(pos(0, 3)).unwrap(), 2);

        let index = LineIndex::new("ab\rcd");
        assert_eq!(index.offset(pos(0, 3)).unwrap(), 2);
    }

    #[test]
    fn test_inside_crlf_maps_to_line_end() {
        let index = LineIndex::new("ab\r\ncd");
        assert_eq!(index.position(2).unwrap(), pos(0, 2));
        assert_eq!(index.position(3).unwrap(), pos(0, 2));
        assert_eq!(index.position(4).unwrap(), pos(1, 0));
    }

    #[test]
    fn test_round_trip_every_boundary() {
        let samples = [
            "",
            "plain ascii",
            "foo badword1 bar\nbadword2 baz",
            "trailing\n",
            "crlf\r\nlines\r\n\r\nend",
            "lone\rcarriage\r",
            "𝄞 clef\n😀😀\r\né\n",
            "\n\n\n",
        ];

        for text in samples {
            let index = LineIndex::new(text);
            // The gap between \r and \n has no position of its own
            let inside_crlf =
                |o: usize| o > 0 && text[..o].ends_with('\r') && text[o..].starts_with('\n');
            for offset in (0..=text.len()).filter(|&o| text.is_char_boundary(o) && !inside_crlf(o)) {
                let position = index.position(offset).unwrap();
                assert_eq!(
                    index.offset(position).unwrap(),
                    offset,
                    "round trip failed for {text:?} at {offset} ({position:?})"
                );
            }
        }
    }
}
