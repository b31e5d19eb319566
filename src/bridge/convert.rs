//! Coordinate and text conversion at the protocol boundary
//!
//! The engine wire protocol is 1-based line/offset; LSP is 0-based
//! line/character (UTF-16 code units). Every crossing goes through this
//! module so neither convention leaks into the correlator, session, or
//! diagnostics internals.

use crate::engine::types::{WireLocation, WireSpan};
use tower_lsp::lsp_types::{Position, Range, TextEdit};

/// Convert an LSP position to the engine's 1-based form
pub fn to_wire_location(position: Position) -> WireLocation {
    WireLocation {
        line: position.line + 1,
        offset: position.character + 1,
    }
}

/// Convert an engine location to LSP's 0-based form
pub fn from_wire_location(location: WireLocation) -> Position {
    Position {
        line: location.line.saturating_sub(1),
        character: location.offset.saturating_sub(1),
    }
}

/// Convert an LSP range to a wire span
pub fn to_wire_span(range: Range) -> WireSpan {
    WireSpan {
        start: to_wire_location(range.start),
        end: to_wire_location(range.end),
    }
}

/// Convert a wire span to an LSP range
pub fn from_wire_span(span: WireSpan) -> Range {
    Range {
        start: from_wire_location(span.start),
        end: from_wire_location(span.end),
    }
}

/// Byte offset of an LSP position within `text`
///
/// Character counts are UTF-16 code units per the LSP spec. Out-of-range
/// positions clamp to the nearest valid boundary (line end / text end);
/// clients occasionally send a character one past the line after racing
/// edits, and clamping matches how rope-backed servers behave.
pub fn position_to_offset(text: &str, position: Position) -> usize {
    let mut offset = 0usize;
    let mut lines = text.split_inclusive('\n');

    for _ in 0..position.line {
        match lines.next() {
            Some(line) => offset += line.len(),
            None => return text.len(),
        }
    }

    let line = lines.next().unwrap_or("");
    let line_content = line.strip_suffix('\n').unwrap_or(line);
    let line_content = line_content.strip_suffix('\r').unwrap_or(line_content);

    let mut units = 0u32;
    for (byte_idx, ch) in line_content.char_indices() {
        if units >= position.character {
            return offset + byte_idx;
        }
        units += ch.len_utf16() as u32;
    }

    offset + line_content.len()
}

/// Position just past the final character of `text`
pub fn document_end_position(text: &str) -> Position {
    let mut line = 0u32;
    let mut last_line_start = 0usize;
    for (idx, ch) in text.char_indices() {
        if ch == '\n' {
            line += 1;
            last_line_start = idx + 1;
        }
    }
    let character = text[last_line_start..]
        .chars()
        .map(|c| c.len_utf16() as u32)
        .sum();
    Position { line, character }
}

/// Range covering the entire document
pub fn full_document_range(text: &str) -> Range {
    Range {
        start: Position::new(0, 0),
        end: document_end_position(text),
    }
}

/// Apply one LSP content change to `text` in place
///
/// `range: None` means whole-document replacement.
pub fn apply_content_change(text: &mut String, range: Option<Range>, new_text: &str) {
    match range {
        Some(range) => {
            let start = position_to_offset(text, range.start);
            let end = position_to_offset(text, range.end).max(start);
            text.replace_range(start..end, new_text);
        }
        None => {
            *text = new_text.to_string();
        }
    }
}

/// Apply a batch of non-overlapping edits expressed against `text`
///
/// Edits may arrive in any order; they are sorted ascending by start and
/// applied front to back, so earlier edits never invalidate the offsets of
/// later ones. Overlapping edits are an engine contract violation; if one
/// slips through, the later edit's start clamps to the previous edit's end.
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> String {
    let mut indexed: Vec<(usize, usize, &str)> = edits
        .iter()
        .map(|edit| {
            let start = position_to_offset(text, edit.range.start);
            let end = position_to_offset(text, edit.range.end).max(start);
            (start, end, edit.new_text.as_str())
        })
        .collect();
    indexed.sort_by_key(|(start, end, _)| (*start, *end));

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for (start, end, new_text) in indexed {
        let start = start.max(cursor);
        let end = end.max(start);
        result.push_str(&text[cursor..start]);
        result.push_str(new_text);
        cursor = end;
    }
    result.push_str(&text[cursor..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(line: u32, character: u32) -> Position {
        Position { line, character }
    }

    fn edit(start: (u32, u32), end: (u32, u32), new_text: &str) -> TextEdit {
        TextEdit {
            range: Range {
                start: pos(start.0, start.1),
                end: pos(end.0, end.1),
            },
            new_text: new_text.to_string(),
        }
    }

    #[test]
    fn test_wire_location_round_trip() {
        for (line, character) in [(0, 0), (0, 17), (41, 0), (1000, 2000)] {
            let original = pos(line, character);
            let there_and_back = from_wire_location(to_wire_location(original));
            assert_eq!(there_and_back, original);
        }
    }

    #[test]
    fn test_wire_location_is_one_based() {
        let wire = to_wire_location(pos(0, 0));
        assert_eq!(wire.line, 1);
        assert_eq!(wire.offset, 1);
    }

    #[test]
    fn test_zero_wire_location_clamps() {
        // Defensive: a malformed 0-based wire value must not underflow
        let position = from_wire_location(WireLocation { line: 0, offset: 0 });
        assert_eq!(position, pos(0, 0));
    }

    #[test]
    fn test_position_to_offset_multiline() {
        let text = "let a = 1;\nlet b = 2;\n";
        assert_eq!(position_to_offset(text, pos(0, 0)), 0);
        assert_eq!(position_to_offset(text, pos(0, 4)), 4);
        assert_eq!(position_to_offset(text, pos(1, 0)), 11);
        assert_eq!(position_to_offset(text, pos(1, 10)), 21);
    }

    #[test]
    fn test_position_to_offset_utf16() {
        // '𝕏' is one astral char: 4 bytes, 2 UTF-16 units
        let text = "a𝕏b";
        assert_eq!(position_to_offset(text, pos(0, 1)), 1);
        assert_eq!(position_to_offset(text, pos(0, 3)), 5);
        assert_eq!(position_to_offset(text, pos(0, 4)), 6);
    }

    #[test]
    fn test_position_to_offset_clamps_past_line_end() {
        let text = "ab\ncd";
        assert_eq!(position_to_offset(text, pos(0, 99)), 2);
        assert_eq!(position_to_offset(text, pos(9, 0)), text.len());
    }

    #[test]
    fn test_position_to_offset_crlf() {
        let text = "ab\r\ncd";
        assert_eq!(position_to_offset(text, pos(0, 99)), 2);
        assert_eq!(position_to_offset(text, pos(1, 1)), 5);
    }

    #[test]
    fn test_document_end_position() {
        assert_eq!(document_end_position(""), pos(0, 0));
        assert_eq!(document_end_position("abc"), pos(0, 3));
        assert_eq!(document_end_position("abc\n"), pos(1, 0));
        assert_eq!(document_end_position("abc\ndef"), pos(1, 3));
    }

    #[test]
    fn test_apply_content_change_range() {
        let mut text = "let a = 1;".to_string();
        apply_content_change(
            &mut text,
            Some(Range {
                start: pos(0, 4),
                end: pos(0, 5),
            }),
            "value",
        );
        assert_eq!(text, "let value = 1;");
    }

    #[test]
    fn test_apply_content_change_full_replacement() {
        let mut text = "old".to_string();
        apply_content_change(&mut text, None, "brand new");
        assert_eq!(text, "brand new");
    }

    #[test]
    fn test_apply_edits_out_of_issuance_order() {
        let text = "aaa bbb ccc";
        let edits = vec![
            edit((0, 8), (0, 11), "C"),
            edit((0, 0), (0, 3), "A"),
            edit((0, 4), (0, 7), "B"),
        ];
        assert_eq!(apply_edits(text, &edits), "A B C");
    }

    #[test]
    fn test_apply_edits_formatting_example() {
        let text = "export  function foo (     )   :  void   {   }";
        let edits = vec![
            edit((0, 32), (0, 34), " "),
            edit((0, 6), (0, 8), " "),
            edit((0, 42), (0, 45), " "),
            edit((0, 20), (0, 21), ""),
            edit((0, 38), (0, 41), " "),
            edit((0, 22), (0, 27), ""),
            edit((0, 28), (0, 31), ""),
        ];
        assert_eq!(apply_edits(text, &edits), "export function foo(): void { }");
    }

    #[test]
    fn test_apply_edits_empty() {
        assert_eq!(apply_edits("unchanged", &[]), "unchanged");
    }
}
