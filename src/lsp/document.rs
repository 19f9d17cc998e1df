use ropey::{Rope, RopeSlice};

use thiserror::Error;
use tower_lsp::lsp_types::{Position, Range, TextDocumentContentChangeEvent, Url};

pub use crate::lsp::models::{LspDocument, LspDocumentState};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("version {version} not newer than {current}")]
    StaleVersion { version: i32, current: i32 },

    #[error("range {0:?} is outside the document")]
    InvalidRange(Range),
}

/// Converts an LSP position (UTF-16 code units) to a char index in the Rope.
///
/// A column past the end of its line is clamped to the end of the line's
/// content, before any line break; a line past the end of the document yields
/// `None`.
pub fn position_to_char(position: &Position, text: &Rope) -> Option<usize> {
    let line = position.line as usize;
    if line >= text.len_lines() {
        return None;
    }
    let line_start = text.line_to_char(line);
    let line_end = line_start + content_len(text.line(line));

    let start_cu = text.char_to_utf16_cu(line_start);
    let end_cu = text.char_to_utf16_cu(line_end);
    let target_cu = (start_cu + position.character as usize).min(end_cu);
    Some(text.utf16_cu_to_char(target_cu))
}

/// Length of `line` in chars, excluding a trailing `\n`, `\r\n` or `\r`.
fn content_len(line: RopeSlice) -> usize {
    let len = line.len_chars();
    let last = len.checked_sub(1).map(|i| line.char(i));
    let before_last = len.checked_sub(2).map(|i| line.char(i));
    match (before_last, last) {
        (Some('\r'), Some('\n')) => len - 2,
        (_, Some('\n' | '\r')) => len - 1,
        _ => len,
    }
}

/// Converts an LSP position to a byte offset in the Rope.
pub fn position_to_byte(position: &Position, text: &Rope) -> Option<usize> {
    position_to_char(position, text).map(|char| text.char_to_byte(char))
}

/// Converts a byte offset to an LSP position.
pub fn byte_to_position(byte: usize, text: &Rope) -> Option<Position> {
    if byte > text.len_bytes() {
        return None;
    }
    let char = text.byte_to_char(byte);
    let line = text.char_to_line(char);
    let column = text.char_to_utf16_cu(char) - text.char_to_utf16_cu(text.line_to_char(line));
    Some(Position {
        line: line as u32,
        character: column as u32,
    })
}

impl LspDocumentState {
    /// Applies a list of content changes in order. Returns the updated text if
    /// the version is newer, otherwise an error and the text is unchanged.
    pub fn apply(
        &mut self,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: i32,
    ) -> Result<String, DocumentError> {
        if version <= self.version {
            return Err(DocumentError::StaleVersion {
                version,
                current: self.version,
            });
        }

        let mut text = self.text.clone();
        for change in &changes {
            if let Some(range) = change.range {
                let (Some(start), Some(end)) = (
                    position_to_char(&range.start, &text),
                    position_to_char(&range.end, &text),
                ) else {
                    return Err(DocumentError::InvalidRange(range));
                };
                if start > end {
                    return Err(DocumentError::InvalidRange(range));
                }
                text.remove(start..end);
                text.insert(start, &change.text);
            } else {
                text = Rope::from_str(&change.text);
            }
        }

        self.text = text;
        self.version = version;
        Ok(self.text.to_string())
    }
}

impl LspDocument {
    pub fn new(id: u32, uri: Url, language_id: String, text: &str, version: i32) -> Self {
        Self {
            id,
            state: tokio::sync::RwLock::new(LspDocumentState {
                uri,
                language_id,
                text: Rope::from_str(text),
                version,
            }),
        }
    }

    pub async fn language_id(&self) -> String {
        self.state.read().await.language_id.clone()
    }

    /// Returns the current text of the document as a string.
    pub async fn text(&self) -> String {
        self.state.read().await.text.to_string()
    }

    /// A copy of the current text. Ropes share structure, so this is cheap.
    pub async fn snapshot(&self) -> Rope {
        self.state.read().await.text.clone()
    }

    /// Returns the current version of the document.
    pub async fn version(&self) -> i32 {
        self.state.read().await.version
    }

    /// Applies changes to the document.
    pub async fn apply(
        &self,
        changes: Vec<TextDocumentContentChangeEvent>,
        version: i32,
    ) -> Result<String, DocumentError> {
        let mut state = self.state.write().await;
        state.apply(changes, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn create_test_document(text: &str) -> Arc<LspDocument> {
        Arc::new(LspDocument::new(
            1,
            Url::parse("file:///w/index.html").unwrap(),
            "html".to_string(),
            text,
            0,
        ))
    }

    fn change(
        range: Option<((u32, u32), (u32, u32))>,
        text: &str,
    ) -> TextDocumentContentChangeEvent {
        TextDocumentContentChangeEvent {
            range: range.map(|((sl, sc), (el, ec))| Range {
                start: Position { line: sl, character: sc },
                end: Position { line: el, character: ec },
            }),
            range_length: None,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_apply_full_change() {
        let doc = create_test_document("initial text");
        let result = doc.apply(vec![change(None, "new text")], 1).await;
        assert_eq!(result.as_deref(), Ok("new text"));
        assert_eq!(doc.version().await, 1);
    }

    #[tokio::test]
    async fn test_apply_multiple_incremental() {
        let doc = create_test_document("hello world");
        let changes = vec![
            change(Some(((0, 6), (0, 11))), "rust"),
            change(Some(((0, 0), (0, 5))), "hi"),
        ];
        let result = doc.apply(changes, 1).await;
        assert_eq!(result.as_deref(), Ok("hi rust"));
    }

    #[tokio::test]
    async fn test_apply_outdated_version() {
        let doc = create_test_document("initial text");
        doc.apply(vec![change(None, "new text")], 1).await.unwrap();
        let result = doc.apply(vec![change(None, "stale")], 1).await;
        assert_eq!(
            result,
            Err(DocumentError::StaleVersion {
                version: 1,
                current: 1
            })
        );
        assert_eq!(doc.text().await, "new text");
    }

    #[tokio::test]
    async fn test_apply_invalid_range_leaves_text() {
        let doc = create_test_document("one line");
        let result = doc.apply(vec![change(Some(((5, 0), (5, 1))), "x")], 1).await;
        assert!(matches!(result, Err(DocumentError::InvalidRange(_))));
        assert_eq!(doc.text().await, "one line");
        assert_eq!(doc.version().await, 0);
    }

    #[test]
    fn test_utf16_positions() {
        // '😀' is two UTF-16 code units and four bytes.
        let text = Rope::from_str("a😀b\nc");
        let b = Position { line: 0, character: 3 };
        assert_eq!(position_to_byte(&b, &text), Some(5));
        assert_eq!(byte_to_position(5, &text), Some(b));

        let c = Position { line: 1, character: 0 };
        assert_eq!(position_to_byte(&c, &text), Some(7));
        assert_eq!(byte_to_position(7, &text), Some(c));
        assert_eq!(byte_to_position(99, &text), None);
    }

    #[test]
    fn test_column_clamped_to_line() {
        let text = Rope::from_str("ab\ncd");
        let past_end = Position { line: 1, character: 40 };
        assert_eq!(position_to_byte(&past_end, &text), Some(5));
        assert_eq!(position_to_byte(&Position { line: 2, character: 0 }, &text), None);
    }

    #[test]
    fn test_column_clamped_before_line_break() {
        let text = Rope::from_str("ab\ncd");
        assert_eq!(position_to_byte(&Position { line: 0, character: 40 }, &text), Some(2));

        let crlf = Rope::from_str("ab\r\ncd");
        assert_eq!(position_to_byte(&Position { line: 0, character: 3 }, &crlf), Some(2));
        assert_eq!(position_to_byte(&Position { line: 1, character: 0 }, &crlf), Some(4));
    }

    #[tokio::test]
    async fn test_edit_past_line_end_keeps_newline() {
        let doc = create_test_document("ab\ncd");
        let result = doc.apply(vec![change(Some(((0, 2), (0, 9))), "X")], 1).await;
        assert_eq!(result.as_deref(), Ok("abX\ncd"));
    }
}
