//! Reference [`TextExtractor`] for documents that are already plain text.

use super::TextExtractor;
use crate::errors::SummaryError;

/// Page separator used by `pdftotext` and friends.
const FORM_FEED: char = '\u{000C}';

/// Treats the document as UTF-8 text, one page per form-feed-separated chunk.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<Vec<String>, SummaryError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| SummaryError::Extraction(format!("document is not valid UTF-8: {e}")))?;

        Ok(text
            .split(FORM_FEED)
            .map(str::trim)
            .filter(|page| !page.is_empty())
            .map(str::to_string)
            .collect())
    }
}
