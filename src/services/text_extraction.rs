use std::path::Path;

const PLAIN_TEXT_EXTENSIONS: &[&str] = &["txt", "md", "csv", "json", "log"];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("File is not valid UTF-8 text")]
    InvalidEncoding,
    #[error("No text could be extracted from the file")]
    Empty,
}

/// Turns an uploaded document into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, ExtractionError>;
}

/// Handles text-like formats by decoding them as UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, ExtractionError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        if !PLAIN_TEXT_EXTENSIONS.contains(&extension.as_str()) {
            return Err(ExtractionError::UnsupportedFormat(extension));
        }

        let text = std::str::from_utf8(bytes).map_err(|_| ExtractionError::InvalidEncoding)?;
        let text = text.trim_start_matches('\u{feff}').trim();
        if text.is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(text.to_string())
    }
}
