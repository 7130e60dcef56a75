//! Error types for the PDF engine

use std::io;
use thiserror::Error;

use crate::pdf::ObjectId;

/// Main error type for PDF engine operations
#[derive(Error, Debug)]
pub enum PdfError {
    /// The byte stream could not be understood as a PDF document
    #[error("Malformed PDF document: {0}")]
    MalformedDocument(String),

    /// Tokenizer or object grammar failure at a byte offset
    #[error("Parse error at offset {offset}: {message}")]
    Parse {
        offset: usize,
        message: String,
    },

    /// Indirect reference with no matching object
    #[error("Unresolved reference: {}", reference_label(.0))]
    UnresolvedReference(ObjectId),

    /// Page index outside `0..count`
    #[error("Page index {index} out of range (document has {count} pages)")]
    PageIndexOutOfRange {
        index: isize,
        count: usize,
    },

    /// Stream filter that this engine cannot decode
    #[error("Undecodable stream: {0}")]
    UndecodableStream(String),

    /// Font encoding that text extraction cannot map
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Invalid object type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        expected: &'static str,
        found: &'static str,
    },

    /// Missing required dictionary entry
    #[error("Missing required dictionary entry: {0}")]
    MissingDictionaryEntry(String),

    /// Dictionary value present but unusable
    #[error("Invalid dictionary value for key {key}: {message}")]
    InvalidDictionaryValue {
        key: String,
        message: String,
    },

    /// Decompression error
    #[error("Decompression error: {0}")]
    DecompressionError(String),

    /// Compression error
    #[error("Compression error: {0}")]
    CompressionError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

fn reference_label(id: &ObjectId) -> String {
    format!("{} {} R", id.0, id.1)
}

/// Result type for PDF engine operations
pub type PdfResult<T> = Result<T, PdfError>;

impl PdfError {
    /// Create a new malformed document error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedDocument(msg.into())
    }

    /// Create a new parse error at `offset`
    pub fn parse(offset: usize, msg: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: msg.into(),
        }
    }

    /// Create a new undecodable stream error
    pub fn undecodable(filter: impl Into<String>) -> Self {
        Self::UndecodableStream(filter.into())
    }

    /// Check if the caller may degrade gracefully instead of failing
    pub fn is_recoverable(&self) -> bool {
        matches!(self,
            Self::UndecodableStream(_) |
            Self::UnsupportedEncoding(_)
        )
    }

    /// Check if error is related to PDF structure
    pub fn is_structure_error(&self) -> bool {
        matches!(self,
            Self::MalformedDocument(_) |
            Self::Parse { .. } |
            Self::UnresolvedReference(_) |
            Self::InvalidObjectType { .. } |
            Self::MissingDictionaryEntry(_) |
            Self::InvalidDictionaryValue { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PdfError::malformed("Invalid header");
        assert!(matches!(err, PdfError::MalformedDocument(_)));

        let err = PdfError::parse(12, "unexpected token");
        assert!(matches!(err, PdfError::Parse { offset: 12, .. }));

        let err = PdfError::undecodable("DCTDecode");
        assert!(matches!(err, PdfError::UndecodableStream(_)));
    }

    #[test]
    fn test_error_categorization() {
        let err = PdfError::UndecodableStream("JBIG2Decode".to_string());
        assert!(err.is_recoverable());
        assert!(!err.is_structure_error());

        let err = PdfError::UnresolvedReference((7, 0));
        assert!(err.is_structure_error());
        assert!(!err.is_recoverable());

        let err = PdfError::PageIndexOutOfRange { index: -1, count: 3 };
        assert!(!err.is_structure_error());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = PdfError::UnresolvedReference((12, 0));
        assert_eq!(err.to_string(), "Unresolved reference: 12 0 R");

        let err = PdfError::PageIndexOutOfRange { index: 4, count: 4 };
        assert_eq!(
            err.to_string(),
            "Page index 4 out of range (document has 4 pages)"
        );

        let err = PdfError::InvalidObjectType {
            expected: "Dictionary",
            found: "Integer",
        };
        assert_eq!(
            err.to_string(),
            "Invalid object type: expected Dictionary, found Integer"
        );
    }

    #[test]
    fn test_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let pdf_err: PdfError = io_err.into();
        assert!(matches!(pdf_err, PdfError::IoError(_)));
    }
}
