//! Error types for the PDF rasterization bridge

use thiserror::Error;

/// Result type alias for the bridge
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the bridge.
///
/// These never cross the [`PdfBridge`](crate::PdfBridge) boundary: the facade
/// logs them and degrades to an empty result.
#[derive(Error, Debug)]
pub enum Error {
    /// PDF file not found
    #[error("PDF not found: {path}")]
    PdfNotFound { path: String },

    /// Invalid PDF data
    #[error("Invalid PDF data: {reason}")]
    InvalidPdf { reason: String },

    /// Source could not be interpreted (bad URL, unsupported scheme)
    #[error("Invalid source: {reason}")]
    InvalidSource { reason: String },

    /// PDFium error
    #[error("PDFium error: {reason}")]
    Pdfium { reason: String },

    /// Re-saving at an older PDF version failed
    #[error("Version downgrade failed: {reason}")]
    DowngradeFailed { reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Base64 decode error
    #[error("Invalid base64 data: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Bitmap encoding error
    #[error("Image encoding failed: {reason}")]
    ImageEncode { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::PdfNotFound {
            path: "/tmp/missing.pdf".to_string(),
        };
        assert_eq!(err.to_string(), "PDF not found: /tmp/missing.pdf");
    }

    #[test]
    fn test_source_errors_convert() {
        use base64::Engine;

        fn read(path: &str) -> Result<Vec<u8>> {
            Ok(std::fs::read(path)?)
        }
        fn decode(text: &str) -> Result<Vec<u8>> {
            Ok(base64::engine::general_purpose::STANDARD.decode(text)?)
        }

        assert!(matches!(read("/nonexistent/input.pdf"), Err(Error::Io(_))));
        assert!(matches!(decode("!!not base64!!"), Err(Error::Base64Decode(_))));
    }
}
