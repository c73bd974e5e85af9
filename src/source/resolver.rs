//! Source resolution for PDF data
//!
//! Bytes are returned as found. Whether they are a usable document is for the
//! engine to decide.

use crate::error::{Error, Result};
use base64::Engine;
use std::path::{Path, PathBuf};

/// Resolved PDF data
pub struct ResolvedPdf {
    pub data: Vec<u8>,
    pub source_name: String,
}

/// Turn a path or `file://` URL into a local path.
pub fn local_path(source: &str) -> Result<PathBuf> {
    if !source.contains("://") {
        return Ok(PathBuf::from(source));
    }

    let parsed = url::Url::parse(source).map_err(|e| Error::InvalidSource {
        reason: format!("Invalid URL: {}", e),
    })?;

    if parsed.scheme() != "file" {
        return Err(Error::InvalidSource {
            reason: format!("Unsupported URL scheme: {}", parsed.scheme()),
        });
    }

    parsed.to_file_path().map_err(|()| Error::InvalidSource {
        reason: format!("URL does not name a local file: {}", source),
    })
}

/// Resolve a file path to PDF data
pub fn resolve_path<P: AsRef<Path>>(path: P) -> Result<ResolvedPdf> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(Error::PdfNotFound {
            path: path.display().to_string(),
        });
    }

    let data = std::fs::read(path)?;

    Ok(ResolvedPdf {
        data,
        source_name: path.display().to_string(),
    })
}

/// Resolve a path or `file://` URL to PDF data
pub fn resolve_source(source: &str) -> Result<ResolvedPdf> {
    resolve_path(local_path(source)?)
}

/// Resolve base64 encoded data to PDF data
pub fn resolve_base64(base64_data: &str) -> Result<ResolvedPdf> {
    let engine = base64::engine::general_purpose::STANDARD;
    let data = engine.decode(base64_data.trim())?;

    Ok(ResolvedPdf {
        data,
        source_name: "<base64>".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_base64() {
        let resolved = resolve_base64("JVBERi0xLjQK").unwrap(); // "%PDF-1.4\n"
        assert_eq!(resolved.data, b"%PDF-1.4\n");
        assert_eq!(resolved.source_name, "<base64>");
    }

    #[test]
    fn test_resolve_base64_invalid_base64() {
        let result = resolve_base64("not valid base64!!!");
        assert!(matches!(result, Err(Error::Base64Decode(_))));
    }

    #[test]
    fn test_resolve_path_not_found() {
        let result = resolve_path("/nonexistent/path/file.pdf");
        assert!(matches!(result, Err(Error::PdfNotFound { .. })));
    }

    #[test]
    fn test_resolve_path_reads_bytes_unchecked() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not a pdf").unwrap();

        let resolved = resolve_path(file.path()).unwrap();
        assert_eq!(resolved.data, b"not a pdf");
    }

    #[test]
    fn test_resolve_file_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.7\n").unwrap();
        let url = url::Url::from_file_path(file.path()).unwrap();

        let resolved = resolve_source(url.as_str()).unwrap();
        assert_eq!(resolved.data, b"%PDF-1.7\n");
    }

    #[test]
    fn test_plain_path_passes_through() {
        assert_eq!(local_path("docs/a.pdf").unwrap(), PathBuf::from("docs/a.pdf"));
    }

    #[test]
    fn test_remote_url_rejected() {
        let result = local_path("https://example.com/a.pdf");
        assert!(matches!(result, Err(Error::InvalidSource { .. })));
    }
}
