//! PDF version compatibility
//!
//! Documents declaring a version newer than 1.6 are re-saved by the engine at
//! 1.6. Anything else is copied verbatim.

use super::backend::{EngineDocument, MemorySink, PdfVersion, RenderingBackend, WriteSink};
use crate::error::{Error, Result};
use std::ops::Range;

/// Newest version passed through untouched; also the re-save target.
pub const MAX_COMPATIBLE_VERSION: PdfVersion = PdfVersion::V1_6;

const HEADER_LEN: usize = 8;

/// Read the `%PDF-X.Y` marker at the start of `header`.
///
/// Version digits that are not ASCII digits read as 0.
pub fn declared_version(header: &[u8]) -> Option<PdfVersion> {
    if header.len() < HEADER_LEN || !header.starts_with(b"%PDF-") {
        return None;
    }
    let digit = |b: u8| if b.is_ascii_digit() { b - b'0' } else { 0 };
    Some(PdfVersion {
        major: digit(header[5]),
        minor: digit(header[7]),
    })
}

/// Whether `data` is old enough to be used as is.
///
/// Data shorter than the marker, or without one, counts as not compatible.
pub fn is_compatible(data: &[u8]) -> bool {
    declared_version(data).is_some_and(|version| version <= MAX_COMPATIBLE_VERSION)
}

/// Write `data[range]` to `out`, downgrading it first if it is too new.
///
/// Without an available engine the range is always copied verbatim.
pub fn write_compatible<B: RenderingBackend>(
    backend: &B,
    data: &[u8],
    range: Range<usize>,
    out: &mut dyn WriteSink,
) -> Result<()> {
    let end = range.end.min(data.len());
    let start = range.start.min(end);
    let input = &data[start..end];

    if !B::AVAILABLE || is_compatible(input) {
        return if out.write(input) {
            Ok(())
        } else {
            Err(Error::DowngradeFailed {
                reason: "output sink rejected data".to_string(),
            })
        };
    }

    tracing::debug!(
        declared = ?declared_version(input),
        target = %MAX_COMPATIBLE_VERSION,
        backend = backend.name(),
        "downgrading PDF version"
    );

    let document = backend
        .open_document(input)
        .ok_or_else(|| Error::DowngradeFailed {
            reason: "engine could not load the document".to_string(),
        })?;

    if !document.save_with_version(MAX_COMPATIBLE_VERSION, out) {
        return Err(Error::DowngradeFailed {
            reason: format!("engine could not save at PDF-{}", MAX_COMPATIBLE_VERSION),
        });
    }

    Ok(())
}

/// Compatible copy of the whole buffer.
pub fn compatible_bytes<B: RenderingBackend>(backend: &B, data: &[u8]) -> Result<Vec<u8>> {
    let mut sink = MemorySink::new();
    write_compatible(backend, data, 0..data.len(), &mut sink)?;
    Ok(sink.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::backend::{MemoryBackend, MemoryEvent, MemoryPage, NullBackend};
    use rstest::rstest;

    const PDF_14: &[u8] = b"%PDF-1.4\n%\xe2\xe3\n1 0 obj\n<<>>\nendobj\n";
    const PDF_20: &[u8] = b"%PDF-2.0\n1 0 obj\n<<>>\nendobj\n";

    fn backend() -> MemoryBackend {
        MemoryBackend::new(vec![MemoryPage::a4()])
    }

    #[rstest]
    #[case(b"%PDF-1.0\n", true)]
    #[case(b"%PDF-1.4\n", true)]
    #[case(b"%PDF-1.6\n", true)]
    #[case(b"%PDF-1.7\n", false)]
    #[case(b"%PDF-2.0\n", false)]
    #[case(b"%PDF-1.4", true)]
    #[case(b"%PDF-1", false)]
    #[case(b"GIF89a..", false)]
    #[case(b"", false)]
    fn test_is_compatible(#[case] header: &[u8], #[case] expected: bool) {
        assert_eq!(is_compatible(header), expected);
    }

    #[test]
    fn test_non_digit_version_reads_as_zero() {
        assert_eq!(
            declared_version(b"%PDF-a.b"),
            Some(PdfVersion { major: 0, minor: 0 })
        );
        assert!(is_compatible(b"%PDF-a.b"));
    }

    #[test]
    fn test_old_version_copied_byte_for_byte() {
        let backend = backend();
        let out = compatible_bytes(&backend, PDF_14).unwrap();
        assert_eq!(out, PDF_14);
        assert!(backend.events().is_empty());
    }

    #[test]
    fn test_new_version_goes_through_resave() {
        let backend = backend();
        let out = compatible_bytes(&backend, PDF_20).unwrap();
        assert_ne!(out, PDF_20);
        assert!(out.starts_with(b"%PDF-1.6"));
        assert_eq!(
            backend.events(),
            vec![
                MemoryEvent::OpenDocument,
                MemoryEvent::Save(PdfVersion::V1_6),
                MemoryEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn test_range_is_respected() {
        let backend = backend();
        let mut data = b"JUNK".to_vec();
        data.extend_from_slice(PDF_14);
        data.extend_from_slice(b"TRAILER");

        let mut sink = MemorySink::new();
        write_compatible(&backend, &data, 4..4 + PDF_14.len(), &mut sink).unwrap();
        assert_eq!(sink.as_bytes(), PDF_14);
    }

    #[test]
    fn test_malformed_header_forces_failing_downgrade() {
        let backend = backend();
        let result = compatible_bytes(&backend, b"not a pdf at all");
        assert!(matches!(result, Err(Error::DowngradeFailed { .. })));
    }

    #[test]
    fn test_short_input_is_not_compatible() {
        let backend = backend();
        let result = compatible_bytes(&backend, b"%PDF");
        assert!(matches!(result, Err(Error::DowngradeFailed { .. })));
    }

    #[test]
    fn test_engine_absent_copies_verbatim() {
        let out = compatible_bytes(&NullBackend, PDF_20).unwrap();
        assert_eq!(out, PDF_20);
    }
}
