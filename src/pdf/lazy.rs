//! Deferred page graphics
//!
//! Importing a document does not rasterize it. Each page becomes a
//! [`LazyPageGraphic`] sharing one [`PdfDataLink`] to the original bytes;
//! pixels are produced only when a consumer asks for them.

use super::annotations::{extract_page_annotations, PageAnnotation};
use super::backend::{EngineDocument, EnginePage, RenderingBackend};
use super::compat::compatible_bytes;
use super::raster::{RenderedPage, Rasterizer};
use super::units::{point_to_mm100, point_to_pixel_count};
use crate::error::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Original PDF bytes shared by every page graphic of one document.
#[derive(Debug)]
pub struct PdfDataLink {
    id: Uuid,
    bytes: Vec<u8>,
}

impl PdfDataLink {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4(),
            bytes,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// What a deferred graphic renders from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeferredKind {
    Pdf,
}

/// One page of a document, rasterized on demand.
#[derive(Debug, Clone)]
pub struct LazyPageGraphic {
    link: Arc<PdfDataLink>,
    page_index: usize,
    kind: Option<DeferredKind>,
}

impl LazyPageGraphic {
    pub fn new(link: Arc<PdfDataLink>, page_index: usize) -> Self {
        Self {
            link,
            page_index,
            kind: Some(DeferredKind::Pdf),
        }
    }

    pub fn link(&self) -> &Arc<PdfDataLink> {
        &self.link
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn kind(&self) -> Option<DeferredKind> {
        self.kind
    }

    /// Cache key for the rendering of this page at `dpi`.
    pub fn cache_key(&self, dpi: f64) -> String {
        format!("{}:{}:{}", self.link.id(), self.page_index, dpi)
    }

    /// Rasterize the wrapped page from the shared bytes.
    pub fn rasterize<B: RenderingBackend>(&self, rasterizer: &Rasterizer<'_, B>) -> Option<RenderedPage> {
        let outcome = rasterizer.render(self.link.bytes(), self.page_index, Some(1), None);
        if let Some(stop) = outcome.stop {
            tracing::warn!(page = self.page_index + 1, reason = %stop, "deferred page not rendered");
        }
        outcome.pages.into_iter().next()
    }
}

/// Page size in hundredths of a millimetre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageSize {
    pub width: i64,
    pub height: i64,
}

/// One imported page: its deferred graphic, size, and popup comments.
#[derive(Debug, Clone)]
pub struct PdfGraphicResult {
    pub graphic: LazyPageGraphic,
    /// Logical size, hundredths of a millimetre
    pub size_mm100: PageSize,
    /// Pixel size the page rasterizes to at the import resolution
    pub pixel_size: (usize, usize),
    pub annotations: Vec<PageAnnotation>,
}

/// Normalize `data` and wrap it as a single deferred graphic for page 0.
pub fn import_graphic<B: RenderingBackend>(backend: &B, data: &[u8]) -> Result<LazyPageGraphic> {
    let link = prepare_link(backend, data)?;
    Ok(LazyPageGraphic::new(link, 0))
}

fn prepare_link<B: RenderingBackend>(backend: &B, data: &[u8]) -> Result<Arc<PdfDataLink>> {
    let bytes = compatible_bytes(backend, data)?;
    if bytes.is_empty() {
        return Err(Error::InvalidPdf {
            reason: "empty PDF data".to_string(),
        });
    }
    Ok(Arc::new(PdfDataLink::new(bytes)))
}

/// Import every page of `data` as a deferred graphic, with its size and
/// popup comments. Pages the engine cannot load or that report a
/// non-positive size are skipped.
pub fn import_deferred_bytes<B: RenderingBackend>(
    backend: &B,
    data: &[u8],
    resolution_dpi: f64,
) -> Result<Vec<PdfGraphicResult>> {
    let link = prepare_link(backend, data)?;

    let document = backend
        .open_document(link.bytes())
        .ok_or_else(|| Error::InvalidPdf {
            reason: "engine could not load the document".to_string(),
        })?;

    let page_count = document.page_count();
    let mut results = Vec::with_capacity(page_count);

    for page_index in 0..page_count {
        let Some(page) = document.load_page(page_index) else {
            tracing::debug!(page = page_index + 1, "skipping page that failed to load");
            continue;
        };

        let width_points = page.width_points();
        let height_points = page.height_points();
        if width_points <= 0.0 || height_points <= 0.0 {
            continue;
        }

        results.push(PdfGraphicResult {
            graphic: LazyPageGraphic::new(Arc::clone(&link), page_index),
            size_mm100: PageSize {
                width: point_to_mm100(width_points).round() as i64,
                height: point_to_mm100(height_points).round() as i64,
            },
            pixel_size: (
                point_to_pixel_count(width_points, resolution_dpi),
                point_to_pixel_count(height_points, resolution_dpi),
            ),
            annotations: extract_page_annotations(&page, height_points),
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::backend::{
        AnnotationSubtype, EngineAnnotation, MemoryBackend, MemoryEvent, MemoryPage,
    };

    const PDF: &[u8] = b"%PDF-1.5\n1 0 obj\n";

    fn popup(contents: &str) -> EngineAnnotation {
        EngineAnnotation {
            subtype: Some(AnnotationSubtype::Text),
            has_popup: true,
            contents: contents.to_string(),
            ..EngineAnnotation::default()
        }
    }

    #[test]
    fn test_import_shares_bytes_and_never_rasterizes() {
        let backend = MemoryBackend::new(vec![MemoryPage::a4(), MemoryPage::a4(), MemoryPage::a4()]);
        let results = import_deferred_bytes(&backend, PDF, 96.0).unwrap();

        assert_eq!(results.len(), 3);
        for (index, result) in results.iter().enumerate() {
            assert_eq!(result.graphic.page_index(), index);
            assert_eq!(result.graphic.kind(), Some(DeferredKind::Pdf));
            assert!(Arc::ptr_eq(result.graphic.link(), results[0].graphic.link()));
            assert_eq!(result.graphic.link().bytes(), PDF);
        }
        assert!(!backend
            .events()
            .iter()
            .any(|e| matches!(e, MemoryEvent::CreateBitmap { .. } | MemoryEvent::RenderPage(_))));
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_import_sizes() {
        let backend = MemoryBackend::new(vec![MemoryPage::new(72.0, 144.0)]);
        let results = import_deferred_bytes(&backend, PDF, 96.0).unwrap();
        assert_eq!(
            results[0].size_mm100,
            PageSize {
                width: 2540,
                height: 5080
            }
        );
        assert_eq!(results[0].pixel_size, (96, 192));
    }

    #[test]
    fn test_import_skips_unusable_pages() {
        let backend = MemoryBackend::new(vec![
            MemoryPage::new(0.0, 100.0),
            MemoryPage::a4().failing(),
            MemoryPage::a4(),
        ]);
        let results = import_deferred_bytes(&backend, PDF, 96.0).unwrap();
        let indices: Vec<usize> = results.iter().map(|r| r.graphic.page_index()).collect();
        assert_eq!(indices, vec![2]);
    }

    #[test]
    fn test_import_collects_popup_comments_in_order() {
        let page = MemoryPage::a4()
            .with_annotation(popup("first"))
            .with_annotation(EngineAnnotation {
                subtype: Some(AnnotationSubtype::Popup),
                ..EngineAnnotation::default()
            })
            .with_annotation(popup("second"));
        let backend = MemoryBackend::new(vec![page]);
        let results = import_deferred_bytes(&backend, PDF, 96.0).unwrap();

        let texts: Vec<&str> = results[0]
            .annotations
            .iter()
            .map(|a| a.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[test]
    fn test_import_rejects_garbage() {
        let backend = MemoryBackend::new(vec![MemoryPage::a4()]);
        assert!(import_deferred_bytes(&backend, b"garbage", 96.0).is_err());
        assert!(import_graphic(&backend, b"").is_err());
    }

    #[test]
    fn test_rasterize_on_demand() {
        let backend = MemoryBackend::new(vec![MemoryPage::new(72.0, 72.0), MemoryPage::new(36.0, 72.0)]);
        let results = import_deferred_bytes(&backend, PDF, 72.0).unwrap();
        backend.clear_events();

        let rasterizer = Rasterizer::new(&backend).with_resolution(Some(72.0));
        let page = results[1].graphic.rasterize(&rasterizer).unwrap();
        assert_eq!(page.page_index, 1);
        assert_eq!((page.width(), page.height()), (36, 72));
        assert_eq!(backend.loaded_pages(), vec![1]);
    }

    #[test]
    fn test_cache_key_distinguishes_page_and_dpi() {
        let link = Arc::new(PdfDataLink::new(PDF.to_vec()));
        let a = LazyPageGraphic::new(Arc::clone(&link), 0);
        let b = LazyPageGraphic::new(link, 1);
        assert_ne!(a.cache_key(96.0), b.cache_key(96.0));
        assert_ne!(a.cache_key(96.0), a.cache_key(150.0));
    }
}
