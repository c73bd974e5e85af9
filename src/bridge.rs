//! Embedding-facing facade
//!
//! Every operation here degrades to an empty or truncated result on failure
//! and logs the reason. Nothing returns an error to the caller.

use crate::error::Result;
use crate::pdf::backend::{DefaultBackend, RenderingBackend};
use crate::pdf::compat::compatible_bytes;
use crate::pdf::lazy::{import_deferred_bytes, import_graphic, LazyPageGraphic, PageSize, PdfGraphicResult};
use crate::pdf::raster::{Rasterizer, RenderedPage, SizeHint, DEFAULT_MAX_BITMAP_PIXELS};
use crate::pdf::units::{effective_resolution, pixel_to_mm100};
use crate::source::{resolve_source, RenderCache};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Bridge configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Rendering resolution; `None` uses the process default
    pub resolution_dpi: Option<f64>,
    /// Maximum pixel area of one page bitmap (default: 100_000_000)
    pub max_bitmap_pixels: u64,
    /// Maximum number of cached rendered pages (default: 100)
    pub cache_max_entries: usize,
    /// Maximum total bytes of cached pixels (default: 256MB)
    pub cache_max_bytes: usize,
    /// Directory holding the pdfium shared library
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            resolution_dpi: None,
            max_bitmap_pixels: DEFAULT_MAX_BITMAP_PIXELS,
            cache_max_entries: 100,
            cache_max_bytes: 256 * 1024 * 1024, // 256MB
            pdfium_library_path: None,
        }
    }
}

/// Parameters for [`PdfBridge::decompose`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DecompositionParams {
    /// Page to render; absent or negative means the first page
    pub page_index: Option<i32>,
}

impl DecompositionParams {
    pub fn page(self) -> usize {
        self.page_index
            .and_then(|index| usize::try_from(index).ok())
            .unwrap_or(0)
    }
}

/// A single page rendered as a bitmap primitive with its logical size.
#[derive(Debug, Clone, PartialEq)]
pub struct DecomposedPage {
    pub bitmap: RenderedPage,
    /// Logical size, hundredths of a millimetre
    pub logical_size: PageSize,
}

/// PDF rasterization bridge over a [`RenderingBackend`]
pub struct PdfBridge<B: RenderingBackend = DefaultBackend> {
    backend: B,
    config: BridgeConfig,
    cache: RenderCache,
}

impl PdfBridge<DefaultBackend> {
    /// Bridge over the default backend with default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(BridgeConfig::default())
    }

    /// Bridge over the default backend with full configuration
    #[cfg(feature = "pdfium")]
    pub fn with_config(config: BridgeConfig) -> Result<Self> {
        let backend = crate::pdf::backend::PdfiumBackend::with_library_dir(
            config.pdfium_library_path.as_deref(),
        )?;
        Ok(Self::with_backend(backend, config))
    }

    /// Bridge over the default backend with full configuration
    #[cfg(not(feature = "pdfium"))]
    pub fn with_config(config: BridgeConfig) -> Result<Self> {
        Ok(Self::with_backend(crate::pdf::backend::NullBackend, config))
    }
}

impl<B: RenderingBackend> PdfBridge<B> {
    /// Bridge over an explicit backend
    pub fn with_backend(backend: B, config: BridgeConfig) -> Self {
        let cache = RenderCache::new(config.cache_max_entries, config.cache_max_bytes);
        Self {
            backend,
            config,
            cache,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    /// Resolution used by every call on this bridge
    pub fn resolution_dpi(&self) -> f64 {
        effective_resolution(self.config.resolution_dpi)
    }

    fn rasterizer(&self) -> Rasterizer<'_, B> {
        Rasterizer::new(&self.backend)
            .with_resolution(self.config.resolution_dpi)
            .with_max_bitmap_pixels(self.config.max_bitmap_pixels)
    }

    /// Rasterize `page_count` pages from `first_page` (zero-based).
    ///
    /// `None` or zero renders all remaining pages. Rendering stops at the
    /// first failing page; the pages before it are returned.
    pub fn rasterize(
        &self,
        data: &[u8],
        first_page: usize,
        page_count: Option<usize>,
        size_hint: Option<SizeHint>,
    ) -> Vec<RenderedPage> {
        let outcome = self.rasterizer().render(data, first_page, page_count, size_hint);
        if let Some(stop) = outcome.stop {
            tracing::warn!(
                first_page,
                rendered = outcome.pages.len(),
                reason = %stop,
                "rasterization stopped early"
            );
        }
        outcome.pages
    }

    /// Re-save `data` at PDF 1.6 if it declares a newer version.
    /// Empty on failure.
    pub fn downgrade(&self, data: &[u8]) -> Vec<u8> {
        compatible_bytes(&self.backend, data).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "downgrade failed");
            Vec::new()
        })
    }

    /// Import every page of the file at `source` (path or `file://` URL) as
    /// a deferred graphic.
    pub fn import_deferred(&self, source: &str) -> Vec<PdfGraphicResult> {
        let resolved = match resolve_source(source) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!(error = %e, source, "import_deferred failed");
                return Vec::new();
            }
        };
        self.import_deferred_data(&resolved.data)
    }

    /// Import every page of `data` as a deferred graphic.
    pub fn import_deferred_data(&self, data: &[u8]) -> Vec<PdfGraphicResult> {
        import_deferred_bytes(&self.backend, data, self.resolution_dpi()).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "import_deferred failed");
            Vec::new()
        })
    }

    /// Wrap the whole document as one deferred graphic.
    pub fn import_graphic(&self, data: &[u8]) -> Option<LazyPageGraphic> {
        import_graphic(&self.backend, data)
            .map_err(|e| tracing::warn!(error = %e, "import_graphic failed"))
            .ok()
    }

    /// Materialize a deferred graphic, reusing a cached rendering when the
    /// same page was already rendered at the same resolution.
    pub fn render_graphic(&self, graphic: &LazyPageGraphic) -> Option<Arc<RenderedPage>> {
        let key = graphic.cache_key(self.resolution_dpi());
        if let Some(page) = self.cache.get(&key) {
            tracing::debug!(key = %key, "render cache hit");
            return Some(page);
        }

        let page = Arc::new(graphic.rasterize(&self.rasterizer())?);
        self.cache.put(key, Arc::clone(&page));
        Some(page)
    }

    /// Render one page and report its logical size.
    pub fn decompose(&self, data: &[u8], params: &DecompositionParams) -> Option<DecomposedPage> {
        let page_index = params.page();
        let bitmap = self.rasterize(data, page_index, Some(1), None).into_iter().next()?;

        let dpi = self.resolution_dpi();
        let logical_size = PageSize {
            width: pixel_to_mm100(f64::from(bitmap.width()), dpi).round() as i64,
            height: pixel_to_mm100(f64::from(bitmap.height()), dpi).round() as i64,
        };
        Some(DecomposedPage {
            bitmap,
            logical_size,
        })
    }
}
