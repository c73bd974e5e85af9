//! PDF processing layer
//!
//! Version downgrade, page rasterization, deferred page graphics and popup
//! annotation extraction, all driven through a [`RenderingBackend`].

pub mod annotations;
pub mod backend;
pub mod compat;
pub mod lazy;
pub mod raster;
pub mod units;

pub use annotations::{extract_page_annotations, AnnotationRect, PageAnnotation};
pub use backend::{
    DefaultBackend, MemoryBackend, MemoryPage, MemorySink, NullBackend, PdfVersion,
    RenderingBackend, WriteSink,
};
#[cfg(feature = "pdfium")]
pub use backend::PdfiumBackend;
pub use compat::{compatible_bytes, is_compatible, write_compatible, MAX_COMPATIBLE_VERSION};
pub use lazy::{
    import_deferred_bytes, import_graphic, DeferredKind, LazyPageGraphic, PageSize, PdfDataLink,
    PdfGraphicResult,
};
pub use raster::{RasterOutcome, RasterStop, Rasterizer, RenderedPage, SizeHint};
pub use units::{default_resolution_dpi, effective_resolution, RESOLUTION_ENV_VAR};
