//! PDF page rasterization bridge
//!
//! Drives a PDF rendering engine (PDFium by default) to:
//! - rasterize page ranges into 24-bit RGB bitmaps at a target resolution
//! - re-save documents newer than PDF 1.6 at 1.6
//! - import documents as deferred per-page graphics, rendered on demand
//! - extract popup comments with positions in hundredths of a millimetre
//!
//! [`PdfBridge`] is the entry point for embedders. It never returns errors;
//! failures degrade to empty results and are logged through `tracing`.

pub mod bridge;
pub mod error;
pub mod pdf;
pub mod source;

pub use bridge::{BridgeConfig, DecomposedPage, DecompositionParams, PdfBridge};
pub use error::{Error, Result};
pub use pdf::{
    default_resolution_dpi, LazyPageGraphic, PageAnnotation, PageSize, PdfGraphicResult,
    RenderedPage, RenderingBackend, SizeHint, RESOLUTION_ENV_VAR,
};
