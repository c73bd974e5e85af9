//! Source resolution and caching

pub mod cache;
pub mod resolver;

pub use cache::RenderCache;
pub use resolver::{local_path, resolve_base64, resolve_path, resolve_source, ResolvedPdf};
