//! Rendering engine abstraction
//!
//! The bridge never talks to a PDF engine directly. It drives a
//! [`RenderingBackend`], whose documents, pages, form environments and
//! bitmaps are owned handles released on drop. Three implementations exist:
//!
//! - [`PdfiumBackend`] (feature `pdfium`): the real engine.
//! - [`NullBackend`]: no engine; every document fails to open.
//! - [`MemoryBackend`]: a scripted in-memory engine.
//!
//! [`DefaultBackend`] picks between the first two at build time.

mod memory;
#[cfg(feature = "pdfium")]
mod pdfium;

pub use memory::{MemoryBackend, MemoryEvent, MemoryPage};
#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumBackend;

/// Backend used when none is chosen explicitly.
#[cfg(feature = "pdfium")]
pub type DefaultBackend = PdfiumBackend;

/// Backend used when none is chosen explicitly.
#[cfg(not(feature = "pdfium"))]
pub type DefaultBackend = NullBackend;

/// Fill colour for opaque pages (0xAARRGGBB).
pub const OPAQUE_WHITE: u32 = 0xFFFF_FFFF;

/// Fill colour for pages that report transparency (0xAARRGGBB).
pub const TRANSPARENT: u32 = 0x0000_0000;

/// Destination for bytes produced by a document save.
pub trait WriteSink {
    /// Append `bytes`. Returns `false` if the sink cannot take them.
    fn write(&mut self, bytes: &[u8]) -> bool;
}

/// In-memory [`WriteSink`] accumulating everything written to it.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    buffer: Vec<u8>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

impl WriteSink for MemorySink {
    fn write(&mut self, bytes: &[u8]) -> bool {
        self.buffer.extend_from_slice(bytes);
        true
    }
}

/// A `%PDF-major.minor` file format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub const V1_6: PdfVersion = PdfVersion { major: 1, minor: 6 };

    /// Version number as the engine expects it (`16` for 1.6).
    pub fn engine_code(self) -> i32 {
        i32::from(self.major) * 10 + i32::from(self.minor)
    }
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Annotation subtype as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationSubtype {
    Text,
    Popup,
    Other(i32),
}

impl AnnotationSubtype {
    /// Map a raw engine subtype code (PDF annotation subtype numbering).
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => AnnotationSubtype::Text,
            16 => AnnotationSubtype::Popup,
            other => AnnotationSubtype::Other(other),
        }
    }
}

/// Annotation rectangle in page space (points, origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointRect {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
}

impl PointRect {
    pub fn min_x(&self) -> f64 {
        self.left.min(self.right)
    }

    pub fn max_x(&self) -> f64 {
        self.left.max(self.right)
    }

    pub fn min_y(&self) -> f64 {
        self.bottom.min(self.top)
    }

    pub fn max_y(&self) -> f64 {
        self.bottom.max(self.top)
    }
}

/// Raw annotation attributes read from a page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineAnnotation {
    pub subtype: Option<AnnotationSubtype>,
    /// Whether the annotation dictionary carries a `Popup` key.
    pub has_popup: bool,
    pub rect: PointRect,
    /// `T` entry
    pub title: String,
    /// `Contents` entry
    pub contents: String,
    /// `M` entry, in PDF date encoding (`D:YYYYMMDDHHmmSSOHH'mm'`)
    pub modification_date: String,
}

/// A PDF rendering engine.
pub trait RenderingBackend {
    /// Whether this backend can actually parse and render documents.
    const AVAILABLE: bool = true;

    type Document<'a>: EngineDocument
    where
        Self: 'a;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Open a document from an in-memory buffer. `None` if the bytes are not
    /// a document the engine can parse. The buffer must outlive the handle.
    fn open_document<'a>(&'a self, data: &'a [u8]) -> Option<Self::Document<'a>>;
}

/// An open document handle. Closed on drop.
pub trait EngineDocument {
    /// Form-fill environment bound to this document. Torn down on drop.
    type Form<'d>
    where
        Self: 'd;
    type Page<'d>: EnginePage
    where
        Self: 'd;
    type Bitmap<'d>: EngineBitmap
    where
        Self: 'd;

    fn page_count(&self) -> usize;

    fn init_form(&self) -> Self::Form<'_>;

    /// Load a page by zero-based index. `None` on failure.
    fn load_page(&self, index: usize) -> Option<Self::Page<'_>>;

    /// Allocate an alpha-capable BGRA bitmap. `None` on allocation failure.
    fn create_bitmap(&self, width: usize, height: usize) -> Option<Self::Bitmap<'_>>;

    /// Render page content over the whole bitmap, no rotation, no flags.
    fn render_page(&self, bitmap: &mut Self::Bitmap<'_>, page: &Self::Page<'_>);

    /// Render form widget appearances over the whole bitmap.
    fn draw_form(&self, form: &Self::Form<'_>, bitmap: &mut Self::Bitmap<'_>, page: &Self::Page<'_>);

    /// Serialize the document at `version` into `sink`.
    fn save_with_version(&self, version: PdfVersion, sink: &mut dyn WriteSink) -> bool;
}

/// An open page handle. Closed on drop.
pub trait EnginePage {
    fn width_points(&self) -> f64;
    fn height_points(&self) -> f64;
    fn has_transparency(&self) -> bool;
    /// Annotations in engine enumeration order.
    fn annotations(&self) -> Vec<EngineAnnotation>;
}

/// An engine-owned BGRA bitmap. Destroyed on drop.
pub trait EngineBitmap {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    /// Fill a rectangle with a 0xAARRGGBB colour.
    fn fill_rect(&mut self, left: usize, top: usize, width: usize, height: usize, color: u32);
    /// Bytes per row, at least `width * 4`.
    fn stride(&self) -> usize;
    /// Pixel rows, BGRA, `stride * height` bytes.
    fn buffer(&self) -> &[u8];
}

/// Backend for builds without a rendering engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

/// Uninhabited handle type of [`NullBackend`].
#[derive(Debug)]
pub enum NullHandle {}

impl RenderingBackend for NullBackend {
    const AVAILABLE: bool = false;

    type Document<'a> = NullHandle;

    fn name(&self) -> &'static str {
        "null"
    }

    fn open_document<'a>(&'a self, _data: &'a [u8]) -> Option<NullHandle> {
        None
    }
}

impl EngineDocument for NullHandle {
    type Form<'d> = ();
    type Page<'d> = NullHandle;
    type Bitmap<'d> = NullHandle;

    fn page_count(&self) -> usize {
        match *self {}
    }

    fn init_form(&self) {
        match *self {}
    }

    fn load_page(&self, _index: usize) -> Option<NullHandle> {
        match *self {}
    }

    fn create_bitmap(&self, _width: usize, _height: usize) -> Option<NullHandle> {
        match *self {}
    }

    fn render_page(&self, _bitmap: &mut NullHandle, _page: &NullHandle) {
        match *self {}
    }

    fn draw_form(&self, _form: &(), _bitmap: &mut NullHandle, _page: &NullHandle) {
        match *self {}
    }

    fn save_with_version(&self, _version: PdfVersion, _sink: &mut dyn WriteSink) -> bool {
        match *self {}
    }
}

impl EnginePage for NullHandle {
    fn width_points(&self) -> f64 {
        match *self {}
    }

    fn height_points(&self) -> f64 {
        match *self {}
    }

    fn has_transparency(&self) -> bool {
        match *self {}
    }

    fn annotations(&self) -> Vec<EngineAnnotation> {
        match *self {}
    }
}

impl EngineBitmap for NullHandle {
    fn width(&self) -> usize {
        match *self {}
    }

    fn height(&self) -> usize {
        match *self {}
    }

    fn fill_rect(&mut self, _left: usize, _top: usize, _width: usize, _height: usize, _color: u32) {
        match *self {}
    }

    fn stride(&self) -> usize {
        match *self {}
    }

    fn buffer(&self) -> &[u8] {
        match *self {}
    }
}
