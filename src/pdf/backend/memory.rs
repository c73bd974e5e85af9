//! Scripted in-memory rendering engine
//!
//! Opens any buffer that starts with `%PDF-` and presents the pages it was
//! built with. Every handle acquisition and release is recorded, so callers
//! can check both what was rendered and that every handle was released.

use super::{
    EngineAnnotation, EngineBitmap, EngineDocument, EnginePage, PdfVersion, RenderingBackend,
    WriteSink,
};
use parking_lot::Mutex;

/// One page of a [`MemoryBackend`] document.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPage {
    pub width_points: f64,
    pub height_points: f64,
    pub transparent: bool,
    /// BGRA colour painted over the whole page by content rendering.
    pub ink: Option<[u8; 4]>,
    /// BGRA colour painted over the first pixel row by form-widget drawing.
    pub widget_ink: Option<[u8; 4]>,
    pub annotations: Vec<EngineAnnotation>,
    /// Page load fails when set.
    pub fail_to_load: bool,
}

impl MemoryPage {
    /// Opaque blank page of the given size in points.
    pub fn new(width_points: f64, height_points: f64) -> Self {
        Self {
            width_points,
            height_points,
            transparent: false,
            ink: None,
            widget_ink: None,
            annotations: Vec::new(),
            fail_to_load: false,
        }
    }

    /// A4 portrait (595 x 842 pt).
    pub fn a4() -> Self {
        Self::new(595.0, 842.0)
    }

    pub fn transparent(mut self) -> Self {
        self.transparent = true;
        self
    }

    pub fn with_ink(mut self, bgra: [u8; 4]) -> Self {
        self.ink = Some(bgra);
        self
    }

    pub fn with_widget_ink(mut self, bgra: [u8; 4]) -> Self {
        self.widget_ink = Some(bgra);
        self
    }

    pub fn with_annotation(mut self, annotation: EngineAnnotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_to_load = true;
        self
    }
}

/// Handle events recorded by a [`MemoryBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryEvent {
    OpenDocument,
    CloseDocument,
    InitForm,
    ExitForm,
    LoadPage(usize),
    LoadPageFailed(usize),
    ClosePage(usize),
    CreateBitmap { width: usize, height: usize },
    DestroyBitmap,
    RenderPage(usize),
    DrawForm(usize),
    Save(PdfVersion),
}

/// Scripted in-memory [`RenderingBackend`].
#[derive(Debug, Default)]
pub struct MemoryBackend {
    pages: Vec<MemoryPage>,
    stride_padding: usize,
    max_bitmap_bytes: Option<usize>,
    events: Mutex<Vec<MemoryEvent>>,
}

impl MemoryBackend {
    pub fn new(pages: Vec<MemoryPage>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    /// Pad every bitmap row with `bytes` extra bytes.
    pub fn with_stride_padding(mut self, bytes: usize) -> Self {
        self.stride_padding = bytes;
        self
    }

    /// Fail bitmap allocations larger than `bytes`.
    pub fn with_max_bitmap_bytes(mut self, bytes: usize) -> Self {
        self.max_bitmap_bytes = Some(bytes);
        self
    }

    pub fn pages(&self) -> &[MemoryPage] {
        &self.pages
    }

    pub fn events(&self) -> Vec<MemoryEvent> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Page indices passed to page load, in call order, failed or not.
    pub fn loaded_pages(&self) -> Vec<usize> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                MemoryEvent::LoadPage(index) | MemoryEvent::LoadPageFailed(index) => Some(*index),
                _ => None,
            })
            .collect()
    }

    /// Number of handles acquired and not yet released.
    pub fn open_handles(&self) -> isize {
        self.events.lock().iter().fold(0, |open, e| match e {
            MemoryEvent::OpenDocument
            | MemoryEvent::InitForm
            | MemoryEvent::CreateBitmap { .. } => open + 1,
            MemoryEvent::LoadPage(_) => open + 1,
            MemoryEvent::CloseDocument | MemoryEvent::ExitForm | MemoryEvent::DestroyBitmap => {
                open - 1
            }
            MemoryEvent::ClosePage(_) => open - 1,
            _ => open,
        })
    }

    fn record(&self, event: MemoryEvent) {
        self.events.lock().push(event);
    }
}

impl RenderingBackend for MemoryBackend {
    type Document<'a> = MemoryDocument<'a>;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn open_document<'a>(&'a self, data: &'a [u8]) -> Option<MemoryDocument<'a>> {
        if !data.starts_with(b"%PDF-") {
            return None;
        }
        self.record(MemoryEvent::OpenDocument);
        Some(MemoryDocument {
            backend: self,
            data,
        })
    }
}

pub struct MemoryDocument<'a> {
    backend: &'a MemoryBackend,
    data: &'a [u8],
}

impl Drop for MemoryDocument<'_> {
    fn drop(&mut self) {
        self.backend.record(MemoryEvent::CloseDocument);
    }
}

pub struct MemoryForm<'d> {
    backend: &'d MemoryBackend,
}

impl Drop for MemoryForm<'_> {
    fn drop(&mut self) {
        self.backend.record(MemoryEvent::ExitForm);
    }
}

pub struct MemoryPageHandle<'d> {
    backend: &'d MemoryBackend,
    index: usize,
    page: &'d MemoryPage,
}

impl Drop for MemoryPageHandle<'_> {
    fn drop(&mut self) {
        self.backend.record(MemoryEvent::ClosePage(self.index));
    }
}

pub struct MemoryBitmap<'d> {
    backend: &'d MemoryBackend,
    width: usize,
    height: usize,
    stride: usize,
    pixels: Vec<u8>,
}

impl MemoryBitmap<'_> {
    fn paint_rows(&mut self, rows: std::ops::Range<usize>, bgra: [u8; 4]) {
        for row in rows {
            let start = row * self.stride;
            for pixel in self.pixels[start..start + self.width * 4].chunks_exact_mut(4) {
                pixel.copy_from_slice(&bgra);
            }
        }
    }
}

impl Drop for MemoryBitmap<'_> {
    fn drop(&mut self) {
        self.backend.record(MemoryEvent::DestroyBitmap);
    }
}

impl<'a> EngineDocument for MemoryDocument<'a> {
    type Form<'d> = MemoryForm<'d> where Self: 'd;
    type Page<'d> = MemoryPageHandle<'d> where Self: 'd;
    type Bitmap<'d> = MemoryBitmap<'d> where Self: 'd;

    fn page_count(&self) -> usize {
        self.backend.pages.len()
    }

    fn init_form(&self) -> MemoryForm<'_> {
        self.backend.record(MemoryEvent::InitForm);
        MemoryForm {
            backend: self.backend,
        }
    }

    fn load_page(&self, index: usize) -> Option<MemoryPageHandle<'_>> {
        let Some(page) = self.backend.pages.get(index).filter(|page| !page.fail_to_load) else {
            self.backend.record(MemoryEvent::LoadPageFailed(index));
            return None;
        };
        self.backend.record(MemoryEvent::LoadPage(index));
        Some(MemoryPageHandle {
            backend: self.backend,
            index,
            page,
        })
    }

    fn create_bitmap(&self, width: usize, height: usize) -> Option<MemoryBitmap<'_>> {
        if width == 0 || height == 0 {
            return None;
        }
        let stride = width * 4 + self.backend.stride_padding;
        let size = stride.checked_mul(height)?;
        if self.backend.max_bitmap_bytes.is_some_and(|max| size > max) {
            return None;
        }
        self.backend
            .record(MemoryEvent::CreateBitmap { width, height });
        Some(MemoryBitmap {
            backend: self.backend,
            width,
            height,
            stride,
            // Row padding is never written by the engine.
            pixels: vec![0xAB; size],
        })
    }

    fn render_page(&self, bitmap: &mut MemoryBitmap<'_>, page: &MemoryPageHandle<'_>) {
        self.backend.record(MemoryEvent::RenderPage(page.index));
        if let Some(ink) = page.page.ink {
            let height = bitmap.height;
            bitmap.paint_rows(0..height, ink);
        }
    }

    fn draw_form(
        &self,
        _form: &MemoryForm<'_>,
        bitmap: &mut MemoryBitmap<'_>,
        page: &MemoryPageHandle<'_>,
    ) {
        self.backend.record(MemoryEvent::DrawForm(page.index));
        if let Some(ink) = page.page.widget_ink {
            bitmap.paint_rows(0..1, ink);
        }
    }

    fn save_with_version(&self, version: PdfVersion, sink: &mut dyn WriteSink) -> bool {
        self.backend.record(MemoryEvent::Save(version));
        let body = match self.data.iter().position(|&b| b == b'\n') {
            Some(newline) => &self.data[newline..],
            None => &[][..],
        };
        sink.write(format!("%PDF-{}", version).as_bytes()) && sink.write(body)
    }
}

impl EnginePage for MemoryPageHandle<'_> {
    fn width_points(&self) -> f64 {
        self.page.width_points
    }

    fn height_points(&self) -> f64 {
        self.page.height_points
    }

    fn has_transparency(&self) -> bool {
        self.page.transparent
    }

    fn annotations(&self) -> Vec<EngineAnnotation> {
        self.page.annotations.clone()
    }
}

impl EngineBitmap for MemoryBitmap<'_> {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn fill_rect(&mut self, left: usize, top: usize, width: usize, height: usize, color: u32) {
        let [a, r, g, b] = color.to_be_bytes();
        let right = (left + width).min(self.width);
        let bottom = (top + height).min(self.height);
        for row in top..bottom {
            let start = row * self.stride;
            for pixel in self.pixels[start + left * 4..start + right * 4].chunks_exact_mut(4) {
                pixel.copy_from_slice(&[b, g, r, a]);
            }
        }
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn buffer(&self) -> &[u8] {
        &self.pixels
    }
}
