//! Page rasterization
//!
//! Renders a range of pages into owned 24-bit RGB bitmaps. Page content and
//! form widgets are both drawn. The loop stops at the first page that cannot
//! be loaded or allocated; pages rendered before it are kept.

use super::backend::{
    EngineBitmap, EngineDocument, EnginePage, RenderingBackend, OPAQUE_WHITE, TRANSPARENT,
};
use super::units::{effective_resolution, mm100_to_point, point_to_pixel_count};
use crate::error::{Error, Result};
use image::RgbImage;

/// Default ceiling on the pixel area of a single page bitmap.
pub const DEFAULT_MAX_BITMAP_PIXELS: u64 = 100_000_000;

/// Physical page size, in hundredths of a millimetre, overriding the
/// document's own page size.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SizeHint {
    pub width: f64,
    pub height: f64,
}

impl SizeHint {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// A hint only applies when both dimensions are non-zero.
    pub fn is_usable(&self) -> bool {
        self.width != 0.0 && self.height != 0.0
    }

    /// Hint converted to points.
    pub fn to_points(self) -> (f64, f64) {
        (mm100_to_point(self.width), mm100_to_point(self.height))
    }
}

/// One rasterized page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// Zero-based page index
    pub page_index: usize,
    /// 24-bit RGB pixels
    pub bitmap: RgbImage,
}

impl RenderedPage {
    pub const BITS_PER_PIXEL: u16 = 24;

    pub fn width(&self) -> u32 {
        self.bitmap.width()
    }

    pub fn height(&self) -> u32 {
        self.bitmap.height()
    }

    /// Approximate in-memory size of the pixel data.
    pub fn byte_size(&self) -> usize {
        self.bitmap.as_raw().len()
    }

    /// Encode as PNG
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut png_bytes = Vec::new();
        self.bitmap
            .write_to(
                &mut std::io::Cursor::new(&mut png_bytes),
                image::ImageFormat::Png,
            )
            .map_err(|e| Error::ImageEncode {
                reason: format!("Failed to encode page {} as PNG: {}", self.page_index + 1, e),
            })?;
        Ok(png_bytes)
    }
}

/// Why a rasterization stopped before the end of the requested range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterStop {
    /// The buffer is not a document the engine can open.
    Unreadable,
    /// The page could not be loaded.
    PageLoad { page_index: usize },
    /// The page bitmap could not be allocated.
    BitmapAllocation {
        page_index: usize,
        width: usize,
        height: usize,
    },
    /// The engine returned fewer bitmap bytes than its stride promises.
    BufferTooSmall { page_index: usize },
}

impl std::fmt::Display for RasterStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RasterStop::Unreadable => write!(f, "document could not be opened"),
            RasterStop::PageLoad { page_index } => {
                write!(f, "page {} could not be loaded", page_index + 1)
            }
            RasterStop::BitmapAllocation {
                page_index,
                width,
                height,
            } => write!(
                f,
                "bitmap of {}x{} for page {} could not be allocated",
                width,
                height,
                page_index + 1
            ),
            RasterStop::BufferTooSmall { page_index } => {
                write!(f, "bitmap buffer for page {} is truncated", page_index + 1)
            }
        }
    }
}

/// Pages produced by one rasterization call.
#[derive(Debug, Clone, Default)]
pub struct RasterOutcome {
    pub pages: Vec<RenderedPage>,
    /// Set when the loop ended before the requested range was exhausted.
    pub stop: Option<RasterStop>,
}

impl RasterOutcome {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Indices of the pages to render: from `first_page` for `page_count` pages,
/// clamped to the document. `None` or zero means all remaining pages.
pub fn page_span(total: usize, first_page: usize, page_count: Option<usize>) -> std::ops::Range<usize> {
    let wanted = match page_count {
        Some(count) if count > 0 => count,
        _ => total,
    };
    let end = total.min(first_page.saturating_add(wanted));
    first_page.min(end)..end
}

/// Copy BGRA rows of `stride` bytes into a new RGB bitmap.
///
/// Returns `None` if `buffer` is shorter than `stride * height` or a row is
/// narrower than `width` pixels.
pub fn bgra_rows_to_rgb(buffer: &[u8], stride: usize, width: usize, height: usize) -> Option<RgbImage> {
    if width == 0 || height == 0 {
        return None;
    }
    let row_bytes = width.checked_mul(4)?;
    if stride < row_bytes || buffer.len() < stride.checked_mul(height - 1)?.checked_add(row_bytes)? {
        return None;
    }

    let mut image = RgbImage::new(u32::try_from(width).ok()?, u32::try_from(height).ok()?);
    for (row, out) in image.chunks_exact_mut(width * 3).enumerate() {
        let line = &buffer[row * stride..row * stride + row_bytes];
        for (rgb, bgra) in out.chunks_exact_mut(3).zip(line.chunks_exact(4)) {
            rgb[0] = bgra[2];
            rgb[1] = bgra[1];
            rgb[2] = bgra[0];
        }
    }
    Some(image)
}

/// Renders pages of in-memory documents through a [`RenderingBackend`].
pub struct Rasterizer<'b, B: RenderingBackend> {
    backend: &'b B,
    resolution_dpi: f64,
    max_bitmap_pixels: u64,
}

impl<'b, B: RenderingBackend> Rasterizer<'b, B> {
    /// Rasterizer at the process default resolution.
    pub fn new(backend: &'b B) -> Self {
        Self {
            backend,
            resolution_dpi: effective_resolution(None),
            max_bitmap_pixels: DEFAULT_MAX_BITMAP_PIXELS,
        }
    }

    /// Override the resolution. Non-positive values fall back to the default.
    pub fn with_resolution(mut self, dpi: Option<f64>) -> Self {
        self.resolution_dpi = effective_resolution(dpi);
        self
    }

    pub fn with_max_bitmap_pixels(mut self, max_pixels: u64) -> Self {
        self.max_bitmap_pixels = max_pixels;
        self
    }

    pub fn resolution_dpi(&self) -> f64 {
        self.resolution_dpi
    }

    /// Pixel size of a page of `width_points` x `height_points`, or of the
    /// size hint when one applies.
    pub fn pixel_size(&self, width_points: f64, height_points: f64, size_hint: Option<SizeHint>) -> (usize, usize) {
        let (width, height) = match size_hint.filter(SizeHint::is_usable) {
            Some(hint) => hint.to_points(),
            None => (width_points, height_points),
        };
        (
            point_to_pixel_count(width, self.resolution_dpi),
            point_to_pixel_count(height, self.resolution_dpi),
        )
    }

    /// Rasterize `page_count` pages starting at `first_page` (zero-based).
    pub fn render(
        &self,
        data: &[u8],
        first_page: usize,
        page_count: Option<usize>,
        size_hint: Option<SizeHint>,
    ) -> RasterOutcome {
        let mut outcome = RasterOutcome::default();

        let Some(document) = self.backend.open_document(data) else {
            outcome.stop = Some(RasterStop::Unreadable);
            return outcome;
        };
        let form = document.init_form();

        let span = page_span(document.page_count(), first_page, page_count);
        tracing::debug!(
            first_page,
            last_page = span.end,
            dpi = self.resolution_dpi,
            backend = self.backend.name(),
            "rasterizing pages"
        );

        for page_index in span {
            match self.render_page(&document, &form, page_index, size_hint) {
                Ok(page) => outcome.pages.push(page),
                Err(stop) => {
                    outcome.stop = Some(stop);
                    break;
                }
            }
        }

        // Form environment before document.
        drop(form);
        drop(document);
        outcome
    }

    fn render_page<D: EngineDocument>(
        &self,
        document: &D,
        form: &D::Form<'_>,
        page_index: usize,
        size_hint: Option<SizeHint>,
    ) -> std::result::Result<RenderedPage, RasterStop> {
        let page = document
            .load_page(page_index)
            .ok_or(RasterStop::PageLoad { page_index })?;

        let (width, height) = self.pixel_size(page.width_points(), page.height_points(), size_hint);
        let allocation_failed = RasterStop::BitmapAllocation {
            page_index,
            width,
            height,
        };
        if width == 0 || height == 0 || (width as u64).saturating_mul(height as u64) > self.max_bitmap_pixels {
            return Err(allocation_failed);
        }
        let mut bitmap = document
            .create_bitmap(width, height)
            .ok_or(allocation_failed)?;

        let background = if page.has_transparency() {
            TRANSPARENT
        } else {
            OPAQUE_WHITE
        };
        bitmap.fill_rect(0, 0, width, height, background);
        document.render_page(&mut bitmap, &page);
        document.draw_form(form, &mut bitmap, &page);

        let image = bgra_rows_to_rgb(bitmap.buffer(), bitmap.stride(), width, height)
            .ok_or(RasterStop::BufferTooSmall { page_index })?;

        Ok(RenderedPage {
            page_index,
            bitmap: image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::backend::{MemoryBackend, MemoryEvent, MemoryPage, NullBackend};
    use rstest::rstest;

    const PDF: &[u8] = b"%PDF-1.4\n";

    fn five_pages() -> Vec<MemoryPage> {
        (0..5).map(|_| MemoryPage::new(72.0, 36.0)).collect()
    }

    #[rstest]
    #[case(5, 0, None, 0..5)]
    #[case(5, 0, Some(0), 0..5)]
    #[case(5, 2, None, 2..5)]
    #[case(5, 1, Some(2), 1..3)]
    #[case(5, 3, Some(10), 3..5)]
    #[case(5, 5, None, 5..5)]
    #[case(5, 9, Some(1), 5..5)]
    #[case(0, 0, None, 0..0)]
    fn test_page_span(
        #[case] total: usize,
        #[case] first: usize,
        #[case] count: Option<usize>,
        #[case] expected: std::ops::Range<usize>,
    ) {
        assert_eq!(page_span(total, first, count), expected);
    }

    #[test]
    fn test_bgra_rows_honour_stride() {
        // 2x2, stride 10 (2 bytes of padding per row)
        let buffer = [
            1, 2, 3, 255, 4, 5, 6, 255, 0xEE, 0xEE, //
            7, 8, 9, 0, 10, 11, 12, 0, 0xEE, 0xEE,
        ];
        let image = bgra_rows_to_rgb(&buffer, 10, 2, 2).unwrap();
        assert_eq!(image.as_raw(), &vec![3, 2, 1, 6, 5, 4, 9, 8, 7, 12, 11, 10]);
    }

    #[test]
    fn test_bgra_rows_reject_short_buffer() {
        assert!(bgra_rows_to_rgb(&[0; 15], 8, 2, 2).is_none());
        assert!(bgra_rows_to_rgb(&[0; 16], 4, 2, 2).is_none());
        assert!(bgra_rows_to_rgb(&[], 0, 0, 0).is_none());
    }

    #[test]
    fn test_single_page_size_at_96_dpi() {
        let backend = MemoryBackend::new(vec![MemoryPage::new(612.0, 792.0)]);
        let outcome = Rasterizer::new(&backend)
            .with_resolution(Some(96.0))
            .render(PDF, 0, None, None);

        assert_eq!(outcome.len(), 1);
        assert_eq!(outcome.stop, None);
        assert_eq!(outcome.pages[0].width(), (612.0_f64 * 96.0 / 72.0).round() as u32);
        assert_eq!(outcome.pages[0].height(), (792.0_f64 * 96.0 / 72.0).round() as u32);
    }

    #[test]
    fn test_all_remaining_pages() {
        let backend = MemoryBackend::new(five_pages());
        let rasterizer = Rasterizer::new(&backend).with_resolution(Some(72.0));

        let outcome = rasterizer.render(PDF, 2, None, None);
        let indices: Vec<usize> = outcome.pages.iter().map(|p| p.page_index).collect();
        assert_eq!(indices, vec![2, 3, 4]);

        assert_eq!(rasterizer.render(PDF, 0, Some(0), None).len(), 5);
    }

    #[test]
    fn test_first_page_beyond_end_yields_nothing() {
        let backend = MemoryBackend::new(five_pages());
        let outcome = Rasterizer::new(&backend).render(PDF, 7, Some(2), None);
        assert!(outcome.is_empty());
        assert_eq!(outcome.stop, None);
        assert!(backend.loaded_pages().is_empty());
    }

    #[test]
    fn test_page_load_failure_stops_loop() {
        let mut pages = five_pages();
        pages[2] = pages[2].clone().failing();
        let backend = MemoryBackend::new(pages);

        let outcome = Rasterizer::new(&backend).render(PDF, 0, None, None);
        let indices: Vec<usize> = outcome.pages.iter().map(|p| p.page_index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(outcome.stop, Some(RasterStop::PageLoad { page_index: 2 }));
        assert_eq!(backend.loaded_pages(), vec![0, 1, 2]);
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_unreadable_document() {
        let backend = MemoryBackend::new(five_pages());
        let outcome = Rasterizer::new(&backend).render(b"garbage", 0, None, None);
        assert!(outcome.is_empty());
        assert_eq!(outcome.stop, Some(RasterStop::Unreadable));
    }

    #[test]
    fn test_null_backend_renders_nothing() {
        let outcome = Rasterizer::new(&NullBackend).render(PDF, 0, None, None);
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_background_follows_transparency() {
        let backend = MemoryBackend::new(vec![
            MemoryPage::new(72.0, 72.0),
            MemoryPage::new(72.0, 72.0).transparent(),
        ]);
        let outcome = Rasterizer::new(&backend)
            .with_resolution(Some(72.0))
            .render(PDF, 0, None, None);

        assert_eq!(outcome.pages[0].bitmap.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(outcome.pages[1].bitmap.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_content_then_widgets_with_channel_swap() {
        // ink is BGRA: blue=10, green=20, red=30
        let backend = MemoryBackend::new(vec![MemoryPage::new(4.0, 4.0)
            .with_ink([10, 20, 30, 255])
            .with_widget_ink([1, 2, 3, 255])])
        .with_stride_padding(7);
        let outcome = Rasterizer::new(&backend)
            .with_resolution(Some(72.0))
            .render(PDF, 0, None, None);

        let bitmap = &outcome.pages[0].bitmap;
        assert_eq!(bitmap.get_pixel(0, 0).0, [3, 2, 1]);
        assert_eq!(bitmap.get_pixel(3, 3).0, [30, 20, 10]);
    }

    #[test]
    fn test_size_hint_overrides_page_size() {
        let backend = MemoryBackend::new(vec![MemoryPage::new(612.0, 792.0)]);
        // 2540 x 1270 mm100 = 72 x 36 pt
        let outcome = Rasterizer::new(&backend).with_resolution(Some(96.0)).render(
            PDF,
            0,
            None,
            Some(SizeHint::new(2540.0, 1270.0)),
        );
        assert_eq!((outcome.pages[0].width(), outcome.pages[0].height()), (96, 48));
    }

    #[test]
    fn test_size_hint_with_zero_dimension_is_ignored() {
        let backend = MemoryBackend::new(vec![MemoryPage::new(72.0, 72.0)]);
        let outcome = Rasterizer::new(&backend).with_resolution(Some(96.0)).render(
            PDF,
            0,
            None,
            Some(SizeHint::new(2540.0, 0.0)),
        );
        assert_eq!((outcome.pages[0].width(), outcome.pages[0].height()), (96, 96));
    }

    #[test]
    fn test_allocation_failure_keeps_prefix() {
        let backend = MemoryBackend::new(vec![
            MemoryPage::new(10.0, 10.0),
            MemoryPage::new(1000.0, 1000.0),
            MemoryPage::new(10.0, 10.0),
        ])
        .with_max_bitmap_bytes(10_000);
        let outcome = Rasterizer::new(&backend)
            .with_resolution(Some(72.0))
            .render(PDF, 0, None, None);

        assert_eq!(outcome.len(), 1);
        assert_eq!(
            outcome.stop,
            Some(RasterStop::BitmapAllocation {
                page_index: 1,
                width: 1000,
                height: 1000
            })
        );
        assert_eq!(backend.open_handles(), 0);
    }

    #[test]
    fn test_pixel_ceiling_counts_as_allocation_failure() {
        let backend = MemoryBackend::new(vec![MemoryPage::new(100.0, 100.0)]);
        let outcome = Rasterizer::new(&backend)
            .with_resolution(Some(72.0))
            .with_max_bitmap_pixels(9_999)
            .render(PDF, 0, None, None);
        assert!(outcome.is_empty());
        assert!(matches!(outcome.stop, Some(RasterStop::BitmapAllocation { .. })));
    }

    #[test]
    fn test_handle_lifecycle_order() {
        let backend = MemoryBackend::new(vec![MemoryPage::new(1.0, 1.0)]);
        Rasterizer::new(&backend)
            .with_resolution(Some(72.0))
            .render(PDF, 0, None, None);

        assert_eq!(
            backend.events(),
            vec![
                MemoryEvent::OpenDocument,
                MemoryEvent::InitForm,
                MemoryEvent::LoadPage(0),
                MemoryEvent::CreateBitmap {
                    width: 1,
                    height: 1
                },
                MemoryEvent::RenderPage(0),
                MemoryEvent::DrawForm(0),
                MemoryEvent::DestroyBitmap,
                MemoryEvent::ClosePage(0),
                MemoryEvent::ExitForm,
                MemoryEvent::CloseDocument,
            ]
        );
    }

    #[test]
    fn test_png_encoding() {
        let backend = MemoryBackend::new(vec![MemoryPage::new(8.0, 8.0)]);
        let outcome = Rasterizer::new(&backend)
            .with_resolution(Some(72.0))
            .render(PDF, 0, None, None);
        let png = outcome.pages[0].to_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
