//! PDFium rendering backend
//!
//! Drives the raw PDFium C API through `pdfium-render`'s bindings. PDFium is
//! not reentrant: a process-wide lock is held for as long as any document
//! handle is open, and every other handle borrows its document. The library
//! is bound and initialised once per process, under the same lock, and never
//! destroyed.

use super::{
    AnnotationSubtype, EngineAnnotation, EngineBitmap, EngineDocument, EnginePage, PdfVersion,
    PointRect, RenderingBackend, WriteSink,
};
use crate::error::{Error, Result};
use parking_lot::{Mutex, MutexGuard};
use pdfium_render::prelude::*;
use std::ffi::c_void;
use std::os::raw::{c_int, c_ulong};
use std::path::Path;
use std::sync::OnceLock;

static ENGINE_LOCK: Mutex<()> = parking_lot::const_mutex(());
static SHARED_PDFIUM: OnceLock<SharedPdfium> = OnceLock::new();

struct SharedPdfium(Pdfium);

// SAFETY: the bindings are only called while ENGINE_LOCK is held, either
// during initialisation or through a `PdfiumDocument` that owns the guard.
unsafe impl Send for SharedPdfium {}
unsafe impl Sync for SharedPdfium {}

const KEY_POPUP: &str = "Popup";
const KEY_TITLE: &str = "T";
const KEY_CONTENTS: &str = "Contents";
const KEY_MODIFICATION_DATE: &str = "M";

/// Bind to PDFium, trying an explicit path first, then `./`, `/opt/pdfium/lib`
/// and finally the system library.
fn create_pdfium(library_dir: Option<&Path>) -> Result<Pdfium> {
    let explicit = library_dir
        .and_then(|dir| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)).ok());

    let bindings = explicit
        .map(Ok)
        .unwrap_or_else(|| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        })
        .or_else(|_| {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(
                "/opt/pdfium/lib",
            ))
        })
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| Error::Pdfium {
            reason: format!("Failed to initialize PDFium: {}", e),
        })?;

    Ok(Pdfium::new(bindings))
}

/// The process-wide PDFium instance, bound on first use.
///
/// `library_dir` only matters for the call that binds the library; later
/// callers share whatever was bound first.
fn shared_pdfium(library_dir: Option<&Path>) -> Result<&'static Pdfium> {
    if let Some(shared) = SHARED_PDFIUM.get() {
        return Ok(&shared.0);
    }
    let _lock = ENGINE_LOCK.lock();
    if let Some(shared) = SHARED_PDFIUM.get() {
        return Ok(&shared.0);
    }
    let pdfium = create_pdfium(library_dir)?;
    tracing::debug!(dir = ?library_dir, "PDFium bound");
    Ok(&SHARED_PDFIUM.get_or_init(|| SharedPdfium(pdfium)).0)
}

/// [`RenderingBackend`] backed by the PDFium library.
///
/// Every backend shares one PDFium instance, so creating and dropping
/// backends never re-initialises or tears down the library.
pub struct PdfiumBackend {
    pdfium: &'static Pdfium,
}

impl PdfiumBackend {
    /// Bind to PDFium from the default locations.
    pub fn new() -> Result<Self> {
        Self::with_library_dir(None)
    }

    /// Bind to PDFium, looking in `library_dir` before the default locations.
    pub fn with_library_dir(library_dir: Option<&Path>) -> Result<Self> {
        Ok(Self {
            pdfium: shared_pdfium(library_dir)?,
        })
    }

    fn bindings(&self) -> &'static dyn PdfiumLibraryBindings {
        self.pdfium.bindings()
    }
}

impl RenderingBackend for PdfiumBackend {
    type Document<'a> = PdfiumDocument<'a>;

    fn name(&self) -> &'static str {
        "pdfium"
    }

    /// The returned document holds the engine lock until dropped. The lock is
    /// not reentrant: opening a second document on the same thread while the
    /// first is alive deadlocks.
    fn open_document<'a>(&'a self, data: &'a [u8]) -> Option<PdfiumDocument<'a>> {
        let lock = ENGINE_LOCK.lock();
        let bindings = self.bindings();
        let handle = bindings.FPDF_LoadMemDocument64(data, None);
        if handle.is_null() {
            return None;
        }
        Some(PdfiumDocument {
            bindings,
            handle,
            _data: data,
            _lock: lock,
        })
    }
}

pub struct PdfiumDocument<'a> {
    bindings: &'a dyn PdfiumLibraryBindings,
    handle: FPDF_DOCUMENT,
    // PDFium reads from the caller's buffer for the document's lifetime.
    _data: &'a [u8],
    _lock: MutexGuard<'static, ()>,
}

impl Drop for PdfiumDocument<'_> {
    fn drop(&mut self) {
        self.bindings.FPDF_CloseDocument(self.handle);
    }
}

pub struct PdfiumForm<'d> {
    bindings: &'d dyn PdfiumLibraryBindings,
    handle: FPDF_FORMHANDLE,
    // PDFium keeps a pointer to the callback table until exit.
    _info: Box<FPDF_FORMFILLINFO>,
}

impl Drop for PdfiumForm<'_> {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            self.bindings.FPDFDOC_ExitFormFillEnvironment(self.handle);
        }
    }
}

pub struct PdfiumPage<'d> {
    bindings: &'d dyn PdfiumLibraryBindings,
    handle: FPDF_PAGE,
}

impl Drop for PdfiumPage<'_> {
    fn drop(&mut self) {
        self.bindings.FPDF_ClosePage(self.handle);
    }
}

pub struct PdfiumBitmap<'d> {
    bindings: &'d dyn PdfiumLibraryBindings,
    handle: FPDF_BITMAP,
    width: usize,
    height: usize,
}

impl Drop for PdfiumBitmap<'_> {
    fn drop(&mut self) {
        self.bindings.FPDFBitmap_Destroy(self.handle);
    }
}

/// `FPDF_FILEWRITE` followed by the sink it forwards to.
#[repr(C)]
struct SinkWriter<'s> {
    raw: FPDF_FILEWRITE,
    sink: &'s mut dyn WriteSink,
}

unsafe extern "C" fn write_block(
    this: *mut FPDF_FILEWRITE,
    data: *const c_void,
    size: c_ulong,
) -> c_int {
    if this.is_null() {
        return 0;
    }
    // SAFETY: `this` is the first field of the `SinkWriter` handed to
    // FPDF_SaveWithVersion, which outlives the save call.
    let writer = unsafe { &mut *(this as *mut SinkWriter<'_>) };
    let bytes = if size == 0 || data.is_null() {
        &[][..]
    } else {
        // SAFETY: PDFium passes a readable block of `size` bytes.
        unsafe { std::slice::from_raw_parts(data as *const u8, size as usize) }
    };
    c_int::from(writer.sink.write(bytes))
}

impl<'a> EngineDocument for PdfiumDocument<'a> {
    type Form<'d> = PdfiumForm<'d> where Self: 'd;
    type Page<'d> = PdfiumPage<'d> where Self: 'd;
    type Bitmap<'d> = PdfiumBitmap<'d> where Self: 'd;

    fn page_count(&self) -> usize {
        usize::try_from(self.bindings.FPDF_GetPageCount(self.handle)).unwrap_or(0)
    }

    fn init_form(&self) -> PdfiumForm<'_> {
        // SAFETY: an all-zero FPDF_FORMFILLINFO is a valid table with no callbacks.
        let mut info: Box<FPDF_FORMFILLINFO> = Box::new(unsafe { std::mem::zeroed() });
        info.version = 1;
        let handle = self
            .bindings
            .FPDFDOC_InitFormFillEnvironment(self.handle, info.as_mut());
        if handle.is_null() {
            tracing::debug!("PDFium form-fill environment unavailable");
        }
        PdfiumForm {
            bindings: self.bindings,
            handle,
            _info: info,
        }
    }

    fn load_page(&self, index: usize) -> Option<PdfiumPage<'_>> {
        let index = c_int::try_from(index).ok()?;
        let handle = self.bindings.FPDF_LoadPage(self.handle, index);
        if handle.is_null() {
            return None;
        }
        Some(PdfiumPage {
            bindings: self.bindings,
            handle,
        })
    }

    fn create_bitmap(&self, width: usize, height: usize) -> Option<PdfiumBitmap<'_>> {
        let w = c_int::try_from(width).ok()?;
        let h = c_int::try_from(height).ok()?;
        let handle = self.bindings.FPDFBitmap_Create(w, h, 1);
        if handle.is_null() {
            return None;
        }
        Some(PdfiumBitmap {
            bindings: self.bindings,
            handle,
            width,
            height,
        })
    }

    fn render_page(&self, bitmap: &mut PdfiumBitmap<'_>, page: &PdfiumPage<'_>) {
        self.bindings.FPDF_RenderPageBitmap(
            bitmap.handle,
            page.handle,
            0,
            0,
            bitmap.width as c_int,
            bitmap.height as c_int,
            0,
            0,
        );
    }

    fn draw_form(&self, form: &PdfiumForm<'_>, bitmap: &mut PdfiumBitmap<'_>, page: &PdfiumPage<'_>) {
        if form.handle.is_null() {
            return;
        }
        self.bindings.FPDF_FFLDraw(
            form.handle,
            bitmap.handle,
            page.handle,
            0,
            0,
            bitmap.width as c_int,
            bitmap.height as c_int,
            0,
            0,
        );
    }

    fn save_with_version(&self, version: PdfVersion, sink: &mut dyn WriteSink) -> bool {
        let mut writer = SinkWriter {
            raw: FPDF_FILEWRITE {
                version: 1,
                WriteBlock: Some(write_block),
            },
            sink,
        };
        let saved = self.bindings.FPDF_SaveWithVersion(
            self.handle,
            &mut writer.raw as *mut FPDF_FILEWRITE,
            0,
            version.engine_code(),
        );
        saved != 0
    }
}

impl PdfiumPage<'_> {
    fn annotation(&self, index: c_int) -> Option<PdfiumAnnotation<'_>> {
        let handle = self.bindings.FPDFPage_GetAnnot(self.handle, index);
        if handle.is_null() {
            return None;
        }
        Some(PdfiumAnnotation {
            bindings: self.bindings,
            handle,
        })
    }
}

impl EnginePage for PdfiumPage<'_> {
    fn width_points(&self) -> f64 {
        f64::from(self.bindings.FPDF_GetPageWidthF(self.handle))
    }

    fn height_points(&self) -> f64 {
        f64::from(self.bindings.FPDF_GetPageHeightF(self.handle))
    }

    fn has_transparency(&self) -> bool {
        self.bindings.FPDFPage_HasTransparency(self.handle) != 0
    }

    fn annotations(&self) -> Vec<EngineAnnotation> {
        let count = self.bindings.FPDFPage_GetAnnotCount(self.handle);
        (0..count)
            .filter_map(|index| self.annotation(index))
            .map(|annotation| annotation.read())
            .collect()
    }
}

struct PdfiumAnnotation<'p> {
    bindings: &'p dyn PdfiumLibraryBindings,
    handle: FPDF_ANNOTATION,
}

impl PdfiumAnnotation<'_> {
    fn read(&self) -> EngineAnnotation {
        let subtype = AnnotationSubtype::from_code(self.bindings.FPDFAnnot_GetSubtype(self.handle) as i32);
        let has_popup = self.bindings.FPDFAnnot_HasKey(self.handle, KEY_POPUP) != 0;

        let mut raw = FS_RECTF {
            left: 0.0,
            top: 0.0,
            right: 0.0,
            bottom: 0.0,
        };
        let rect = if self.bindings.FPDFAnnot_GetRect(self.handle, &mut raw) != 0 {
            PointRect {
                left: f64::from(raw.left),
                bottom: f64::from(raw.bottom),
                right: f64::from(raw.right),
                top: f64::from(raw.top),
            }
        } else {
            PointRect::default()
        };

        EngineAnnotation {
            subtype: Some(subtype),
            has_popup,
            rect,
            title: self.string_value(KEY_TITLE),
            contents: self.string_value(KEY_CONTENTS),
            modification_date: self.string_value(KEY_MODIFICATION_DATE),
        }
    }

    /// Read a string entry of the annotation dictionary (UTF-16LE, NUL terminated).
    fn string_value(&self, key: &str) -> String {
        let len = self
            .bindings
            .FPDFAnnot_GetStringValue(self.handle, key, std::ptr::null_mut(), 0);
        if len <= 2 {
            return String::new();
        }

        let mut buffer: Vec<u16> = vec![0; (len / 2) as usize];
        let read = self.bindings.FPDFAnnot_GetStringValue(
            self.handle,
            key,
            buffer.as_mut_ptr(),
            len,
        );
        let units = ((read.min(len) / 2) as usize).saturating_sub(1);
        String::from_utf16_lossy(&buffer[..units])
    }
}

impl Drop for PdfiumAnnotation<'_> {
    fn drop(&mut self) {
        self.bindings.FPDFPage_CloseAnnot(self.handle);
    }
}

impl EngineBitmap for PdfiumBitmap<'_> {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn fill_rect(&mut self, left: usize, top: usize, width: usize, height: usize, color: u32) {
        let _ = self.bindings.FPDFBitmap_FillRect(
            self.handle,
            left as c_int,
            top as c_int,
            width as c_int,
            height as c_int,
            color as FPDF_DWORD,
        );
    }

    fn stride(&self) -> usize {
        usize::try_from(self.bindings.FPDFBitmap_GetStride(self.handle)).unwrap_or(0)
    }

    fn buffer(&self) -> &[u8] {
        let data = self.bindings.FPDFBitmap_GetBuffer(self.handle) as *const u8;
        if data.is_null() {
            return &[];
        }
        // SAFETY: PDFium owns `stride * height` bytes for this bitmap until
        // FPDFBitmap_Destroy, which only runs when `self` is dropped.
        unsafe { std::slice::from_raw_parts(data, self.stride() * self.height) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::backend::MemorySink;

    fn sink_writer(sink: &mut MemorySink) -> SinkWriter<'_> {
        SinkWriter {
            raw: FPDF_FILEWRITE {
                version: 1,
                WriteBlock: Some(write_block),
            },
            sink,
        }
    }

    #[test]
    fn test_write_block_forwards_bytes() {
        let mut sink = MemorySink::new();
        let mut writer = sink_writer(&mut sink);
        let block = b"%PDF-1.6";

        let written = unsafe {
            write_block(
                &mut writer.raw,
                block.as_ptr() as *const c_void,
                block.len() as c_ulong,
            )
        };

        assert_eq!(written, 1);
        assert_eq!(sink.as_bytes(), b"%PDF-1.6");
    }

    #[test]
    fn test_write_block_empty_and_null_blocks() {
        let mut sink = MemorySink::new();
        let mut writer = sink_writer(&mut sink);
        let block = b"ignored";

        let zero_size =
            unsafe { write_block(&mut writer.raw, block.as_ptr() as *const c_void, 0) };
        let null_data = unsafe { write_block(&mut writer.raw, std::ptr::null(), 16) };

        assert_eq!(zero_size, 1);
        assert_eq!(null_data, 1);
        assert!(sink.as_bytes().is_empty());
    }

    #[test]
    fn test_write_block_null_writer() {
        let block = b"%PDF";
        let written = unsafe {
            write_block(
                std::ptr::null_mut(),
                block.as_ptr() as *const c_void,
                block.len() as c_ulong,
            )
        };
        assert_eq!(written, 0);
    }

    #[test]
    fn test_backends_share_one_library() {
        // Skipped where no PDFium library can be found.
        let Ok(first) = PdfiumBackend::new() else {
            return;
        };
        let second = PdfiumBackend::new().unwrap();
        assert!(std::ptr::eq(first.pdfium, second.pdfium));

        drop(first);
        assert!(second.open_document(b"not a pdf").is_none());
        assert!(PdfiumBackend::new().is_ok());
    }
}
