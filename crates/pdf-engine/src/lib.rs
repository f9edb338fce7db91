#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;
pub mod upload;

pub use upload::{PdfUpload, UploadError, PDF_MIME_TYPE};

use image::{ImageBuffer, Rgba};
use lopdf::{Document, Object, ObjectId};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Scale applied to PDF points when rasterizing a page for display.
pub const DEFAULT_RENDER_SCALE: f32 = 1.5;

/// Largest RGBA raster `render_page` will allocate.
pub const MAX_SURFACE_BYTES: u64 = 256 * 1024 * 1024;

/// Bound on `/Parent` hops when looking up inherited page attributes.
const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    /// For engines implemented outside this crate.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    pub const LETTER: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: DEFAULT_RENDER_SCALE }
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("page surface {width}x{height} is too large to render")]
    SurfaceTooLarge { width: u32, height: u32 },
    #[error("backend error: {0}")]
    Backend(String),
}

/// Decodes documents and rasterizes their pages.
///
/// Page indices are 0-based here; the annotation model numbers pages from 1.
pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError>;
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

/// Rendered pixel dimensions of a page at `scale`, rounded like a canvas
/// sized from a fractional viewport.
pub fn surface_dimensions(size: PageSize, scale: f32) -> (u32, u32) {
    let scale = if scale <= 0.0 { 1.0 } else { scale };
    let width = (size.width_pt * scale).round().max(1.0) as u32;
    let height = (size.height_pt * scale).round().max(1.0) as u32;
    (width, height)
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    page_sizes: Vec<PageSize>,
}

/// Pure-Rust engine: reads page geometry with `lopdf` and produces blank
/// page rasters of the right size.
#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (number, object_id) in pages {
            let size = media_box(&doc, object_id).unwrap_or_else(|| {
                debug!(page = number, "no usable MediaBox, assuming Letter");
                PageSize::LETTER
            });
            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(PdfEngineError::Backend("document has no pages".to_owned()));
        }

        Ok(sizes)
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let page_sizes = Self::parse_sizes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        debug!(handle = handle.raw(), pages = page_sizes.len(), "opened document");
        self.docs.insert(handle, DocumentRecord { page_sizes });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.record(handle)?.page_sizes.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        let record = self.record(handle)?;
        record.page_sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: record.page_sizes.len() as u32,
        })
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page_size = self.page_size(handle, request.page_index)?;
        let (width, height) = surface_dimensions(page_size, request.scale);
        if u64::from(width) * u64::from(height) * 4 > MAX_SURFACE_BYTES {
            return Err(PdfEngineError::SurfaceTooLarge { width, height });
        }

        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                image.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                image.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        Ok(image)
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

/// The page's MediaBox, inherited from the nearest `/Pages` ancestor when the
/// page itself has none.
fn media_box(doc: &Document, page_id: ObjectId) -> Option<PageSize> {
    let mut node = doc.get_dictionary(page_id).ok()?;

    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(b"MediaBox") {
            return page_size_from_box(doc, value);
        }
        let parent = node.get(b"Parent").and_then(|parent| parent.as_reference()).ok()?;
        node = doc.get_dictionary(parent).ok()?;
    }

    None
}

fn page_size_from_box(doc: &Document, value: &Object) -> Option<PageSize> {
    let (_, value) = doc.dereference(value).ok()?;
    let array = value.as_array().ok()?;
    if array.len() != 4 {
        return None;
    }

    let mut coords = [0.0_f32; 4];
    for (slot, item) in coords.iter_mut().zip(array) {
        let (_, item) = doc.dereference(item).ok()?;
        *slot = item.as_float().ok()?;
    }

    let [x0, y0, x1, y1] = coords;
    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::blank_pdf;
    use lopdf::dictionary;

    /// One page whose MediaBox lives on the `/Pages` node, stored as an
    /// indirect object.
    fn inherited_media_box_pdf() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let media_box = doc.add_object(Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(595),
            Object::Real(842.0),
        ]));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => media_box,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("in-memory PDF should serialize");
        bytes
    }

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(blank_pdf(&[PageSize::LETTER, PageSize::LETTER])))
            .expect("open should succeed");

        assert_eq!(engine.page_count(handle).expect("count should succeed"), 2);
        assert_eq!(engine.page_size(handle, 1).expect("size should succeed"), PageSize::LETTER);
    }

    #[test]
    fn opens_pdf_from_path() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let path = temp.path().join("doc.pdf");
        fs::write(&path, blank_pdf(&[PageSize::LETTER])).expect("fixture should be written");

        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::from(path.as_path())).expect("open should succeed");
        assert_eq!(engine.page_count(handle).expect("count should succeed"), 1);
    }

    #[test]
    fn render_page_uses_scaled_media_box() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(blank_pdf(&[PageSize::LETTER])))
            .expect("open should succeed");

        let image = engine
            .render_page(handle, RenderRequest::default())
            .expect("render should succeed");

        assert_eq!((image.width(), image.height()), (918, 1188));
    }

    #[test]
    fn surface_dimensions_fall_back_to_unit_scale() {
        assert_eq!(surface_dimensions(PageSize::LETTER, 0.0), (612, 792));
        assert_eq!(surface_dimensions(PageSize { width_pt: 0.2, height_pt: 10.0 }, 1.0), (1, 10));
    }

    #[test]
    fn page_out_of_range_is_reported() {
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(blank_pdf(&[PageSize::LETTER])))
            .expect("open should succeed");

        let err = engine.page_size(handle, 3).expect_err("page 3 does not exist");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 3, page_count: 1 }));
    }

    #[test]
    fn garbage_bytes_fail_to_parse() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(b"not a pdf at all".to_vec()))
            .expect_err("garbage should not parse");

        assert!(matches!(err, PdfEngineError::Parse(_)));
    }

    #[test]
    fn encrypted_marker_is_rejected() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(b"%PDF-1.5\n/Encrypt 5 0 R\n".to_vec()))
            .expect_err("encrypted documents are unsupported");

        assert!(matches!(err, PdfEngineError::EncryptedUnsupported));
    }

    #[test]
    fn invalid_handle_returns_error() {
        let mut engine = LopdfEngine::new();
        let err =
            engine.page_count(DocumentHandle(999)).expect_err("should fail for unknown handle");
        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));

        let err = engine.close(DocumentHandle(999)).expect_err("close should fail too");
        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));
    }

    #[test]
    fn media_box_is_inherited_from_the_page_tree() {
        let mut engine = LopdfEngine::new();
        let handle =
            engine.open(OpenSource::Bytes(inherited_media_box_pdf())).expect("open should succeed");

        assert_eq!(
            engine.page_size(handle, 0).expect("size should succeed"),
            PageSize { width_pt: 595.0, height_pt: 842.0 }
        );
    }

    #[test]
    fn oversized_pages_fail_before_allocating() {
        let huge = PageSize { width_pt: 3e9, height_pt: 3e9 };
        let mut engine = LopdfEngine::new();
        let handle = engine
            .open(OpenSource::Bytes(blank_pdf(&[PageSize::LETTER, huge])))
            .expect("open should succeed");

        let err = engine
            .render_page(handle, RenderRequest { page_index: 1, scale: 1.5 })
            .expect_err("huge page should not render");

        assert!(matches!(err, PdfEngineError::SurfaceTooLarge { width: u32::MAX, height: u32::MAX }));
        assert!(engine.render_page(handle, RenderRequest::default()).is_ok());
    }
}
