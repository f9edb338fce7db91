//! File selection: only PDF uploads are accepted.

use std::fs;
use std::path::Path;

pub const PDF_MIME_TYPE: &str = "application/pdf";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Please upload a valid PDF file.")]
    NotPdf { mime_type: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A selected file, kept verbatim so it can be forwarded on save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfUpload {
    file_name: String,
    mime_type: String,
    bytes: Vec<u8>,
}

impl PdfUpload {
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, UploadError> {
        let mime_type = mime_type.into();
        if !is_pdf_mime(&mime_type) {
            return Err(UploadError::NotPdf { mime_type });
        }

        Ok(Self { file_name: file_name.into(), mime_type, bytes })
    }

    /// Reads a file from disk, deriving its MIME type from the extension the
    /// way a browser file picker does.
    pub fn from_path(path: &Path) -> Result<Self, UploadError> {
        let mime_type = mime_guess::from_path(path).first_or_octet_stream().essence_str().to_owned();
        if !is_pdf_mime(&mime_type) {
            return Err(UploadError::NotPdf { mime_type });
        }

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_owned());

        Self::new(file_name, mime_type, fs::read(path)?)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

fn is_pdf_mime(mime_type: &str) -> bool {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case(PDF_MIME_TYPE)
}
