//! Sends the selected document and its annotations to the save endpoint.

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

use doc_model::AnnotationRecord;
use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Path of the save endpoint, relative to the configured base URL.
pub const SAVE_PATH: &str = "/save";

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("server reported the save as unsuccessful")]
    Rejected,
}

/// Everything one save submits: the original file plus the annotation list.
#[derive(Debug, Clone, Copy)]
pub struct SaveRequest<'a> {
    pub file_name: &'a str,
    pub mime_type: &'a str,
    pub file_bytes: &'a [u8],
    pub annotations: &'a [AnnotationRecord],
}

pub trait SaveTransport {
    fn save(&self, request: &SaveRequest<'_>) -> Result<(), TransportError>;
}

#[derive(Deserialize)]
struct SaveResponse {
    #[serde(default)]
    success: bool,
}

/// Interprets a 2xx response body. Anything but `{"success": true}` fails;
/// a JSON object without the flag counts as a rejection.
pub fn parse_save_response(body: &str) -> Result<(), TransportError> {
    let response: SaveResponse = serde_json::from_str(body)
        .map_err(|err| TransportError::InvalidResponse(err.to_string()))?;

    if response.success {
        Ok(())
    } else {
        Err(TransportError::Rejected)
    }
}

/// Multipart POST to `{base_url}/save`.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpTransport {
    /// `base_url` should be like `http://localhost:8000` (no trailing slash).
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, reqwest::blocking::Client::new())
    }

    pub fn with_client(base_url: &str, client: reqwest::blocking::Client) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn save_url(&self) -> String {
        format!("{}{}", self.base_url, SAVE_PATH)
    }
}

impl SaveTransport for HttpTransport {
    fn save(&self, request: &SaveRequest<'_>) -> Result<(), TransportError> {
        let url = self.save_url();
        let annotations = serde_json::to_string(request.annotations)?;

        let file = Part::bytes(request.file_bytes.to_vec())
            .file_name(request.file_name.to_owned())
            .mime_str(request.mime_type)?;
        let form = Form::new().part("file", file).text("annotations", annotations);

        info!(url = %url, count = request.annotations.len(), "saving annotations");
        let resp = self.client.post(&url).multipart(form).send()?;

        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        if !status.is_success() {
            warn!(status = status.as_u16(), "save endpoint returned an error");
            return Err(TransportError::Server { status: status.as_u16(), body });
        }

        parse_save_response(&body)
    }
}
