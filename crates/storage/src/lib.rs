use directories::ProjectDirs;
use doc_model::{AnnotationRecord, HighlightSize, ResolverPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_FILE: &str = "config.json";
const SIDECAR_SUFFIX: &str = ".annotations.json";

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local config directory")]
    NoConfigDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// User-level viewer settings. Missing keys fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub endpoint: String,
    pub render_scale: f32,
    pub resolver: ResolverPolicy,
    pub highlight_width: f64,
    pub highlight_height: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let size = HighlightSize::default();
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            render_scale: 1.5,
            resolver: ResolverPolicy::default(),
            highlight_width: size.width,
            highlight_height: size.height,
        }
    }
}

impl ViewerConfig {
    pub fn highlight_size(&self) -> HighlightSize {
        HighlightSize { width: self.highlight_width, height: self.highlight_height }
    }
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "Pagemark", "Pagemark")
            .ok_or(StorageError::NoConfigDirectory)?;

        Ok(Self { root: dirs.config_dir().to_path_buf() })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn load_config(&self) -> Result<ViewerConfig, StorageError> {
        let path = self.config_path();
        if !path.exists() {
            return Ok(ViewerConfig::default());
        }

        let bytes = fs::read(&path)?;
        let config = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), "loaded viewer config");

        Ok(config)
    }

    pub fn save_config(&self, config: &ViewerConfig) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)?;

        let bytes = serde_json::to_vec_pretty(config)?;
        fs::write(self.config_path(), bytes)?;
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }
}

/// `doc.pdf` → `doc.pdf.annotations.json`, next to the document.
pub fn annotations_path(pdf: &Path) -> PathBuf {
    let mut name = pdf.as_os_str().to_owned();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

pub fn load_annotations(path: &Path) -> Result<Vec<AnnotationRecord>, StorageError> {
    let bytes = fs::read(path)?;
    let records: Vec<AnnotationRecord> = serde_json::from_slice(&bytes)?;
    debug!(path = %path.display(), count = records.len(), "loaded annotations");
    Ok(records)
}

pub fn save_annotations(path: &Path, records: &[AnnotationRecord]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let bytes = serde_json::to_vec_pretty(records)?;
    fs::write(path, bytes)?;
    debug!(path = %path.display(), count = records.len(), "saved annotations");
    Ok(())
}
