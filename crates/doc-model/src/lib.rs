mod annotation;
mod mode;

pub use annotation::{
    AnnotationKind, AnnotationRecord, AnnotationStore, Comment, Highlight, HighlightSize,
    RecordError, DEFAULT_HIGHLIGHT_HEIGHT, DEFAULT_HIGHLIGHT_WIDTH,
};
pub use mode::{InteractionMode, ModeController};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How a container offset is mapped to a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverPolicy {
    /// Page n matches when `y < height(n) * n`. Exact only when every page
    /// has the same height.
    #[default]
    IndexScaled,
    /// Running sum of the rendered page heights.
    Cumulative,
}

/// Pixel size of a rendered page surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: String,
    pub page_count: u32,
}

/// One loaded document: its page surfaces, annotations and interaction mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentSession {
    document: Option<DocumentInfo>,
    surfaces: Vec<Option<SurfaceSize>>,
    store: AnnotationStore,
    modes: ModeController,
}

impl DocumentSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self) -> Option<&DocumentInfo> {
        self.document.as_ref()
    }

    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, |document| document.page_count)
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn mode(&self) -> InteractionMode {
        self.modes.mode()
    }

    /// Surface of a 1-based page, once that page has rendered.
    pub fn surface(&self, page: u32) -> Option<SurfaceSize> {
        let index = page.checked_sub(1)? as usize;
        self.surfaces.get(index).copied().flatten()
    }

    /// Rendered heights in page order, `None` for pages still rendering.
    pub fn page_heights(&self) -> Vec<Option<f64>> {
        self.surfaces.iter().map(|surface| surface.map(|size| f64::from(size.height))).collect()
    }

    pub fn check_page(&self, page: u32) -> Result<(), RecordError> {
        if page == 0 {
            return Err(RecordError::ZeroPage);
        }

        let page_count = self.page_count();
        if page > page_count {
            return Err(RecordError::PageOutOfRange { page, page_count });
        }

        Ok(())
    }

    /// Loads previously saved records into an empty store. Nothing is added
    /// unless every record falls inside the document.
    pub fn seed(&mut self, records: Vec<AnnotationRecord>) -> Result<(), RecordError> {
        for record in &records {
            self.check_page(record.page())?;
        }

        debug!(count = records.len(), "seeding annotation store");
        for record in records {
            self.store.append(record);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    OpenDocument { title: String, page_count: u32 },
    CloseDocument,
    PageRendered { page: u32, surface: SurfaceSize },
    ToggleHighlight,
    ToggleComment,
    Append(AnnotationRecord),
}

pub fn apply_session_action(state: &mut DocumentSession, action: SessionAction) {
    match action {
        SessionAction::OpenDocument { title, page_count } => {
            *state = DocumentSession {
                document: Some(DocumentInfo { title, page_count }),
                surfaces: vec![None; page_count as usize],
                store: AnnotationStore::new(),
                modes: ModeController::new(),
            };
        }
        SessionAction::CloseDocument => {
            *state = DocumentSession::default();
        }
        SessionAction::PageRendered { page, surface } => {
            let Some(slot) =
                page.checked_sub(1).and_then(|index| state.surfaces.get_mut(index as usize))
            else {
                warn!(page, "render result for a page outside the document");
                return;
            };

            *slot = Some(surface);
        }
        SessionAction::ToggleHighlight => {
            state.modes.toggle_highlight();
        }
        SessionAction::ToggleComment => {
            state.modes.toggle_comment();
        }
        SessionAction::Append(record) => {
            if let Err(err) = state.check_page(record.page()) {
                warn!(%err, "dropping annotation outside the document");
                return;
            }

            state.store.append(record);
        }
    }
}
