use crate::PageLayout;
use doc_model::{AnnotationRecord, AnnotationStore};
use tracing::debug;

pub const COMMENT_GLYPH: &str = "💬";

/// An absolutely positioned element drawn over the page stack. Offsets are
/// in container coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayElement {
    HighlightBox { page: u32, left: f64, top: f64, width: f64, height: f64 },
    CommentMarker { page: u32, left: f64, top: f64, glyph: &'static str, tooltip: String },
}

impl OverlayElement {
    pub fn for_record(record: &AnnotationRecord, page_top: f64) -> Self {
        match record {
            AnnotationRecord::Highlight(highlight) => Self::HighlightBox {
                page: highlight.page(),
                left: highlight.x(),
                top: page_top + highlight.y(),
                width: highlight.width(),
                height: highlight.height(),
            },
            AnnotationRecord::Comment(comment) => Self::CommentMarker {
                page: comment.page(),
                left: comment.x(),
                top: page_top + comment.y(),
                glyph: COMMENT_GLYPH,
                tooltip: comment.text().to_owned(),
            },
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            Self::HighlightBox { page, .. } | Self::CommentMarker { page, .. } => *page,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayLayer {
    elements: Vec<OverlayElement>,
}

impl OverlayLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws one record. Returns false when its page has no surface yet.
    pub fn draw(&mut self, record: &AnnotationRecord, layout: &PageLayout) -> bool {
        let Some(page_top) = layout.page_top(record.page()) else {
            return false;
        };

        self.elements.push(OverlayElement::for_record(record, page_top));
        true
    }

    /// Redraws every stored record of a page that just finished rendering.
    pub fn replay_page(&mut self, store: &AnnotationStore, page: u32, layout: &PageLayout) -> usize {
        let drawn = store.for_page(page).filter(|record| self.draw(record, layout)).count();
        debug!(page, drawn, "replayed annotations");
        drawn
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    pub fn elements(&self) -> &[OverlayElement] {
        &self.elements
    }

    pub fn for_page(&self, page: u32) -> impl Iterator<Item = &OverlayElement> + '_ {
        self.elements.iter().filter(move |element| element.page() == page)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}
