mod dispatch;
mod overlay;
mod prompt;

pub use dispatch::{ClickDispatcher, ClickOutcome, ClickPoint, IgnoreReason};
pub use overlay::{OverlayElement, OverlayLayer, COMMENT_GLYPH};
pub use prompt::{CommentPrompt, PendingComment, PromptError};

use doc_model::{DocumentSession, ResolverPolicy};

/// A page matched by a container offset, with the offset of its top edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageHit {
    pub page: u32,
    pub top: f64,
}

impl PageHit {
    /// Converts a container y offset into the page's local space.
    pub fn local_y(&self, y: f64) -> f64 {
        (y - self.top).max(0.0)
    }
}

/// Vertical stack of rendered pages inside the viewer container.
///
/// Pages that have not finished rendering have no surface yet and are
/// skipped by every lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    heights: Vec<Option<f64>>,
    policy: ResolverPolicy,
}

impl PageLayout {
    pub fn new(heights: Vec<Option<f64>>, policy: ResolverPolicy) -> Self {
        Self { heights, policy }
    }

    pub fn from_session(session: &DocumentSession, policy: ResolverPolicy) -> Self {
        Self::new(session.page_heights(), policy)
    }

    pub fn policy(&self) -> ResolverPolicy {
        self.policy
    }

    pub fn resolve(&self, y: f64) -> Option<PageHit> {
        if !y.is_finite() || y < 0.0 {
            return None;
        }

        match self.policy {
            ResolverPolicy::IndexScaled => self.rendered().find_map(|(page, height)| {
                let scale = f64::from(page);
                (y < height * scale).then(|| PageHit { page, top: height * (scale - 1.0) })
            }),
            ResolverPolicy::Cumulative => {
                let mut top = 0.0;
                for (page, height) in self.rendered() {
                    if y < top + height {
                        return Some(PageHit { page, top });
                    }
                    top += height;
                }
                None
            }
        }
    }

    /// Container offset of a rendered page's top edge.
    pub fn page_top(&self, page: u32) -> Option<f64> {
        match self.policy {
            ResolverPolicy::IndexScaled => {
                let height = self.height(page)?;
                Some(height * (f64::from(page) - 1.0))
            }
            ResolverPolicy::Cumulative => {
                self.height(page)?;
                Some(
                    self.rendered()
                        .take_while(|(candidate, _)| *candidate < page)
                        .map(|(_, height)| height)
                        .sum(),
                )
            }
        }
    }

    fn height(&self, page: u32) -> Option<f64> {
        let index = page.checked_sub(1)? as usize;
        self.heights.get(index).copied().flatten()
    }

    fn rendered(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.heights
            .iter()
            .enumerate()
            .filter_map(|(index, height)| height.map(|height| (index as u32 + 1, height)))
    }
}
