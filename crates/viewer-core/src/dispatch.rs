use crate::{CommentPrompt, PageLayout, PendingComment};
use doc_model::{
    apply_session_action, AnnotationRecord, DocumentSession, HighlightSize, InteractionMode,
    ResolverPolicy, SessionAction,
};
use tracing::debug;

/// Pointer position relative to the top-left of the page container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoActiveMode,
    OutsidePages,
    InvalidPosition,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    Ignored(IgnoreReason),
    /// The highlight was appended and should be drawn right away.
    Highlighted(AnnotationRecord),
    CommentPending(PendingComment),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickDispatcher {
    policy: ResolverPolicy,
    highlight_size: HighlightSize,
}

impl Default for ClickDispatcher {
    fn default() -> Self {
        Self::new(ResolverPolicy::default(), HighlightSize::default())
    }
}

impl ClickDispatcher {
    pub fn new(policy: ResolverPolicy, highlight_size: HighlightSize) -> Self {
        Self { policy, highlight_size }
    }

    pub fn policy(&self) -> ResolverPolicy {
        self.policy
    }

    pub fn dispatch(
        &self,
        session: &mut DocumentSession,
        prompt: &mut CommentPrompt,
        click: ClickPoint,
    ) -> ClickOutcome {
        let highlighting = match session.mode() {
            InteractionMode::Highlight => true,
            InteractionMode::Comment => false,
            InteractionMode::Neutral => return ClickOutcome::Ignored(IgnoreReason::NoActiveMode),
        };

        let layout = PageLayout::from_session(session, self.policy);
        let Some(hit) = layout.resolve(click.y) else {
            debug!(x = click.x, y = click.y, "click outside rendered pages");
            return ClickOutcome::Ignored(IgnoreReason::OutsidePages);
        };

        let local_y = hit.local_y(click.y);

        if highlighting {
            let Ok(record) = AnnotationRecord::highlight_with_size(
                hit.page,
                click.x,
                local_y,
                self.highlight_size,
            ) else {
                return ClickOutcome::Ignored(IgnoreReason::InvalidPosition);
            };

            debug!(page = hit.page, x = click.x, y = local_y, "highlight added");
            apply_session_action(session, SessionAction::Append(record.clone()));
            return ClickOutcome::Highlighted(record);
        }

        if !click.x.is_finite() || click.x < 0.0 {
            return ClickOutcome::Ignored(IgnoreReason::InvalidPosition);
        }

        let pending = PendingComment { page: hit.page, x: click.x, y: local_y };
        prompt.open(pending);
        ClickOutcome::CommentPending(pending)
    }
}
