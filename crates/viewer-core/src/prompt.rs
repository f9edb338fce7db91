use doc_model::{AnnotationRecord, RecordError};

/// Where a comment will be placed once its text is confirmed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingComment {
    pub page: u32,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PromptError {
    #[error("no comment is pending")]
    NotOpen,
    #[error("Please enter a comment.")]
    EmptyText,
    #[error(transparent)]
    Record(RecordError),
}

/// The modal that collects comment text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentPrompt {
    pending: Option<PendingComment>,
}

impl CommentPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the prompt for a new position, replacing any earlier one.
    pub fn open(&mut self, pending: PendingComment) {
        self.pending = Some(pending);
    }

    pub fn is_open(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<PendingComment> {
        self.pending
    }

    /// Builds the comment. Blank text leaves the prompt open.
    pub fn confirm(&mut self, text: &str) -> Result<AnnotationRecord, PromptError> {
        let pending = self.pending.ok_or(PromptError::NotOpen)?;

        let record = AnnotationRecord::comment(pending.page, pending.x, pending.y, text)
            .map_err(|err| match err {
                RecordError::EmptyCommentText => PromptError::EmptyText,
                other => PromptError::Record(other),
            })?;

        self.pending = None;
        Ok(record)
    }

    /// Close button. Returns whether the prompt was open.
    pub fn close(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// Click on the backdrop outside the prompt.
    pub fn dismiss_outside(&mut self) -> bool {
        self.close()
    }
}
