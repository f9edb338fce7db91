use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionMode {
    #[default]
    Neutral,
    Highlight,
    Comment,
}

/// Tracks which click behavior is active. Highlight and comment modes are
/// mutually exclusive; activating one turns the other off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeController {
    mode: InteractionMode,
}

impl ModeController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn is_active(&self) -> bool {
        self.mode != InteractionMode::Neutral
    }

    pub fn toggle_highlight(&mut self) -> InteractionMode {
        self.toggle(InteractionMode::Highlight)
    }

    pub fn toggle_comment(&mut self) -> InteractionMode {
        self.toggle(InteractionMode::Comment)
    }

    fn toggle(&mut self, target: InteractionMode) -> InteractionMode {
        self.mode = if self.mode == target { InteractionMode::Neutral } else { target };
        self.mode
    }
}
