use url::Url;

use crate::error::ErrorKind;
use crate::protocol::ActionKind;
use crate::protocol::ConversationTurn;

pub const LABEL_INSERT: &str = "Insert";
pub const LABEL_OPEN: &str = "Open";
pub const LABEL_RETRY: &str = "Retry";
pub const LABEL_CANCEL: &str = "Cancel";

/// What the panel is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelMode {
    #[default]
    Hidden,
    /// A request (or web content) is outstanding and nothing is shown yet.
    Loading,
    ShowingResult,
    ShowingWebContent,
    /// Chat with the key-input surface hidden.
    AwaitingFollowup,
    /// Chat with the key-input surface visible; the host field is mirrored
    /// into `pending_followup` while in this mode.
    ComposingFollowup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeightAnimation {
    #[default]
    Idle,
    /// The view is animating toward `target_height_px` and reports
    /// `HeightAnimationFinished { generation }` when done.
    Running { generation: u64 },
}

/// Transient effects the view plays while the core waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualCue {
    Dissolve,
}

/// Render model for the panel. Owned by the controller; views receive it by
/// shared reference only.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelState {
    pub mode: PanelMode,
    pub action_kind: Option<ActionKind>,
    /// The key-input surface is suppressed in favor of the panel.
    pub is_expanded: bool,
    /// Secondary size tier, only used by chat.
    pub is_enlarged: bool,
    pub height_px: f64,
    pub target_height_px: f64,
    pub height_animation: HeightAnimation,
    pub primary_action_label: String,
    pub is_busy: bool,
    pub is_cancellable: bool,
    pub last_error: Option<ErrorKind>,
    pub result_text: Option<String>,
    pub web_url: Option<Url>,
    pub transcript: Vec<ConversationTurn>,
    pub pending_followup: String,
    pub scroll_to_turn: Option<usize>,
    pub visual_cue: Option<VisualCue>,
    /// Fixed when an action is invoked. When set, `toggle` swaps which
    /// surface is visible; otherwise it resizes the content.
    pub inverted_toggle: bool,
    pub allows_toggle: bool,
    pub key_input_visible: bool,
}

impl Default for PanelState {
    fn default() -> Self {
        Self {
            mode: PanelMode::Hidden,
            action_kind: None,
            is_expanded: false,
            is_enlarged: false,
            height_px: 0.0,
            target_height_px: 0.0,
            height_animation: HeightAnimation::Idle,
            primary_action_label: String::new(),
            is_busy: false,
            is_cancellable: false,
            last_error: None,
            result_text: None,
            web_url: None,
            transcript: Vec::new(),
            pending_followup: String::new(),
            scroll_to_turn: None,
            visual_cue: None,
            inverted_toggle: false,
            allows_toggle: false,
            key_input_visible: true,
        }
    }
}

impl PanelState {
    pub fn is_hidden(&self) -> bool {
        self.mode == PanelMode::Hidden
    }

    pub fn is_chat(&self) -> bool {
        self.action_kind.is_some_and(ActionKind::is_conversational)
    }

    pub(crate) fn reset(&mut self) {
        *self = PanelState::default();
    }

    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.is_busy = busy;
        self.is_cancellable = busy;
        if busy {
            self.primary_action_label = LABEL_CANCEL.to_string();
        }
    }

    pub(crate) fn set_label(&mut self, label: &str) {
        self.primary_action_label = label.to_string();
    }

    /// Applies a height at once, superseding any running animation.
    pub(crate) fn set_height_immediate(&mut self, height_px: f64) {
        self.height_px = height_px;
        self.target_height_px = height_px;
        self.height_animation = HeightAnimation::Idle;
    }

    pub(crate) fn animate_height_to(&mut self, height_px: f64, generation: u64) {
        self.target_height_px = height_px;
        self.height_animation = HeightAnimation::Running { generation };
    }

    /// Settles the animation with `generation`. Returns false for a
    /// superseded animation.
    pub(crate) fn finish_animation(&mut self, generation: u64) -> bool {
        if self.height_animation != (HeightAnimation::Running { generation }) {
            return false;
        }
        self.height_px = self.target_height_px;
        self.height_animation = HeightAnimation::Idle;
        true
    }
}
