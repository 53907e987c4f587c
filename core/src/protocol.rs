//! Types shared between the controller, the conversation session and the
//! background tasks that report back into the UI context.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use crate::error::CompletionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Compose,
    Polish,
    Shorten,
    Explain,
    FactCheck,
    WebSearch,
    Chat,
}

/// Which menu of the action bar an action lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuGroup {
    Write,
    Search,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::Compose,
        ActionKind::Polish,
        ActionKind::Shorten,
        ActionKind::Explain,
        ActionKind::FactCheck,
        ActionKind::WebSearch,
        ActionKind::Chat,
    ];

    pub fn title(self) -> &'static str {
        match self {
            ActionKind::Compose => "Compose",
            ActionKind::Polish => "Polish",
            ActionKind::Shorten => "Shorten",
            ActionKind::Explain => "Explain",
            ActionKind::FactCheck => "Fact check",
            ActionKind::WebSearch => "Google",
            ActionKind::Chat => "Ask",
        }
    }

    pub fn menu_group(self) -> MenuGroup {
        match self {
            ActionKind::Compose | ActionKind::Polish | ActionKind::Shorten | ActionKind::Chat => {
                MenuGroup::Write
            }
            ActionKind::Explain | ActionKind::FactCheck | ActionKind::WebSearch => {
                MenuGroup::Search
            }
        }
    }

    /// Conversational kinds keep a transcript and use the inverted toggle.
    pub fn is_conversational(self) -> bool {
        matches!(self, ActionKind::Chat)
    }

    /// Resource-backed kinds display a locator instead of generated text.
    pub fn is_resource_backed(self) -> bool {
        matches!(self, ActionKind::WebSearch)
    }

    pub fn parse(name: &str) -> Option<ActionKind> {
        let normalized = name.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "compose" => Some(ActionKind::Compose),
            "polish" => Some(ActionKind::Polish),
            "shorten" => Some(ActionKind::Shorten),
            "explain" => Some(ActionKind::Explain),
            "fact_check" | "factcheck" => Some(ActionKind::FactCheck),
            "web_search" | "google" | "search" => Some(ActionKind::WebSearch),
            "chat" | "ask" => Some(ActionKind::Chat),
            _ => None,
        }
    }
}

/// A request to run one action. The source text is fixed at construction;
/// re-running an action clones the request rather than editing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    kind: ActionKind,
    source_text: String,
}

impl ActionRequest {
    pub fn new(kind: ActionKind, source_text: impl Into<String>) -> Self {
        Self {
            kind,
            source_text: source_text.into(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide request ids, so a completion from a dismissed session can
/// never be mistaken for one belonging to its successor.
pub(crate) fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Results and ticks produced off the UI context. They are applied by
/// `PanelController::handle_event` on the UI context, never by the producer.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    SingleCompleted {
        request_id: u64,
        result: Result<String, CompletionError>,
    },
    ChatCompleted {
        request_id: u64,
        result: Result<String, CompletionError>,
    },
    FollowupPoll {
        capture_id: u64,
    },
    /// Reported by the view when a height animation started by the core ends.
    HeightAnimationFinished {
        generation: u64,
    },
    /// Reported by the shell once web content requested by the core settles.
    WebContentFinished {
        url: Url,
        result: Result<(), CompletionError>,
    },
}

/// Thin wrapper around the channel back into the UI context.
#[derive(Clone, Debug)]
pub struct PanelEventSender {
    tx: UnboundedSender<PanelEvent>,
}

impl PanelEventSender {
    pub fn new(tx: UnboundedSender<PanelEvent>) -> Self {
        Self { tx }
    }

    /// Returns false once the receiving side is gone, which background tasks
    /// treat as a signal to stop.
    pub fn send(&self, event: PanelEvent) -> bool {
        if let Err(e) = self.tx.send(event) {
            tracing::debug!("panel event dropped, receiver closed: {e}");
            return false;
        }
        true
    }
}
