//! Core of the keyboard copilot: a panel that runs writing actions over the
//! text in a host field, talks to a chat-completion service and puts the
//! results back into the host.
//!
//! Everything here runs on the caller's (UI) context except the requests and
//! the follow-up poll, which run as tokio tasks and report back through
//! [`protocol::PanelEvent`]s. Feed those into
//! [`PanelController::handle_event`] from the UI loop.

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod host;
pub mod panel;
pub mod prompts;
pub mod protocol;
pub mod session;

pub use bridge::HostTextBridge;
pub use client::CompletionBackend;
pub use client::RemoteCompletionClient;
pub use config::Config;
pub use config::ConfigToml;
pub use error::AskError;
pub use error::CompletionError;
pub use error::ConfigError;
pub use error::ErrorKind;
pub use panel::PanelController;
pub use panel::PanelMode;
pub use panel::PanelState;
pub use protocol::ActionKind;
pub use protocol::ActionRequest;
pub use protocol::PanelEvent;
pub use protocol::PanelEventSender;
pub use session::ConversationSession;
