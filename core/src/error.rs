use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::ActionKind;

pub type Result<T> = std::result::Result<T, CompletionError>;

/// Text shown inline in the panel when a single-turn action fails.
pub const GENERIC_RETRY_MESSAGE: &str = "Something went wrong. Please try again.";

/// Transcript entry appended when a chat turn fails.
pub const CHAT_FAILURE_MARKER: &str = "⚠️ Failed to get a response. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// The request never produced an HTTP response (DNS, TLS, timeout, ...).
    #[error("network failure: {0}")]
    Network(String),

    /// The service answered with `{"error": {"message": ...}}`.
    #[error("remote API error: {0}")]
    RemoteApi(String),

    /// The body was neither a completion nor an error payload.
    #[error("malformed response from completion service")]
    MalformedResponse,

    /// The action is not answered by a single-turn completion.
    #[error("{0:?} has no single-turn prompt")]
    UnsupportedAction(ActionKind),

    #[error("request cancelled")]
    Cancelled,
}

/// What the panel records in `last_error`. `NoSourceText` is never stored here:
/// an action without source text simply does nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    NetworkFailure,
    RemoteApiError(String),
    MalformedResponse,
    UnsupportedAction(ActionKind),
    Cancelled,
}

impl ErrorKind {
    /// Message rendered to the user. Every non-cancellation failure collapses to
    /// the same retry prompt; the remote text is kept for logs only.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            ErrorKind::Cancelled => None,
            ErrorKind::NetworkFailure
            | ErrorKind::RemoteApiError(_)
            | ErrorKind::MalformedResponse
            | ErrorKind::UnsupportedAction(_) => Some(GENERIC_RETRY_MESSAGE),
        }
    }
}

impl From<&CompletionError> for ErrorKind {
    fn from(err: &CompletionError) -> Self {
        match err {
            CompletionError::Network(_) => ErrorKind::NetworkFailure,
            CompletionError::RemoteApi(message) => ErrorKind::RemoteApiError(message.clone()),
            CompletionError::MalformedResponse => ErrorKind::MalformedResponse,
            CompletionError::UnsupportedAction(kind) => ErrorKind::UnsupportedAction(*kind),
            CompletionError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AskError {
    #[error("a request is already in flight for this session")]
    Busy,

    #[error("nothing to send")]
    EmptyInput,

    #[error("no conversation is active")]
    NoSession,
}
