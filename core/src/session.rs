use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use uuid::Uuid;

use crate::client::CompletionBackend;
use crate::error::AskError;
use crate::error::CHAT_FAILURE_MARKER;
use crate::error::CompletionError;
use crate::error::ErrorKind;
use crate::protocol::ConversationTurn;
use crate::protocol::PanelEvent;
use crate::protocol::PanelEventSender;
use crate::protocol::Role;
use crate::protocol::next_request_id;

/// What a completed chat request did to the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// An assistant turn was appended at `turn_index`.
    Answered { turn_index: usize },
    /// A failure marker was appended at `turn_index`.
    Failed { turn_index: usize, error: ErrorKind },
    /// The backend gave up on its own; the transcript was rolled back.
    Cancelled(CancelledTurn),
}

/// A request that was rolled back before it was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledTurn {
    pub request_id: u64,
    /// Text of the user turn the request was sent for, when it came from
    /// [`ConversationSession::ask`]. Regenerations carry none.
    pub unsent: Option<String>,
}

struct InFlightTurn {
    request_id: u64,
    cancel: CancellationToken,
    /// Transcript as it was before the request started.
    prior: Vec<ConversationTurn>,
    question: Option<String>,
}

impl InFlightTurn {
    fn into_cancelled(self) -> (Vec<ConversationTurn>, CancelledTurn) {
        (
            self.prior,
            CancelledTurn {
                request_id: self.request_id,
                unsent: self.question,
            },
        )
    }
}

/// A multi-turn conversation with at most one request in flight.
pub struct ConversationSession {
    id: Uuid,
    transcript: Vec<ConversationTurn>,
    in_flight: Option<InFlightTurn>,
    backend: Arc<dyn CompletionBackend>,
    events: PanelEventSender,
}

impl ConversationSession {
    pub fn new(backend: Arc<dyn CompletionBackend>, events: PanelEventSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            transcript: Vec::new(),
            in_flight: None,
            backend,
            events,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Latest assistant reply, skipping failure markers.
    pub fn last_reply(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant && turn.text != CHAT_FAILURE_MARKER)
            .map(|turn| turn.text.as_str())
    }

    /// Appends a user turn and asks the backend to answer it with the whole
    /// transcript as context. Returns the request id.
    pub fn ask(&mut self, text: &str) -> Result<u64, AskError> {
        if self.is_busy() {
            debug!(session_id = %self.id, "ask rejected: request in flight");
            return Err(AskError::Busy);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(AskError::EmptyInput);
        }
        let prior = self.transcript.clone();
        self.transcript.push(ConversationTurn::user(text));
        Ok(self.start_request(prior, Some(text.to_string())))
    }

    /// Drops a trailing assistant turn and asks again for the last user turn.
    pub fn regenerate(&mut self) -> Result<u64, AskError> {
        if self.is_busy() {
            return Err(AskError::Busy);
        }
        let prior = self.transcript.clone();
        if self
            .transcript
            .last()
            .is_some_and(|turn| turn.role == Role::Assistant)
        {
            self.transcript.pop();
        }
        if !self
            .transcript
            .last()
            .is_some_and(|turn| turn.role == Role::User)
        {
            self.transcript = prior;
            return Err(AskError::EmptyInput);
        }
        Ok(self.start_request(prior, None))
    }

    /// Aborts the in-flight request and restores the transcript to exactly
    /// what it was before that request. Returns `None` when nothing was in
    /// flight.
    pub fn cancel(&mut self) -> Option<CancelledTurn> {
        let in_flight = self.in_flight.take()?;
        in_flight.cancel.cancel();
        let (prior, cancelled) = in_flight.into_cancelled();
        self.transcript = prior;
        info!(session_id = %self.id, request_id = cancelled.request_id, "chat request cancelled");
        Some(cancelled)
    }

    /// Applies a completion reported back through the panel's event channel.
    /// Completions for anything other than the current request are discarded.
    pub fn on_completion(
        &mut self,
        request_id: u64,
        result: Result<String, CompletionError>,
    ) -> Option<TurnOutcome> {
        if self
            .in_flight
            .as_ref()
            .is_none_or(|in_flight| in_flight.request_id != request_id)
        {
            debug!(session_id = %self.id, request_id, "discarding stale chat completion");
            return None;
        }
        let in_flight = self.in_flight.take()?;

        let outcome = match result {
            Ok(text) => {
                self.transcript.push(ConversationTurn::assistant(text));
                TurnOutcome::Answered {
                    turn_index: self.transcript.len() - 1,
                }
            }
            Err(CompletionError::Cancelled) => {
                let (prior, cancelled) = in_flight.into_cancelled();
                self.transcript = prior;
                TurnOutcome::Cancelled(cancelled)
            }
            Err(err) => {
                tracing::warn!(session_id = %self.id, request_id, "chat request failed: {err}");
                self.transcript
                    .push(ConversationTurn::assistant(CHAT_FAILURE_MARKER));
                TurnOutcome::Failed {
                    turn_index: self.transcript.len() - 1,
                    error: ErrorKind::from(&err),
                }
            }
        };
        Some(outcome)
    }

    fn start_request(&mut self, prior: Vec<ConversationTurn>, question: Option<String>) -> u64 {
        let request_id = next_request_id();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();
        let snapshot = self.transcript.clone();

        info!(
            session_id = %self.id,
            request_id,
            turns = snapshot.len(),
            "sending chat request"
        );
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                result = backend.complete_chat(&snapshot) => result,
            };
            events.send(PanelEvent::ChatCompleted { request_id, result });
        });

        self.in_flight = Some(InFlightTurn {
            request_id,
            cancel,
            prior,
            question,
        });
        request_id
    }
}

impl Drop for ConversationSession {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel.cancel();
        }
    }
}
