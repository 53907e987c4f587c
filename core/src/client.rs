//! Requests against the remote chat-completion service.

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::Config;
use crate::error::CompletionError;
use crate::error::Result;
use crate::prompts::CHAT_SYSTEM_PROMPT;
use crate::prompts::single_turn_prompt;
use crate::protocol::ActionKind;
use crate::protocol::ConversationTurn;
use crate::protocol::Role;

/// Anything that can answer completion requests. The panel only talks to this
/// trait so tests and offline drivers can substitute their own backend.
///
/// Implementations must not retry; retrying is the caller's decision.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete_single(&self, kind: ActionKind, source_text: &str) -> Result<String>;

    /// Answers the last user turn with the whole transcript as context.
    async fn complete_chat(&self, transcript: &[ConversationTurn]) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

/// HTTPS client for an OpenAI-compatible `chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct RemoteCompletionClient {
    http: reqwest::Client,
    config: Config,
}

impl RemoteCompletionClient {
    pub fn new(config: Config) -> Result<Self> {
        if config.api_key.is_none() {
            warn!("no API key configured; completion requests will be rejected by the service");
        }
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| CompletionError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    async fn send(&self, messages: Vec<WireMessage<'_>>, temperature: f64) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature,
            max_tokens: self.config.max_tokens,
        };

        let mut request = self.http.post(&self.config.base_url).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CompletionError::Network(e.to_string()))?;
        debug!(%status, len = bytes.len(), "completion response received");

        parse_response(&bytes)
    }
}

/// Extracts the first choice's content, or the service's error message.
/// The HTTP status is not consulted: error payloads arrive with 4xx and 5xx
/// codes alike and are recognised by shape.
fn parse_response(bytes: &[u8]) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_slice(bytes).map_err(|_| CompletionError::MalformedResponse)?;

    if let Some(content) = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
    {
        return Ok(content.trim().to_string());
    }

    match parsed.error.and_then(|error| error.message) {
        Some(message) => Err(CompletionError::RemoteApi(message)),
        None => Err(CompletionError::MalformedResponse),
    }
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[async_trait]
impl CompletionBackend for RemoteCompletionClient {
    async fn complete_single(&self, kind: ActionKind, source_text: &str) -> Result<String> {
        let Some(prompt) = single_turn_prompt(kind, source_text) else {
            warn!(?kind, "kind has no single-turn prompt");
            return Err(CompletionError::UnsupportedAction(kind));
        };
        let messages = vec![WireMessage {
            role: "user",
            content: &prompt,
        }];
        self.send(messages, self.config.temperature_for(kind)).await
    }

    async fn complete_chat(&self, transcript: &[ConversationTurn]) -> Result<String> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(WireMessage {
            role: "system",
            content: CHAT_SYSTEM_PROMPT,
        });
        messages.extend(transcript.iter().map(|turn| WireMessage {
            role: wire_role(turn.role),
            content: &turn.text,
        }));
        self.send(messages, self.config.temperature_for(ActionKind::Chat))
            .await
    }
}
