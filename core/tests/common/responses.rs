use copilot_core::Config;
use serde_json::Value;
use serde_json::json;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::method;
use wiremock::matchers::path;

pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

pub async fn start_mock_server() -> MockServer {
    MockServer::start().await
}

/// A successful chat-completion payload carrying `content`.
pub fn completion_body(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

pub fn error_body(message: &str) -> Value {
    json!({
        "error": { "message": message, "type": "invalid_request_error" }
    })
}

/// Mounts a completion answer served exactly once.
pub async fn mount_completion_once(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(content)))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

pub async fn mount_error(server: &MockServer, status: u16, message: &str) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_json(error_body(message)))
        .mount(server)
        .await;
}

/// Defaults pointed at `server`, with a fixed key.
pub fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.base_url = format!("{}{COMPLETIONS_PATH}", server.uri());
    config.api_key = Some("sk-test".to_string());
    config
}

/// JSON bodies of every request the server has received so far.
pub async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).expect("request body is JSON"))
        .collect()
}
