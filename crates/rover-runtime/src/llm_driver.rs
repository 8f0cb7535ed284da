//! [`LlmDriver`] – OpenAI-compatible chat client for the decider.
//!
//! Talks to any model server exposing `/v1/chat/completions`, such as
//! [Ollama](https://ollama.com) (`http://localhost:11434`). The
//! [`DecisionReply`] JSON Schema goes out in `response_format` so servers
//! that support structured output constrain the reply; the orchestrator
//! still validates whatever comes back.
//!
//! # Example
//!
//! ```rust,no_run
//! use rover_runtime::llm_driver::{ChatMessage, LlmDriver, Role};
//!
//! # async fn demo() -> Result<(), rover_runtime::llm_driver::LlmError> {
//! let driver = LlmDriver::new("http://localhost:11434", "gemma3");
//! let reply = driver
//!     .complete(&[ChatMessage::new(Role::User, "Anything in front of you?")])
//!     .await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

use rover_types::{DecisionReply, RoverError};
use schemars::schema_for;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Reply rules
// ─────────────────────────────────────────────────────────────────────────────

/// Output rules appended to every system message.
pub const REPLY_RULES: &str = "\
## Reply rules
- Reply with exactly one JSON object and nothing else.
- `action` is required and must be one of the listed action names.
- Put a duration in `params.duration_ms` (at most 10000) for moves and turns.
- `set_speed` needs `params.level`, 0 is fastest and 9 is slowest.
- Do not repeat a failed action more than twice in a row; try something else.
- Only fill `directive` when the user asks for something new.";

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

impl From<LlmError> for RoverError {
    fn from(e: LlmError) -> Self {
        RoverError::Collaborator {
            collaborator: "decider".into(),
            details: e.to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: serde_json::Value,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    response_format: ResponseFormat,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmDriver
// ─────────────────────────────────────────────────────────────────────────────

/// Async client for one model on one server. Construct once and reuse.
pub struct LlmDriver {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LlmDriver {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `messages` and return the assistant's reply text.
    ///
    /// [`REPLY_RULES`] are appended to the system prompt (one is prepended
    /// if the caller supplied none).
    ///
    /// # Errors
    ///
    /// [`LlmError::Http`] on transport or status failure,
    /// [`LlmError::BadResponse`] when no choice comes back.
    pub async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let messages = with_reply_rules(messages);
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
            response_format: decision_format(),
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: ChatResponse = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))
    }
}

fn decision_format() -> ResponseFormat {
    ResponseFormat {
        kind: "json_schema",
        json_schema: serde_json::to_value(schema_for!(DecisionReply))
            .unwrap_or(serde_json::Value::Null),
    }
}

fn with_reply_rules(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut out: Vec<ChatMessage> = messages
        .iter()
        .map(|m| match m.role {
            Role::System => ChatMessage::new(Role::System, format!("{}\n\n{REPLY_RULES}", m.content)),
            _ => m.clone(),
        })
        .collect();
    if !out.iter().any(|m| m.role == Role::System) {
        out.insert(0, ChatMessage::new(Role::System, REPLY_RULES));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        for (role, expected) in [
            (Role::System, "\"system\""),
            (Role::User, "\"user\""),
            (Role::Assistant, "\"assistant\""),
        ] {
            let json = serde_json::to_string(&ChatMessage::new(role, "")).unwrap();
            assert!(json.contains(expected), "{json}");
        }
    }

    #[test]
    fn reply_rules_are_appended_to_the_system_message() {
        let out = with_reply_rules(&[
            ChatMessage::new(Role::System, "You are a small robot."),
            ChatMessage::new(Role::User, "hello"),
        ]);
        assert_eq!(out.len(), 2);
        assert!(out[0].content.starts_with("You are a small robot."));
        assert!(out[0].content.contains("## Reply rules"));
        assert_eq!(out[1].content, "hello");
    }

    #[test]
    fn reply_rules_are_prepended_without_a_system_message() {
        let out = with_reply_rules(&[ChatMessage::new(Role::User, "hello")]);
        assert_eq!(out[0].role, Role::System);
        assert_eq!(out[0].content, REPLY_RULES);
    }

    #[test]
    fn request_carries_the_decision_schema() {
        let messages = [ChatMessage::new(Role::User, "go")];
        let body = ChatRequest {
            model: "gemma3",
            messages: &messages,
            stream: false,
            response_format: decision_format(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["response_format"]["type"], "json_schema");
        let schema = json["response_format"]["json_schema"].to_string();
        for name in ["move_forward", "set_speed", "listen", "duration_ms"] {
            assert!(schema.contains(name), "schema lacks {name}");
        }
    }

    #[test]
    fn trailing_slash_is_trimmed_and_blank_keys_ignored() {
        let driver = LlmDriver::new("http://localhost:11434/", "gemma3").with_api_key(Some(String::new()));
        assert_eq!(driver.base_url, "http://localhost:11434");
        assert!(driver.api_key.is_none());
        assert_eq!(driver.model(), "gemma3");
    }

    #[test]
    fn driver_errors_are_collaborator_faults() {
        let err: RoverError = LlmError::BadResponse("empty".into()).into();
        assert_eq!(err.kind(), "collaborator");
    }
}
