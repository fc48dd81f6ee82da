//! OpenAI-compatible `/chat/completions` client.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::{CompletionClient, CompletionError, Role, Turn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.1;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Chat-completion client for OpenAI and API-compatible servers.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_key", &"***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

fn build_messages<'a>(system: &'a str, turns: &'a [Turn]) -> Vec<ChatMessage<'a>> {
    let mut messages = Vec::with_capacity(turns.len() + 1);
    messages.push(ChatMessage {
        role: "system",
        content: system,
    });
    for turn in turns {
        messages.push(ChatMessage {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            },
            content: &turn.content,
        });
    }
    messages
}

/// Pull `error.message` out of an API error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| body.trim().chars().take(300).collect())
}

/// Characters (not bytes) of instruction plus turns.
fn request_chars(system: &str, turns: &[Turn]) -> usize {
    system.chars().count() + turns.iter().map(|t| t.content.chars().count()).sum::<usize>()
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

impl CompletionClient for OpenAiClient {
    fn name(&self) -> &str {
        &self.model
    }

    fn complete<'a>(
        &'a self,
        system: &'a str,
        turns: &'a [Turn],
        max_output_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>> {
        Box::pin(async move {
            let body = ChatRequest {
                model: &self.model,
                messages: build_messages(system, turns),
                temperature: self.temperature,
                max_tokens: max_output_tokens,
            };
            let request_chars = request_chars(system, turns);
            tracing::debug!(
                model = %self.model,
                turns = turns.len(),
                request_chars,
                max_output_tokens,
                "sending completion request"
            );

            let started = Instant::now();
            let resp = self
                .client
                .post(self.endpoint())
                .bearer_auth(&self.api_key)
                .timeout(self.timeout)
                .json(&body)
                .send()
                .await?;

            let status = resp.status();
            if status.as_u16() == 429 {
                return Err(CompletionError::RateLimited {
                    retry_after: parse_retry_after(resp.headers()),
                });
            }
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                let message = error_message(&text);
                return Err(match status.as_u16() {
                    401 | 403 => CompletionError::Auth {
                        status: status.as_u16(),
                        message,
                    },
                    code => CompletionError::Api {
                        status: code,
                        message,
                    },
                });
            }

            let data: ChatResponse = resp
                .json()
                .await
                .map_err(|e| CompletionError::Decode(e.to_string()))?;
            let choice = data
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| CompletionError::Decode("response has no choices".into()))?;

            if choice.finish_reason.as_deref() == Some("length") {
                tracing::warn!(
                    model = %self.model,
                    max_output_tokens,
                    "completion stopped at the output limit"
                );
            }
            let content = choice.message.content.unwrap_or_default();
            tracing::debug!(
                model = %self.model,
                elapsed_ms = started.elapsed().as_millis() as u64,
                reply_chars = content.len(),
                "completion received"
            );
            Ok(content)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_start_with_system_instruction() {
        let turns = vec![Turn::user("text"), Turn::assistant("<table>"), Turn::user("continue")];
        let messages = build_messages("instruction", &turns);
        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(messages[0].content, "instruction");
    }

    #[test]
    fn request_size_counts_characters() {
        let turns = vec![Turn::user("Spis treści"), Turn::assistant("żółw")];
        assert_eq!(request_chars("Zadanie", &turns), 7 + 11 + 4);
    }

    #[test]
    fn request_serializes_openai_shape() {
        let turns = vec![Turn::user("text")];
        let body = ChatRequest {
            model: "gpt-4o",
            messages: build_messages("sys", &turns),
            temperature: 0.1,
            max_tokens: 4096,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "text");
    }

    #[test]
    fn error_message_prefers_api_field() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        assert_eq!(error_message(body), "Incorrect API key provided");
        assert_eq!(error_message("  bad gateway \n"), "bad gateway");
    }

    #[test]
    fn retry_after_seconds_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "3".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(3)));
        headers.insert(
            reqwest::header::RETRY_AFTER,
            "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn debug_hides_api_key() {
        let client = OpenAiClient::new("sk-secret").with_model("gpt-4o-mini");
        let dbg = format!("{client:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("gpt-4o-mini"));
        assert_eq!(client.endpoint(), "https://api.openai.com/v1/chat/completions");
    }
}
