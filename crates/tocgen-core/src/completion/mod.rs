//! Completion client trait and implementations for the chat-completion endpoint.

pub mod mock;
pub mod openai;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Speaker of a conversation turn. The system instruction travels separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Assistant => f.write_str("assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Failure of a single completion call. Never retried implicitly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("authentication rejected (HTTP {status}): {message}")]
    Auth { status: u16, message: String },
    #[error("{}", rate_limited_message(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
    #[error("completion API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("could not decode completion response: {0}")]
    Decode(String),
}

fn rate_limited_message(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!("Rate limited (429), retry after {:.1}s", d.as_secs_f64()),
        None => "Rate limited (429)".to_string(),
    }
}

impl From<reqwest::Error> for CompletionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CompletionError::Timeout
        } else if e.is_decode() {
            CompletionError::Decode(e.to_string())
        } else {
            CompletionError::Transport(e.to_string())
        }
    }
}

/// A chat-completion endpoint.
///
/// One call is one round: the system instruction, the ordered turns, and an
/// upper bound on the size of the reply.
pub trait CompletionClient: Send + Sync {
    /// Human-readable name for logs (e.g. the model id).
    fn name(&self) -> &str;

    fn complete<'a>(
        &'a self,
        system: &'a str,
        turns: &'a [Turn],
        max_output_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>>;
}
