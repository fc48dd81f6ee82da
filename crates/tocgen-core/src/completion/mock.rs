//! Mock completion client for testing.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{CompletionClient, CompletionError, Turn};

/// A configurable reply for [`MockCompletion`].
#[derive(Clone, Debug)]
pub enum MockReply {
    Text(String),
    Fail(CompletionError),
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        MockReply::Text(s.into())
    }
}

/// A request as seen by the mock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedRequest {
    pub system: String,
    pub turns: Vec<Turn>,
    pub max_output_tokens: u32,
}

/// A hand-rolled mock implementing [`CompletionClient`] for tests.
///
/// Replies are served in order; once the script runs out the last reply is
/// repeated. Every request is recorded for inspection.
pub struct MockCompletion {
    replies: Mutex<Vec<MockReply>>,
    fallback: MockReply,
    delay: Option<Duration>,
    call_count: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockCompletion {
    /// A mock that always returns `reply`.
    pub fn new(reply: MockReply) -> Self {
        Self::with_sequence(vec![reply])
    }

    /// A mock that returns `replies` in order, repeating the last one.
    pub fn with_sequence(mut replies: Vec<MockReply>) -> Self {
        assert!(!replies.is_empty(), "sequence must have at least one reply");
        // Reversed so pop() yields the next reply.
        replies.reverse();
        let fallback = replies[0].clone();
        Self {
            replies: Mutex::new(replies),
            fallback,
            delay: None,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Simulated latency per call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        match self.replies.lock() {
            Ok(mut seq) => seq.pop().unwrap_or_else(|| self.fallback.clone()),
            Err(_) => self.fallback.clone(),
        }
    }
}

impl CompletionClient for MockCompletion {
    fn name(&self) -> &str {
        "mock"
    }

    fn complete<'a>(
        &'a self,
        system: &'a str,
        turns: &'a [Turn],
        max_output_tokens: u32,
    ) -> Pin<Box<dyn Future<Output = Result<String, CompletionError>> + Send + 'a>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                system: system.to_string(),
                turns: turns.to_vec(),
                max_output_tokens,
            });
        }
        let reply = self.next_reply();
        let delay = self.delay;

        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            match reply {
                MockReply::Text(text) => Ok(text),
                MockReply::Fail(err) => Err(err),
            }
        })
    }
}
