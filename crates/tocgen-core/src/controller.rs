//! Continuation controller: one round per advance action.
//!
//! [`plan_round`] and [`apply_reply`] are the pure transitions; the only I/O
//! is the completion call that [`advance`] makes between them. Termination is
//! decided after every reply:
//!
//! 1. an empty reply, or one repeating the whole accumulated output, ends the
//!    session without being appended (no progress);
//! 2. otherwise the fragment is appended and the configured
//!    [`CompletionSignal`] is consulted (marker, then structural heuristic);
//! 3. running out of windows ends the session regardless of the signal.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::completion::{CompletionClient, CompletionError, Turn};
use crate::prompt;
use crate::session::{CompletionReason, Phase, RoundTicket, Session, SessionStore};

/// Default output bound per round.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 4096;
pub const DEFAULT_SEPARATOR: &str = "\n\n";
pub const DEFAULT_CLOSING_TAG: &str = "</table>";
pub const DEFAULT_LENGTH_THRESHOLD: usize = 12_000;
pub const DEFAULT_MARKER: &str = "[[CONTINUE]]";

/// How much history each request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextMode {
    /// Each request is a single user turn with no memory of earlier rounds.
    #[default]
    Stateless,
    /// The full conversation is resent every round.
    Conversational,
}

/// What each round sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// The next unconsumed window, one per round.
    #[default]
    Queue,
    /// The whole windowed text every round; later rounds ask the model to continue.
    Whole,
}

/// How the controller recognises that the model has finished.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CompletionSignal {
    /// Only running out of windows ends generation.
    #[default]
    Exhaustion,
    /// The model appends `marker` while more output is pending.
    Marker { marker: String },
    /// Output ending in `closing_tag` and shorter than `max_len` chars is complete.
    Structural { closing_tag: String, max_len: usize },
}

impl CompletionSignal {
    fn marker(&self) -> Option<&str> {
        match self {
            CompletionSignal::Marker { marker } => Some(marker),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub system_prompt: String,
    pub continue_prompt: String,
    pub context_mode: ContextMode,
    pub dispatch: Dispatch,
    pub signal: CompletionSignal,
    pub max_output_tokens: u32,
    pub separator: String,
    pub unwrap_code_fences: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            system_prompt: prompt::DEFAULT_SYSTEM_PROMPT.to_string(),
            continue_prompt: prompt::DEFAULT_CONTINUE_PROMPT.to_string(),
            context_mode: ContextMode::default(),
            dispatch: Dispatch::default(),
            signal: CompletionSignal::default(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            separator: DEFAULT_SEPARATOR.to_string(),
            unwrap_code_fences: true,
        }
    }
}

#[derive(Error, Debug)]
pub enum AdvanceError {
    #[error("no document loaded")]
    NoSession,
    #[error("a round is already in progress")]
    Busy,
    #[error("nothing left to generate")]
    NothingLeft,
    #[error("the session was replaced while the round was running")]
    SessionReplaced,
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),
}

/// A fully built request for one round.
#[derive(Debug, Clone)]
pub struct RoundPlan {
    /// 1-based round number.
    pub round: usize,
    pub system: String,
    pub turns: Vec<Turn>,
    pub max_output_tokens: u32,
    /// What this round covers, e.g. `window 2/6 (pages 11-20)`.
    pub unit: String,
    /// Characters of instruction plus turns; grows each round in conversational mode.
    pub context_chars: usize,
}

/// What a completed round did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundReport {
    pub round: usize,
    pub appended: bool,
    pub phase: Phase,
    pub warning: Option<String>,
    pub remaining: usize,
}

impl RoundReport {
    /// User-facing progress line for this round.
    pub fn message(&self) -> &'static str {
        match self.phase {
            Phase::Complete(CompletionReason::NoProgress) if !self.appended => {
                "The model returned nothing new; generation is finished."
            }
            Phase::Complete(_) => "All parts of the table of contents have been generated.",
            _ => "Part of the table of contents has been generated; advance again to continue.",
        }
    }
}

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\A\s*```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*\z").unwrap()
});

/// Unwrap a fragment that is entirely one fenced code block.
pub fn unwrap_code_fence(fragment: &str) -> String {
    match FENCED_BLOCK.captures(fragment) {
        Some(caps) => caps[1].to_string(),
        None => fragment.to_string(),
    }
}

/// Build the request for the next round, or say why there is none.
pub fn plan_round(session: &Session, settings: &GenerationSettings) -> Result<RoundPlan, AdvanceError> {
    if session.phase.is_complete() || session.cursor >= session.windows.len() {
        return Err(AdvanceError::NothingLeft);
    }

    let (user_text, unit) = match settings.dispatch {
        Dispatch::Queue => {
            let window = &session.windows[session.cursor];
            (
                window.text.clone(),
                format!(
                    "window {}/{} ({})",
                    session.cursor + 1,
                    session.windows.len(),
                    window.label()
                ),
            )
        }
        Dispatch::Whole => {
            let first_round = session.conversation.is_empty();
            let text = if first_round || settings.context_mode == ContextMode::Stateless {
                whole_text(session)
            } else {
                settings.continue_prompt.clone()
            };
            (text, "whole document".to_string())
        }
    };

    let mut turns = match settings.context_mode {
        ContextMode::Stateless => Vec::with_capacity(1),
        ContextMode::Conversational => session.conversation.clone(),
    };
    turns.push(Turn::user(user_text));

    let system = prompt::system_instruction(&settings.system_prompt, settings.signal.marker());
    let context_chars =
        system.chars().count() + turns.iter().map(|t| t.content.chars().count()).sum::<usize>();

    Ok(RoundPlan {
        round: session.rounds + 1,
        system,
        turns,
        max_output_tokens: settings.max_output_tokens,
        unit,
        context_chars,
    })
}

fn whole_text(session: &Session) -> String {
    session
        .windows
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fold a successful reply into the session.
pub fn apply_reply(
    mut session: Session,
    plan: &RoundPlan,
    reply: String,
    settings: &GenerationSettings,
) -> (Session, RoundReport) {
    session.in_flight = false;
    session.rounds = plan.round;
    session.warning = None;

    let marker = settings.signal.marker();
    let has_marker = marker.is_some_and(|m| reply.contains(m));
    let mut fragment = match marker {
        Some(m) => reply.replace(m, ""),
        None => reply.clone(),
    };
    if settings.unwrap_code_fences {
        fragment = unwrap_code_fence(&fragment);
    }

    let repeats_everything = !session.accumulator.is_empty()
        && fragment.trim() == session.accumulator.html().trim();
    if fragment.trim().is_empty() || repeats_everything {
        session.phase = Phase::Complete(CompletionReason::NoProgress);
        tracing::info!(
            identity = %session.identity,
            round = plan.round,
            empty = !repeats_everything,
            "no new content, generation complete"
        );
        let report = report(&session, false);
        return (session, report);
    }

    session.accumulator.push(fragment);
    if let Some(user) = plan.turns.last() {
        session.conversation.push(user.clone());
    }
    session.conversation.push(Turn::assistant(reply));

    let exhausted = match settings.dispatch {
        Dispatch::Queue => {
            session.cursor += 1;
            session.cursor >= session.windows.len()
        }
        Dispatch::Whole if settings.signal == CompletionSignal::Exhaustion => {
            session.cursor = session.windows.len();
            true
        }
        Dispatch::Whole => false,
    };

    let signalled = match &settings.signal {
        CompletionSignal::Exhaustion => None,
        CompletionSignal::Marker { .. } => (!has_marker).then_some(CompletionReason::MarkerAbsent),
        CompletionSignal::Structural {
            closing_tag,
            max_len,
        } => {
            let html = session.accumulator.html();
            if html.trim_end().ends_with(closing_tag.as_str()) && html.chars().count() < *max_len {
                Some(CompletionReason::StructurallyComplete)
            } else {
                session.warning = Some(if exhausted {
                    "The table of contents may be incomplete.".into()
                } else {
                    "The table of contents may be incomplete; advance again to continue.".into()
                });
                None
            }
        }
    };

    session.phase = match signalled.or(exhausted.then_some(CompletionReason::Exhausted)) {
        Some(reason) => Phase::Complete(reason),
        None => Phase::Running,
    };
    tracing::info!(
        identity = %session.identity,
        round = plan.round,
        unit = %plan.unit,
        phase = ?session.phase,
        remaining = session.remaining(),
        "round applied"
    );
    let report = report(&session, true);
    (session, report)
}

/// A failed round changes nothing but the in-flight flag.
pub fn apply_failure(mut session: Session, plan: &RoundPlan, err: &CompletionError) -> Session {
    session.in_flight = false;
    tracing::warn!(
        identity = %session.identity,
        round = plan.round,
        error = %err,
        "completion failed, round can be retried"
    );
    session
}

fn report(session: &Session, appended: bool) -> RoundReport {
    RoundReport {
        round: session.rounds,
        appended,
        phase: session.phase,
        warning: session.warning.clone(),
        remaining: session.remaining(),
    }
}

/// A started round that is abandoned on drop unless finished.
struct PendingRound<'a> {
    store: &'a mut SessionStore,
    ticket: Option<RoundTicket>,
}

impl PendingRound<'_> {
    fn finish(
        mut self,
        reply: Result<String, CompletionError>,
        settings: &GenerationSettings,
    ) -> Result<RoundReport, AdvanceError> {
        let ticket = self.ticket.take().ok_or(AdvanceError::NothingLeft)?;
        self.store.finish_round(ticket, reply, settings)
    }
}

impl Drop for PendingRound<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.store.abandon_round(&ticket);
        }
    }
}

/// Run exactly one round against `client`.
///
/// Dropping the returned future before it resolves abandons the round: the
/// session stays as it was and the next call retries the same window.
pub async fn advance(
    store: &mut SessionStore,
    client: &dyn CompletionClient,
    settings: &GenerationSettings,
) -> Result<RoundReport, AdvanceError> {
    let ticket = store.begin_round(settings)?;
    let plan = ticket.plan.clone();
    let pending = PendingRound {
        store,
        ticket: Some(ticket),
    };
    tracing::debug!(
        round = plan.round,
        unit = %plan.unit,
        context_chars = plan.context_chars,
        client = client.name(),
        "dispatching round"
    );
    let reply = client
        .complete(&plan.system, &plan.turns, plan.max_output_tokens)
        .await;
    pending.finish(reply, settings)
}
