//! Session state and the single-session store.
//!
//! A [`Session`] is a plain value. The controller computes its transitions;
//! the [`SessionStore`] owns at most one of them and guards against
//! overlapping rounds.

use std::fmt;

use serde::Serialize;

use crate::completion::{CompletionError, Turn};
use crate::controller::{self, AdvanceError, GenerationSettings, RoundPlan, RoundReport};
use crate::window::TextWindow;

/// Why a session stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The continuation marker was absent from the last fragment.
    MarkerAbsent,
    /// The output ends with the closing tag and is under the length threshold.
    StructurallyComplete,
    /// No windows left to dispatch.
    Exhausted,
    /// The last round produced nothing new.
    NoProgress,
}

impl fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompletionReason::MarkerAbsent => "no continuation marker",
            CompletionReason::StructurallyComplete => "table closed",
            CompletionReason::Exhausted => "all windows processed",
            CompletionReason::NoProgress => "model produced no new content",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
    Complete(CompletionReason),
}

impl Phase {
    pub fn is_complete(&self) -> bool {
        matches!(self, Phase::Complete(_))
    }
}

/// Append-only list of completion fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocAccumulator {
    fragments: Vec<String>,
    separator: String,
}

impl TocAccumulator {
    pub fn new(separator: impl Into<String>) -> Self {
        Self {
            fragments: Vec::new(),
            separator: separator.into(),
        }
    }

    pub fn push(&mut self, fragment: String) {
        self.fragments.push(fragment);
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// The rendered artifact: fragments joined with the separator.
    pub fn html(&self) -> String {
        self.fragments.join(&self.separator)
    }
}

/// Generation state for one loaded document.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) identity: String,
    pub(crate) windows: Vec<TextWindow>,
    /// Number of windows already consumed.
    pub(crate) cursor: usize,
    pub(crate) accumulator: TocAccumulator,
    pub(crate) conversation: Vec<Turn>,
    pub(crate) phase: Phase,
    pub(crate) rounds: usize,
    pub(crate) warning: Option<String>,
    pub(crate) in_flight: bool,
}

impl Session {
    pub fn new(identity: impl Into<String>, windows: Vec<TextWindow>, separator: &str) -> Self {
        Self {
            identity: identity.into(),
            windows,
            cursor: 0,
            accumulator: TocAccumulator::new(separator),
            conversation: Vec::new(),
            phase: Phase::Idle,
            rounds: 0,
            warning: None,
            in_flight: false,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn windows(&self) -> &[TextWindow] {
        &self.windows
    }

    /// Index of the next window to dispatch (equals the number consumed).
    pub fn current_index(&self) -> usize {
        self.cursor
    }

    pub fn remaining(&self) -> usize {
        self.windows.len().saturating_sub(self.cursor)
    }

    pub fn accumulator(&self) -> &TocAccumulator {
        &self.accumulator
    }

    pub fn conversation(&self) -> &[Turn] {
        &self.conversation
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Warning from the most recent round, if any.
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }
}

/// Result of [`SessionStore::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The identity was already loaded; nothing changed.
    Unchanged,
    /// A fresh idle session replaced whatever was there.
    Loaded { windows: usize },
}

/// Holds at most one session.
#[derive(Debug, Default)]
pub struct SessionStore {
    session: Option<Session>,
    /// Bumped whenever the session is replaced or dropped, so a round that
    /// started against an older session cannot write into a newer one.
    generation: u64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_current(&self, identity: &str) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.identity == identity)
    }

    /// Bind the store to `identity`.
    ///
    /// Re-submitting the loaded identity is a no-op and `load` is not called.
    /// Otherwise the old session is discarded and `load` produces the windows
    /// for a new idle session; if it fails the store is left empty.
    pub fn submit<E>(
        &mut self,
        identity: &str,
        separator: &str,
        load: impl FnOnce() -> Result<Vec<TextWindow>, E>,
    ) -> Result<SubmitOutcome, E> {
        if self.is_current(identity) {
            tracing::debug!(identity, "document already loaded");
            return Ok(SubmitOutcome::Unchanged);
        }

        self.reset();
        let windows = load()?;
        let count = windows.len();
        self.session = Some(Session::new(identity, windows, separator));
        tracing::info!(identity, windows = count, "session created");
        Ok(SubmitOutcome::Loaded { windows: count })
    }

    /// Discard all state.
    pub fn reset(&mut self) {
        if let Some(old) = self.session.take() {
            tracing::info!(identity = %old.identity, rounds = old.rounds, "session discarded");
        }
        self.generation += 1;
    }

    /// Start a round: plan the request and mark the session in flight.
    pub fn begin_round(&mut self, settings: &GenerationSettings) -> Result<RoundTicket, AdvanceError> {
        let session = self.session.as_mut().ok_or(AdvanceError::NoSession)?;
        if session.in_flight {
            return Err(AdvanceError::Busy);
        }
        let plan = controller::plan_round(session, settings)?;
        session.in_flight = true;
        session.phase = Phase::Running;
        Ok(RoundTicket {
            generation: self.generation,
            plan,
        })
    }

    /// Finish a round started with [`begin_round`](Self::begin_round).
    pub fn finish_round(
        &mut self,
        ticket: RoundTicket,
        reply: Result<String, CompletionError>,
        settings: &GenerationSettings,
    ) -> Result<RoundReport, AdvanceError> {
        if ticket.generation != self.generation {
            tracing::warn!(round = ticket.plan.round, "dropping reply for a discarded session");
            return Err(AdvanceError::SessionReplaced);
        }
        let session = self.session.take().ok_or(AdvanceError::NoSession)?;
        match reply {
            Ok(text) => {
                let (session, report) = controller::apply_reply(session, &ticket.plan, text, settings);
                self.session = Some(session);
                Ok(report)
            }
            Err(err) => {
                self.session = Some(controller::apply_failure(session, &ticket.plan, &err));
                Err(AdvanceError::Completion(err))
            }
        }
    }

    /// Release a round whose reply will never arrive. The session keeps its
    /// state and the same window is dispatched again on the next advance.
    pub fn abandon_round(&mut self, ticket: &RoundTicket) {
        if ticket.generation != self.generation {
            return;
        }
        if let Some(session) = self.session.as_mut()
            && session.in_flight
        {
            session.in_flight = false;
            tracing::warn!(
                identity = %session.identity,
                round = ticket.plan.round,
                "round abandoned before its reply arrived"
            );
        }
    }
}

/// An in-flight round, returned by [`SessionStore::begin_round`].
#[derive(Debug, Clone)]
pub struct RoundTicket {
    generation: u64,
    pub plan: RoundPlan,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::window::{WindowStrategy, window};

    fn windows_for(pages: usize) -> Vec<TextWindow> {
        let doc = Document::paged("x.pdf", (1..=pages).map(|i| format!("page {i}")).collect());
        window(&doc, &WindowStrategy::PageBlocks { pages_per_block: 2 }, None).unwrap()
    }

    #[test]
    fn resubmitting_same_identity_skips_load() {
        let mut store = SessionStore::new();
        let outcome = store
            .submit("a.pdf", "\n\n", || Ok::<_, String>(windows_for(4)))
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Loaded { windows: 2 });

        let mut called = false;
        let outcome = store
            .submit("a.pdf", "\n\n", || {
                called = true;
                Ok::<_, String>(windows_for(8))
            })
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Unchanged);
        assert!(!called);
        assert_eq!(store.session().unwrap().windows().len(), 2);
    }

    #[test]
    fn new_identity_replaces_session() {
        let mut store = SessionStore::new();
        store
            .submit("a.pdf", "\n\n", || Ok::<_, String>(windows_for(4)))
            .unwrap();
        store
            .submit("b.pdf", "\n\n", || Ok::<_, String>(windows_for(6)))
            .unwrap();
        let session = store.session().unwrap();
        assert_eq!(session.identity(), "b.pdf");
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.windows().len(), 3);
    }

    #[test]
    fn failed_load_leaves_store_empty() {
        let mut store = SessionStore::new();
        store
            .submit("a.pdf", "\n\n", || Ok::<_, String>(windows_for(4)))
            .unwrap();
        let err = store
            .submit("broken.pdf", "\n\n", || Err::<Vec<TextWindow>, _>("corrupt".to_string()))
            .unwrap_err();
        assert_eq!(err, "corrupt");
        assert!(store.session().is_none());
    }

    #[test]
    fn reset_discards_everything() {
        let mut store = SessionStore::new();
        store
            .submit("a.pdf", "\n\n", || Ok::<_, String>(windows_for(4)))
            .unwrap();
        store.reset();
        assert!(store.session().is_none());
        assert!(!store.is_current("a.pdf"));
    }

    #[test]
    fn overlapping_round_is_busy() {
        let settings = GenerationSettings::default();
        let mut store = SessionStore::new();
        store
            .submit("a.pdf", "\n\n", || Ok::<_, String>(windows_for(4)))
            .unwrap();
        let ticket = store.begin_round(&settings).unwrap();
        assert!(matches!(store.begin_round(&settings), Err(AdvanceError::Busy)));
        store
            .finish_round(ticket, Ok("<table></table>".into()), &settings)
            .unwrap();
        assert!(store.begin_round(&settings).is_ok());
    }

    #[test]
    fn reply_for_replaced_session_is_dropped() {
        let settings = GenerationSettings::default();
        let mut store = SessionStore::new();
        store
            .submit("a.pdf", "\n\n", || Ok::<_, String>(windows_for(4)))
            .unwrap();
        let ticket = store.begin_round(&settings).unwrap();
        store
            .submit("b.pdf", "\n\n", || Ok::<_, String>(windows_for(4)))
            .unwrap();
        let err = store
            .finish_round(ticket, Ok("<table>a</table>".into()), &settings)
            .unwrap_err();
        assert!(matches!(err, AdvanceError::SessionReplaced));
        let session = store.session().unwrap();
        assert!(session.accumulator().is_empty());
        assert!(!session.in_flight());
    }

    #[test]
    fn abandoned_round_can_be_retried() {
        let settings = GenerationSettings::default();
        let mut store = SessionStore::new();
        store
            .submit("a.pdf", "\n\n", || Ok::<_, String>(windows_for(4)))
            .unwrap();
        let ticket = store.begin_round(&settings).unwrap();
        store.abandon_round(&ticket);
        assert!(!store.session().unwrap().in_flight());

        let retry = store.begin_round(&settings).unwrap();
        assert_eq!(retry.plan.round, ticket.plan.round);
        assert_eq!(retry.plan.unit, ticket.plan.unit);
    }

    #[test]
    fn abandoning_a_stale_ticket_leaves_new_round_alone() {
        let settings = GenerationSettings::default();
        let mut store = SessionStore::new();
        store
            .submit("a.pdf", "\n\n", || Ok::<_, String>(windows_for(4)))
            .unwrap();
        let stale = store.begin_round(&settings).unwrap();
        store
            .submit("b.pdf", "\n\n", || Ok::<_, String>(windows_for(4)))
            .unwrap();
        let _current = store.begin_round(&settings).unwrap();
        store.abandon_round(&stale);
        assert!(store.session().unwrap().in_flight());
    }

    #[test]
    fn advance_without_session() {
        let mut store = SessionStore::new();
        assert!(matches!(
            store.begin_round(&GenerationSettings::default()),
            Err(AdvanceError::NoSession)
        ));
    }

    #[test]
    fn accumulator_joins_with_separator() {
        let mut acc = TocAccumulator::new("\n\n");
        acc.push("<table>a".into());
        acc.push("b</table>".into());
        assert_eq!(acc.html(), "<table>a\n\nb</table>");
    }
}
