use serde::Serialize;

use tocgen_core::{CompletionReason, Phase, RoundReport, SessionStore};

/// Snapshot of the session shown by the page.
#[derive(Debug, Clone, Serialize)]
pub struct StatusJson {
    pub loaded: bool,
    pub identity: Option<String>,
    pub windows: usize,
    pub current_index: usize,
    pub remaining: usize,
    pub rounds: usize,
    /// `idle`, `running` or `complete`.
    pub phase: &'static str,
    pub reason: Option<CompletionReason>,
    pub warning: Option<String>,
    pub in_flight: bool,
    pub html: String,
}

impl From<&SessionStore> for StatusJson {
    fn from(store: &SessionStore) -> Self {
        match store.session() {
            Some(s) => StatusJson {
                loaded: true,
                identity: Some(s.identity().to_string()),
                windows: s.windows().len(),
                current_index: s.current_index(),
                remaining: s.remaining(),
                rounds: s.rounds(),
                phase: phase_name(s.phase()),
                reason: match s.phase() {
                    Phase::Complete(reason) => Some(reason),
                    _ => None,
                },
                warning: s.warning().map(String::from),
                in_flight: s.in_flight(),
                html: s.accumulator().html(),
            },
            None => StatusJson {
                loaded: false,
                identity: None,
                windows: 0,
                current_index: 0,
                remaining: 0,
                rounds: 0,
                phase: phase_name(Phase::Idle),
                reason: None,
                warning: None,
                in_flight: false,
                html: String::new(),
            },
        }
    }
}

fn phase_name(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "idle",
        Phase::Running => "running",
        Phase::Complete(_) => "complete",
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// `loaded` for a new document, `unchanged` when it was already current.
    pub outcome: &'static str,
    pub status: StatusJson,
}

#[derive(Debug, Serialize)]
pub struct AdvanceResponse {
    pub report: RoundReport,
    pub message: &'static str,
    pub status: StatusJson,
}
