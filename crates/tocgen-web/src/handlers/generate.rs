use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use std::sync::Arc;

use tocgen_core::RoundTicket;

use crate::error::ApiError;
use crate::models::{AdvanceResponse, StatusJson};
use crate::state::AppState;

/// Run one round. The store is locked to start and to finish the round but
/// not while the model is working, so a concurrent advance sees `Busy`.
///
/// The round runs on its own task: if the client goes away the handler is
/// dropped but the round still finishes and its fragment is kept.
pub async fn advance(State(state): State<Arc<AppState>>) -> Result<Json<AdvanceResponse>, ApiError> {
    let ticket = state.store()?.begin_round(&state.settings)?;
    tracing::debug!(round = ticket.plan.round, unit = %ticket.plan.unit, "dispatching round");

    let round = tokio::spawn(run_round(state.clone(), ticket));
    round
        .await
        .map_err(|e| ApiError::internal(format!("round task failed: {e}")))?
}

async fn run_round(
    state: Arc<AppState>,
    ticket: RoundTicket,
) -> Result<Json<AdvanceResponse>, ApiError> {
    let reply = state
        .client
        .complete(
            &ticket.plan.system,
            &ticket.plan.turns,
            ticket.plan.max_output_tokens,
        )
        .await;

    let mut store = state.store()?;
    let report = store.finish_round(ticket, reply, &state.settings)?;
    Ok(Json(AdvanceResponse {
        message: report.message(),
        report,
        status: StatusJson::from(&*store),
    }))
}

pub async fn reset(State(state): State<Arc<AppState>>) -> Result<Json<StatusJson>, ApiError> {
    let mut store = state.store()?;
    store.reset();
    Ok(Json(StatusJson::from(&*store)))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusJson>, ApiError> {
    let store = state.store()?;
    Ok(Json(StatusJson::from(&*store)))
}

/// Download the accumulated table as an HTML file.
pub async fn toc(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let html = state
        .store()?
        .session()
        .map(|s| s.accumulator().html())
        .unwrap_or_default();
    if html.is_empty() {
        return Err(ApiError::new(
            axum::http::StatusCode::NOT_FOUND,
            "Nothing generated yet",
        ));
    }
    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"table_of_contents.html\"",
            ),
        ],
        html,
    ))
}
