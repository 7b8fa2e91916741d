//! HTTP handlers for the triage service.

use std::sync::Arc;

use axum::{
  extract::{rejection::JsonRejection, State},
  http::StatusCode,
  routing::{get, post},
  Json, Router,
};
use serde::Serialize;
use triage_engine::{AnalyzeRequest, Analysis, AuditEntry};

use crate::audit;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
  pub error: String,
}

type HandlerError = (StatusCode, Json<ErrorBody>);

fn error(status: StatusCode, msg: impl Into<String>) -> HandlerError {
  (status, Json(ErrorBody { error: msg.into() }))
}

pub fn router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/analyze", post(analyze))
    .with_state(state)
}

pub async fn health() -> &'static str {
  "ok"
}

pub async fn analyze(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<Analysis>, HandlerError> {
  let Json(request) = payload.map_err(|e| {
    tracing::warn!(error = %e, "analyze: invalid request body");
    error(StatusCode::BAD_REQUEST, e.body_text())
  })?;

  // Pattern scanning is CPU-bound; keep it off the async workers.
  let engine = Arc::clone(&state.engine);
  let (request, analysis) = tokio::task::spawn_blocking(move || {
    let analysis = engine.analyze_request(&request);
    (request, analysis)
  })
  .await
  .map_err(|e| {
    tracing::error!(error = %e, "analyze: engine task failed");
    error(StatusCode::INTERNAL_SERVER_ERROR, "analysis failed")
  })?;

  if let Some(pool) = &state.pool {
    let entry = AuditEntry::new(&request.pull_request, &analysis).map_err(|e| {
      tracing::error!(error = %e, "analyze: audit entry");
      error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    audit::insert_entry(pool, &entry).await.map_err(|e| {
      tracing::error!(error = %e, "analyze: db error");
      error(StatusCode::INTERNAL_SERVER_ERROR, "audit write failed")
    })?;
  }

  tracing::info!(
    pr = request.pull_request.number,
    action = analysis.decision.action.as_str(),
    score = analysis.impact.score,
    "pull request triaged"
  );
  Ok(Json(analysis))
}
