//! services/api/src/web/monitor_task.rs
//!
//! One monitoring pass over the tracked terms that are due for a check.
//!
//! An external scheduler invokes this on its own cadence; the service keeps
//! no timer of its own. Each term is one unit of work: its failure is
//! caught, logged, and the batch continues. Per-term serialization against
//! overlapping passes is enforced by the store's advisory lock inside
//! `apply_sighting_batch`.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use slanglab_core::domain::{MonitoringRecord, Sighting, Term};
use slanglab_core::ports::PortError;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::web::rest::with_timeout;
use crate::web::state::AppState;

/// Header the external scheduler authenticates with.
const SCHEDULER_TOKEN_HEADER: &str = "x-scheduler-token";

#[derive(Serialize, ToSchema)]
pub struct MonitoringPassSummary {
    pub due: usize,
    pub processed: usize,
    pub failed: usize,
}

/// POST /internal/monitoring/run - execute one monitoring pass.
#[utoipa::path(
    post,
    path = "/internal/monitoring/run",
    responses(
        (status = 200, description = "Pass completed", body = MonitoringPassSummary),
        (status = 403, description = "Bad or missing scheduler token"),
        (status = 500, description = "Pass could not run")
    )
)]
pub async fn run_monitoring_pass_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, (StatusCode, String)> {
    let token = headers
        .get(SCHEDULER_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if token != state.config.scheduler_token {
        return Err((StatusCode::FORBIDDEN, "Invalid scheduler token".to_string()));
    }

    let summary = run_monitoring_pass(&state).await.map_err(|e| {
        error!("Monitoring pass refused to run: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Monitoring pass failed".to_string())
    })?;
    Ok((StatusCode::OK, Json(summary)).into_response())
}

/// Drives a batch of due terms through the sighting pipeline.
///
/// Refuses to run entirely when the source-rule configuration is unusable:
/// with no enabled sources there is no quality floor, and the safe
/// interpretation is to accept nothing.
pub async fn run_monitoring_pass(state: &Arc<AppState>) -> Result<MonitoringPassSummary, ApiError> {
    let min_score = state.thresholds.min_enabled_score(&state.directory).await?;

    let checked_before = Utc::now()
        - ChronoDuration::from_std(state.config.monitoring_interval)
            .unwrap_or_else(|_| ChronoDuration::hours(6));
    let due = with_timeout(
        state.config.backend_timeout,
        state
            .directory
            .due_monitoring_records(checked_before, state.config.monitoring_batch_size),
    )
    .await?;

    info!("Monitoring pass starting: {} terms due", due.len());
    let mut processed = 0usize;
    let mut failed = 0usize;
    let total = due.len();

    for (term, record) in due {
        match process_term(state, &term, &record, min_score).await {
            Ok(updated) => {
                processed += 1;
                info!(
                    "Term '{}' checked: status={} score={}",
                    term.text,
                    updated.status.as_str(),
                    updated.trending_score
                );
            }
            Err(e) => {
                // Partial-failure isolation: one term's failure never
                // aborts the rest of the batch.
                failed += 1;
                error!("Monitoring failed for term '{}': {:?}", term.text, e);
            }
        }
    }

    info!(
        "Monitoring pass finished: {} processed, {} failed",
        processed, failed
    );
    Ok(MonitoringPassSummary {
        due: total,
        processed,
        failed,
    })
}

/// Fetches evidence for one term and folds it into its monitoring record.
async fn process_term(
    state: &Arc<AppState>,
    term: &Term,
    record: &MonitoringRecord,
    min_score: u8,
) -> Result<MonitoringRecord, PortError> {
    let candidates = with_timeout(
        state.config.backend_timeout,
        state.evidence.find_mentions(&term.text),
    )
    .await?;

    // Validate candidates one at a time; a malformed item is dropped, the
    // rest of the batch proceeds.
    let mut sightings: Vec<Sighting> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match candidate.into_sighting() {
            Ok(sighting) => sightings.push(sighting),
            Err(e) => warn!("Dropping malformed sighting for '{}': {}", term.text, e),
        }
    }

    // Only sightings at or above the quality floor are persisted or counted.
    let accepted: Vec<Sighting> = sightings
        .into_iter()
        .filter(|s| s.score >= min_score)
        .collect();

    with_timeout(
        state.config.backend_timeout,
        state
            .directory
            .apply_sighting_batch(term, record.owner_id, &accepted, min_score, Utc::now()),
    )
    .await
}
