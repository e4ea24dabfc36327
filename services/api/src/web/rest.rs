//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use slanglab_core::domain::{
    AccessDecision, Capability, DenyReason, MonitoringRecord, PrincipalState, Quota, Term,
    TrendSummary, UsagePeriod,
};
use slanglab_core::entitlement::{evaluate, EntitlementCheck, UsageLookup};
use slanglab_core::monitoring::compute_trend_summary;
use slanglab_core::ports::PortError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::web::state::AppState;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        lookup_handler,
        create_term_handler,
        create_term_ai_handler,
        track_term_handler,
        trends_handler,
        access_handler,
        list_sources_handler,
        upsert_source_handler,
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
    ),
    components(
        schemas(
            AccessDecisionDto,
            TermDto,
            SearchResponse,
            CreateTermRequest,
            CreateAiTermRequest,
            MonitoringRecordDto,
            TrendSummaryDto,
            TrendSeriesDto,
            TrendPointDto,
            SourceRuleDto,
            UpsertSourceRequest,
            crate::web::monitor_task::MonitoringPassSummary,
            crate::web::auth::SignupRequest,
            crate::web::auth::LoginRequest,
            crate::web::auth::AuthResponse,
        )
    ),
    tags(
        (name = "SlangLab API", description = "API endpoints for slang lookup, creation, and tracking.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The wire form of an access decision. `remaining = -1` means unlimited;
/// it is never conflated with zero. `allowed` is absent while the principal
/// is still resolving.
#[derive(Serialize, ToSchema)]
pub struct AccessDecisionDto {
    pub allowed: Option<bool>,
    pub reason: Option<String>,
    pub required_plan: Option<String>,
    pub quota_kind: Option<String>,
    pub remaining: Option<i64>,
}

impl AccessDecisionDto {
    pub fn from_decision(decision: &AccessDecision) -> Self {
        match decision {
            AccessDecision::Pending => Self {
                allowed: None,
                reason: None,
                required_plan: None,
                quota_kind: None,
                remaining: None,
            },
            AccessDecision::Granted { remaining } => Self {
                allowed: Some(true),
                reason: None,
                required_plan: None,
                quota_kind: None,
                remaining: Some(remaining.to_raw()),
            },
            AccessDecision::Denied { reason } => {
                let (code, required_plan, quota_kind, remaining) = match reason {
                    DenyReason::AuthenticationRequired => {
                        ("authentication_required", None, None, None)
                    }
                    DenyReason::PlanRequired(plan) => {
                        ("plan_required", Some(plan.as_str().to_string()), None, None)
                    }
                    DenyReason::AdminRequired => ("admin_required", None, None, None),
                    DenyReason::QuotaExceeded(kind) => (
                        "quota_exceeded",
                        None,
                        Some(kind.as_str().to_string()),
                        Some(0),
                    ),
                };
                Self {
                    allowed: Some(false),
                    reason: Some(code.to_string()),
                    required_plan,
                    quota_kind,
                    remaining,
                }
            }
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TermDto {
    pub id: Uuid,
    pub phrase: String,
    pub normalized: String,
    pub definition: Option<String>,
    pub example_usage: Option<String>,
    pub created_at: chrono::DateTime<Utc>,
}

impl TermDto {
    fn from_domain(term: Term) -> Self {
        Self {
            id: term.id,
            phrase: term.text,
            normalized: term.normalized,
            definition: term.definition,
            example_usage: term.example_usage,
            created_at: term.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SearchResponse {
    pub results: Vec<TermDto>,
    /// Searches left in the current period; -1 means unlimited.
    pub remaining: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateTermRequest {
    pub phrase: String,
    pub definition: Option<String>,
    pub example_usage: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateAiTermRequest {
    pub phrase: String,
}

#[derive(Serialize, ToSchema)]
pub struct MonitoringRecordDto {
    pub term_id: Uuid,
    pub status: String,
    pub trending_score: i64,
    pub times_found: i64,
    pub last_checked_at: chrono::DateTime<Utc>,
    pub last_found_at: Option<chrono::DateTime<Utc>>,
    pub platforms: Vec<String>,
}

impl MonitoringRecordDto {
    pub fn from_domain(record: &MonitoringRecord) -> Self {
        Self {
            term_id: record.term_id,
            status: record.status.as_str().to_string(),
            trending_score: record.trending_score,
            times_found: record.times_found,
            last_checked_at: record.last_checked_at,
            last_found_at: record.last_found_at,
            platforms: record
                .platforms
                .iter()
                .map(|p| p.as_str().to_string())
                .collect(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TrendPointDto {
    pub date: chrono::NaiveDate,
    pub index: f64,
}

#[derive(Serialize, ToSchema)]
pub struct TrendSeriesDto {
    pub window_days: u32,
    pub points: Vec<TrendPointDto>,
}

#[derive(Serialize, ToSchema)]
pub struct TrendSummaryDto {
    pub series: Vec<TrendSeriesDto>,
    pub distinct_urls: usize,
    pub distinct_sources: usize,
    pub mean_score: f64,
}

impl TrendSummaryDto {
    fn from_domain(summary: TrendSummary) -> Self {
        Self {
            series: summary
                .series
                .into_iter()
                .map(|s| TrendSeriesDto {
                    window_days: s.window_days,
                    points: s
                        .points
                        .into_iter()
                        .map(|p| TrendPointDto {
                            date: p.date,
                            index: p.index,
                        })
                        .collect(),
                })
                .collect(),
            distinct_urls: summary.distinct_urls,
            distinct_sources: summary.distinct_sources,
            mean_score: summary.mean_score,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct SourceRuleDto {
    pub name: String,
    pub enabled: bool,
    pub min_score: u8,
}

//=========================================================================================
// Entitlement Glue
//=========================================================================================

/// Wraps a port call in the configured backend timeout. A timed-out call
/// surfaces as `Unavailable`, which the entitlement engine fails closed on.
pub(crate) async fn with_timeout<T>(
    duration: Duration,
    fut: impl Future<Output = Result<T, PortError>>,
) -> Result<T, PortError> {
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(PortError::Unavailable("backend call timed out".to_string())),
    }
}

/// One usage read per check, scoped to the period the capability meters on.
/// Capabilities without a quota skip the read entirely.
async fn usage_for(
    state: &AppState,
    principal: &PrincipalState,
    capability: Capability,
) -> UsageLookup {
    let principal = match principal {
        PrincipalState::Authenticated(p) => p,
        _ => return UsageLookup::Available(Default::default()),
    };
    let period = match capability {
        Capability::Search => UsagePeriod::day_of(Utc::now()),
        Capability::AiCreation | Capability::ManualCreation => UsagePeriod::week_of(Utc::now()),
        Capability::Tracking | Capability::Analytics | Capability::AdminFeature => {
            return UsageLookup::Available(Default::default())
        }
    };
    match with_timeout(
        state.config.backend_timeout,
        state.directory.fetch_usage(principal.user_id, period),
    )
    .await
    {
        Ok(counter) => UsageLookup::Available(counter.unwrap_or_default()),
        Err(e) => {
            warn!("Usage lookup failed for {}: {:?}", principal.user_id, e);
            UsageLookup::Unavailable
        }
    }
}

/// Runs the entitlement check for a handler and converts a non-granted
/// decision into the HTTP response the caller should return.
async fn check_access(
    state: &AppState,
    principal: &PrincipalState,
    capability: Capability,
    anonymous_searches_used: u32,
) -> Result<Quota, Response> {
    let usage = usage_for(state, principal, capability).await;
    let check = EntitlementCheck::new(&state.catalog)
        .with_usage(usage)
        .with_anonymous_searches(anonymous_searches_used);
    let decision = evaluate(principal, capability, &check);
    match decision {
        AccessDecision::Granted { remaining } => Ok(remaining),
        AccessDecision::Pending => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(AccessDecisionDto::from_decision(&decision)),
        )
            .into_response()),
        AccessDecision::Denied { reason } => {
            let status = match reason {
                DenyReason::AuthenticationRequired => StatusCode::UNAUTHORIZED,
                DenyReason::PlanRequired(_) => StatusCode::PAYMENT_REQUIRED,
                DenyReason::AdminRequired => StatusCode::FORBIDDEN,
                DenyReason::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            };
            Err((status, Json(AccessDecisionDto::from_decision(&decision))).into_response())
        }
    }
}

fn require_authenticated(
    principal: &PrincipalState,
) -> Result<&slanglab_core::domain::Principal, (StatusCode, String)> {
    match principal {
        PrincipalState::Authenticated(p) => Ok(p),
        _ => Err((StatusCode::UNAUTHORIZED, "Authentication required".to_string())),
    }
}

/// Bumps a usage counter after the gated action committed. A failed bump is
/// logged, never surfaced: the action already succeeded, and undercounting
/// here beats failing a completed request.
async fn bump_usage(state: &AppState, user_id: Uuid, period: UsagePeriod, kind: slanglab_core::domain::QuotaKind) {
    if let Err(e) = state.directory.add_usage(user_id, period, kind).await {
        error!("Failed to record {} usage for {}: {:?}", kind.as_str(), user_id, e);
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

#[derive(Deserialize)]
pub struct LookupParams {
    pub phrase: String,
    /// Client-local anonymous search count. Only meaningful for anonymous
    /// callers; it has no reset period and no cross-device consistency.
    #[serde(default)]
    pub anon_searches: u32,
}

/// Look up a slang phrase.
///
/// Open to anonymous callers, who get exactly one search metered by the
/// client-local counter they echo back in `anon_searches`.
#[utoipa::path(
    get,
    path = "/lookup",
    params(
        ("phrase" = String, Query, description = "The phrase to look up."),
        ("anon_searches" = u32, Query, description = "Client-local anonymous search count.")
    ),
    responses(
        (status = 200, description = "Lookup results", body = SearchResponse),
        (status = 401, description = "Authentication required", body = AccessDecisionDto),
        (status = 429, description = "Quota exceeded", body = AccessDecisionDto),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn lookup_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<PrincipalState>,
    Query(params): Query<LookupParams>,
) -> Result<Response, (StatusCode, String)> {
    let remaining = match check_access(&state, &principal, Capability::Search, params.anon_searches)
        .await
    {
        Ok(remaining) => remaining,
        Err(denied) => return Ok(denied),
    };

    let normalized = slanglab_core::domain::normalize_phrase(&params.phrase);
    if normalized.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "phrase must not be empty".to_string()));
    }

    let terms = with_timeout(
        state.config.backend_timeout,
        state.directory.search_terms(&normalized),
    )
    .await
    .map_err(|e| {
        error!("Failed to search terms: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Search failed, please retry".to_string())
    })?;

    // Increment-after-commit: the search has produced its result, now meter it.
    if let PrincipalState::Authenticated(p) = &principal {
        bump_usage(
            &state,
            p.user_id,
            UsagePeriod::day_of(Utc::now()),
            slanglab_core::domain::QuotaKind::Search,
        )
        .await;
    }

    let response = SearchResponse {
        results: terms.into_iter().map(TermDto::from_domain).collect(),
        remaining: remaining.to_raw(),
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Create a slang term manually.
#[utoipa::path(
    post,
    path = "/terms",
    request_body = CreateTermRequest,
    responses(
        (status = 201, description = "Term created", body = TermDto),
        (status = 401, description = "Authentication required", body = AccessDecisionDto),
        (status = 429, description = "Quota exceeded", body = AccessDecisionDto),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_term_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<PrincipalState>,
    Json(req): Json<CreateTermRequest>,
) -> Result<Response, (StatusCode, String)> {
    if let Err(denied) = check_access(&state, &principal, Capability::ManualCreation, 0).await {
        return Ok(denied);
    }
    let user = require_authenticated(&principal)?;

    let term = with_timeout(
        state.config.backend_timeout,
        state.directory.get_or_create_term(
            user.user_id,
            req.phrase.trim(),
            req.definition.as_deref(),
            req.example_usage.as_deref(),
        ),
    )
    .await
    .map_err(|e| match e {
            PortError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg),
            other => {
                error!("Failed to create term: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create term".to_string())
            }
        })?;

    bump_usage(
        &state,
        user.user_id,
        UsagePeriod::week_of(Utc::now()),
        slanglab_core::domain::QuotaKind::ManualCreation,
    )
    .await;

    Ok((StatusCode::CREATED, Json(TermDto::from_domain(term))).into_response())
}

/// Create a slang term with an AI-drafted definition and example.
#[utoipa::path(
    post,
    path = "/terms/ai",
    request_body = CreateAiTermRequest,
    responses(
        (status = 201, description = "Term created", body = TermDto),
        (status = 401, description = "Authentication required", body = AccessDecisionDto),
        (status = 429, description = "Quota exceeded", body = AccessDecisionDto),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_term_ai_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<PrincipalState>,
    Json(req): Json<CreateAiTermRequest>,
) -> Result<Response, (StatusCode, String)> {
    if let Err(denied) = check_access(&state, &principal, Capability::AiCreation, 0).await {
        return Ok(denied);
    }
    let user = require_authenticated(&principal)?;

    let draft = state.creator.draft_term(req.phrase.trim()).await.map_err(|e| {
        error!("Failed to draft term: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to draft term, please retry".to_string())
    })?;

    let term = with_timeout(
        state.config.backend_timeout,
        state.directory.get_or_create_term(
            user.user_id,
            req.phrase.trim(),
            Some(&draft.definition),
            Some(&draft.example_usage),
        ),
    )
    .await
    .map_err(|e| match e {
            PortError::Invalid(msg) => (StatusCode::BAD_REQUEST, msg),
            other => {
                error!("Failed to create term: {:?}", other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create term".to_string())
            }
        })?;

    bump_usage(
        &state,
        user.user_id,
        UsagePeriod::week_of(Utc::now()),
        slanglab_core::domain::QuotaKind::AiCreation,
    )
    .await;

    Ok((StatusCode::CREATED, Json(TermDto::from_domain(term))).into_response())
}

/// Start tracking (sharing) a term. Idempotent per (term, owner).
#[utoipa::path(
    post,
    path = "/terms/{term_id}/track",
    params(("term_id" = Uuid, Path, description = "The term to track.")),
    responses(
        (status = 200, description = "Tracking active", body = MonitoringRecordDto),
        (status = 402, description = "Plan upgrade required", body = AccessDecisionDto),
        (status = 404, description = "Term not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn track_term_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<PrincipalState>,
    Path(term_id): Path<Uuid>,
) -> Result<Response, (StatusCode, String)> {
    if let Err(denied) = check_access(&state, &principal, Capability::Tracking, 0).await {
        return Ok(denied);
    }
    let user = require_authenticated(&principal)?;

    let term = with_timeout(state.config.backend_timeout, state.directory.get_term(term_id))
        .await
        .map_err(|e| match e {
            PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            other => {
                error!("Failed to load term {}: {:?}", term_id, other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load term".to_string())
            }
        })?;

    let record = with_timeout(
        state.config.backend_timeout,
        state.directory.start_monitoring(term.id, user.user_id, Utc::now()),
    )
    .await
    .map_err(|e| {
        error!("Failed to start monitoring term {}: {:?}", term_id, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start tracking".to_string())
    })?;

    Ok((StatusCode::OK, Json(MonitoringRecordDto::from_domain(&record))).into_response())
}

#[derive(Deserialize)]
pub struct TrendsParams {
    /// Comma-separated day windows, e.g. "7,30,90".
    pub windows: Option<String>,
}

const DEFAULT_WINDOWS: [u32; 3] = [7, 30, 90];
const MAX_WINDOW_DAYS: u32 = 365;

/// The Trending Index series and summary totals for a tracked term.
#[utoipa::path(
    get,
    path = "/terms/{term_id}/trends",
    params(
        ("term_id" = Uuid, Path, description = "The term to summarize."),
        ("windows" = Option<String>, Query, description = "Comma-separated day windows (default 7,30,90).")
    ),
    responses(
        (status = 200, description = "Trend summary", body = TrendSummaryDto),
        (status = 402, description = "Plan upgrade required", body = AccessDecisionDto),
        (status = 404, description = "Term not found"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn trends_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<PrincipalState>,
    Path(term_id): Path<Uuid>,
    Query(params): Query<TrendsParams>,
) -> Result<Response, (StatusCode, String)> {
    if let Err(denied) = check_access(&state, &principal, Capability::Analytics, 0).await {
        return Ok(denied);
    }

    let windows = parse_windows(params.windows.as_deref())?;

    let term = with_timeout(state.config.backend_timeout, state.directory.get_term(term_id))
        .await
        .map_err(|e| match e {
            PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            other => {
                error!("Failed to load term {}: {:?}", term_id, other);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load term".to_string())
            }
        })?;

    let min_score = state
        .thresholds
        .min_enabled_score(&state.directory)
        .await
        .map_err(|e| {
            error!("Source threshold unavailable: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Trend data unavailable".to_string())
        })?;

    let now = Utc::now();
    let today = now.date_naive();
    let max_window = windows.iter().copied().max().unwrap_or(90);
    // Fetch exactly the widest bucket range, [today - max_window, today],
    // so the summary totals cover the same rows as the buckets.
    let since = (today - ChronoDuration::days(i64::from(max_window)))
        .and_time(chrono::NaiveTime::MIN)
        .and_utc();
    let sightings = with_timeout(
        state.config.backend_timeout,
        state.directory.sightings_since(term.id, since),
    )
    .await
    .map_err(|e| {
        error!("Failed to load sightings for {}: {:?}", term_id, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Trend data unavailable, please retry".to_string())
    })?;

    let summary = compute_trend_summary(&sightings, &windows, min_score, today);
    Ok((StatusCode::OK, Json(TrendSummaryDto::from_domain(summary))).into_response())
}

fn parse_windows(raw: Option<&str>) -> Result<Vec<u32>, (StatusCode, String)> {
    let raw = match raw {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(DEFAULT_WINDOWS.to_vec()),
    };
    let mut windows = Vec::new();
    for part in raw.split(',') {
        let days: u32 = part.trim().parse().map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                format!("'{}' is not a valid window size", part.trim()),
            )
        })?;
        if days == 0 || days > MAX_WINDOW_DAYS {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("window must be between 1 and {} days", MAX_WINDOW_DAYS),
            ));
        }
        windows.push(days);
    }
    Ok(windows)
}

#[derive(Deserialize)]
pub struct AccessParams {
    pub capability: String,
    #[serde(default)]
    pub anon_searches: u32,
}

/// Evaluate a capability for the current principal, for UI prompts.
///
/// Always returns 200 with the structured decision; the capability name
/// itself being unknown is the only client error.
#[utoipa::path(
    get,
    path = "/me/access",
    params(
        ("capability" = String, Query, description = "Capability name, e.g. 'search'."),
        ("anon_searches" = u32, Query, description = "Client-local anonymous search count.")
    ),
    responses(
        (status = 200, description = "The access decision", body = AccessDecisionDto),
        (status = 400, description = "Unknown capability")
    )
)]
pub async fn access_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<PrincipalState>,
    Query(params): Query<AccessParams>,
) -> Result<Response, (StatusCode, String)> {
    let capability = Capability::parse(&params.capability).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("'{}' is not a recognized capability", params.capability),
        )
    })?;

    let usage = usage_for(&state, &principal, capability).await;
    let check = EntitlementCheck::new(&state.catalog)
        .with_usage(usage)
        .with_anonymous_searches(params.anon_searches);
    let decision = evaluate(&principal, capability, &check);
    Ok((StatusCode::OK, Json(AccessDecisionDto::from_decision(&decision))).into_response())
}

//=========================================================================================
// Admin: Source Rules
//=========================================================================================

/// List the per-source quality floors.
#[utoipa::path(
    get,
    path = "/admin/sources",
    responses(
        (status = 200, description = "All source rules", body = [SourceRuleDto]),
        (status = 403, description = "Admin required", body = AccessDecisionDto)
    )
)]
pub async fn list_sources_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<PrincipalState>,
) -> Result<Response, (StatusCode, String)> {
    if let Err(denied) = check_access(&state, &principal, Capability::AdminFeature, 0).await {
        return Ok(denied);
    }

    let rules = with_timeout(
        state.config.backend_timeout,
        state.directory.list_source_rules(),
    )
    .await
    .map_err(|e| {
        error!("Failed to list source rules: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list sources".to_string())
    })?;
    let dtos: Vec<SourceRuleDto> = rules
        .into_iter()
        .map(|r| SourceRuleDto {
            name: r.name,
            enabled: r.enabled,
            min_score: r.min_score,
        })
        .collect();
    Ok((StatusCode::OK, Json(dtos)).into_response())
}

#[derive(Deserialize, ToSchema)]
pub struct UpsertSourceRequest {
    pub enabled: bool,
    pub min_score: u8,
}

/// Create or update one source rule and invalidate the threshold cache.
#[utoipa::path(
    put,
    path = "/admin/sources/{name}",
    request_body = UpsertSourceRequest,
    params(("name" = String, Path, description = "The source name.")),
    responses(
        (status = 204, description = "Rule stored"),
        (status = 400, description = "Invalid rule"),
        (status = 403, description = "Admin required", body = AccessDecisionDto)
    )
)]
pub async fn upsert_source_handler(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<PrincipalState>,
    Path(name): Path<String>,
    Json(req): Json<UpsertSourceRequest>,
) -> Result<Response, (StatusCode, String)> {
    if let Err(denied) = check_access(&state, &principal, Capability::AdminFeature, 0).await {
        return Ok(denied);
    }

    if req.min_score > 100 {
        return Err((StatusCode::BAD_REQUEST, "min_score must be 0-100".to_string()));
    }
    if name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "source name must not be empty".to_string()));
    }

    let rule = slanglab_core::domain::SourceRule {
        name: name.trim().to_string(),
        enabled: req.enabled,
        min_score: req.min_score,
    };
    with_timeout(
        state.config.backend_timeout,
        state.directory.upsert_source_rule(&rule),
    )
    .await
    .map_err(|e| {
        error!("Failed to upsert source rule '{}': {:?}", rule.name, e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to store rule".to_string())
    })?;

    // The quality floor may have changed; the next sighting batch refetches.
    state.thresholds.invalidate().await;

    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slanglab_core::domain::{Plan, QuotaKind};

    #[test]
    fn windows_parse_and_validate() {
        assert_eq!(parse_windows(None).unwrap(), vec![7, 30, 90]);
        assert_eq!(parse_windows(Some("7, 14")).unwrap(), vec![7, 14]);
        assert!(parse_windows(Some("7,abc")).is_err());
        assert!(parse_windows(Some("0")).is_err());
        assert!(parse_windows(Some("400")).is_err());
    }

    #[test]
    fn decision_dto_preserves_the_unlimited_sentinel() {
        let unlimited = AccessDecisionDto::from_decision(&AccessDecision::Granted {
            remaining: Quota::Unlimited,
        });
        assert_eq!(unlimited.allowed, Some(true));
        assert_eq!(unlimited.remaining, Some(-1));

        let counted = AccessDecisionDto::from_decision(&AccessDecision::Granted {
            remaining: Quota::Count(0),
        });
        // A remaining count of zero is still an allow; it must not read as
        // unlimited.
        assert_eq!(counted.remaining, Some(0));
    }

    #[test]
    fn decision_dto_carries_machine_readable_reasons() {
        let quota = AccessDecisionDto::from_decision(&AccessDecision::Denied {
            reason: DenyReason::QuotaExceeded(QuotaKind::Search),
        });
        assert_eq!(quota.allowed, Some(false));
        assert_eq!(quota.reason.as_deref(), Some("quota_exceeded"));
        assert_eq!(quota.quota_kind.as_deref(), Some("search"));
        assert_eq!(quota.remaining, Some(0));

        let plan = AccessDecisionDto::from_decision(&AccessDecision::Denied {
            reason: DenyReason::PlanRequired(Plan::LabPro),
        });
        assert_eq!(plan.reason.as_deref(), Some("plan_required"));
        assert_eq!(plan.required_plan.as_deref(), Some("lab_pro"));

        let pending = AccessDecisionDto::from_decision(&AccessDecision::Pending);
        assert_eq!(pending.allowed, None);
        assert_eq!(pending.reason, None);
    }
}
