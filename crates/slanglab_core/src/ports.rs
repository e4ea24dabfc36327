//! crates/slanglab_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    MonitoringRecord, PlanCatalog, Principal, QuotaKind, Sighting, SourceRule, Term, UsageCounter,
    UsagePeriod, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A transient backend failure or timeout. Quota checks against a
    /// finite limit treat this as fail-closed.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    /// A single malformed item, rejected without failing its batch.
    #[error("Malformed input: {0}")]
    Invalid(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DirectoryService: Send + Sync {
    // --- Auth Methods ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<Principal>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    /// Resolves a user id to its principal (role + plan). The plan field is
    /// written externally by the subscription sync; it is only read here.
    async fn get_principal(&self, user_id: Uuid) -> PortResult<Principal>;

    // --- Plan Limits ---
    async fn load_plan_catalog(&self) -> PortResult<PlanCatalog>;

    // --- Usage Counters ---
    /// One read per check. `None` means no counter row exists yet for the
    /// period (nothing used).
    async fn fetch_usage(
        &self,
        user_id: Uuid,
        period: UsagePeriod,
    ) -> PortResult<Option<UsageCounter>>;

    /// Atomic insert-or-add increment keyed by (user, period). Never
    /// read-modify-write; two concurrent calls must both land.
    async fn add_usage(&self, user_id: Uuid, period: UsagePeriod, kind: QuotaKind)
        -> PortResult<()>;

    // --- Terms ---
    /// Idempotent per (owner, normalized text): re-creating a phrase returns
    /// the existing term.
    async fn get_or_create_term(
        &self,
        owner_id: Uuid,
        text: &str,
        definition: Option<&str>,
        example_usage: Option<&str>,
    ) -> PortResult<Term>;

    async fn get_term(&self, term_id: Uuid) -> PortResult<Term>;

    async fn search_terms(&self, normalized: &str) -> PortResult<Vec<Term>>;

    async fn sightings_since(
        &self,
        term_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<Sighting>>;

    // --- Monitoring ---
    async fn get_monitoring_record(
        &self,
        term_id: Uuid,
        owner_id: Uuid,
    ) -> PortResult<Option<MonitoringRecord>>;

    /// Idempotent upsert keyed by (term, owner): tracking an already-tracked
    /// term returns the existing record untouched.
    async fn start_monitoring(
        &self,
        term_id: Uuid,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> PortResult<MonitoringRecord>;

    /// Records whose last check is older than `checked_before`, oldest first.
    async fn due_monitoring_records(
        &self,
        checked_before: DateTime<Utc>,
        limit: i64,
    ) -> PortResult<Vec<(Term, MonitoringRecord)>>;

    /// Persists accepted sightings and folds them into the term's record in
    /// one serialized step: the implementation must hold a per-term lock so
    /// overlapping passes cannot double-count or race the status transition.
    async fn apply_sighting_batch(
        &self,
        term: &Term,
        owner_id: Uuid,
        accepted: &[Sighting],
        min_score: u8,
        now: DateTime<Utc>,
    ) -> PortResult<MonitoringRecord>;

    // --- Source Rules ---
    async fn list_source_rules(&self) -> PortResult<Vec<SourceRule>>;

    async fn upsert_source_rule(&self, rule: &SourceRule) -> PortResult<()>;
}

/// One raw mention candidate from the evidence provider, unvalidated.
#[derive(Debug, Clone)]
pub struct SightingCandidate {
    pub source: Option<String>,
    pub url: Option<String>,
    pub snippet: Option<String>,
    pub score: Option<i64>,
    pub observed_at: Option<DateTime<Utc>>,
}

impl SightingCandidate {
    /// Validates one candidate into a sighting. A missing field or an
    /// out-of-range score rejects just this item, never the whole batch.
    pub fn into_sighting(self) -> PortResult<Sighting> {
        let source = self
            .source
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PortError::Invalid("sighting missing source".to_string()))?;
        let url = self
            .url
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PortError::Invalid("sighting missing url".to_string()))?;
        let snippet = self
            .snippet
            .ok_or_else(|| PortError::Invalid("sighting missing snippet".to_string()))?;
        let score = self
            .score
            .ok_or_else(|| PortError::Invalid("sighting missing score".to_string()))?;
        if !(0..=100).contains(&score) {
            return Err(PortError::Invalid(format!(
                "sighting score {score} outside 0-100"
            )));
        }
        let observed_at = self
            .observed_at
            .ok_or_else(|| PortError::Invalid("sighting missing timestamp".to_string()))?;
        Ok(Sighting {
            source,
            url,
            snippet,
            score: score as u8,
            observed_at,
        })
    }
}

#[async_trait]
pub trait EvidenceService: Send + Sync {
    /// Fetches raw mention candidates for a phrase from the external
    /// search/evidence provider.
    async fn find_mentions(&self, phrase: &str) -> PortResult<Vec<SightingCandidate>>;
}

/// A draft definition and example for an AI-created term.
#[derive(Debug, Clone)]
pub struct TermDraft {
    pub definition: String,
    pub example_usage: String,
}

#[async_trait]
pub trait TermCreationService: Send + Sync {
    /// Drafts a definition and example usage for a new slang phrase.
    async fn draft_term(&self, phrase: &str) -> PortResult<TermDraft>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_validation_rejects_single_items() {
        let good = SightingCandidate {
            source: Some("web_search".into()),
            url: Some("https://example.com/a".into()),
            snippet: Some("snippet".into()),
            score: Some(55),
            observed_at: Some(Utc::now()),
        };
        assert!(good.into_sighting().is_ok());

        let missing_url = SightingCandidate {
            source: Some("web_search".into()),
            url: None,
            snippet: Some("snippet".into()),
            score: Some(55),
            observed_at: Some(Utc::now()),
        };
        assert!(matches!(
            missing_url.into_sighting(),
            Err(PortError::Invalid(_))
        ));

        let out_of_range = SightingCandidate {
            source: Some("web_search".into()),
            url: Some("https://example.com/a".into()),
            snippet: Some("snippet".into()),
            score: Some(250),
            observed_at: Some(Utc::now()),
        };
        assert!(matches!(
            out_of_range.into_sighting(),
            Err(PortError::Invalid(_))
        ));
    }
}
