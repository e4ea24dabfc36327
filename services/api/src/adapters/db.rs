//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DirectoryService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slanglab_core::domain::{
    MonitoringRecord, MonitoringStatus, Plan, PlanCatalog, PlanLimits, Platform, Principal,
    Quota, QuotaKind, Role, Sighting, SourceRule, Term, UsageCounter, UsagePeriod,
    UserCredentials,
};
use slanglab_core::monitoring;
use slanglab_core::ports::{DirectoryService, PortError, PortResult};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::collections::BTreeSet;
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DirectoryService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => PortError::Unavailable(e.to_string()),
        other => PortError::Unexpected(other.to_string()),
    }
}

/// Advisory-lock key for a term: the first 8 bytes of its UUID.
fn term_lock_key(term_id: Uuid) -> i64 {
    let bytes = term_id.as_bytes();
    i64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ])
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct PrincipalRecord {
    user_id: Uuid,
    role: String,
    plan: String,
}

impl PrincipalRecord {
    fn to_domain(self) -> PortResult<Principal> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| PortError::Unexpected(format!("unknown role '{}'", self.role)))?;
        let plan = Plan::parse(&self.plan)
            .ok_or_else(|| PortError::Unexpected(format!("unknown plan '{}'", self.plan)))?;
        Ok(Principal {
            user_id: self.user_id,
            role,
            plan,
        })
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}

impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct PlanLimitsRecord {
    plan: String,
    searches_per_day: i64,
    ai_creations_per_week: i64,
    manual_creations_per_week: i64,
    tracking_allowed: bool,
    analytics_allowed: bool,
}

impl PlanLimitsRecord {
    fn to_domain(&self) -> PlanLimits {
        PlanLimits {
            searches_per_day: Quota::from_raw(self.searches_per_day),
            ai_creations_per_week: Quota::from_raw(self.ai_creations_per_week),
            manual_creations_per_week: Quota::from_raw(self.manual_creations_per_week),
            tracking_allowed: self.tracking_allowed,
            analytics_allowed: self.analytics_allowed,
        }
    }
}

#[derive(FromRow)]
struct UsageRecord {
    searches_used: i64,
    ai_creations_used: i64,
    manual_creations_used: i64,
}

impl UsageRecord {
    fn to_domain(self) -> UsageCounter {
        UsageCounter {
            searches_used: self.searches_used.max(0) as u32,
            ai_creations_used: self.ai_creations_used.max(0) as u32,
            manual_creations_used: self.manual_creations_used.max(0) as u32,
        }
    }
}

#[derive(FromRow)]
struct TermRecord {
    id: Uuid,
    owner_id: Uuid,
    text: String,
    normalized: String,
    definition: Option<String>,
    example_usage: Option<String>,
    created_at: DateTime<Utc>,
}

impl TermRecord {
    fn to_domain(self) -> Term {
        Term {
            id: self.id,
            owner_id: self.owner_id,
            text: self.text,
            normalized: self.normalized,
            definition: self.definition,
            example_usage: self.example_usage,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SightingRecord {
    source: String,
    url: String,
    snippet: String,
    score: i16,
    observed_at: DateTime<Utc>,
}

impl SightingRecord {
    fn to_domain(self) -> Sighting {
        Sighting {
            source: self.source,
            url: self.url,
            snippet: self.snippet,
            score: self.score.clamp(0, 100) as u8,
            observed_at: self.observed_at,
        }
    }
}

#[derive(FromRow)]
struct MonitoringRecordRow {
    term_id: Uuid,
    owner_id: Uuid,
    status: String,
    trending_score: i64,
    times_found: i64,
    last_checked_at: DateTime<Utc>,
    last_found_at: Option<DateTime<Utc>>,
    platforms: Vec<String>,
}

impl MonitoringRecordRow {
    fn to_domain(self) -> PortResult<MonitoringRecord> {
        let status = MonitoringStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("unknown monitoring status '{}'", self.status))
        })?;
        let mut platforms = BTreeSet::new();
        for name in &self.platforms {
            match Platform::parse(name) {
                Some(platform) => {
                    platforms.insert(platform);
                }
                None => warn!("Ignoring unknown platform '{}' on term {}", name, self.term_id),
            }
        }
        Ok(MonitoringRecord {
            term_id: self.term_id,
            owner_id: self.owner_id,
            status,
            trending_score: self.trending_score,
            times_found: self.times_found,
            last_checked_at: self.last_checked_at,
            last_found_at: self.last_found_at,
            platforms,
        })
    }
}

#[derive(FromRow)]
struct SourceRuleRecord {
    name: String,
    enabled: bool,
    min_score: i16,
}

impl SourceRuleRecord {
    fn to_domain(self) -> SourceRule {
        SourceRule {
            name: self.name,
            enabled: self.enabled,
            min_score: self.min_score.clamp(0, 100) as u8,
        }
    }
}

#[derive(FromRow)]
struct DueRecordRow {
    id: Uuid,
    owner_id: Uuid,
    text: String,
    normalized: String,
    definition: Option<String>,
    example_usage: Option<String>,
    created_at: DateTime<Utc>,
    status: String,
    trending_score: i64,
    times_found: i64,
    last_checked_at: DateTime<Utc>,
    last_found_at: Option<DateTime<Utc>>,
    platforms: Vec<String>,
    record_owner_id: Uuid,
}

//=========================================================================================
// `DirectoryService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DirectoryService for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<Principal> {
        let record = sqlx::query_as::<_, PrincipalRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING user_id, role, plan",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        record.to_domain()
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        match row {
            Some((user_id,)) => Ok(user_id),
            None => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn get_principal(&self, user_id: Uuid) -> PortResult<Principal> {
        let record = sqlx::query_as::<_, PrincipalRecord>(
            "SELECT user_id, role, plan FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn load_plan_catalog(&self) -> PortResult<PlanCatalog> {
        let records = sqlx::query_as::<_, PlanLimitsRecord>(
            "SELECT plan, searches_per_day, ai_creations_per_week, manual_creations_per_week, \
             tracking_allowed, analytics_allowed FROM plan_limits",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let mut entries = Vec::new();
        for record in &records {
            match Plan::parse(&record.plan) {
                Some(plan) => entries.push((plan, record.to_domain())),
                None => warn!("Ignoring plan_limits row for unknown plan '{}'", record.plan),
            }
        }
        // A plan with no row stays absent from the catalog; the entitlement
        // engine treats that as fully locked. Flag it here where it is
        // detectable.
        for plan in Plan::ALL {
            if !entries.iter().any(|(p, _)| *p == plan) {
                tracing::error!(
                    "plan_limits is missing an entry for plan '{}'; that plan is now locked",
                    plan.as_str()
                );
            }
        }
        Ok(PlanCatalog::new(entries))
    }

    async fn fetch_usage(
        &self,
        user_id: Uuid,
        period: UsagePeriod,
    ) -> PortResult<Option<UsageCounter>> {
        let record = sqlx::query_as::<_, UsageRecord>(
            "SELECT searches_used, ai_creations_used, manual_creations_used \
             FROM usage_counters WHERE user_id = $1 AND period_kind = $2 AND period_start = $3",
        )
        .bind(user_id)
        .bind(period.kind().as_str())
        .bind(period.start())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(UsageRecord::to_domain))
    }

    async fn add_usage(
        &self,
        user_id: Uuid,
        period: UsagePeriod,
        kind: QuotaKind,
    ) -> PortResult<()> {
        // Single atomic upsert: two concurrent increments both land, no
        // read-modify-write in application code.
        let (searches, ai, manual) = match kind {
            QuotaKind::Search => (1i64, 0i64, 0i64),
            QuotaKind::AiCreation => (0, 1, 0),
            QuotaKind::ManualCreation => (0, 0, 1),
        };
        sqlx::query(
            "INSERT INTO usage_counters \
             (user_id, period_kind, period_start, searches_used, ai_creations_used, manual_creations_used) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id, period_kind, period_start) DO UPDATE SET \
             searches_used = usage_counters.searches_used + EXCLUDED.searches_used, \
             ai_creations_used = usage_counters.ai_creations_used + EXCLUDED.ai_creations_used, \
             manual_creations_used = usage_counters.manual_creations_used + EXCLUDED.manual_creations_used",
        )
        .bind(user_id)
        .bind(period.kind().as_str())
        .bind(period.start())
        .bind(searches)
        .bind(ai)
        .bind(manual)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_or_create_term(
        &self,
        owner_id: Uuid,
        text: &str,
        definition: Option<&str>,
        example_usage: Option<&str>,
    ) -> PortResult<Term> {
        let normalized = slanglab_core::domain::normalize_phrase(text);
        if normalized.is_empty() {
            return Err(PortError::Invalid("term text is empty".to_string()));
        }
        sqlx::query(
            "INSERT INTO terms (id, owner_id, text, normalized, definition, example_usage) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (owner_id, normalized) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(text)
        .bind(&normalized)
        .bind(definition)
        .bind(example_usage)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        let record = sqlx::query_as::<_, TermRecord>(
            "SELECT id, owner_id, text, normalized, definition, example_usage, created_at \
             FROM terms WHERE owner_id = $1 AND normalized = $2",
        )
        .bind(owner_id)
        .bind(&normalized)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_term(&self, term_id: Uuid) -> PortResult<Term> {
        let record = sqlx::query_as::<_, TermRecord>(
            "SELECT id, owner_id, text, normalized, definition, example_usage, created_at \
             FROM terms WHERE id = $1",
        )
        .bind(term_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Term {} not found", term_id)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn search_terms(&self, normalized: &str) -> PortResult<Vec<Term>> {
        let records = sqlx::query_as::<_, TermRecord>(
            "SELECT id, owner_id, text, normalized, definition, example_usage, created_at \
             FROM terms WHERE normalized = $1 ORDER BY created_at ASC",
        )
        .bind(normalized)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(TermRecord::to_domain).collect())
    }

    async fn sightings_since(
        &self,
        term_id: Uuid,
        since: DateTime<Utc>,
    ) -> PortResult<Vec<Sighting>> {
        let records = sqlx::query_as::<_, SightingRecord>(
            "SELECT source, url, snippet, score, observed_at FROM sightings \
             WHERE term_id = $1 AND observed_at >= $2 ORDER BY observed_at ASC",
        )
        .bind(term_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(SightingRecord::to_domain).collect())
    }

    async fn get_monitoring_record(
        &self,
        term_id: Uuid,
        owner_id: Uuid,
    ) -> PortResult<Option<MonitoringRecord>> {
        let row = sqlx::query_as::<_, MonitoringRecordRow>(
            "SELECT term_id, owner_id, status, trending_score, times_found, \
             last_checked_at, last_found_at, platforms \
             FROM monitoring_records WHERE term_id = $1 AND owner_id = $2",
        )
        .bind(term_id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        row.map(MonitoringRecordRow::to_domain).transpose()
    }

    async fn start_monitoring(
        &self,
        term_id: Uuid,
        owner_id: Uuid,
        now: DateTime<Utc>,
    ) -> PortResult<MonitoringRecord> {
        // Idempotent: tracking an already-tracked term leaves the existing
        // record untouched and returns it.
        sqlx::query(
            "INSERT INTO monitoring_records (term_id, owner_id, last_checked_at) \
             VALUES ($1, $2, $3) ON CONFLICT (term_id, owner_id) DO NOTHING",
        )
        .bind(term_id)
        .bind(owner_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        match self.get_monitoring_record(term_id, owner_id).await? {
            Some(record) => Ok(record),
            None => Err(PortError::Unexpected(format!(
                "monitoring record for term {} vanished after upsert",
                term_id
            ))),
        }
    }

    async fn due_monitoring_records(
        &self,
        checked_before: DateTime<Utc>,
        limit: i64,
    ) -> PortResult<Vec<(Term, MonitoringRecord)>> {
        let rows = sqlx::query_as::<_, DueRecordRow>(
            "SELECT t.id, t.owner_id, t.text, t.normalized, t.definition, t.example_usage, \
             t.created_at, m.status, m.trending_score, m.times_found, m.last_checked_at, \
             m.last_found_at, m.platforms, m.owner_id AS record_owner_id \
             FROM monitoring_records m JOIN terms t ON t.id = m.term_id \
             WHERE m.last_checked_at < $1 ORDER BY m.last_checked_at ASC LIMIT $2",
        )
        .bind(checked_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        let mut due = Vec::with_capacity(rows.len());
        for row in rows {
            let term = Term {
                id: row.id,
                owner_id: row.owner_id,
                text: row.text,
                normalized: row.normalized,
                definition: row.definition,
                example_usage: row.example_usage,
                created_at: row.created_at,
            };
            let record = MonitoringRecordRow {
                term_id: term.id,
                owner_id: row.record_owner_id,
                status: row.status,
                trending_score: row.trending_score,
                times_found: row.times_found,
                last_checked_at: row.last_checked_at,
                last_found_at: row.last_found_at,
                platforms: row.platforms,
            }
            .to_domain()?;
            due.push((term, record));
        }
        Ok(due)
    }

    async fn apply_sighting_batch(
        &self,
        term: &Term,
        owner_id: Uuid,
        accepted: &[Sighting],
        min_score: u8,
        now: DateTime<Utc>,
    ) -> PortResult<MonitoringRecord> {
        let mut tx: Transaction<'_, Postgres> =
            self.pool.begin().await.map_err(unexpected)?;

        // Serialize per term: overlapping passes for the same term queue
        // behind this transaction-scoped advisory lock.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(term_lock_key(term.id))
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        let prior_row = sqlx::query_as::<_, MonitoringRecordRow>(
            "SELECT term_id, owner_id, status, trending_score, times_found, \
             last_checked_at, last_found_at, platforms \
             FROM monitoring_records WHERE term_id = $1 AND owner_id = $2",
        )
        .bind(term.id)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Monitoring record for term {} not found", term.id))
            }
            _ => unexpected(e),
        })?;
        let prior = prior_row.to_domain()?;

        for sighting in accepted {
            sqlx::query(
                "INSERT INTO sightings (id, term_id, source, url, snippet, score, observed_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(Uuid::new_v4())
            .bind(term.id)
            .bind(&sighting.source)
            .bind(&sighting.url)
            .bind(&sighting.snippet)
            .bind(i16::from(sighting.score))
            .bind(sighting.observed_at)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        }

        let updated = monitoring::record_sighting_batch(term, accepted, &prior, min_score, now);
        let platform_names: Vec<String> = updated
            .platforms
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();

        sqlx::query(
            "UPDATE monitoring_records SET status = $1, trending_score = $2, times_found = $3, \
             last_checked_at = $4, last_found_at = $5, platforms = $6 \
             WHERE term_id = $7 AND owner_id = $8",
        )
        .bind(updated.status.as_str())
        .bind(updated.trending_score)
        .bind(updated.times_found)
        .bind(updated.last_checked_at)
        .bind(updated.last_found_at)
        .bind(&platform_names)
        .bind(term.id)
        .bind(owner_id)
        .execute(&mut *tx)
        .await
        .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(updated)
    }

    async fn list_source_rules(&self) -> PortResult<Vec<SourceRule>> {
        let records = sqlx::query_as::<_, SourceRuleRecord>(
            "SELECT name, enabled, min_score FROM source_rules ORDER BY name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(SourceRuleRecord::to_domain).collect())
    }

    async fn upsert_source_rule(&self, rule: &SourceRule) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO source_rules (name, enabled, min_score) VALUES ($1, $2, $3) \
             ON CONFLICT (name) DO UPDATE SET enabled = EXCLUDED.enabled, \
             min_score = EXCLUDED.min_score",
        )
        .bind(&rule.name)
        .bind(rule.enabled)
        .bind(i16::from(rule.min_score))
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}
