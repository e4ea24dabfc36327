//! crates/slanglab_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use std::collections::BTreeSet;
use uuid::Uuid;

//=========================================================================================
// Identity and Plans
//=========================================================================================

/// The role attached to an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "member" => Some(Role::Member),
            _ => None,
        }
    }
}

/// Subscription tier controlling quotas and feature access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Plan {
    Free,
    SearchPro,
    LabPro,
}

impl Plan {
    /// All plans, cheapest first. Used when picking the upgrade target
    /// to surface in a denial.
    pub const ALL: [Plan; 3] = [Plan::Free, Plan::SearchPro, Plan::LabPro];

    pub fn as_str(self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::SearchPro => "search_pro",
            Plan::LabPro => "lab_pro",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "free" => Some(Plan::Free),
            "search_pro" => Some(Plan::SearchPro),
            "lab_pro" => Some(Plan::LabPro),
            _ => None,
        }
    }
}

/// An authenticated identity with its resolved role and plan.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    pub plan: Plan,
}

/// The identity (or absence thereof) on whose behalf a request is evaluated.
///
/// `Resolving` is a transient state while the profile is still being loaded.
/// It must never be treated as either allow or deny.
#[derive(Debug, Clone)]
pub enum PrincipalState {
    Resolving,
    Anonymous,
    Authenticated(Principal),
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

//=========================================================================================
// Quotas and Plan Limits
//=========================================================================================

/// A plan limit: either unlimited or a finite count.
///
/// The wire and storage representation uses `-1` as the unlimited sentinel.
/// That sentinel must never be conflated with zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quota {
    Unlimited,
    Count(u32),
}

impl Quota {
    /// Decodes the stored representation, where any negative value means unlimited.
    pub fn from_raw(raw: i64) -> Self {
        if raw < 0 {
            Quota::Unlimited
        } else {
            Quota::Count(raw as u32)
        }
    }

    /// Encodes back to the stored representation (`-1` = unlimited).
    pub fn to_raw(self) -> i64 {
        match self {
            Quota::Unlimited => -1,
            Quota::Count(n) => i64::from(n),
        }
    }

    pub fn is_unlimited(self) -> bool {
        matches!(self, Quota::Unlimited)
    }
}

/// Static per-plan configuration.
#[derive(Debug, Clone, Copy)]
pub struct PlanLimits {
    pub searches_per_day: Quota,
    pub ai_creations_per_week: Quota,
    pub manual_creations_per_week: Quota,
    pub tracking_allowed: bool,
    pub analytics_allowed: bool,
}

impl PlanLimits {
    /// The most restrictive interpretation: nothing is allowed.
    ///
    /// Used when a plan's limits row is missing, which is a configuration
    /// error that must not silently become permissive.
    pub fn locked() -> Self {
        Self {
            searches_per_day: Quota::Count(0),
            ai_creations_per_week: Quota::Count(0),
            manual_creations_per_week: Quota::Count(0),
            tracking_allowed: false,
            analytics_allowed: false,
        }
    }
}

/// The full plan-limits table, one entry per plan.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    entries: Vec<(Plan, PlanLimits)>,
}

impl PlanCatalog {
    pub fn new(entries: Vec<(Plan, PlanLimits)>) -> Self {
        Self { entries }
    }

    /// The compiled-in defaults, matching the seeded plan_limits table.
    pub fn builtin() -> Self {
        Self::new(vec![
            (
                Plan::Free,
                PlanLimits {
                    searches_per_day: Quota::Count(3),
                    ai_creations_per_week: Quota::Count(1),
                    manual_creations_per_week: Quota::Count(3),
                    tracking_allowed: false,
                    analytics_allowed: false,
                },
            ),
            (
                Plan::SearchPro,
                PlanLimits {
                    searches_per_day: Quota::Unlimited,
                    ai_creations_per_week: Quota::Count(10),
                    manual_creations_per_week: Quota::Count(10),
                    tracking_allowed: false,
                    analytics_allowed: false,
                },
            ),
            (
                Plan::LabPro,
                PlanLimits {
                    searches_per_day: Quota::Unlimited,
                    ai_creations_per_week: Quota::Unlimited,
                    manual_creations_per_week: Quota::Unlimited,
                    tracking_allowed: true,
                    analytics_allowed: true,
                },
            ),
        ])
    }

    pub fn limits_for(&self, plan: Plan) -> Option<&PlanLimits> {
        self.entries.iter().find(|(p, _)| *p == plan).map(|(_, l)| l)
    }

    /// The cheapest plan whose limits satisfy `allows`. Surfaced in
    /// `PlanRequired` denials as the upgrade target.
    pub fn cheapest_plan_where(&self, allows: impl Fn(&PlanLimits) -> bool) -> Option<Plan> {
        Plan::ALL
            .into_iter()
            .find(|plan| self.limits_for(*plan).map(&allows).unwrap_or(false))
    }
}

//=========================================================================================
// Usage Periods and Counters
//=========================================================================================

/// The granularity a usage counter is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    Day,
    Week,
}

impl PeriodKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodKind::Day => "day",
            PeriodKind::Week => "week",
        }
    }
}

/// A usage-metering period: a calendar day, or an ISO week starting Monday.
///
/// Counters reset at period rollover by keying a fresh row, never by
/// mutating the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsagePeriod {
    Day(NaiveDate),
    Week(NaiveDate),
}

impl UsagePeriod {
    pub fn day_of(instant: DateTime<Utc>) -> Self {
        UsagePeriod::Day(instant.date_naive())
    }

    /// The ISO week containing `instant`, identified by its Monday.
    pub fn week_of(instant: DateTime<Utc>) -> Self {
        let date = instant.date_naive();
        let days_from_monday = i64::from(date.weekday().num_days_from_monday());
        UsagePeriod::Week(date - Duration::days(days_from_monday))
    }

    pub fn kind(self) -> PeriodKind {
        match self {
            UsagePeriod::Day(_) => PeriodKind::Day,
            UsagePeriod::Week(_) => PeriodKind::Week,
        }
    }

    pub fn start(self) -> NaiveDate {
        match self {
            UsagePeriod::Day(d) | UsagePeriod::Week(d) => d,
        }
    }
}

/// The kind of metered action a quota applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaKind {
    Search,
    AiCreation,
    ManualCreation,
}

impl QuotaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QuotaKind::Search => "search",
            QuotaKind::AiCreation => "ai_creation",
            QuotaKind::ManualCreation => "manual_creation",
        }
    }
}

/// One usage-counter row for a (principal, period) pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageCounter {
    pub searches_used: u32,
    pub ai_creations_used: u32,
    pub manual_creations_used: u32,
}

//=========================================================================================
// Capabilities and Access Decisions
//=========================================================================================

/// A gated action a caller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Search,
    AiCreation,
    ManualCreation,
    Tracking,
    Analytics,
    AdminFeature,
}

impl Capability {
    /// Search is the only capability open to anonymous callers.
    pub fn requires_authentication(self) -> bool {
        !matches!(self, Capability::Search)
    }

    pub fn requires_admin(self) -> bool {
        matches!(self, Capability::AdminFeature)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Search => "search",
            Capability::AiCreation => "ai_creation",
            Capability::ManualCreation => "manual_creation",
            Capability::Tracking => "tracking",
            Capability::Analytics => "analytics",
            Capability::AdminFeature => "admin_feature",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "search" => Some(Capability::Search),
            "ai_creation" => Some(Capability::AiCreation),
            "manual_creation" => Some(Capability::ManualCreation),
            "tracking" => Some(Capability::Tracking),
            "analytics" => Some(Capability::Analytics),
            "admin_feature" => Some(Capability::AdminFeature),
            _ => None,
        }
    }
}

/// Why an access check denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    AuthenticationRequired,
    PlanRequired(Plan),
    AdminRequired,
    QuotaExceeded(QuotaKind),
}

/// The outcome of an entitlement check. Computed fresh on every check and
/// never cached beyond a single request.
///
/// `Pending` is returned while the principal is still resolving: callers
/// must neither execute the gated action nor surface a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Pending,
    Granted { remaining: Quota },
    Denied { reason: DenyReason },
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted { .. })
    }
}

//=========================================================================================
// Terms and Sightings
//=========================================================================================

/// A slang phrase under tracking. Normalized text is unique per owner.
#[derive(Debug, Clone)]
pub struct Term {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub text: String,
    pub normalized: String,
    pub definition: Option<String>,
    pub example_usage: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lowercases a phrase and reduces it to a hyphen-separated slug.
pub fn normalize_phrase(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// One observed external mention of a term.
#[derive(Debug, Clone)]
pub struct Sighting {
    pub source: String,
    pub url: String,
    pub snippet: String,
    /// Relevance score, 0-100.
    pub score: u8,
    pub observed_at: DateTime<Utc>,
}

/// The runtime-configurable quality floor for one evidence source.
#[derive(Debug, Clone)]
pub struct SourceRule {
    pub name: String,
    pub enabled: bool,
    pub min_score: u8,
}

//=========================================================================================
// Monitoring
//=========================================================================================

/// Lifecycle status of a tracked term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringStatus {
    Monitoring,
    Spotted,
    Trending,
    Dormant,
}

impl MonitoringStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MonitoringStatus::Monitoring => "monitoring",
            MonitoringStatus::Spotted => "spotted",
            MonitoringStatus::Trending => "trending",
            MonitoringStatus::Dormant => "dormant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "monitoring" => Some(MonitoringStatus::Monitoring),
            "spotted" => Some(MonitoringStatus::Spotted),
            "trending" => Some(MonitoringStatus::Trending),
            "dormant" => Some(MonitoringStatus::Dormant),
            _ => None,
        }
    }
}

/// A platform a sighting was observed on, derived from the URL host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Platform {
    Twitter,
    Reddit,
    Tiktok,
    Instagram,
    Youtube,
    Facebook,
    /// Any host outside the recognized set.
    Web,
}

impl Platform {
    /// Exact host matching against the known platform domains.
    /// Unknown hosts land in the generic `Web` bucket.
    pub fn from_url(url: &str) -> Self {
        let after_scheme = url.split("://").nth(1).unwrap_or(url);
        let host = after_scheme
            .split('/')
            .next()
            .unwrap_or("")
            .trim_start_matches("www.")
            .to_lowercase();
        match host.as_str() {
            "twitter.com" | "x.com" => Platform::Twitter,
            "reddit.com" | "old.reddit.com" => Platform::Reddit,
            "tiktok.com" => Platform::Tiktok,
            "instagram.com" => Platform::Instagram,
            "youtube.com" | "youtu.be" => Platform::Youtube,
            "facebook.com" => Platform::Facebook,
            _ => Platform::Web,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Reddit => "reddit",
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
            Platform::Facebook => "facebook",
            Platform::Web => "web",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "twitter" => Some(Platform::Twitter),
            "reddit" => Some(Platform::Reddit),
            "tiktok" => Some(Platform::Tiktok),
            "instagram" => Some(Platform::Instagram),
            "youtube" => Some(Platform::Youtube),
            "facebook" => Some(Platform::Facebook),
            "web" => Some(Platform::Web),
            _ => None,
        }
    }
}

/// Per-term-per-owner lifecycle and accumulator state, updated by each
/// monitoring pass. Never deleted by the monitoring process itself.
#[derive(Debug, Clone)]
pub struct MonitoringRecord {
    pub term_id: Uuid,
    pub owner_id: Uuid,
    pub status: MonitoringStatus,
    pub trending_score: i64,
    pub times_found: i64,
    pub last_checked_at: DateTime<Utc>,
    pub last_found_at: Option<DateTime<Utc>>,
    /// Append-only set of platforms the term has been seen on.
    pub platforms: BTreeSet<Platform>,
}

impl MonitoringRecord {
    /// The initial record created when an owner starts tracking a term.
    pub fn fresh(term_id: Uuid, owner_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            term_id,
            owner_id,
            status: MonitoringStatus::Monitoring,
            trending_score: 0,
            times_found: 0,
            last_checked_at: now,
            last_found_at: None,
            platforms: BTreeSet::new(),
        }
    }
}

//=========================================================================================
// Trend Summaries
//=========================================================================================

/// One daily bucket of the Trending Index.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    /// Sum of `score / 100` contributions for this day, rounded to 2 decimals.
    pub index: f64,
}

/// The bucketed series for one requested window.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSeries {
    pub window_days: u32,
    pub points: Vec<TrendPoint>,
}

/// Aggregates recomputable at any time from the raw sighting rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSummary {
    pub series: Vec<TrendSeries>,
    /// Distinct page count, de-duplicating re-crawls of the same URL.
    pub distinct_urls: usize,
    pub distinct_sources: usize,
    pub mean_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn week_period_starts_on_monday() {
        // 2026-08-06 is a Thursday; its ISO week starts 2026-08-03.
        let instant = Utc.with_ymd_and_hms(2026, 8, 6, 15, 30, 0).unwrap();
        let period = UsagePeriod::week_of(instant);
        assert_eq!(
            period,
            UsagePeriod::Week(NaiveDate::from_ymd_opt(2026, 8, 3).unwrap())
        );

        // A Monday maps to itself.
        let monday = Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).unwrap();
        assert_eq!(
            UsagePeriod::week_of(monday),
            UsagePeriod::Week(NaiveDate::from_ymd_opt(2026, 8, 3).unwrap())
        );
    }

    #[test]
    fn quota_sentinel_round_trips_and_is_not_zero() {
        assert_eq!(Quota::from_raw(-1), Quota::Unlimited);
        assert_eq!(Quota::from_raw(0), Quota::Count(0));
        assert_eq!(Quota::Unlimited.to_raw(), -1);
        assert_eq!(Quota::Count(0).to_raw(), 0);
        assert_ne!(Quota::from_raw(-1), Quota::from_raw(0));
    }

    #[test]
    fn normalize_phrase_slugs_and_lowercases() {
        assert_eq!(normalize_phrase("No Cap"), "no-cap");
        assert_eq!(normalize_phrase("  it's Bussin!!  "), "it-s-bussin");
        assert_eq!(normalize_phrase("rizz"), "rizz");
    }

    #[test]
    fn platform_matches_exact_hosts_only() {
        assert_eq!(Platform::from_url("https://www.reddit.com/r/slang/abc"), Platform::Reddit);
        assert_eq!(Platform::from_url("https://x.com/someone/status/1"), Platform::Twitter);
        assert_eq!(Platform::from_url("https://notreddit.com/post"), Platform::Web);
        assert_eq!(Platform::from_url("https://blog.example.org/entry"), Platform::Web);
    }

    #[test]
    fn cheapest_plan_for_tracking_is_lab_pro() {
        let catalog = PlanCatalog::builtin();
        assert_eq!(
            catalog.cheapest_plan_where(|l| l.tracking_allowed),
            Some(Plan::LabPro)
        );
        assert_eq!(
            catalog.cheapest_plan_where(|l| l.searches_per_day.is_unlimited()),
            Some(Plan::SearchPro)
        );
    }
}
