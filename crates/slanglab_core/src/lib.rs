pub mod domain;
pub mod entitlement;
pub mod monitoring;
pub mod ports;

pub use domain::{
    AccessDecision, Capability, DenyReason, MonitoringRecord, MonitoringStatus, Plan,
    PlanCatalog, PlanLimits, Platform, Principal, PrincipalState, Quota, QuotaKind, Sighting,
    SourceRule, Term, TrendSummary, UsageCounter, UsagePeriod, UserCredentials,
};
pub use entitlement::{evaluate, EntitlementCheck, UsageLookup};
pub use ports::{
    DirectoryService, EvidenceService, PortError, PortResult, SightingCandidate,
    TermCreationService, TermDraft,
};
