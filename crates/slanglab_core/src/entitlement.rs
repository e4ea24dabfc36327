//! crates/slanglab_core/src/entitlement.rs
//!
//! The entitlement engine: decides whether a principal may perform a
//! capability right now, based on role, plan, and period usage counters.
//!
//! The engine is a pure function of its inputs. It never performs I/O and
//! never mutates counters; the caller increments usage only after the gated
//! action has durably committed.

use crate::domain::{
    AccessDecision, Capability, DenyReason, PlanCatalog, PlanLimits, PrincipalState, Quota,
    QuotaKind, Role, UsageCounter,
};

/// Anonymous callers get exactly one search, metered by a client-local
/// counter with no reset period and no cross-device consistency.
pub const ANONYMOUS_SEARCH_ALLOWANCE: u32 = 1;

/// The outcome of the caller's usage-counter read.
///
/// `Unavailable` covers transient backend failure and timeouts. Quota checks
/// against a finite limit fail closed on it; unlimited plans are unaffected.
#[derive(Debug, Clone, Copy)]
pub enum UsageLookup {
    /// The counter row for the current period, or the zero counter if none
    /// exists yet (counters are created lazily on first use).
    Available(UsageCounter),
    Unavailable,
}

/// Per-check inputs gathered by the caller in a single consistent read.
#[derive(Debug, Clone, Copy)]
pub struct EntitlementCheck<'a> {
    pub catalog: &'a PlanCatalog,
    pub usage: UsageLookup,
    /// The client-local anonymous search count. Ignored for authenticated
    /// principals.
    pub anonymous_searches_used: u32,
    /// Per-call override: require the admin role regardless of plan.
    pub require_admin: bool,
}

impl<'a> EntitlementCheck<'a> {
    pub fn new(catalog: &'a PlanCatalog) -> Self {
        Self {
            catalog,
            usage: UsageLookup::Available(UsageCounter::default()),
            anonymous_searches_used: 0,
            require_admin: false,
        }
    }

    pub fn with_usage(mut self, usage: UsageLookup) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_anonymous_searches(mut self, used: u32) -> Self {
        self.anonymous_searches_used = used;
        self
    }

    pub fn requiring_admin(mut self) -> Self {
        self.require_admin = true;
        self
    }
}

/// Evaluates one capability request. Ordered, first match wins:
/// resolution state, authentication, admin bypass, admin requirement,
/// plan gate, quota gate.
pub fn evaluate(
    principal: &PrincipalState,
    capability: Capability,
    check: &EntitlementCheck<'_>,
) -> AccessDecision {
    let principal = match principal {
        PrincipalState::Resolving => return AccessDecision::Pending,
        PrincipalState::Anonymous => {
            if capability.requires_authentication() {
                return AccessDecision::Denied {
                    reason: DenyReason::AuthenticationRequired,
                };
            }
            return anonymous_search_decision(check.anonymous_searches_used);
        }
        PrincipalState::Authenticated(principal) => principal,
    };

    // Admins bypass every plan and quota check. This is a deliberate, total
    // bypass: the admin role is a trust boundary.
    if principal.role == Role::Admin {
        return AccessDecision::Granted {
            remaining: Quota::Unlimited,
        };
    }

    if check.require_admin || capability.requires_admin() {
        return AccessDecision::Denied {
            reason: DenyReason::AdminRequired,
        };
    }

    // A plan missing from the catalog is a configuration error; fall back to
    // the most restrictive limits rather than anything permissive.
    let limits = check
        .catalog
        .limits_for(principal.plan)
        .copied()
        .unwrap_or_else(PlanLimits::locked);

    match capability {
        Capability::Search => {
            quota_decision(QuotaKind::Search, limits.searches_per_day, &check.usage, |c| {
                c.searches_used
            })
        }
        Capability::AiCreation => quota_decision(
            QuotaKind::AiCreation,
            limits.ai_creations_per_week,
            &check.usage,
            |c| c.ai_creations_used,
        ),
        Capability::ManualCreation => quota_decision(
            QuotaKind::ManualCreation,
            limits.manual_creations_per_week,
            &check.usage,
            |c| c.manual_creations_used,
        ),
        Capability::Tracking => {
            feature_decision(limits.tracking_allowed, check.catalog, |l| l.tracking_allowed)
        }
        Capability::Analytics => {
            feature_decision(limits.analytics_allowed, check.catalog, |l| l.analytics_allowed)
        }
        // Reachable only if the admin-requirement check above ever changes;
        // non-admins never get here with an admin capability.
        Capability::AdminFeature => AccessDecision::Denied {
            reason: DenyReason::AdminRequired,
        },
    }
}

fn anonymous_search_decision(used: u32) -> AccessDecision {
    if used < ANONYMOUS_SEARCH_ALLOWANCE {
        AccessDecision::Granted {
            remaining: Quota::Count(ANONYMOUS_SEARCH_ALLOWANCE - used),
        }
    } else {
        AccessDecision::Denied {
            reason: DenyReason::QuotaExceeded(QuotaKind::Search),
        }
    }
}

/// Plan-flag gate for feature capabilities. The denial names the cheapest
/// plan that carries the feature.
fn feature_decision(
    allowed: bool,
    catalog: &PlanCatalog,
    feature: impl Fn(&PlanLimits) -> bool,
) -> AccessDecision {
    if allowed {
        AccessDecision::Granted {
            remaining: Quota::Unlimited,
        }
    } else {
        let required = catalog
            .cheapest_plan_where(feature)
            .unwrap_or(crate::domain::Plan::LabPro);
        AccessDecision::Denied {
            reason: DenyReason::PlanRequired(required),
        }
    }
}

/// Quota gate. Unlimited limits short-circuit before the counter is even
/// consulted, which is what makes them fail open when the lookup failed.
fn quota_decision(
    kind: QuotaKind,
    limit: Quota,
    usage: &UsageLookup,
    used_of: impl Fn(&UsageCounter) -> u32,
) -> AccessDecision {
    let limit = match limit {
        Quota::Unlimited => {
            return AccessDecision::Granted {
                remaining: Quota::Unlimited,
            }
        }
        Quota::Count(n) => n,
    };

    match usage {
        // Fail closed: a finite limit with an unreadable counter denies.
        UsageLookup::Unavailable => AccessDecision::Denied {
            reason: DenyReason::QuotaExceeded(kind),
        },
        UsageLookup::Available(counter) => {
            let used = used_of(counter);
            if used >= limit {
                AccessDecision::Denied {
                    reason: DenyReason::QuotaExceeded(kind),
                }
            } else {
                AccessDecision::Granted {
                    remaining: Quota::Count(limit - used),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Plan, Principal};
    use uuid::Uuid;

    fn member(plan: Plan) -> PrincipalState {
        PrincipalState::Authenticated(Principal {
            user_id: Uuid::new_v4(),
            role: Role::Member,
            plan,
        })
    }

    fn admin() -> PrincipalState {
        PrincipalState::Authenticated(Principal {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
            plan: Plan::Free,
        })
    }

    fn usage(searches: u32, ai: u32, manual: u32) -> UsageLookup {
        UsageLookup::Available(UsageCounter {
            searches_used: searches,
            ai_creations_used: ai,
            manual_creations_used: manual,
        })
    }

    #[test]
    fn resolving_principal_yields_pending() {
        let catalog = PlanCatalog::builtin();
        let check = EntitlementCheck::new(&catalog);
        let decision = evaluate(&PrincipalState::Resolving, Capability::Search, &check);
        assert_eq!(decision, AccessDecision::Pending);
    }

    #[test]
    fn unlimited_plan_never_hits_quota() {
        let catalog = PlanCatalog::builtin();
        // Absurdly high usage; SearchPro searches are unlimited.
        for used in [0, 1, 1_000, u32::MAX] {
            let check = EntitlementCheck::new(&catalog).with_usage(usage(used, 0, 0));
            let decision = evaluate(&member(Plan::SearchPro), Capability::Search, &check);
            assert_eq!(
                decision,
                AccessDecision::Granted {
                    remaining: Quota::Unlimited
                },
                "used={used}"
            );
        }
    }

    #[test]
    fn finite_limit_allows_under_and_denies_at_limit() {
        let catalog = PlanCatalog::builtin();
        // Free plan: 3 searches per day.
        for used in 0..3 {
            let check = EntitlementCheck::new(&catalog).with_usage(usage(used, 0, 0));
            let decision = evaluate(&member(Plan::Free), Capability::Search, &check);
            assert_eq!(
                decision,
                AccessDecision::Granted {
                    remaining: Quota::Count(3 - used)
                }
            );
        }
        for used in [3, 4, 100] {
            let check = EntitlementCheck::new(&catalog).with_usage(usage(used, 0, 0));
            let decision = evaluate(&member(Plan::Free), Capability::Search, &check);
            assert_eq!(
                decision,
                AccessDecision::Denied {
                    reason: DenyReason::QuotaExceeded(QuotaKind::Search)
                }
            );
        }
    }

    #[test]
    fn weekly_creation_quotas_use_their_own_counters() {
        let catalog = PlanCatalog::builtin();
        // Free: 1 AI creation, 3 manual creations per week.
        let check = EntitlementCheck::new(&catalog).with_usage(usage(0, 1, 0));
        assert_eq!(
            evaluate(&member(Plan::Free), Capability::AiCreation, &check),
            AccessDecision::Denied {
                reason: DenyReason::QuotaExceeded(QuotaKind::AiCreation)
            }
        );
        // The exhausted AI counter must not bleed into the manual quota.
        assert_eq!(
            evaluate(&member(Plan::Free), Capability::ManualCreation, &check),
            AccessDecision::Granted {
                remaining: Quota::Count(3)
            }
        );
    }

    #[test]
    fn admin_bypasses_everything() {
        let catalog = PlanCatalog::builtin();
        let check = EntitlementCheck::new(&catalog)
            .with_usage(usage(u32::MAX, u32::MAX, u32::MAX))
            .requiring_admin();
        for capability in [
            Capability::Search,
            Capability::AiCreation,
            Capability::ManualCreation,
            Capability::Tracking,
            Capability::Analytics,
            Capability::AdminFeature,
        ] {
            let decision = evaluate(&admin(), capability, &check);
            assert_eq!(
                decision,
                AccessDecision::Granted {
                    remaining: Quota::Unlimited
                },
                "capability={capability:?}"
            );
        }
    }

    #[test]
    fn non_admin_denied_admin_feature_and_override() {
        let catalog = PlanCatalog::builtin();
        let check = EntitlementCheck::new(&catalog);
        assert_eq!(
            evaluate(&member(Plan::LabPro), Capability::AdminFeature, &check),
            AccessDecision::Denied {
                reason: DenyReason::AdminRequired
            }
        );
        let override_check = EntitlementCheck::new(&catalog).requiring_admin();
        assert_eq!(
            evaluate(&member(Plan::LabPro), Capability::Search, &override_check),
            AccessDecision::Denied {
                reason: DenyReason::AdminRequired
            }
        );
    }

    #[test]
    fn anonymous_gets_exactly_one_search() {
        let catalog = PlanCatalog::builtin();
        let first = EntitlementCheck::new(&catalog).with_anonymous_searches(0);
        assert_eq!(
            evaluate(&PrincipalState::Anonymous, Capability::Search, &first),
            AccessDecision::Granted {
                remaining: Quota::Count(1)
            }
        );
        let second = EntitlementCheck::new(&catalog).with_anonymous_searches(1);
        assert_eq!(
            evaluate(&PrincipalState::Anonymous, Capability::Search, &second),
            AccessDecision::Denied {
                reason: DenyReason::QuotaExceeded(QuotaKind::Search)
            }
        );
    }

    #[test]
    fn anonymous_denied_authenticated_capabilities() {
        let catalog = PlanCatalog::builtin();
        let check = EntitlementCheck::new(&catalog);
        for capability in [
            Capability::AiCreation,
            Capability::ManualCreation,
            Capability::Tracking,
            Capability::Analytics,
            Capability::AdminFeature,
        ] {
            assert_eq!(
                evaluate(&PrincipalState::Anonymous, capability, &check),
                AccessDecision::Denied {
                    reason: DenyReason::AuthenticationRequired
                },
                "capability={capability:?}"
            );
        }
    }

    #[test]
    fn lookup_failure_fails_closed_for_finite_and_open_for_unlimited() {
        let catalog = PlanCatalog::builtin();
        let check = EntitlementCheck::new(&catalog).with_usage(UsageLookup::Unavailable);
        // Free search limit is finite: deny.
        assert_eq!(
            evaluate(&member(Plan::Free), Capability::Search, &check),
            AccessDecision::Denied {
                reason: DenyReason::QuotaExceeded(QuotaKind::Search)
            }
        );
        // SearchPro search limit is unlimited: the counter is never consulted.
        assert_eq!(
            evaluate(&member(Plan::SearchPro), Capability::Search, &check),
            AccessDecision::Granted {
                remaining: Quota::Unlimited
            }
        );
    }

    #[test]
    fn tracking_denial_names_the_upgrade_plan() {
        let catalog = PlanCatalog::builtin();
        let check = EntitlementCheck::new(&catalog);
        assert_eq!(
            evaluate(&member(Plan::Free), Capability::Tracking, &check),
            AccessDecision::Denied {
                reason: DenyReason::PlanRequired(Plan::LabPro)
            }
        );
        assert_eq!(
            evaluate(&member(Plan::SearchPro), Capability::Analytics, &check),
            AccessDecision::Denied {
                reason: DenyReason::PlanRequired(Plan::LabPro)
            }
        );
        assert_eq!(
            evaluate(&member(Plan::LabPro), Capability::Tracking, &check),
            AccessDecision::Granted {
                remaining: Quota::Unlimited
            }
        );
    }

    #[test]
    fn missing_catalog_entry_is_most_restrictive() {
        // A catalog with no Free row must deny quota capabilities for Free
        // users, never allow them.
        let catalog = PlanCatalog::new(vec![]);
        let check = EntitlementCheck::new(&catalog);
        assert_eq!(
            evaluate(&member(Plan::Free), Capability::Search, &check),
            AccessDecision::Denied {
                reason: DenyReason::QuotaExceeded(QuotaKind::Search)
            }
        );
        assert_eq!(
            evaluate(&member(Plan::Free), Capability::Tracking, &check),
            AccessDecision::Denied {
                reason: DenyReason::PlanRequired(Plan::LabPro)
            }
        );
    }

    #[test]
    fn upgrade_takes_effect_without_counter_reset() {
        let catalog = PlanCatalog::builtin();
        // Free user at the daily search limit.
        let exhausted = EntitlementCheck::new(&catalog).with_usage(usage(3, 0, 0));
        assert_eq!(
            evaluate(&member(Plan::Free), Capability::Search, &exhausted),
            AccessDecision::Denied {
                reason: DenyReason::QuotaExceeded(QuotaKind::Search)
            }
        );
        // Same counters, plan now SearchPro: immediately unlimited.
        assert_eq!(
            evaluate(&member(Plan::SearchPro), Capability::Search, &exhausted),
            AccessDecision::Granted {
                remaining: Quota::Unlimited
            }
        );
    }
}
