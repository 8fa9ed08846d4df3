//! The gatekeeper facade.

use std::sync::Arc;

use serde_json::Value;

use crate::action::ActionKind;
use crate::audit::{AuditEntry, AuditFilter, AuditLog, AuditTrail, EntryId};
use crate::clock::{Clock, SystemClock};
use crate::decision::Decision;
use crate::error::{ConfigSaveError, GateError};
use crate::evaluator::PolicyEvaluator;
use crate::rate_limit::{RateCeilings, RateLimiter};
use crate::store::{ListChange, PolicyStore};

/// A decision together with the audit entry that recorded it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Authorization {
    /// The audit entry for this request
    pub entry: EntryId,
    /// The verdict
    pub decision: Decision,
}

/// Single entry point for permission checks.
///
/// Callers ask before acting:
///
/// ```rust,ignore
/// let gate = Gatekeeper::new(PolicyStore::in_memory());
/// match gate.check_permission("run_application", json!({"application": "Safari"})) {
///     Ok(decision) if decision.is_allowed() => launch(),
///     Ok(decision) => report(decision.denial()),
///     Err(GateError::RateLimitExceeded { .. }) => retry_tomorrow(),
///     Err(e) => return Err(e.into()),
/// }
/// ```
///
/// Each call leaves exactly one finalized audit entry, whether the action
/// was allowed, denied by policy, or rate limited. The rate limit is
/// checked first, so denied attempts count against the daily ceiling.
pub struct Gatekeeper {
    store: Arc<PolicyStore>,
    limiter: RateLimiter,
    audit: Arc<dyn AuditTrail>,
    evaluator: PolicyEvaluator,
}

impl std::fmt::Debug for Gatekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gatekeeper")
            .field("store", &self.store)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl Gatekeeper {
    /// A gatekeeper over `store` with the wall clock, default ceilings and
    /// an in-memory audit log.
    pub fn new(store: impl Into<Arc<PolicyStore>>) -> Self {
        Self::builder(store).build()
    }

    /// Start building a gatekeeper with custom collaborators.
    pub fn builder(store: impl Into<Arc<PolicyStore>>) -> GatekeeperBuilder {
        GatekeeperBuilder {
            store: store.into(),
            clock: None,
            ceilings: RateCeilings::default(),
            audit: None,
        }
    }

    /// Check whether an action may proceed.
    ///
    /// Policy denials are an `Ok` decision; only rate-limit exhaustion is an error.
    pub fn check_permission(
        &self,
        kind: impl Into<ActionKind>,
        details: Value,
    ) -> Result<Decision, GateError> {
        self.check(kind, details).map(|auth| auth.decision)
    }

    /// Like [`check_permission`](Self::check_permission), also returning the audit entry.
    pub fn check(
        &self,
        kind: impl Into<ActionKind>,
        details: Value,
    ) -> Result<Authorization, GateError> {
        let kind = kind.into();
        let action = kind.as_str();
        let entry = self.audit.begin(action, details.clone());

        if !self.limiter.try_consume(action) {
            self.audit.finalize(entry, false);
            let limit = self.limiter.ceilings().limit_for(action);
            tracing::warn!(action, limit, entry = entry.0, "rate limit exceeded");
            return Err(GateError::RateLimitExceeded {
                action: action.to_string(),
                limit,
            });
        }

        let decision = self.evaluator.evaluate(&kind, &details);
        self.audit.finalize(entry, decision.is_allowed());
        tracing::debug!(
            action,
            entry = entry.0,
            allowed = decision.is_allowed(),
            confirm = decision.requires_confirmation(),
            reason = decision.denial().map(tracing::field::display),
            "permission checked"
        );
        Ok(Authorization { entry, decision })
    }

    /// Check and turn a denial into [`GateError::PermissionDenied`].
    ///
    /// This is the guard to place in front of an action. A decision that
    /// needs confirmation is returned as-is (and logged); pausing for the
    /// human is up to the caller.
    pub fn authorize(
        &self,
        kind: impl Into<ActionKind>,
        details: Value,
    ) -> Result<Authorization, GateError> {
        let auth = self.check(kind, details)?;
        match &auth.decision {
            Decision::Deny(denial) => Err(GateError::PermissionDenied(denial.clone())),
            Decision::RequireConfirmation(message) => {
                tracing::warn!(entry = auth.entry.0, %message, "action requires confirmation");
                Ok(auth)
            }
            Decision::Allow => Ok(auth),
        }
    }

    /// Whitelist `item` and persist.
    pub async fn add_to_whitelist(&self, item: &str) -> Result<(), ConfigSaveError> {
        self.store.mutate_whitelist(item, ListChange::Add).await?;
        Ok(())
    }

    /// Blacklist `item` and persist.
    pub async fn add_to_blacklist(&self, item: &str) -> Result<(), ConfigSaveError> {
        self.store.mutate_blacklist(item, ListChange::Add).await?;
        Ok(())
    }

    /// Remove `item` from the whitelist and persist.
    pub async fn remove_from_whitelist(&self, item: &str) -> Result<(), ConfigSaveError> {
        self.store.mutate_whitelist(item, ListChange::Remove).await?;
        Ok(())
    }

    /// Remove `item` from the blacklist and persist.
    pub async fn remove_from_blacklist(&self, item: &str) -> Result<(), ConfigSaveError> {
        self.store.mutate_blacklist(item, ListChange::Remove).await?;
        Ok(())
    }

    /// Audit entries matching `filter`, oldest first.
    pub fn audit_log(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.audit.query(filter)
    }

    /// The policy store.
    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// The rate limiter.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The audit trail.
    pub fn audit(&self) -> &Arc<dyn AuditTrail> {
        &self.audit
    }
}

/// Builder for [`Gatekeeper`].
pub struct GatekeeperBuilder {
    store: Arc<PolicyStore>,
    clock: Option<Arc<dyn Clock>>,
    ceilings: RateCeilings,
    audit: Option<Arc<dyn AuditTrail>>,
}

impl std::fmt::Debug for GatekeeperBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatekeeperBuilder")
            .field("ceilings", &self.ceilings)
            .finish_non_exhaustive()
    }
}

impl GatekeeperBuilder {
    /// Time source for the daily window and audit timestamps.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Daily ceilings per action kind.
    #[must_use]
    pub fn ceilings(mut self, ceilings: RateCeilings) -> Self {
        self.ceilings = ceilings;
        self
    }

    /// Audit trail to record into. Defaults to an [`AuditLog`] on the same clock.
    #[must_use]
    pub fn audit(mut self, audit: Arc<dyn AuditTrail>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build the gatekeeper.
    pub fn build(self) -> Gatekeeper {
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let audit: Arc<dyn AuditTrail> = match self.audit {
            Some(audit) => audit,
            None => Arc::new(AuditLog::new(Arc::clone(&clock))),
        };
        let limiter = RateLimiter::new(self.ceilings, clock);
        let evaluator = PolicyEvaluator::new(Arc::clone(&self.store), Arc::clone(&audit));

        Gatekeeper {
            store: self.store,
            limiter,
            audit,
            evaluator,
        }
    }
}
