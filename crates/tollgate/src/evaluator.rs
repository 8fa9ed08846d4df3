//! Per-category decision rules.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::action::{ActionKind, ApplicationDetails, EmailDetails, FileDetails, ScriptDetails};
use crate::audit::AuditTrail;
use crate::config::PolicyConfig;
use crate::decision::{Decision, Denial};
use crate::script::find_dangerous_pattern;
use crate::store::PolicyStore;

/// Decides whether a request is allowed under the current policy.
///
/// Every path ends in an explicit [`Decision`]; there is no implicit allow.
/// The evaluator does not count requests or write audit entries; it only
/// reads the trail for recipient history.
pub struct PolicyEvaluator {
    store: Arc<PolicyStore>,
    audit: Arc<dyn AuditTrail>,
}

impl std::fmt::Debug for PolicyEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEvaluator")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl PolicyEvaluator {
    /// Create an evaluator over `store`, consulting `audit` for history.
    pub fn new(store: Arc<PolicyStore>, audit: Arc<dyn AuditTrail>) -> Self {
        Self { store, audit }
    }

    /// Decide on one request.
    ///
    /// The whole decision is made against one snapshot of the policy, so a
    /// concurrent list or category change is seen entirely or not at all.
    pub fn evaluate(&self, kind: &ActionKind, details: &Value) -> Decision {
        let policy = self.store.snapshot();
        let result = match kind {
            ActionKind::SendEmail => {
                parse::<EmailDetails>(kind, details).map(|d| self.check_email(&policy, &d))
            }
            ActionKind::FileOperation => {
                parse::<FileDetails>(kind, details).map(|d| check_file(&policy, &d))
            }
            ActionKind::RunApplication => {
                parse::<ApplicationDetails>(kind, details).map(|d| check_application(&policy, &d))
            }
            ActionKind::ExecuteScript => {
                parse::<ScriptDetails>(kind, details).map(|d| check_script(&d))
            }
            ActionKind::Other(name) => Ok(Decision::RequireConfirmation(format!(
                "Unknown action {name}. Please confirm."
            ))),
        };
        result.unwrap_or_else(Decision::Deny)
    }

    fn check_email(&self, policy: &PolicyConfig, email: &EmailDetails) -> Decision {
        let permissions = &policy.permissions.email;
        if !permissions.enabled {
            return Decision::Deny(Denial::EmailDisabled);
        }

        let to = email.to.as_str();
        if policy.is_blacklisted(to) {
            return Decision::Deny(Denial::Blacklisted(to.to_string()));
        }
        if !policy.passes_whitelist(to) {
            return Decision::Deny(Denial::NotWhitelisted(to.to_string()));
        }

        let domain = email.domain();
        if !permissions.allowed_domains.is_empty() && !permissions.allowed_domains.contains(domain)
        {
            return Decision::Deny(Denial::DomainNotAllowed(domain.to_string()));
        }

        if permissions.require_confirmation && !self.has_emailed(to) {
            return Decision::RequireConfirmation(format!(
                "First time emailing {to}. Please confirm."
            ));
        }
        Decision::Allow
    }

    fn has_emailed(&self, to: &str) -> bool {
        self.audit
            .has_prior_approval(ActionKind::SendEmail.as_str(), &|details| {
                details.get("to").and_then(Value::as_str) == Some(to)
            })
    }
}

fn check_file(policy: &PolicyConfig, file: &FileDetails) -> Decision {
    let permissions = &policy.permissions.file_system;
    if !permissions.enabled {
        return Decision::Deny(Denial::FileOperationsDisabled);
    }

    let path = file.path.as_str();
    if permissions
        .forbidden_paths
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return Decision::Deny(Denial::PathForbidden(path.to_string()));
    }
    if !permissions.allowed_paths.is_empty()
        && !permissions
            .allowed_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return Decision::Deny(Denial::PathNotAllowed(path.to_string()));
    }
    Decision::Allow
}

fn check_application(policy: &PolicyConfig, app: &ApplicationDetails) -> Decision {
    let permissions = &policy.permissions.applications;
    if !permissions.enabled {
        return Decision::Deny(Denial::ApplicationsDisabled);
    }

    let name = app.application.as_str();
    if permissions.forbidden_apps.contains(name) {
        return Decision::Deny(Denial::ApplicationForbidden(name.to_string()));
    }
    if !permissions.allowed_apps.is_empty() && !permissions.allowed_apps.contains(name) {
        return Decision::Deny(Denial::ApplicationNotAllowed(name.to_string()));
    }
    Decision::Allow
}

/// Screening is unconditional: no configuration can switch it off.
fn check_script(script: &ScriptDetails) -> Decision {
    match find_dangerous_pattern(&script.script) {
        Some(pattern) => {
            tracing::debug!(pattern = pattern.name, "script matched dangerous pattern");
            Decision::Deny(Denial::DangerousScript)
        }
        None => Decision::Allow,
    }
}

fn parse<T: DeserializeOwned>(kind: &ActionKind, details: &Value) -> Result<T, Denial> {
    T::deserialize(details).map_err(|e| Denial::MalformedDetails {
        action: kind.to_string(),
        message: e.to_string(),
    })
}
