//! Gatekeeper decisions and denial reasons.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an action was denied.
///
/// The `Display` text is meant for the operator or the requesting agent.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Denial {
    /// Email category is switched off
    #[error("Email sending is disabled")]
    EmailDisabled,
    /// Recipient is on the blacklist
    #[error("Email to {0} is blocked")]
    Blacklisted(String),
    /// Whitelist is in use and the recipient is not on it
    #[error("Email to {0} is not whitelisted")]
    NotWhitelisted(String),
    /// Recipient's domain is not in the allowed domains
    #[error("Domain {0} is not allowed")]
    DomainNotAllowed(String),
    /// File system category is switched off
    #[error("File operations are disabled")]
    FileOperationsDisabled,
    /// Path is under a forbidden prefix
    #[error("Access to {0} is forbidden")]
    PathForbidden(String),
    /// Path is outside every allowed prefix
    #[error("Path {0} is not in allowed directories")]
    PathNotAllowed(String),
    /// Applications category is switched off
    #[error("Application control is disabled")]
    ApplicationsDisabled,
    /// Application is on the forbidden list
    #[error("Application {0} is forbidden")]
    ApplicationForbidden(String),
    /// Allowed list is in use and the application is not on it
    #[error("Application {0} is not whitelisted")]
    ApplicationNotAllowed(String),
    /// Script matched a dangerous pattern
    #[error("Script contains dangerous commands")]
    DangerousScript,
    /// The request details lack a field this kind needs
    #[error("Invalid details for {action}: {message}")]
    MalformedDetails {
        /// The action kind
        action: String,
        /// What was wrong with the payload
        message: String,
    },
}

impl Denial {
    /// A stable machine-readable code for this reason.
    pub fn code(&self) -> &'static str {
        match self {
            Denial::EmailDisabled => "email_disabled",
            Denial::Blacklisted(_) => "blacklisted",
            Denial::NotWhitelisted(_) => "not_whitelisted",
            Denial::DomainNotAllowed(_) => "domain_not_allowed",
            Denial::FileOperationsDisabled => "file_operations_disabled",
            Denial::PathForbidden(_) => "path_forbidden",
            Denial::PathNotAllowed(_) => "path_not_allowed",
            Denial::ApplicationsDisabled => "applications_disabled",
            Denial::ApplicationForbidden(_) => "application_forbidden",
            Denial::ApplicationNotAllowed(_) => "application_not_allowed",
            Denial::DangerousScript => "dangerous_script",
            Denial::MalformedDetails { .. } => "malformed_details",
        }
    }
}

/// The verdict for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// The action may proceed.
    Allow,
    /// The action is permitted but must wait for an out-of-band human
    /// confirmation. The gatekeeper does not block; it only signals.
    RequireConfirmation(String),
    /// The action must not proceed.
    Deny(Denial),
}

impl Decision {
    /// Returns true unless the action was denied.
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Decision::Deny(_))
    }

    /// Returns true if a human must confirm before the action proceeds.
    pub fn requires_confirmation(&self) -> bool {
        matches!(self, Decision::RequireConfirmation(_))
    }

    /// The confirmation prompt, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Decision::RequireConfirmation(message) => Some(message),
            _ => None,
        }
    }

    /// The denial reason, if denied.
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            Decision::Deny(denial) => Some(denial),
            _ => None,
        }
    }

    /// Flatten into the serializable record form.
    pub fn to_record(&self) -> DecisionRecord {
        DecisionRecord::from(self)
    }
}

/// Flat, serializable view of a [`Decision`].
///
/// This is the shape handed across process boundaries:
/// `{"allowed": true, "requiresConfirmation": true, "message": "..."}` or
/// `{"allowed": false, "reason": "...", "code": "blacklisted"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    /// Whether the action may proceed
    pub allowed: bool,
    /// Whether a human must confirm first
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_confirmation: bool,
    /// Confirmation prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Denial reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Denial code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl From<&Decision> for DecisionRecord {
    fn from(decision: &Decision) -> Self {
        let denial = decision.denial();
        Self {
            allowed: decision.is_allowed(),
            requires_confirmation: decision.requires_confirmation(),
            message: decision.message().map(str::to_string),
            reason: denial.map(Denial::to_string),
            code: denial.map(|d| d.code().to_string()),
        }
    }
}
