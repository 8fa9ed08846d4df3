//! Action kinds and the detail payloads the gatekeeper understands.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of action being requested.
///
/// Kinds the gatekeeper has no rules for are carried as [`ActionKind::Other`]
/// and still go through rate limiting and auditing.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Sending an outbound email
    SendEmail,
    /// Reading, writing or otherwise touching a file
    FileOperation,
    /// Launching or controlling an application
    RunApplication,
    /// Running an arbitrary script body
    ExecuteScript,
    /// Anything else
    Other(String),
}

impl ActionKind {
    /// The wire name of this kind (e.g. `send_email`).
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::SendEmail => "send_email",
            ActionKind::FileOperation => "file_operation",
            ActionKind::RunApplication => "run_application",
            ActionKind::ExecuteScript => "execute_script",
            ActionKind::Other(name) => name,
        }
    }
}

impl From<&str> for ActionKind {
    fn from(name: &str) -> Self {
        match name {
            "send_email" => ActionKind::SendEmail,
            "file_operation" => ActionKind::FileOperation,
            "run_application" => ActionKind::RunApplication,
            "execute_script" => ActionKind::ExecuteScript,
            other => ActionKind::Other(other.to_string()),
        }
    }
}

impl From<String> for ActionKind {
    fn from(name: String) -> Self {
        match ActionKind::from(name.as_str()) {
            ActionKind::Other(_) => ActionKind::Other(name),
            known => known,
        }
    }
}

impl From<&ActionKind> for ActionKind {
    fn from(kind: &ActionKind) -> Self {
        kind.clone()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details of a `send_email` request.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailDetails {
    /// Recipient address
    pub to: String,
    /// Subject line
    #[serde(default)]
    pub subject: String,
    /// Message body
    #[serde(default)]
    pub body: String,
    /// Paths of attached files
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl EmailDetails {
    /// The part of the recipient after the first `@`, or `""` if there is none.
    pub fn domain(&self) -> &str {
        self.to.split_once('@').map(|(_, domain)| domain).unwrap_or("")
    }
}

/// Details of a `file_operation` request.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileDetails {
    /// The path being accessed
    pub path: String,
    /// What is being done to it (informational only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

/// Details of a `run_application` request.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationDetails {
    /// Application name as the host knows it (e.g. "Safari")
    pub application: String,
}

/// Details of an `execute_script` request.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScriptDetails {
    /// The script body
    pub script: String,
}
