//! The audit trail.
//!
//! Every permission check leaves exactly one entry. Entries are appended
//! with a pending outcome and finalized once the decision is known; after
//! that they never change. The trail doubles as recipient history for the
//! email confirmation rule, so it is scanned as well as appended to.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};

/// Handle to an entry returned by [`AuditTrail::begin`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

/// One recorded permission check.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the trail
    pub id: EntryId,
    /// When the request arrived
    pub timestamp: DateTime<Utc>,
    /// The action kind requested
    pub action: String,
    /// The request payload, as received
    pub details: Value,
    /// `None` while pending, then whether the action was allowed
    pub allowed: Option<bool>,
}

/// Selects entries in [`AuditTrail::query`]. Unset fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Only entries for this action kind
    #[serde(default)]
    pub action: Option<String>,
    /// Only entries at or after this instant
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    /// Only finalized entries with this outcome
    #[serde(default)]
    pub allowed: Option<bool>,
}

impl AuditFilter {
    /// Match everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one action kind.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Restrict to entries at or after `since`.
    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Restrict to a finalized outcome.
    #[must_use]
    pub fn allowed(mut self, allowed: bool) -> Self {
        self.allowed = Some(allowed);
        self
    }

    /// Whether `entry` passes this filter.
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(action) = &self.action
            && entry.action != *action
        {
            return false;
        }
        if let Some(since) = self.since
            && entry.timestamp < since
        {
            return false;
        }
        match self.allowed {
            Some(allowed) => entry.allowed == Some(allowed),
            None => true,
        }
    }
}

/// Storage for the audit trail.
///
/// [`AuditLog`] scans linearly. Implementations may index entries however
/// they like as long as the observable behavior is the same.
pub trait AuditTrail: Send + Sync {
    /// Append a pending entry and return its handle.
    fn begin(&self, action: &str, details: Value) -> EntryId;

    /// Record the outcome of a pending entry.
    ///
    /// Returns false, leaving the entry alone, if it is unknown or already final.
    fn finalize(&self, id: EntryId, allowed: bool) -> bool;

    /// Entries matching `filter`, in append order.
    fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry>;

    /// Whether some allowed entry for `action` has details satisfying `matches`.
    fn has_prior_approval(&self, action: &str, matches: &dyn Fn(&Value) -> bool) -> bool;

    /// Number of entries.
    fn len(&self) -> usize;

    /// Whether the trail is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory audit trail.
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl AuditLog {
    /// An empty trail timestamped by `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            clock,
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write every entry as one JSON object per line.
    pub fn write_jsonl(&self, mut writer: impl Write) -> std::io::Result<()> {
        let entries = self.entries().clone();
        for entry in &entries {
            serde_json::to_writer(&mut writer, entry)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }
}

impl AuditTrail for AuditLog {
    fn begin(&self, action: &str, details: Value) -> EntryId {
        // Stamped under the lock so timestamps never decrease along the trail.
        let mut entries = self.entries();
        let timestamp = self.clock.now();
        let id = EntryId(entries.len() as u64);
        entries.push(AuditEntry {
            id,
            timestamp,
            action: action.to_string(),
            details,
            allowed: None,
        });
        id
    }

    fn finalize(&self, id: EntryId, allowed: bool) -> bool {
        let mut entries = self.entries();
        let Some(entry) = usize::try_from(id.0).ok().and_then(|i| entries.get_mut(i)) else {
            tracing::warn!(entry = id.0, "finalize of unknown audit entry");
            return false;
        };
        if entry.allowed.is_some() {
            tracing::warn!(entry = id.0, "audit entry already finalized");
            return false;
        }
        entry.allowed = Some(allowed);
        true
    }

    fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.entries()
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect()
    }

    fn has_prior_approval(&self, action: &str, matches: &dyn Fn(&Value) -> bool) -> bool {
        self.entries().iter().any(|entry| {
            entry.action == action && entry.allowed == Some(true) && matches(&entry.details)
        })
    }

    fn len(&self) -> usize {
        self.entries().len()
    }
}
