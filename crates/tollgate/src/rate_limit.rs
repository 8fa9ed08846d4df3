//! Per-day rate limiting by action kind.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

/// Daily ceilings per action kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCeilings {
    /// Ceiling per known action kind
    pub per_kind: BTreeMap<String, u32>,
    /// Ceiling for kinds not listed in `per_kind`
    pub default: u32,
}

impl Default for RateCeilings {
    fn default() -> Self {
        let per_kind = [
            ("send_email", 10),
            ("file_operation", 100),
            ("run_application", 50),
            ("execute_script", 30),
        ]
        .into_iter()
        .map(|(kind, limit)| (kind.to_string(), limit))
        .collect();

        Self {
            per_kind,
            default: 50,
        }
    }
}

impl RateCeilings {
    /// The ceiling for `kind`.
    pub fn limit_for(&self, kind: &str) -> u32 {
        self.per_kind.get(kind).copied().unwrap_or(self.default)
    }

    /// Override the ceiling for one kind.
    #[must_use]
    pub fn with_limit(mut self, kind: impl Into<String>, limit: u32) -> Self {
        self.per_kind.insert(kind.into(), limit);
        self
    }
}

/// Counter key: one per action kind per local calendar day.
///
/// A new day yields a new key, so counters never need resetting.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// The action kind
    pub action: String,
    /// The local calendar day
    pub day: NaiveDate,
}

/// Counts accepted requests per action kind per day.
pub struct RateLimiter {
    ceilings: RateCeilings,
    counters: Mutex<HashMap<RateLimitKey, u32>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("ceilings", &self.ceilings)
            .finish_non_exhaustive()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateCeilings::default(), Arc::new(SystemClock))
    }
}

impl RateLimiter {
    /// Create a limiter with the given ceilings and time source.
    pub fn new(ceilings: RateCeilings, clock: Arc<dyn Clock>) -> Self {
        Self {
            ceilings,
            counters: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// The configured ceilings.
    pub fn ceilings(&self) -> &RateCeilings {
        &self.ceilings
    }

    fn key(&self, action: &str) -> RateLimitKey {
        RateLimitKey {
            action: action.to_string(),
            day: self.clock.today(),
        }
    }

    /// Count one request of `action` against today's ceiling.
    ///
    /// Returns false, leaving the counter untouched, once the ceiling has
    /// been reached. Check and increment happen under one lock.
    pub fn try_consume(&self, action: &str) -> bool {
        let key = self.key(action);
        let limit = self.ceilings.limit_for(action);

        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counters.entry(key).or_insert(0);
        if *count >= limit {
            return false;
        }
        *count += 1;
        true
    }

    /// Requests of `action` counted today.
    pub fn used(&self, action: &str) -> u32 {
        let key = self.key(action);
        self.counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .copied()
            .unwrap_or(0)
    }

    /// Requests of `action` still available today.
    pub fn remaining(&self, action: &str) -> u32 {
        self.ceilings
            .limit_for(action)
            .saturating_sub(self.used(action))
    }
}
