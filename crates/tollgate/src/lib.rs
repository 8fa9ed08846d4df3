//! Tollgate: a permission gatekeeper for agent-requested automation.
//!
//! An automation layer (scripts, application control, outbound email) asks
//! the gatekeeper before it acts. The gatekeeper answers with a [`Decision`]
//! (allow, allow pending human confirmation, or deny with a reason), enforces
//! per-day ceilings on each action kind, and keeps an audit trail of every
//! request it has seen.
//!
//! ## Components
//!
//! - [`PolicyStore`]: permission configuration plus recipient white/blacklists,
//!   persisted through a [`ConfigBackend`].
//! - [`RateLimiter`]: per action kind, per calendar day counters.
//! - [`AuditLog`]: the append-only trail, also consulted for recipient history.
//! - [`PolicyEvaluator`]: the per-category decision rules.
//! - [`Gatekeeper`]: the single entry point tying the above together.
//!
//! ## Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use tollgate::{Gatekeeper, JsonFileBackend, PolicyStore};
//!
//! let store = PolicyStore::load(JsonFileBackend::at_default_location()?).await;
//! let gate = Gatekeeper::new(store);
//!
//! let decision = gate.check_permission("send_email", json!({
//!     "to": "someone@example.com",
//!     "subject": "hi",
//!     "body": "hey",
//! }))?;
//!
//! if decision.requires_confirmation() {
//!     // ask the operator before sending
//! }
//! ```

mod action;
mod audit;
mod clock;
mod config;
mod decision;
mod error;
mod evaluator;
mod gatekeeper;
mod rate_limit;
mod script;
mod store;

pub use action::{ActionKind, ApplicationDetails, EmailDetails, FileDetails, ScriptDetails};
pub use audit::{AuditEntry, AuditFilter, AuditLog, AuditTrail, EntryId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ApplicationPermissions, CategoryConfig, EmailPermissions, FileSystemPermissions,
    PermissionCategory, Permissions, PolicyConfig, ScriptScreening,
};
pub use decision::{Decision, DecisionRecord, Denial};
pub use error::{ConfigLoadError, ConfigSaveError, GateError};
pub use evaluator::PolicyEvaluator;
pub use gatekeeper::{Authorization, Gatekeeper, GatekeeperBuilder};
pub use rate_limit::{RateCeilings, RateLimitKey, RateLimiter};
pub use script::{DangerousPattern, dangerous_pattern_names, find_dangerous_pattern};
pub use store::{ConfigBackend, JsonFileBackend, ListChange, MemoryBackend, PolicyStore};
