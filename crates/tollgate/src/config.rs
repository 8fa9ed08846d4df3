//! Permission configuration.
//!
//! The persisted shape is:
//!
//! ```json
//! {
//!   "whitelist": ["boss@example.com"],
//!   "blacklist": [],
//!   "permissions": {
//!     "email": { "enabled": true, "requireConfirmation": true, "allowedDomains": [], "maxPerDay": 10 },
//!     "file_system": { "enabled": true, "allowedPaths": ["/Users/me/Desktop"], "forbiddenPaths": ["/Users/me/.ssh"] },
//!     "applications": { "enabled": true, "allowedApps": ["Finder"], "forbiddenApps": ["Terminal"] }
//!   }
//! }
//! ```
//!
//! Every field is optional on load; missing fields take their defaults.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::script::dangerous_pattern_names;

/// A permission category.
///
/// `Script` can be inspected but not configured: its pattern set is built in
/// and always on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionCategory {
    /// Outbound email
    Email,
    /// Filesystem access
    FileSystem,
    /// Application control
    Applications,
    /// Script screening
    Script,
}

impl PermissionCategory {
    /// The persisted name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionCategory::Email => "email",
            PermissionCategory::FileSystem => "file_system",
            PermissionCategory::Applications => "applications",
            PermissionCategory::Script => "script",
        }
    }
}

impl fmt::Display for PermissionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for outbound email.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmailPermissions {
    /// Whether email may be sent at all
    pub enabled: bool,
    /// Ask a human before the first email to a new recipient
    pub require_confirmation: bool,
    /// Recipient domains allowed (empty = any domain)
    pub allowed_domains: BTreeSet<String>,
    /// Daily email budget, persisted for operators; enforcement uses [`RateCeilings`](crate::RateCeilings)
    pub max_per_day: u32,
}

impl Default for EmailPermissions {
    fn default() -> Self {
        Self {
            enabled: true,
            require_confirmation: true,
            allowed_domains: BTreeSet::new(),
            max_per_day: 10,
        }
    }
}

/// Settings for filesystem access.
///
/// Both lists hold plain string prefixes and keep their insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileSystemPermissions {
    /// Whether file operations are permitted at all
    pub enabled: bool,
    /// Path prefixes inside which access is allowed (empty = anywhere not forbidden)
    pub allowed_paths: Vec<String>,
    /// Path prefixes that are never accessible; wins over `allowed_paths`
    pub forbidden_paths: Vec<String>,
}

impl Default for FileSystemPermissions {
    fn default() -> Self {
        Self::with_home(&home_dir())
    }
}

impl FileSystemPermissions {
    /// Default settings rooted at the given home directory.
    pub fn with_home(home: &Path) -> Self {
        let under_home = |name: &str| home.join(name).to_string_lossy().into_owned();
        Self {
            enabled: true,
            allowed_paths: vec![
                under_home("Desktop"),
                under_home("Documents"),
                under_home("Downloads"),
            ],
            forbidden_paths: vec![
                under_home(".ssh"),
                under_home(".gnupg"),
                "/System".to_string(),
                "/Library".to_string(),
            ],
        }
    }
}

/// Settings for application control.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplicationPermissions {
    /// Whether applications may be controlled at all
    pub enabled: bool,
    /// Applications that may be run (empty = any not forbidden)
    pub allowed_apps: BTreeSet<String>,
    /// Applications that may never be run; wins over `allowed_apps`
    pub forbidden_apps: BTreeSet<String>,
}

impl Default for ApplicationPermissions {
    fn default() -> Self {
        let set = |names: &[&str]| names.iter().map(|n| n.to_string()).collect();
        Self {
            enabled: true,
            allowed_apps: set(&["Finder", "Safari", "Mail", "Calendar", "Notes", "Preview"]),
            forbidden_apps: set(&["System Preferences", "Terminal", "Activity Monitor"]),
        }
    }
}

/// The built-in script screening, as reported by [`Permissions::get`].
///
/// Never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScriptScreening {
    /// Names of the dangerous patterns, in matching order
    pub patterns: Vec<String>,
}

impl Default for ScriptScreening {
    fn default() -> Self {
        Self {
            patterns: dangerous_pattern_names().map(str::to_string).collect(),
        }
    }
}

/// Settings for every configurable category.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    /// Outbound email
    pub email: EmailPermissions,
    /// Filesystem access
    pub file_system: FileSystemPermissions,
    /// Application control
    pub applications: ApplicationPermissions,
}

/// The settings of one category, as returned by [`PolicyStore::get`](crate::PolicyStore::get).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CategoryConfig {
    /// Outbound email
    Email(EmailPermissions),
    /// Filesystem access
    FileSystem(FileSystemPermissions),
    /// Application control
    Applications(ApplicationPermissions),
    /// Script screening (read only)
    Script(ScriptScreening),
}

impl CategoryConfig {
    /// The category these settings belong to.
    pub fn category(&self) -> PermissionCategory {
        match self {
            CategoryConfig::Email(_) => PermissionCategory::Email,
            CategoryConfig::FileSystem(_) => PermissionCategory::FileSystem,
            CategoryConfig::Applications(_) => PermissionCategory::Applications,
            CategoryConfig::Script(_) => PermissionCategory::Script,
        }
    }

    /// Whether the category is enabled.
    pub fn enabled(&self) -> bool {
        match self {
            CategoryConfig::Email(c) => c.enabled,
            CategoryConfig::FileSystem(c) => c.enabled,
            CategoryConfig::Applications(c) => c.enabled,
            CategoryConfig::Script(_) => true,
        }
    }
}

impl Permissions {
    /// The settings of a single category.
    pub fn get(&self, category: PermissionCategory) -> CategoryConfig {
        match category {
            PermissionCategory::Email => CategoryConfig::Email(self.email.clone()),
            PermissionCategory::FileSystem => CategoryConfig::FileSystem(self.file_system.clone()),
            PermissionCategory::Applications => {
                CategoryConfig::Applications(self.applications.clone())
            }
            PermissionCategory::Script => CategoryConfig::Script(ScriptScreening::default()),
        }
    }

    /// Replace the settings of the category `config` belongs to.
    ///
    /// Returns false for [`CategoryConfig::Script`], which cannot be changed.
    pub fn set(&mut self, config: CategoryConfig) -> bool {
        match config {
            CategoryConfig::Email(c) => self.email = c,
            CategoryConfig::FileSystem(c) => self.file_system = c,
            CategoryConfig::Applications(c) => self.applications = c,
            CategoryConfig::Script(_) => return false,
        }
        true
    }
}

/// The complete persisted policy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Identifiers (usually email recipients) that are the only ones allowed when non-empty
    pub whitelist: BTreeSet<String>,
    /// Identifiers that are always denied
    pub blacklist: BTreeSet<String>,
    /// Per-category settings
    pub permissions: Permissions,
}

impl PolicyConfig {
    /// Parse a persisted policy.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Whether `item` is blacklisted.
    pub fn is_blacklisted(&self, item: &str) -> bool {
        self.blacklist.contains(item)
    }

    /// Whether `item` passes the whitelist (always true while it is empty).
    pub fn passes_whitelist(&self, item: &str) -> bool {
        self.whitelist.is_empty() || self.whitelist.contains(item)
    }

    /// Serialize for persistence (pretty printed, trailing newline).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// The current user's home directory, or `/` when it cannot be determined.
pub(crate) fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_email_permissions() {
        let email = EmailPermissions::default();
        assert!(email.enabled);
        assert!(email.require_confirmation);
        assert!(email.allowed_domains.is_empty());
        assert_eq!(email.max_per_day, 10);
    }

    #[test]
    fn test_default_file_system_permissions() {
        let fs = FileSystemPermissions::with_home(Path::new("/Users/u"));
        assert_eq!(
            fs.allowed_paths,
            vec!["/Users/u/Desktop", "/Users/u/Documents", "/Users/u/Downloads"]
        );
        assert_eq!(
            fs.forbidden_paths,
            vec!["/Users/u/.ssh", "/Users/u/.gnupg", "/System", "/Library"]
        );
    }

    #[test]
    fn test_default_application_permissions() {
        let apps = ApplicationPermissions::default();
        assert!(apps.allowed_apps.contains("Safari"));
        assert!(apps.forbidden_apps.contains("Terminal"));
        assert!(!apps.allowed_apps.contains("Terminal"));
    }

    #[test]
    fn test_serialization_uses_camel_case_fields() {
        let json = PolicyConfig::default().to_json().unwrap();
        assert!(json.contains("\"requireConfirmation\""));
        assert!(json.contains("\"allowedDomains\""));
        assert!(json.contains("\"maxPerDay\""));
        assert!(json.contains("\"forbiddenPaths\""));
        assert!(json.contains("\"allowedApps\""));
        assert!(json.contains("\"file_system\""));
        assert!(json.ends_with('\n'));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = PolicyConfig::from_json(
            r#"{"blacklist": ["spam@x.com"], "permissions": {"email": {"enabled": false}}}"#,
        )
        .unwrap();

        assert!(config.blacklist.contains("spam@x.com"));
        assert!(config.whitelist.is_empty());
        assert!(!config.permissions.email.enabled);
        assert!(config.permissions.email.require_confirmation);
        assert_eq!(config.permissions.email.max_per_day, 10);
        assert_eq!(
            config.permissions.applications,
            ApplicationPermissions::default()
        );
    }

    #[test]
    fn test_get_and_set_category() {
        let mut permissions = Permissions::default();
        let mut apps = ApplicationPermissions::default();
        apps.enabled = false;
        permissions.set(CategoryConfig::Applications(apps));

        let config = permissions.get(PermissionCategory::Applications);
        assert_eq!(config.category(), PermissionCategory::Applications);
        assert!(!config.enabled());
        assert!(permissions.get(PermissionCategory::Email).enabled());
    }

    #[test]
    fn test_script_category_is_read_only() {
        let mut permissions = Permissions::default();
        let CategoryConfig::Script(screening) = permissions.get(PermissionCategory::Script) else {
            panic!("expected script screening");
        };
        assert_eq!(screening.patterns.len(), 8);
        assert!(screening.patterns.iter().any(|p| p == "curl_pipe_shell"));
        assert!(permissions.get(PermissionCategory::Script).enabled());

        let before = permissions.clone();
        assert!(!permissions.set(CategoryConfig::Script(ScriptScreening { patterns: vec![] })));
        assert_eq!(permissions, before);
        assert_eq!(PermissionCategory::Script.to_string(), "script");

        // Not part of the persisted document
        let json = PolicyConfig::default().to_json().unwrap();
        assert!(!json.contains("curl_pipe_shell"));
    }

    #[test]
    fn test_round_trip_preserves_sets() {
        let mut config = PolicyConfig::default();
        config.whitelist.insert("b@x.com".into());
        config.whitelist.insert("a@x.com".into());
        config.permissions.email.allowed_domains.insert("x.com".into());

        let reloaded = PolicyConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(reloaded, config);
        assert_eq!(reloaded.to_json().unwrap(), config.to_json().unwrap());
    }
}
