//! Policy store and its persistence backends.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;

use crate::config::{
    ApplicationPermissions, CategoryConfig, EmailPermissions, FileSystemPermissions,
    PermissionCategory, PolicyConfig, home_dir,
};
use crate::error::{ConfigLoadError, ConfigSaveError};

/// Durable storage for the policy.
#[async_trait]
pub trait ConfigBackend: Send + Sync + std::fmt::Debug {
    /// Read the persisted policy, or `None` if nothing has been saved yet.
    async fn load(&self) -> Result<Option<PolicyConfig>, ConfigLoadError>;

    /// Persist the policy, replacing whatever was stored.
    async fn save(&self, config: &PolicyConfig) -> Result<(), ConfigSaveError>;
}

/// Stores the policy as a pretty-printed JSON file.
#[derive(Clone, Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    /// Use the file at `path`. It need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.tollgate/policy.json`.
    pub fn default_path() -> PathBuf {
        home_dir().join(".tollgate").join("policy.json")
    }

    /// Use [`default_path`](Self::default_path).
    pub fn at_default_location() -> Self {
        Self::new(Self::default_path())
    }

    /// The file this backend reads and writes.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, source: std::io::Error) -> ConfigSaveError {
        ConfigSaveError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl ConfigBackend for JsonFileBackend {
    async fn load(&self) -> Result<Option<PolicyConfig>, ConfigLoadError> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigLoadError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        Ok(Some(PolicyConfig::from_json(&json)?))
    }

    async fn save(&self, config: &PolicyConfig) -> Result<(), ConfigSaveError> {
        let json = config.to_json()?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.write_error(e))?;
        }

        // Write beside the target and rename so readers never see a partial file.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| self.write_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.write_error(e))?;

        tracing::info!(path = %self.path.display(), "saved policy");
        Ok(())
    }
}

/// Keeps the serialized policy in memory.
///
/// Serializes on save and parses on load, so it behaves like the file
/// backend without touching disk.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    json: Mutex<Option<String>>,
}

impl MemoryBackend {
    /// An empty backend (loads as "nothing saved").
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that already holds `json`, valid or not.
    pub fn with_contents(json: impl Into<String>) -> Self {
        Self {
            json: Mutex::new(Some(json.into())),
        }
    }

    /// The last saved document.
    pub fn contents(&self) -> Option<String> {
        self.json
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ConfigBackend for MemoryBackend {
    async fn load(&self) -> Result<Option<PolicyConfig>, ConfigLoadError> {
        match self.contents() {
            Some(json) => Ok(Some(PolicyConfig::from_json(&json)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, config: &PolicyConfig) -> Result<(), ConfigSaveError> {
        let json = config.to_json()?;
        *self.json.lock().unwrap_or_else(PoisonError::into_inner) = Some(json);
        Ok(())
    }
}

/// Whether to add or remove a list entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListChange {
    /// Insert the item
    Add,
    /// Remove the item
    Remove,
}

/// Which global list to mutate.
#[derive(Clone, Copy, Debug)]
enum List {
    Whitelist,
    Blacklist,
}

/// The current permission configuration.
///
/// Reads are served from memory. Mutations apply in memory first, then
/// persist through the backend; a failed write is reported but the
/// in-memory change stays.
#[derive(Debug)]
pub struct PolicyStore {
    config: RwLock<PolicyConfig>,
    backend: Arc<dyn ConfigBackend>,
    // Serializes snapshot-and-write so the last write always carries the latest state.
    save_lock: tokio::sync::Mutex<()>,
}

impl PolicyStore {
    /// Load the persisted policy, installing defaults if there is none or it
    /// cannot be read.
    pub async fn load(backend: impl ConfigBackend + 'static) -> Self {
        Self::load_from(Arc::new(backend)).await
    }

    /// Like [`load`](Self::load) for a shared backend.
    pub async fn load_from(backend: Arc<dyn ConfigBackend>) -> Self {
        let config = match backend.load().await {
            Ok(Some(config)) => config,
            Ok(None) => {
                tracing::info!("no saved policy, using defaults");
                PolicyConfig::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable policy, using defaults");
                PolicyConfig::default()
            }
        };
        Self::with_config(config, backend)
    }

    /// A store holding `config`, persisting through `backend`.
    pub fn with_config(config: PolicyConfig, backend: Arc<dyn ConfigBackend>) -> Self {
        Self {
            config: RwLock::new(config),
            backend,
            save_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// A store with default settings backed by memory only.
    pub fn in_memory() -> Self {
        Self::with_config(PolicyConfig::default(), Arc::new(MemoryBackend::new()))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PolicyConfig> {
        self.config.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PolicyConfig> {
        self.config.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The settings of one category.
    pub fn get(&self, category: PermissionCategory) -> CategoryConfig {
        self.read().permissions.get(category)
    }

    /// Email settings.
    pub fn email(&self) -> EmailPermissions {
        self.read().permissions.email.clone()
    }

    /// Filesystem settings.
    pub fn file_system(&self) -> FileSystemPermissions {
        self.read().permissions.file_system.clone()
    }

    /// Application settings.
    pub fn applications(&self) -> ApplicationPermissions {
        self.read().permissions.applications.clone()
    }

    /// Whether `item` is blacklisted.
    pub fn is_blacklisted(&self, item: &str) -> bool {
        self.read().is_blacklisted(item)
    }

    /// Whether `item` passes the whitelist (always true while it is empty).
    pub fn passes_whitelist(&self, item: &str) -> bool {
        self.read().passes_whitelist(item)
    }

    /// A copy of the whole configuration.
    pub fn snapshot(&self) -> PolicyConfig {
        self.read().clone()
    }

    /// Add or remove a whitelist entry and persist.
    ///
    /// Returns whether the list changed. Persisting happens even when it did not.
    pub async fn mutate_whitelist(
        &self,
        item: &str,
        change: ListChange,
    ) -> Result<bool, ConfigSaveError> {
        self.mutate_list(List::Whitelist, item, change).await
    }

    /// Add or remove a blacklist entry and persist.
    ///
    /// Returns whether the list changed. Persisting happens even when it did not.
    pub async fn mutate_blacklist(
        &self,
        item: &str,
        change: ListChange,
    ) -> Result<bool, ConfigSaveError> {
        self.mutate_list(List::Blacklist, item, change).await
    }

    async fn mutate_list(
        &self,
        list: List,
        item: &str,
        change: ListChange,
    ) -> Result<bool, ConfigSaveError> {
        let changed = {
            let mut config = self.write();
            let set = match list {
                List::Whitelist => &mut config.whitelist,
                List::Blacklist => &mut config.blacklist,
            };
            match change {
                ListChange::Add => set.insert(item.to_string()),
                ListChange::Remove => set.remove(item),
            }
        };
        tracing::info!(list = ?list, item = %item, change = ?change, changed, "updated list");
        self.save().await?;
        Ok(changed)
    }

    /// Replace a category's settings and persist.
    ///
    /// Script screening is built in; a [`CategoryConfig::Script`] is ignored.
    pub async fn set_permissions(&self, config: CategoryConfig) -> Result<(), ConfigSaveError> {
        let category = config.category();
        if !self.write().permissions.set(config) {
            tracing::warn!(category = %category, "category is not configurable");
            return Ok(());
        }
        tracing::info!(category = %category, "updated permissions");
        self.save().await
    }

    /// Persist the current configuration.
    pub async fn save(&self) -> Result<(), ConfigSaveError> {
        let _guard = self.save_lock.lock().await;
        let snapshot = self.snapshot();
        self.backend.save(&snapshot).await
    }
}
