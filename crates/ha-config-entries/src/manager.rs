//! Config Entries Manager
//!
//! Drives one integration's config entries through setup and unload, owns
//! their runtime data, and hosts the entity platforms the integration
//! forwards entries to.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use ha_entity::{EntityPlatform, Platform};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::entry::{ConfigEntry, ConfigEntryState};
use crate::integration::{Integration, PlatformHost, SetupError};
use crate::state_machine::{calculate_retry_delay, InvalidTransition};

/// Config entries errors
#[derive(Debug, Error)]
pub enum ConfigEntriesError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists for domain {domain} with unique_id {unique_id}")]
    AlreadyExists { domain: String, unique_id: String },

    #[error("Entry domain {got} does not match integration {expected}")]
    WrongDomain { expected: String, got: String },

    #[error("Cannot unload entry in state {0:?}")]
    CannotUnload(ConfigEntryState),

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
}

pub type ConfigEntriesResult<T> = Result<T, ConfigEntriesError>;

/// Config Entries Manager
///
/// Holds, per entry id, at most one runtime data value produced by the
/// integration's setup.
pub struct ConfigEntries<I: Integration> {
    integration: Arc<I>,

    /// Primary index: entry_id -> ConfigEntry
    entries: DashMap<String, ConfigEntry>,

    /// Runtime data of loaded entries
    runtime_data: DashMap<String, Arc<I::RuntimeData>>,

    /// Entity platforms the integration forwards to
    platforms: HashMap<Platform, Arc<EntityPlatform>>,

    /// Platforms set up per entry
    loaded_platforms: DashMap<String, Vec<Platform>>,

    /// Setup lock to prevent concurrent setup/unload
    setup_lock: Mutex<()>,
}

impl<I: Integration> ConfigEntries<I> {
    /// Create a manager for an integration
    pub fn new(integration: I) -> Self {
        let platforms = integration
            .platforms()
            .iter()
            .map(|p| (*p, Arc::new(EntityPlatform::new(*p))))
            .collect();

        Self {
            integration: Arc::new(integration),
            entries: DashMap::new(),
            runtime_data: DashMap::new(),
            platforms,
            loaded_platforms: DashMap::new(),
            setup_lock: Mutex::new(()),
        }
    }

    pub fn integration(&self) -> &Arc<I> {
        &self.integration
    }

    /// Entity platform hosting the integration's entities
    pub fn platform(&self, platform: Platform) -> Option<Arc<EntityPlatform>> {
        self.platforms.get(&platform).cloned()
    }

    /// Add a new config entry
    pub fn add(&self, entry: ConfigEntry) -> ConfigEntriesResult<ConfigEntry> {
        let domain = self.integration.domain();
        if entry.domain != domain {
            return Err(ConfigEntriesError::WrongDomain {
                expected: domain.to_string(),
                got: entry.domain,
            });
        }

        if let Some(ref unique_id) = entry.unique_id {
            let duplicate = self
                .entries
                .iter()
                .any(|e| e.value().unique_id.as_deref() == Some(unique_id.as_str()));
            if duplicate {
                return Err(ConfigEntriesError::AlreadyExists {
                    domain: entry.domain,
                    unique_id: unique_id.clone(),
                });
            }
        }

        self.entries.insert(entry.entry_id.clone(), entry.clone());
        info!("Added config entry: {} ({})", entry.title, entry.entry_id);
        Ok(entry)
    }

    /// Get an entry by ID
    pub fn get(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.get(entry_id).map(|r| r.value().clone())
    }

    /// Runtime data of a loaded entry
    pub fn runtime_data(&self, entry_id: &str) -> Option<Arc<I::RuntimeData>> {
        self.runtime_data.get(entry_id).map(|r| Arc::clone(r.value()))
    }

    /// Get all entry IDs
    pub fn entry_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.entries.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How long to wait before retrying an entry in `SetupRetry`
    pub fn retry_delay(&self, entry_id: &str) -> Option<Duration> {
        self.get(entry_id)
            .filter(|e| e.state == ConfigEntryState::SetupRetry)
            .map(|e| calculate_retry_delay(e.tries))
    }

    /// Set up an entry, returning whether it is now loaded
    ///
    /// A not-ready integration leaves the entry in `SetupRetry`; the caller
    /// schedules the next attempt using [`retry_delay`](Self::retry_delay).
    pub async fn async_setup(&self, entry_id: &str) -> ConfigEntriesResult<bool> {
        let _lock = self.setup_lock.lock().await;

        let entry = self.set_state(entry_id, ConfigEntryState::SetupInProgress, None)?;
        debug!("Setting up {} entry {}", entry.domain, entry.entry_id);

        let runtime_data = match self.integration.async_setup_entry(&entry).await {
            Ok(data) => Arc::new(data),
            Err(e) => return self.setup_failed(&entry, e),
        };

        self.runtime_data
            .insert(entry.entry_id.clone(), Arc::clone(&runtime_data));

        if let Err(e) = self.forward_entry_setups(&entry, &runtime_data).await {
            self.reset_platforms(&entry.entry_id);
            self.runtime_data.remove(&entry.entry_id);
            return self.setup_failed(&entry, e);
        }

        self.set_state(entry_id, ConfigEntryState::Loaded, None)?;
        info!("Setup completed for entry: {} ({})", entry.title, entry_id);
        Ok(true)
    }

    /// Unload an entry, returning the integration's unload result
    ///
    /// Runtime data is dropped only when the unload succeeded.
    pub async fn async_unload(&self, entry_id: &str) -> ConfigEntriesResult<bool> {
        let _lock = self.setup_lock.lock().await;

        let entry = self
            .get(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;

        if !entry.state.is_recoverable() {
            return Err(ConfigEntriesError::CannotUnload(entry.state));
        }
        if entry.state == ConfigEntryState::NotLoaded {
            return Ok(true);
        }

        self.set_state(entry_id, ConfigEntryState::UnloadInProgress, None)?;

        let Some(runtime_data) = self.runtime_data(entry_id) else {
            // Never loaded (SetupRetry / SetupError): nothing to tear down
            self.set_state(entry_id, ConfigEntryState::NotLoaded, None)?;
            return Ok(true);
        };

        let unloaded = self
            .integration
            .async_unload_entry(self, &entry, runtime_data.as_ref())
            .await;

        if unloaded {
            self.runtime_data.remove(entry_id);
            self.set_state(entry_id, ConfigEntryState::NotLoaded, None)?;
            info!("Unloaded entry: {} ({})", entry.title, entry_id);
        } else {
            self.set_state(
                entry_id,
                ConfigEntryState::FailedUnload,
                Some("Unload failed".to_string()),
            )?;
            warn!("Failed to unload entry: {} ({})", entry.title, entry_id);
        }
        Ok(unloaded)
    }

    /// Poll every entity of every platform, returning how many updated
    pub async fn async_update_entities(&self) -> usize {
        let mut updated = 0;
        for platform in self.platforms.values() {
            updated += platform.async_update_entities().await;
        }
        updated
    }

    async fn forward_entry_setups(
        &self,
        entry: &ConfigEntry,
        runtime_data: &I::RuntimeData,
    ) -> Result<(), SetupError> {
        for platform in self.integration.platforms() {
            let Some(host) = self.platforms.get(platform) else {
                continue;
            };
            let add_entities = host.for_entry(&entry.entry_id);
            self.integration
                .async_setup_platform(*platform, entry, runtime_data, &add_entities)
                .await?;

            self.loaded_platforms
                .entry(entry.entry_id.clone())
                .or_default()
                .push(*platform);
            debug!("Forwarded entry {} to {}", entry.entry_id, platform);
        }
        Ok(())
    }

    fn reset_platforms(&self, entry_id: &str) {
        if let Some((_, loaded)) = self.loaded_platforms.remove(entry_id) {
            for platform in loaded {
                if let Some(host) = self.platforms.get(&platform) {
                    host.async_reset_entry(entry_id);
                }
            }
        }
    }

    fn setup_failed(&self, entry: &ConfigEntry, err: SetupError) -> ConfigEntriesResult<bool> {
        if err.is_retryable() {
            self.set_state(
                &entry.entry_id,
                ConfigEntryState::SetupRetry,
                Some(err.to_string()),
            )?;
            let tries = self
                .entries
                .get_mut(&entry.entry_id)
                .map(|mut e| e.increment_tries())
                .unwrap_or_default();
            warn!(
                "Config entry '{}' for {} integration not ready yet: {}; retrying in {:?} (attempt {})",
                entry.title,
                entry.domain,
                err,
                calculate_retry_delay(tries),
                tries
            );
        } else {
            self.set_state(
                &entry.entry_id,
                ConfigEntryState::SetupError,
                Some(err.to_string()),
            )?;
            error!(
                "Error setting up entry {} for {}: {}",
                entry.title, entry.domain, err
            );
        }
        Ok(false)
    }

    fn set_state(
        &self,
        entry_id: &str,
        state: ConfigEntryState,
        reason: Option<String>,
    ) -> ConfigEntriesResult<ConfigEntry> {
        let mut entry = self
            .entries
            .get_mut(entry_id)
            .ok_or_else(|| ConfigEntriesError::NotFound(entry_id.to_string()))?;
        entry.try_set_state(state, reason)?;
        debug!("Entry {} state changed to {:?}", entry_id, state);
        Ok(entry.clone())
    }
}

#[async_trait]
impl<I: Integration> PlatformHost for ConfigEntries<I> {
    async fn async_unload_platforms(&self, entry: &ConfigEntry, platforms: &[Platform]) -> bool {
        let loaded = self
            .loaded_platforms
            .get(&entry.entry_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();

        let mut ok = true;
        for platform in platforms {
            match self.platforms.get(platform) {
                Some(host) if loaded.contains(platform) => {
                    host.async_reset_entry(&entry.entry_id);
                }
                _ => {
                    warn!(
                        "Platform {} was never set up for entry {}",
                        platform, entry.entry_id
                    );
                    ok = false;
                }
            }
        }

        if ok {
            self.loaded_platforms.remove(&entry.entry_id);
        }
        ok
    }
}
