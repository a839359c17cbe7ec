//! MasterTherm Integration
//!
//! Exposes the heat pumps on a MasterTherm cloud account as climate
//! entities. Setup logs in with the entry's credentials; the session becomes
//! the entry's runtime data and the climate platform builds one entity per
//! discovered device from it.

pub mod climate;

use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::{ConfigEntry, Integration, PlatformHost, SetupError};
use ha_entity::{AddEntities, Platform};
use mastertherm_api::{Auth, Error as ApiError, TransportConfig, DEFAULT_BASE_URL};
use serde::Deserialize;
use tracing::{debug, info};

/// Integration domain
pub const DOMAIN: &str = "mastertherm";

/// Platforms activated for every loaded entry
pub const PLATFORMS: &[Platform] = &[Platform::Climate];

pub const CONF_USERNAME: &str = "username";
pub const CONF_PASSWORD: &str = "password";

/// Credentials stored in a config entry
#[derive(Debug, Clone, Deserialize)]
pub struct EntryConfig {
    pub username: String,
    pub password: String,
}

impl EntryConfig {
    pub fn from_entry(entry: &ConfigEntry) -> Result<Self, SetupError> {
        serde_json::from_value(entry.data_value())
            .map_err(|e| SetupError::failed_from("Invalid config entry data", e))
    }
}

/// Runtime data of a loaded entry
#[derive(Debug)]
pub struct MasterthermData {
    pub auth: Arc<Auth>,
}

/// The MasterTherm integration
#[derive(Debug, Clone)]
pub struct Mastertherm {
    transport: TransportConfig,
    base_url: String,
}

impl Default for Mastertherm {
    fn default() -> Self {
        Self::new()
    }
}

impl Mastertherm {
    pub fn new() -> Self {
        Self {
            transport: TransportConfig::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Talk to a different cloud endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Map a client error raised while connecting to the host's setup outcome
pub fn setup_error(err: ApiError) -> SetupError {
    match err {
        ApiError::UnsupportedRole { .. }
        | ApiError::Connection { .. }
        | ApiError::Authentication { .. } => SetupError::not_ready_from("Cannot connect", err),
        other => SetupError::failed_from("Unexpected error connecting to MasterTherm", other),
    }
}

#[async_trait]
impl Integration for Mastertherm {
    type RuntimeData = MasterthermData;

    fn domain(&self) -> &'static str {
        DOMAIN
    }

    fn platforms(&self) -> &'static [Platform] {
        PLATFORMS
    }

    async fn async_setup_entry(&self, entry: &ConfigEntry) -> Result<MasterthermData, SetupError> {
        let config = EntryConfig::from_entry(entry)?;

        let auth = Auth::with_base_url(
            config.username,
            config.password,
            &self.base_url,
            &self.transport,
        )
        .map_err(|e| SetupError::failed_from("Invalid MasterTherm client settings", e))?;

        auth.connect().await.map_err(setup_error)?;
        debug!(
            "Connected to MasterTherm as {} (role {:?})",
            auth.username(),
            auth.role()
        );

        Ok(MasterthermData {
            auth: Arc::new(auth),
        })
    }

    async fn async_setup_platform(
        &self,
        platform: Platform,
        entry: &ConfigEntry,
        runtime_data: &MasterthermData,
        add_entities: &dyn AddEntities,
    ) -> Result<(), SetupError> {
        match platform {
            Platform::Climate => {
                climate::async_setup_entry(entry, runtime_data, add_entities).await;
            }
        }
        Ok(())
    }

    async fn async_unload_entry(
        &self,
        host: &dyn PlatformHost,
        entry: &ConfigEntry,
        runtime_data: &MasterthermData,
    ) -> bool {
        let unloaded = host.async_unload_platforms(entry, PLATFORMS).await;
        if unloaded {
            runtime_data.auth.close();
            info!("Closed MasterTherm session for {}", entry.title);
        }
        unloaded
    }
}
