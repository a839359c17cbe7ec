//! Integration contract
//!
//! The two entry points a config entry drives (`async_setup_entry` and
//! `async_unload_entry`), the per-platform setup hook, and the error an
//! integration uses to tell the host whether setup is worth retrying.

use async_trait::async_trait;
use ha_entity::{AddEntities, Platform};
use thiserror::Error;

use crate::entry::ConfigEntry;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why an integration could not set up a config entry
#[derive(Debug, Error)]
pub enum SetupError {
    /// Temporary failure (device offline, cloud unreachable); the host
    /// retries setup later
    #[error("{message}")]
    NotReady {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Anything else; the entry stays in `SetupError` until reconfigured
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl SetupError {
    pub fn not_ready(message: impl Into<String>) -> Self {
        SetupError::NotReady {
            message: message.into(),
            source: None,
        }
    }

    pub fn not_ready_from<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SetupError::NotReady {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        SetupError::Failed {
            message: message.into(),
            source: None,
        }
    }

    pub fn failed_from<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SetupError::Failed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the host should schedule another setup attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, SetupError::NotReady { .. })
    }
}

/// Host services an integration may call back into during unload
#[async_trait]
pub trait PlatformHost: Send + Sync {
    /// Unload the given platforms for an entry; `true` if all succeeded
    async fn async_unload_platforms(&self, entry: &ConfigEntry, platforms: &[Platform]) -> bool;
}

/// An integration the host can set up from config entries
///
/// Whatever `async_setup_entry` returns is the entry's runtime data: the
/// host owns it, passes it to every platform setup, and drops it once the
/// entry is unloaded.
#[async_trait]
pub trait Integration: Send + Sync + 'static {
    /// Per-entry state built at setup
    type RuntimeData: Send + Sync + 'static;

    /// Integration domain (e.g., "mastertherm")
    fn domain(&self) -> &'static str;

    /// Platforms the host activates after a successful setup
    fn platforms(&self) -> &'static [Platform];

    /// Set up a config entry
    async fn async_setup_entry(&self, entry: &ConfigEntry)
        -> Result<Self::RuntimeData, SetupError>;

    /// Set up one platform for a loaded entry
    async fn async_setup_platform(
        &self,
        platform: Platform,
        entry: &ConfigEntry,
        runtime_data: &Self::RuntimeData,
        add_entities: &dyn AddEntities,
    ) -> Result<(), SetupError>;

    /// Unload a config entry; the host keeps the runtime data on `false`
    async fn async_unload_entry(
        &self,
        host: &dyn PlatformHost,
        entry: &ConfigEntry,
        runtime_data: &Self::RuntimeData,
    ) -> bool;
}
