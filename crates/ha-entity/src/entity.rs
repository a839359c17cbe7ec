//! Types shared by every entity platform

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// State value of an entity whose integration reported an error
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// State value of an entity that has not reported yet
pub const STATE_UNKNOWN: &str = "unknown";

/// Entity platforms an integration can forward a config entry to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Climate,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Climate => "climate",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by entities and the platform that hosts them
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity {entity_id} does not support {feature}")]
    NotSupported {
        entity_id: String,
        feature: &'static str,
    },

    #[error("Invalid service data: {0}")]
    InvalidServiceData(String),

    /// Failure inside the integration's own client
    #[error(transparent)]
    Integration(Box<dyn std::error::Error + Send + Sync>),
}

impl EntityError {
    /// Wrap an integration error
    pub fn integration<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        EntityError::Integration(Box::new(err))
    }
}

/// Rendered state of an entity, as of its last poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Entity ID (e.g., "climate.heat_pump")
    pub entity_id: String,

    /// State value (e.g., "heat", "unavailable")
    pub state: String,

    /// Additional attributes
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the state was last written
    pub last_updated: DateTime<Utc>,
}

impl EntityState {
    pub fn new(
        entity_id: impl Into<String>,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes,
            last_updated: Utc::now(),
        }
    }

    /// Copy of this state marked unavailable, keeping attributes
    pub fn unavailable(&self) -> Self {
        Self::new(
            self.entity_id.clone(),
            STATE_UNAVAILABLE,
            self.attributes.clone(),
        )
    }

    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }
}

/// Turn a display name into an object id ("Heat Pump" → "heat_pump")
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}
