use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use chrono::{DateTime, Utc};

use crate::auth::Auth;
use crate::error::Result;
use crate::models::DeviceData;
use crate::registers;

/// Per-device view over an [`Auth`] session.
///
/// `get_data` refreshes the cached registers; every other getter reads the
/// cache without touching the network and returns `None` before the first
/// successful fetch.
#[derive(Debug)]
pub struct Thermostat {
    auth: Arc<Auth>,
    module_id: String,
    device_id: String,
    data: RwLock<Option<DeviceData>>,
}

impl Thermostat {
    pub fn new(auth: Arc<Auth>, module_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            auth,
            module_id: module_id.into(),
            device_id: device_id.into(),
            data: RwLock::new(None),
        }
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Fetch the latest registers from the cloud.
    pub async fn get_data(&self) -> Result<()> {
        let data = self
            .auth
            .get_device_data(&self.module_id, &self.device_id)
            .await?;
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = Some(data);
        Ok(())
    }

    /// Measured room temperature.
    pub fn current_temperature(&self) -> Option<f64> {
        self.cached()
            .as_ref()
            .and_then(|d| d.get_f64(registers::ROOM_TEMPERATURE))
    }

    /// Requested room temperature.
    pub fn temperature(&self) -> Option<f64> {
        self.cached()
            .as_ref()
            .and_then(|d| d.get_f64(registers::ROOM_TEMPERATURE_REQUESTED))
    }

    /// Operating mode name (`auto`, `heating`, `cooling`, or the raw code).
    pub fn hvac_mode(&self) -> Option<String> {
        self.cached()
            .as_ref()
            .and_then(|d| d.get(registers::OPERATING_MODE))
            .map(|code| registers::operating_mode_name(code).to_string())
    }

    /// When the cache was last refreshed.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.cached().as_ref().map(|d| d.fetched_at)
    }

    /// Write the requested room temperature.
    ///
    /// On success the cached value is updated so readers see it before the
    /// next fetch.
    pub async fn set_temperature(&self, value: f64) -> Result<()> {
        let value = value.to_string();
        self.auth
            .set_variable(
                &self.module_id,
                &self.device_id,
                registers::ROOM_TEMPERATURE_REQUESTED,
                &value,
            )
            .await?;

        if let Some(data) = self
            .data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            data.registers
                .insert(registers::ROOM_TEMPERATURE_REQUESTED.to_string(), value);
        }
        Ok(())
    }

    fn cached(&self) -> RwLockReadGuard<'_, Option<DeviceData>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DEFAULT_BASE_URL;

    #[test]
    fn test_getters_empty_before_fetch() {
        let auth = Arc::new(
            Auth::with_client("u", "p", DEFAULT_BASE_URL, reqwest::Client::new()).unwrap(),
        );
        let thermostat = Thermostat::new(auth, "5", "12");

        assert_eq!(thermostat.module_id(), "5");
        assert_eq!(thermostat.device_id(), "12");
        assert!(thermostat.current_temperature().is_none());
        assert!(thermostat.temperature().is_none());
        assert!(thermostat.hvac_mode().is_none());
        assert!(thermostat.last_updated().is_none());
    }
}
