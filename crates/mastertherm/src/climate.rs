//! MasterTherm climate platform

use std::sync::Arc;

use async_trait::async_trait;
use ha_config_entries::ConfigEntry;
use ha_entity::{
    AddEntities, ClimateEntity, ClimateEntityFeature, EntityError, HvacMode, SetTemperature,
    UnitOfTemperature,
};
use mastertherm_api::{DeviceDescriptor, Thermostat};
use tracing::{debug, info};

use crate::{MasterthermData, DOMAIN};

const ICON: &str = "mdi:thermostat";

const HVAC_MODES: &[HvacMode] = &[HvacMode::Auto, HvacMode::Cool, HvacMode::Heat, HvacMode::Off];

const TEMPERATURE_STEP: f64 = 0.5;

/// Create one climate entity per device discovered on the account
pub async fn async_setup_entry(
    entry: &ConfigEntry,
    data: &MasterthermData,
    add_entities: &dyn AddEntities,
) {
    let modules = data.auth.modules();
    if modules.is_empty() {
        info!("No modules found for {}", entry.title);
        return;
    }

    let entities: Vec<Arc<dyn ClimateEntity>> = modules
        .into_values()
        .flat_map(|devices| devices.into_values())
        .map(|device| {
            Arc::new(MasterthermClimate::new(Arc::clone(&data.auth), device))
                as Arc<dyn ClimateEntity>
        })
        .collect();

    debug!("Adding {} MasterTherm climate entities", entities.len());
    add_entities.async_add_entities(entities, true).await;
}

/// Map a MasterTherm operating mode to an HVAC mode
pub fn hvac_mode_from_str(mode: &str) -> Option<HvacMode> {
    match mode {
        "cooling" => Some(HvacMode::Cool),
        "heating" => Some(HvacMode::Heat),
        "auto" => Some(HvacMode::Auto),
        _ => None,
    }
}

/// A MasterTherm heat pump controller
pub struct MasterthermClimate {
    thermostat: Thermostat,
    name: String,
    unique_id: String,
}

impl MasterthermClimate {
    pub fn new(auth: Arc<mastertherm_api::Auth>, device: DeviceDescriptor) -> Self {
        let unique_id = format!("{}_{}", DOMAIN, device.unique_id());
        Self {
            thermostat: Thermostat::new(auth, device.module_id, device.device_id),
            name: device.module_name,
            unique_id,
        }
    }
}

#[async_trait]
impl ClimateEntity for MasterthermClimate {
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn unique_id(&self) -> Option<&str> {
        Some(&self.unique_id)
    }

    fn icon(&self) -> Option<&str> {
        Some(ICON)
    }

    fn hvac_modes(&self) -> &[HvacMode] {
        HVAC_MODES
    }

    fn supported_features(&self) -> ClimateEntityFeature {
        ClimateEntityFeature::TARGET_TEMPERATURE
    }

    fn target_temperature_step(&self) -> Option<f64> {
        Some(TEMPERATURE_STEP)
    }

    fn temperature_unit(&self) -> UnitOfTemperature {
        UnitOfTemperature::Celsius
    }

    fn should_poll(&self) -> bool {
        true
    }

    fn available(&self) -> bool {
        true
    }

    fn current_temperature(&self) -> Option<f64> {
        self.thermostat.current_temperature()
    }

    fn target_temperature(&self) -> Option<f64> {
        self.thermostat.temperature()
    }

    fn hvac_mode(&self) -> Option<HvacMode> {
        self.thermostat
            .hvac_mode()
            .as_deref()
            .and_then(hvac_mode_from_str)
    }

    async fn async_update(&self) -> Result<(), EntityError> {
        self.thermostat
            .get_data()
            .await
            .map_err(EntityError::integration)
    }

    async fn async_set_temperature(&self, data: &SetTemperature) -> Result<(), EntityError> {
        let Some(temperature) = data.temperature else {
            return Err(EntityError::InvalidServiceData(
                "MasterTherm only accepts a single target temperature".to_string(),
            ));
        };
        self.thermostat
            .set_temperature(temperature)
            .await
            .map_err(EntityError::integration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mastertherm_api::DEFAULT_BASE_URL;

    fn climate() -> MasterthermClimate {
        let auth = Arc::new(
            mastertherm_api::Auth::with_client("u", "p", DEFAULT_BASE_URL, reqwest::Client::new())
                .unwrap(),
        );
        MasterthermClimate::new(
            auth,
            DeviceDescriptor {
                module_id: "5".into(),
                device_id: "12".into(),
                module_name: "Heat Pump".into(),
            },
        )
    }

    #[test]
    fn test_hvac_mode_mapping() {
        assert_eq!(hvac_mode_from_str("cooling"), Some(HvacMode::Cool));
        assert_eq!(hvac_mode_from_str("heating"), Some(HvacMode::Heat));
        assert_eq!(hvac_mode_from_str("auto"), Some(HvacMode::Auto));
        for other in ["off", "Heating", "", "3", "cool"] {
            assert_eq!(hvac_mode_from_str(other), None, "{other}");
        }
    }

    #[test]
    fn test_static_contract() {
        let climate = climate();
        assert_eq!(climate.name(), Some("Heat Pump"));
        assert_eq!(climate.unique_id(), Some("mastertherm_5_12"));
        assert_eq!(climate.icon(), Some("mdi:thermostat"));
        assert_eq!(
            climate.hvac_modes(),
            &[HvacMode::Auto, HvacMode::Cool, HvacMode::Heat, HvacMode::Off]
        );
        assert!(climate
            .supported_features()
            .contains(ClimateEntityFeature::TARGET_TEMPERATURE));
        assert_eq!(climate.target_temperature_step(), Some(0.5));
        assert_eq!(climate.temperature_unit(), UnitOfTemperature::Celsius);
        assert!(climate.should_poll());
        assert!(climate.available());
    }

    #[test]
    fn test_no_state_before_first_poll() {
        let climate = climate();
        assert_eq!(climate.current_temperature(), None);
        assert_eq!(climate.target_temperature(), None);
        assert_eq!(climate.hvac_mode(), None);
    }

    #[tokio::test]
    async fn test_set_temperature_requires_temperature() {
        let climate = climate();
        let data = SetTemperature {
            temperature: None,
            target_temp_low: Some(18.0),
            target_temp_high: Some(22.0),
            hvac_mode: None,
        };
        let err = climate.async_set_temperature(&data).await.unwrap_err();
        assert!(matches!(err, EntityError::InvalidServiceData(_)));
    }
}
