//! Climate entity contract
//!
//! Mirrors the property/command surface of Home Assistant's `ClimateEntity`
//! for the subset integrations here implement.

use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::entity::{EntityError, STATE_UNAVAILABLE, STATE_UNKNOWN};

/// Service data key carrying the requested temperature
pub const ATTR_TEMPERATURE: &str = "temperature";

/// Default minimum target temperature (°C)
pub const DEFAULT_MIN_TEMP: f64 = 7.0;

/// Default maximum target temperature (°C)
pub const DEFAULT_MAX_TEMP: f64 = 35.0;

/// HVAC operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    Auto,
    Dry,
    FanOnly,
}

impl HvacMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Heat => "heat",
            HvacMode::Cool => "cool",
            HvacMode::HeatCool => "heat_cool",
            HvacMode::Auto => "auto",
            HvacMode::Dry => "dry",
            HvacMode::FanOnly => "fan_only",
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported-feature bit set of a climate entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ClimateEntityFeature(u32);

impl ClimateEntityFeature {
    pub const TARGET_TEMPERATURE: Self = Self(1);
    pub const TURN_OFF: Self = Self(128);
    pub const TURN_ON: Self = Self(256);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ClimateEntityFeature {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Temperature unit an entity reports in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitOfTemperature {
    #[serde(rename = "°C")]
    Celsius,
    #[serde(rename = "°F")]
    Fahrenheit,
}

impl UnitOfTemperature {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfTemperature::Celsius => "°C",
            UnitOfTemperature::Fahrenheit => "°F",
        }
    }
}

/// Data of a `climate.set_temperature` service call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetTemperature {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub target_temp_low: Option<f64>,
    #[serde(default)]
    pub target_temp_high: Option<f64>,
    #[serde(default)]
    pub hvac_mode: Option<HvacMode>,
}

impl SetTemperature {
    /// Request a single target temperature
    pub fn temperature(value: f64) -> Self {
        Self {
            temperature: Some(value),
            ..Self::default()
        }
    }

    /// Parse service data, requiring at least one temperature key
    pub fn from_service_data(data: &Value) -> Result<Self, EntityError> {
        let parsed: SetTemperature = serde_json::from_value(data.clone())
            .map_err(|e| EntityError::InvalidServiceData(e.to_string()))?;

        if parsed.temperature.is_none()
            && parsed.target_temp_low.is_none()
            && parsed.target_temp_high.is_none()
        {
            return Err(EntityError::InvalidServiceData(format!(
                "must contain at least one of {ATTR_TEMPERATURE}, target_temp_low, target_temp_high"
            )));
        }
        Ok(parsed)
    }
}

/// A climate device exposed by an integration
///
/// Property accessors are synchronous reads of whatever the last
/// `async_update` fetched; the host calls `async_update` on its own
/// schedule when `should_poll` is true.
#[async_trait]
pub trait ClimateEntity: Send + Sync {
    /// Display name
    fn name(&self) -> Option<&str>;

    /// Identifier stable across restarts
    fn unique_id(&self) -> Option<&str>;

    fn icon(&self) -> Option<&str> {
        None
    }

    fn hvac_modes(&self) -> &[HvacMode];

    fn supported_features(&self) -> ClimateEntityFeature;

    fn target_temperature_step(&self) -> Option<f64> {
        None
    }

    fn temperature_unit(&self) -> UnitOfTemperature;

    fn min_temp(&self) -> f64 {
        DEFAULT_MIN_TEMP
    }

    fn max_temp(&self) -> f64 {
        DEFAULT_MAX_TEMP
    }

    fn should_poll(&self) -> bool {
        true
    }

    fn available(&self) -> bool {
        true
    }

    fn current_temperature(&self) -> Option<f64>;

    fn target_temperature(&self) -> Option<f64>;

    fn hvac_mode(&self) -> Option<HvacMode>;

    /// Refresh cached data from the device
    async fn async_update(&self) -> Result<(), EntityError>;

    /// Set a new target temperature
    async fn async_set_temperature(&self, data: &SetTemperature) -> Result<(), EntityError>;
}

/// Render the state value and attributes of a climate entity
pub fn climate_state(entity: &dyn ClimateEntity) -> (String, HashMap<String, Value>) {
    let state = if !entity.available() {
        STATE_UNAVAILABLE.to_string()
    } else {
        entity
            .hvac_mode()
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| STATE_UNKNOWN.to_string())
    };

    let mut attributes = HashMap::new();
    attributes.insert(
        "hvac_modes".to_string(),
        json!(entity
            .hvac_modes()
            .iter()
            .map(HvacMode::as_str)
            .collect::<Vec<_>>()),
    );
    attributes.insert("min_temp".to_string(), json!(entity.min_temp()));
    attributes.insert("max_temp".to_string(), json!(entity.max_temp()));
    attributes.insert(
        "current_temperature".to_string(),
        json!(entity.current_temperature()),
    );
    attributes.insert(
        ATTR_TEMPERATURE.to_string(),
        json!(entity.target_temperature()),
    );
    attributes.insert(
        "supported_features".to_string(),
        json!(entity.supported_features().bits()),
    );
    if let Some(step) = entity.target_temperature_step() {
        attributes.insert("target_temp_step".to_string(), json!(step));
    }
    if let Some(name) = entity.name() {
        attributes.insert("friendly_name".to_string(), json!(name));
    }
    if let Some(icon) = entity.icon() {
        attributes.insert("icon".to_string(), json!(icon));
    }

    (state, attributes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_bits() {
        let features = ClimateEntityFeature::TARGET_TEMPERATURE | ClimateEntityFeature::TURN_OFF;
        assert!(features.contains(ClimateEntityFeature::TARGET_TEMPERATURE));
        assert!(!features.contains(ClimateEntityFeature::TURN_ON));
        assert_eq!(features.bits(), 129);
        assert!(!ClimateEntityFeature::empty().contains(ClimateEntityFeature::TARGET_TEMPERATURE));
    }

    #[test]
    fn test_hvac_mode_serde() {
        assert_eq!(serde_json::to_value(HvacMode::FanOnly).unwrap(), json!("fan_only"));
        let mode: HvacMode = serde_json::from_value(json!("heat")).unwrap();
        assert_eq!(mode, HvacMode::Heat);
    }

    #[test]
    fn test_set_temperature_from_service_data() {
        let data = SetTemperature::from_service_data(&json!({"temperature": 21.5})).unwrap();
        assert_eq!(data.temperature, Some(21.5));
        assert_eq!(data.hvac_mode, None);
    }

    #[test]
    fn test_set_temperature_requires_a_temperature() {
        let err = SetTemperature::from_service_data(&json!({"hvac_mode": "heat"})).unwrap_err();
        assert!(matches!(err, EntityError::InvalidServiceData(_)));
    }

    #[test]
    fn test_set_temperature_rejects_wrong_types() {
        let err = SetTemperature::from_service_data(&json!({"temperature": "warm"})).unwrap_err();
        assert!(matches!(err, EntityError::InvalidServiceData(_)));
    }
}
