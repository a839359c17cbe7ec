// Wire and domain types for the MasterTherm servlet API.
//
// The servlets are loose about JSON types: ids and register values show up
// as strings or numbers depending on firmware, so everything textual is
// normalised to `String` on the way in.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Config file holding the live registers of a heat pump.
pub const VARFILE: &str = "varfile_mt1_config1";

/// One heat-pump controller discovered on the account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub module_id: String,
    pub device_id: String,
    pub module_name: String,
}

impl DeviceDescriptor {
    /// Stable identifier for the device, unique across the account.
    ///
    /// `{module_id}_{device_id}`, with `%` and `_` inside either id escaped
    /// so distinct pairs never share an identifier.
    pub fn unique_id(&self) -> String {
        format!(
            "{}_{}",
            escape_id(&self.module_id),
            escape_id(&self.device_id)
        )
    }
}

fn escape_id(id: &str) -> String {
    id.replace('%', "%25").replace('_', "%5F")
}

/// Modules keyed by module id, each holding its devices keyed by device id.
pub type ModuleMap = BTreeMap<String, BTreeMap<String, DeviceDescriptor>>;

/// Snapshot of a device's registers from a single data request.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceData {
    pub registers: HashMap<String, String>,
    pub fetched_at: DateTime<Utc>,
}

impl DeviceData {
    pub fn new(registers: HashMap<String, String>) -> Self {
        Self {
            registers,
            fetched_at: Utc::now(),
        }
    }

    /// Raw register value.
    pub fn get(&self, register: &str) -> Option<&str> {
        self.registers.get(register).map(String::as_str)
    }

    /// Register value parsed as a float; `None` when missing or not numeric.
    pub fn get_f64(&self, register: &str) -> Option<f64> {
        self.get(register).and_then(|v| v.trim().parse().ok())
    }
}

// ── Login ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(deserialize_with = "string_or_number")]
    pub returncode: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub role: Option<String>,
    #[serde(default)]
    pub modules: Vec<ModuleInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModuleInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub config: Vec<ModuleConfig>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ModuleConfig {
    #[serde(deserialize_with = "string_or_number")]
    pub mb_addr: String,
}

/// Flatten the login reply into the module → device map.
pub(crate) fn build_module_map(modules: &[ModuleInfo]) -> ModuleMap {
    let mut map = ModuleMap::new();
    for module in modules {
        let module_name = module
            .module_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("MasterTherm {}", module.id));

        let devices = map.entry(module.id.clone()).or_default();
        for config in &module.config {
            devices.insert(
                config.mb_addr.clone(),
                DeviceDescriptor {
                    module_id: module.id.clone(),
                    device_id: config.mb_addr.clone(),
                    module_name: module_name.clone(),
                },
            );
        }
    }
    map
}

// ── Data / write ─────────────────────────────────────────────────────

/// `errorId` reported when the servlet session is gone.
pub(crate) const ERROR_ID_TOKEN_INVALID: i64 = 9;

#[derive(Debug, Deserialize)]
pub(crate) struct ServletResponse {
    #[serde(default, rename = "errorId")]
    pub error_id: i64,
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub data: Option<HashMap<String, HashMap<String, HashMap<String, Value>>>>,
}

impl ServletResponse {
    /// Registers for `device_id`, keyed the way the servlet pads device
    /// addresses (`"1"` → `"001"`). Falls back to the only entry present.
    pub fn registers(&self, device_id: &str) -> Option<HashMap<String, String>> {
        let varfile = self.data.as_ref()?.get(VARFILE)?;
        let padded = format!("{device_id:0>3}");
        let raw = varfile
            .get(&padded)
            .or_else(|| varfile.get(device_id))
            .or_else(|| {
                if varfile.len() == 1 {
                    varfile.values().next()
                } else {
                    None
                }
            })?;

        Some(
            raw.iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect(),
        )
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_null()).map(|v| value_to_string(&v)))
}
