//! Entity Platform
//!
//! Holds the entities integrations register for one platform, renders their
//! state after every poll, and routes service calls to them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::climate::{climate_state, ClimateEntity, ClimateEntityFeature, SetTemperature};
use crate::entity::{slugify, EntityError, EntityState, Platform};

/// Callback handed to an integration's platform setup
#[async_trait]
pub trait AddEntities: Send + Sync {
    /// Register entities, optionally polling each once before it is added
    async fn async_add_entities(
        &self,
        entities: Vec<Arc<dyn ClimateEntity>>,
        update_before_add: bool,
    );
}

struct PlatformEntity {
    entity: Arc<dyn ClimateEntity>,
    config_entry_id: String,
    state: EntityState,
}

/// Entities of one platform across all config entries
pub struct EntityPlatform {
    platform: Platform,

    /// Primary index: entity_id -> entity
    entities: DashMap<String, PlatformEntity>,

    /// Index: unique_id -> entity_id
    by_unique_id: DashMap<String, String>,
}

impl EntityPlatform {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            entities: DashMap::new(),
            by_unique_id: DashMap::new(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Handle that adds entities on behalf of one config entry
    pub fn for_entry<'a>(&'a self, config_entry_id: &'a str) -> EntryEntities<'a> {
        EntryEntities {
            platform: self,
            config_entry_id,
        }
    }

    /// Register entities for a config entry, returning how many were added
    ///
    /// Entities whose unique_id is already registered are skipped. With
    /// `update_before_add`, an entity whose first update fails is not added.
    pub async fn async_add_entities(
        &self,
        config_entry_id: &str,
        entities: Vec<Arc<dyn ClimateEntity>>,
        update_before_add: bool,
    ) -> usize {
        let mut added = 0;

        for entity in entities {
            if let Some(unique_id) = entity.unique_id() {
                if self.by_unique_id.contains_key(unique_id) {
                    warn!(
                        "Platform {} does not generate unique IDs. ID {} already exists - ignoring {}",
                        self.platform,
                        unique_id,
                        entity.name().unwrap_or("entity")
                    );
                    continue;
                }
            }

            if update_before_add {
                if let Err(e) = entity.async_update().await {
                    warn!(
                        "{}: Error on device update of {}: {}",
                        self.platform,
                        entity.name().unwrap_or("entity"),
                        e
                    );
                    continue;
                }
            }

            let entity_id = self.generate_entity_id(entity.as_ref());
            let state = render(&entity_id, entity.as_ref());

            if let Some(unique_id) = entity.unique_id() {
                self.by_unique_id
                    .insert(unique_id.to_string(), entity_id.clone());
            }
            self.entities.insert(
                entity_id.clone(),
                PlatformEntity {
                    entity,
                    config_entry_id: config_entry_id.to_string(),
                    state,
                },
            );

            debug!("Added {}", entity_id);
            added += 1;
        }

        if added > 0 {
            info!("Added {} {} entities", added, self.platform);
        }
        added
    }

    /// Poll every entity that asks for it, returning how many succeeded
    ///
    /// Entities are polled concurrently. One whose update fails is rendered
    /// unavailable until its next successful poll.
    pub async fn async_update_entities(&self) -> usize {
        let polled: Vec<(String, Arc<dyn ClimateEntity>)> = self
            .entities
            .iter()
            .filter(|e| e.value().entity.should_poll())
            .map(|e| (e.key().clone(), Arc::clone(&e.value().entity)))
            .collect();

        join_all(
            polled
                .iter()
                .map(|(entity_id, entity)| self.refresh(entity_id, entity.as_ref())),
        )
        .await
        .into_iter()
        .filter(Result::is_ok)
        .count()
    }

    /// Handle a `climate.set_temperature` service call
    pub async fn async_set_temperature(
        &self,
        entity_id: &str,
        service_data: &Value,
    ) -> Result<(), EntityError> {
        let entity = self.get(entity_id)?;

        if !entity
            .supported_features()
            .contains(ClimateEntityFeature::TARGET_TEMPERATURE)
        {
            return Err(EntityError::NotSupported {
                entity_id: entity_id.to_string(),
                feature: "target temperature",
            });
        }

        let data = SetTemperature::from_service_data(service_data)?;
        entity.async_set_temperature(&data).await?;

        if entity.should_poll() {
            self.refresh(entity_id, entity.as_ref()).await
        } else {
            self.write_state(entity_id, render(entity_id, entity.as_ref()));
            Ok(())
        }
    }

    /// Remove every entity of a config entry, returning how many were removed
    pub fn async_reset_entry(&self, config_entry_id: &str) -> usize {
        let entity_ids = self.entity_ids_for_entry(config_entry_id);
        for entity_id in &entity_ids {
            if let Some((_, removed)) = self.entities.remove(entity_id) {
                if let Some(unique_id) = removed.entity.unique_id() {
                    self.by_unique_id.remove(unique_id);
                }
            }
        }
        if !entity_ids.is_empty() {
            info!(
                "Removed {} {} entities of entry {}",
                entity_ids.len(),
                self.platform,
                config_entry_id
            );
        }
        entity_ids.len()
    }

    /// Last rendered state of an entity
    pub fn state(&self, entity_id: &str) -> Option<EntityState> {
        self.entities.get(entity_id).map(|e| e.value().state.clone())
    }

    /// All rendered states, ordered by entity_id
    pub fn states(&self) -> Vec<EntityState> {
        let mut states: Vec<_> = self.entities.iter().map(|e| e.value().state.clone()).collect();
        states.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        states
    }

    /// Entity ID registered for a unique_id
    pub fn entity_id_for_unique_id(&self, unique_id: &str) -> Option<String> {
        self.by_unique_id.get(unique_id).map(|r| r.value().clone())
    }

    pub fn entity_ids_for_entry(&self, config_entry_id: &str) -> Vec<String> {
        let mut ids: Vec<_> = self
            .entities
            .iter()
            .filter(|e| e.value().config_entry_id == config_entry_id)
            .map(|e| e.key().clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn get(&self, entity_id: &str) -> Result<Arc<dyn ClimateEntity>, EntityError> {
        self.entities
            .get(entity_id)
            .map(|e| Arc::clone(&e.value().entity))
            .ok_or_else(|| EntityError::NotFound(entity_id.to_string()))
    }

    async fn refresh(&self, entity_id: &str, entity: &dyn ClimateEntity) -> Result<(), EntityError> {
        match entity.async_update().await {
            Ok(()) => {
                self.write_state(entity_id, render(entity_id, entity));
                Ok(())
            }
            Err(e) => {
                warn!("Update of {} failed: {}", entity_id, e);
                if let Some(mut current) = self.entities.get_mut(entity_id) {
                    current.state = current.state.unavailable();
                }
                Err(e)
            }
        }
    }

    fn write_state(&self, entity_id: &str, state: EntityState) {
        if let Some(mut current) = self.entities.get_mut(entity_id) {
            current.state = state;
        }
    }

    /// `<platform>.<slug of name>`, suffixed `_2`, `_3`... on collision
    fn generate_entity_id(&self, entity: &dyn ClimateEntity) -> String {
        let mut object_id = entity.name().map(slugify).unwrap_or_default();
        if object_id.is_empty() {
            object_id = entity
                .unique_id()
                .map(slugify)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| self.platform.as_str().to_string());
        }

        let base = format!("{}.{}", self.platform, object_id);
        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.entities.contains_key(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        candidate
    }
}

/// [`AddEntities`] bound to one config entry
pub struct EntryEntities<'a> {
    platform: &'a EntityPlatform,
    config_entry_id: &'a str,
}

#[async_trait]
impl AddEntities for EntryEntities<'_> {
    async fn async_add_entities(
        &self,
        entities: Vec<Arc<dyn ClimateEntity>>,
        update_before_add: bool,
    ) {
        self.platform
            .async_add_entities(self.config_entry_id, entities, update_before_add)
            .await;
    }
}

fn render(entity_id: &str, entity: &dyn ClimateEntity) -> EntityState {
    let (state, attributes): (String, HashMap<String, Value>) = climate_state(entity);
    EntityState::new(entity_id, state, attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::climate::{HvacMode, UnitOfTemperature};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Minimal climate entity with scripted update results
    struct MockClimate {
        name: String,
        unique_id: String,
        fail_updates: AtomicBool,
        updates: AtomicUsize,
        target: Mutex<Option<f64>>,
    }

    impl MockClimate {
        fn new(name: &str, unique_id: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                unique_id: unique_id.to_string(),
                fail_updates: AtomicBool::new(false),
                updates: AtomicUsize::new(0),
                target: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl ClimateEntity for MockClimate {
        fn name(&self) -> Option<&str> {
            Some(&self.name)
        }
        fn unique_id(&self) -> Option<&str> {
            Some(&self.unique_id)
        }
        fn hvac_modes(&self) -> &[HvacMode] {
            &[HvacMode::Heat, HvacMode::Off]
        }
        fn supported_features(&self) -> ClimateEntityFeature {
            ClimateEntityFeature::TARGET_TEMPERATURE
        }
        fn temperature_unit(&self) -> UnitOfTemperature {
            UnitOfTemperature::Celsius
        }
        fn current_temperature(&self) -> Option<f64> {
            Some(20.0)
        }
        fn target_temperature(&self) -> Option<f64> {
            *self.target.lock().unwrap()
        }
        fn hvac_mode(&self) -> Option<HvacMode> {
            Some(HvacMode::Heat)
        }
        async fn async_update(&self) -> Result<(), EntityError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            if self.fail_updates.load(Ordering::SeqCst) {
                return Err(EntityError::integration(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "cloud timeout",
                )));
            }
            Ok(())
        }
        async fn async_set_temperature(&self, data: &SetTemperature) -> Result<(), EntityError> {
            *self.target.lock().unwrap() = data.temperature;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_add_entities_renders_state() {
        let platform = EntityPlatform::new(Platform::Climate);
        let entity = MockClimate::new("Heat Pump", "5_12");

        let added = platform
            .async_add_entities("entry1", vec![entity.clone() as Arc<dyn ClimateEntity>], true)
            .await;

        assert_eq!(added, 1);
        assert_eq!(entity.updates.load(Ordering::SeqCst), 1);

        let state = platform.state("climate.heat_pump").unwrap();
        assert_eq!(state.state, "heat");
        assert_eq!(state.attributes["friendly_name"], json!("Heat Pump"));
        assert_eq!(state.attributes["current_temperature"], json!(20.0));
        assert_eq!(state.attributes["hvac_modes"], json!(["heat", "off"]));
        assert_eq!(
            platform.entity_id_for_unique_id("5_12").as_deref(),
            Some("climate.heat_pump")
        );
    }

    #[tokio::test]
    async fn test_duplicate_unique_id_is_ignored() {
        let platform = EntityPlatform::new(Platform::Climate);
        let added = platform
            .async_add_entities(
                "entry1",
                vec![
                    MockClimate::new("Heat Pump", "5_12") as Arc<dyn ClimateEntity>,
                    MockClimate::new("Heat Pump Again", "5_12") as Arc<dyn ClimateEntity>,
                ],
                false,
            )
            .await;

        assert_eq!(added, 1);
        assert_eq!(platform.len(), 1);
    }

    #[tokio::test]
    async fn test_same_name_gets_suffix() {
        let platform = EntityPlatform::new(Platform::Climate);
        platform
            .async_add_entities(
                "entry1",
                vec![
                    MockClimate::new("Heat Pump", "5_12") as Arc<dyn ClimateEntity>,
                    MockClimate::new("Heat Pump", "5_13") as Arc<dyn ClimateEntity>,
                ],
                false,
            )
            .await;

        assert_eq!(
            platform.entity_ids_for_entry("entry1"),
            vec!["climate.heat_pump", "climate.heat_pump_2"]
        );
    }

    #[tokio::test]
    async fn test_failed_first_update_skips_entity() {
        let platform = EntityPlatform::new(Platform::Climate);
        let entity = MockClimate::new("Heat Pump", "5_12");
        entity.fail_updates.store(true, Ordering::SeqCst);

        let added = platform.async_add_entities("entry1", vec![entity as Arc<dyn ClimateEntity>], true).await;

        assert_eq!(added, 0);
        assert!(platform.is_empty());
    }

    #[tokio::test]
    async fn test_failed_poll_marks_unavailable() {
        let platform = EntityPlatform::new(Platform::Climate);
        let entity = MockClimate::new("Heat Pump", "5_12");
        platform
            .async_add_entities("entry1", vec![entity.clone() as Arc<dyn ClimateEntity>], false)
            .await;

        entity.fail_updates.store(true, Ordering::SeqCst);
        assert_eq!(platform.async_update_entities().await, 0);
        assert!(platform.state("climate.heat_pump").unwrap().is_unavailable());

        entity.fail_updates.store(false, Ordering::SeqCst);
        assert_eq!(platform.async_update_entities().await, 1);
        assert_eq!(platform.state("climate.heat_pump").unwrap().state, "heat");
    }

    #[tokio::test]
    async fn test_set_temperature_refreshes_state() {
        let platform = EntityPlatform::new(Platform::Climate);
        let entity = MockClimate::new("Heat Pump", "5_12");
        platform
            .async_add_entities("entry1", vec![entity.clone() as Arc<dyn ClimateEntity>], false)
            .await;

        platform
            .async_set_temperature("climate.heat_pump", &json!({"temperature": 22.5}))
            .await
            .unwrap();

        assert_eq!(*entity.target.lock().unwrap(), Some(22.5));
        let state = platform.state("climate.heat_pump").unwrap();
        assert_eq!(state.attributes["temperature"], json!(22.5));
    }

    #[tokio::test]
    async fn test_set_temperature_unknown_entity() {
        let platform = EntityPlatform::new(Platform::Climate);
        let err = platform
            .async_set_temperature("climate.nope", &json!({"temperature": 20}))
            .await
            .unwrap_err();
        assert!(matches!(err, EntityError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reset_entry_removes_only_its_entities() {
        let platform = EntityPlatform::new(Platform::Climate);
        platform
            .for_entry("entry1")
            .async_add_entities(vec![MockClimate::new("Heat Pump", "5_12") as Arc<dyn ClimateEntity>], false)
            .await;
        platform
            .for_entry("entry2")
            .async_add_entities(vec![MockClimate::new("Garage", "6_1") as Arc<dyn ClimateEntity>], false)
            .await;

        assert_eq!(platform.async_reset_entry("entry1"), 1);
        assert_eq!(platform.len(), 1);
        assert!(platform.entity_id_for_unique_id("5_12").is_none());
        assert!(platform.state("climate.garage").is_some());
    }
}
