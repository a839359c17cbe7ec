//! Entities
//!
//! Contracts between integrations and the entity platforms that host their
//! devices.
//!
//! # Key Types
//!
//! - [`ClimateEntity`] - Property and command surface of a climate device
//! - [`AddEntities`] - Callback an integration uses to register entities
//! - [`EntityPlatform`] - Host-side registry that polls and renders entities

pub mod climate;
pub mod entity;
pub mod platform;

pub use climate::{
    climate_state, ClimateEntity, ClimateEntityFeature, HvacMode, SetTemperature,
    UnitOfTemperature, ATTR_TEMPERATURE,
};
pub use entity::{
    slugify, EntityError, EntityState, Platform, STATE_UNAVAILABLE, STATE_UNKNOWN,
};
pub use platform::{AddEntities, EntityPlatform, EntryEntities};
