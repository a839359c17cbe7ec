//! Config Entries
//!
//! Config entries represent individual integration instances. This crate
//! drives their lifecycle (setup, retry, unload) and owns the runtime data
//! an integration builds for each loaded entry.
//!
//! # Key Types
//!
//! - [`ConfigEntry`] - A single integration configuration
//! - [`ConfigEntryState`] - Lifecycle state of an entry
//! - [`Integration`] - Setup/unload contract an integration implements
//! - [`ConfigEntries`] - Manager for one integration's entries

pub mod entry;
pub mod integration;
pub mod manager;
pub mod state_machine;

// Re-export main types
pub use entry::{ConfigEntry, ConfigEntrySource, ConfigEntryState};
pub use integration::{Integration, PlatformHost, SetupError};
pub use manager::{ConfigEntries, ConfigEntriesError, ConfigEntriesResult};
pub use state_machine::{calculate_retry_delay, InvalidTransition};
