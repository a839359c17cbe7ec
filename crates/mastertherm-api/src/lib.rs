//! Async client for the MasterTherm heat-pump cloud.
//!
//! - [`Auth`] logs in, keeps the servlet session alive and lists the
//!   modules and devices on the account.
//! - [`Thermostat`] reads and writes the registers of one device.
//! - [`Error`] is the closed set of failures both can report.

pub mod auth;
pub mod error;
pub mod models;
pub mod registers;
pub mod thermostat;
pub mod transport;

pub use auth::{Auth, DEFAULT_BASE_URL, SUPPORTED_ROLES, TOKEN_LIFETIME};
pub use error::{Error, Result};
pub use models::{DeviceData, DeviceDescriptor, ModuleMap};
pub use thermostat::Thermostat;
pub use transport::TransportConfig;
