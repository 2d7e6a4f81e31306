//! BLE peripheral lifecycle management on top of BlueZ.
//!
//! A [`Peripheral`] picks a capable adapter, holds it to a fixed policy
//! (alias set, powered, discoverable without timeout), registers an LE
//! advertisement and a GATT application, and keeps them registered until the
//! session is stopped. Whatever ends a session, the registrations are
//! withdrawn before [`Peripheral::run`] returns.

pub mod bus;
mod config;
mod error;
pub mod gatt;
pub mod peripheral;

pub use config::PeripheralConfig;
pub use error::*;
pub use peripheral::{bluez::BluezBus, Peripheral, State};
