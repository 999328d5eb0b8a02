//! envsense - BLE Environmental Sensing peripheral.
//!
//! Everything except the SoftDevice backend and the timeout wrapper is
//! portable and tested on the host:
//!
//! Usage: `cargo test --lib` (unit) or `cargo test` (unit + integration)
//!
//! The embedded binary (`src/main.rs`, feature `embedded`) wires these
//! modules to the nRF52840 radio, TWIM bus and watchdog.

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod ble;
pub mod config;
pub mod error;
pub mod sampler;
pub mod sensor;
pub mod temperature;

pub use error::{AdvError, BleError, Error, SensorError};
pub use temperature::Temperature;
