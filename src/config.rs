//! Application-wide constants and compile-time configuration.
//!
//! All hardware pin assignments, timing parameters, and protocol
//! constants live here so they can be tuned in one place.

// BLE

/// Explicit advertised name. `None` derives one from the radio address.
pub const DEVICE_NAME: Option<&str> = None;

/// Prefix of the derived name: `"<prefix> AA:BB:CC:DD:EE:FF"`.
/// Kept at 4 characters so the full name fits the 31-byte legacy payload.
pub const DEVICE_NAME_PREFIX: &str = "Temp";

/// Advertising interval (ms). Converted to 0.625 ms units by the radio.
pub const ADV_INTERVAL_MS: u32 = 500;

/// Maximum simultaneous central links. Must be a power of two (it also
/// sizes the controller's connection set).
pub const MAX_CONNECTIONS: usize = 4;

/// Depth of the radio → controller event queue.
pub const EVENT_QUEUE_DEPTH: usize = 8;

// Sampling

/// Sampling loop cadence (ms).
pub const SAMPLE_TICK_MS: u64 = 1000;

/// A reading is taken on every N-th tick (tick 0 included).
pub const SAMPLE_EVERY_TICKS: u32 = 10;

// Sensor

/// SHT31 I²C address (ADDR pin low).
pub const SHT31_ADDR: u8 = 0x44;

/// Wait between triggering a single-shot measurement and reading it back (ms).
pub const SHT31_SETTLE_MS: u32 = 500;

/// Upper bound for a whole trigger + settle + read transaction (ms).
pub const SENSOR_TIMEOUT_MS: u64 = 1000;

// Supervision

/// Hardware watchdog period. The sampling task pets it once per tick.
pub const WATCHDOG_TIMEOUT_SECS: u32 = 30;

// GPIO pin assignments (nRF52840-DK defaults)
//
// These are logical names; the actual `embassy_nrf::peripherals::*` are
// picked in `main.rs`.  Adjust for your custom PCB.
//
//   I²C SDA        → P0.26
//   I²C SCL        → P0.27
