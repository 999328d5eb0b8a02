//! Unified error type for envsense.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (with the `defmt` feature) for efficient
//! on-target logging.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The radio stack refused an operation.
    Ble(BleError),

    /// The temperature sensor could not produce a reading.
    Sensor(SensorError),

    /// The advertisement payload could not be built.
    Advertisement(AdvError),
}

/// Subset of BLE errors we propagate (keeps the enum `Copy`-friendly).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleError {
    /// GAP / GATT raw error code from the SoftDevice.
    Raw(u32),
    /// The radio has not been activated yet.
    NotActive,
    /// GATT service registration failed.
    RegisterFailed,
    /// No live link with the given connection handle.
    NotConnected,
    /// Writing the local attribute value failed.
    WriteFailed,
    /// A notification could not be queued.
    NotifyFailed,
    /// An indication could not be queued.
    IndicateFailed,
    /// Advertising could not be started.
    AdvertiseFailed,
    /// A radio background task could not be spawned.
    SpawnFailed,
}

/// Sensor acquisition failures. All of them are recoverable: the
/// sampling loop skips the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorError {
    /// I²C transaction failed (NACK, arbitration loss, ...).
    Bus,
    /// The sensor answered but the checksum did not match.
    Crc,
    /// The measurement did not complete in time.
    Timeout,
}

/// Advertisement payload construction failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvError {
    /// Flags plus the service list already exceed the legacy 31-byte limit.
    PayloadTooLarge,
}

// Convenience conversions

impl From<BleError> for Error {
    fn from(e: BleError) -> Self {
        Error::Ble(e)
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Error::Sensor(e)
    }
}

impl From<AdvError> for Error {
    fn from(e: AdvError) -> Self {
        Error::Advertisement(e)
    }
}
