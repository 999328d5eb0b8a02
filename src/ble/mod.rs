//! Bluetooth Low Energy subsystem.
//!
//! This module drives the radio in **Peripheral** role:
//!
//! 1. **Payload builder** - encodes the device name and the advertised
//!    service list into a legacy advertising payload.
//! 2. **GATT descriptor** - the static Environmental Sensing service with
//!    its single Temperature characteristic.
//! 3. **Controller** - owns the connection set and the attribute value,
//!    reacts to radio events, re-arms advertising after a disconnect and
//!    fans readings out as notifications / indications.
//!
//! The radio itself sits behind the [`Radio`] trait; events travel the
//! other way as [`RadioEvent`] values through a channel, so the
//! controller is only ever mutated from one place.

pub mod adv_payload;
pub mod controller;
pub mod gatt;
pub mod name;
#[cfg(feature = "embedded")]
pub mod softdevice;

use crate::ble::adv_payload::AdvPayload;
use crate::ble::gatt::ServiceDescriptor;
use crate::error::BleError;

/// Link identifier assigned by the radio stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnHandle(pub u16);

/// Attribute (characteristic value) handle in the local GATT table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttrHandle(pub u16);

/// Outcome of an indication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IndicateStatus {
    /// The central confirmed reception.
    Confirmed,
    /// No confirmation within the ATT transaction timeout.
    Timeout,
}

/// Events the radio publishes for the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioEvent {
    /// A central opened a link.
    Connected(ConnHandle),
    /// A link closed (either side).
    Disconnected(ConnHandle),
    /// An indication finished.
    IndicateAck {
        conn: ConnHandle,
        attr: AttrHandle,
        status: IndicateStatus,
    },
}

/// Operations the controller needs from the radio stack.
pub trait Radio {
    /// Bring the stack up. Must precede every other call.
    fn activate(&mut self) -> Result<(), BleError>;

    /// Add `descriptor` to the attribute table; returns the value handle
    /// of its characteristic.
    fn register_service(&mut self, descriptor: &ServiceDescriptor) -> Result<AttrHandle, BleError>;

    /// Radio address in display order (most significant byte first).
    fn address(&self) -> Result<[u8; 6], BleError>;

    /// Set the GAP device name centrals read after connecting.
    fn set_device_name(&mut self, name: &str) -> Result<(), BleError>;

    /// Store `value` for later reads and pushes.
    fn write_attribute(&mut self, attr: AttrHandle, value: &[u8]) -> Result<(), BleError>;

    /// Push the stored value of `attr` to `conn`, unacknowledged.
    fn notify(&mut self, conn: ConnHandle, attr: AttrHandle) -> Result<(), BleError>;

    /// Push the stored value of `attr` to `conn`, acknowledged.
    fn indicate(&mut self, conn: ConnHandle, attr: AttrHandle) -> Result<(), BleError>;

    /// (Re)start connectable advertising with `payload`.
    fn start_advertising(&mut self, interval_ms: u32, payload: &AdvPayload) -> Result<(), BleError>;
}
