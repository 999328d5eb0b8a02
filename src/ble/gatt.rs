//! Static GATT declaration of the Environmental Sensing service.
//!
//! The descriptor is plain data; the radio adapter turns it into an
//! attribute table at registration time.

use crate::temperature::TEMPERATURE_VALUE_SIZE;

/// Bluetooth UUID as advertised / registered.
///
/// 16- and 32-bit values are SIG-assigned numbers; the stack expands
/// them onto the Bluetooth base UUID.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BleUuid {
    Uuid16(u16),
    Uuid32(u32),
    Uuid128(u128),
}

impl BleUuid {
    /// Width of the little-endian encoding in bytes.
    pub const fn width(&self) -> usize {
        match self {
            BleUuid::Uuid16(_) => 2,
            BleUuid::Uuid32(_) => 4,
            BleUuid::Uuid128(_) => 16,
        }
    }
}

/// Characteristic access flags.
///
/// Bit values are the GATT characteristic property bits, so the set can
/// be handed to a stack verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AccessFlags(u8);

impl AccessFlags {
    pub const READ: Self = Self(0x02);
    pub const NOTIFY: Self = Self(0x10);
    pub const INDICATE: Self = Self(0x20);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// One characteristic inside a service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CharacteristicDescriptor {
    pub uuid: BleUuid,
    pub flags: AccessFlags,
    /// Fixed value length in bytes.
    pub value_len: usize,
}

/// A primary service with exactly one characteristic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceDescriptor {
    pub uuid: BleUuid,
    pub characteristic: CharacteristicDescriptor,
}

/// org.bluetooth.service.environmental_sensing
pub const ENVIRONMENTAL_SENSING_UUID: BleUuid = BleUuid::Uuid16(0x181A);

/// org.bluetooth.characteristic.temperature
pub const TEMPERATURE_UUID: BleUuid = BleUuid::Uuid16(0x2A6E);

/// Environmental Sensing → Temperature {read, notify, indicate}.
pub const ENVIRONMENTAL_SENSING: ServiceDescriptor = ServiceDescriptor {
    uuid: ENVIRONMENTAL_SENSING_UUID,
    characteristic: CharacteristicDescriptor {
        uuid: TEMPERATURE_UUID,
        flags: AccessFlags::READ
            .union(AccessFlags::NOTIFY)
            .union(AccessFlags::INDICATE),
        value_len: TEMPERATURE_VALUE_SIZE,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_characteristic_is_readable_notifiable_indicatable() {
        let flags = ENVIRONMENTAL_SENSING.characteristic.flags;
        assert!(flags.contains(AccessFlags::READ));
        assert!(flags.contains(AccessFlags::NOTIFY));
        assert!(flags.contains(AccessFlags::INDICATE));
        assert_eq!(flags.bits(), 0x32);
    }

    #[test]
    fn assigned_numbers() {
        assert_eq!(ENVIRONMENTAL_SENSING.uuid, BleUuid::Uuid16(0x181A));
        assert_eq!(ENVIRONMENTAL_SENSING.characteristic.uuid, BleUuid::Uuid16(0x2A6E));
        assert_eq!(ENVIRONMENTAL_SENSING.characteristic.value_len, 2);
    }

    #[test]
    fn empty_flags_contain_nothing() {
        assert!(!AccessFlags::empty().contains(AccessFlags::READ));
        assert!(AccessFlags::READ.contains(AccessFlags::empty()));
    }
}
