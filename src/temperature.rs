//! Temperature characteristic value (org.bluetooth.characteristic.temperature).
//!
//! Wire layout (2 bytes):
//! ```text
//! Byte 0-1: sint16, little-endian, unit 0.01 °C
//! ```
//! `0x8000` is reserved by the Environmental Sensing profile for
//! "value is not known" and is never produced from a reading.

/// Encoded value size in bytes.
pub const TEMPERATURE_VALUE_SIZE: usize = 2;

/// A temperature in hundredths of a degree Celsius.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Temperature(i16);

impl Temperature {
    /// Lowest encodable reading (0x8000 is the "unknown" marker).
    pub const MIN: Self = Self(i16::MIN + 1);
    /// Highest encodable reading.
    pub const MAX: Self = Self(i16::MAX);

    /// Build from hundredths of a degree.
    pub const fn from_centi(centi: i16) -> Self {
        if centi == i16::MIN {
            Self::MIN
        } else {
            Self(centi)
        }
    }

    /// Convert a physical reading, rounding half away from zero.
    ///
    /// Out-of-range values saturate; NaN maps to 0.
    pub fn from_celsius(celsius: f32) -> Self {
        let scaled = celsius * 100.0;
        // `f32::round` lives in std; the float→int cast truncates toward
        // zero and saturates, so bias first.
        let biased = if scaled >= 0.0 {
            scaled + 0.5
        } else {
            scaled - 0.5
        };
        Self::from_centi(biased as i16)
    }

    /// Raw value in hundredths of a degree.
    pub const fn centi(self) -> i16 {
        self.0
    }

    /// Value in degrees Celsius.
    pub fn celsius(self) -> f32 {
        f32::from(self.0) / 100.0
    }

    /// Encode for the GATT attribute store.
    pub const fn to_le_bytes(self) -> [u8; TEMPERATURE_VALUE_SIZE] {
        self.0.to_le_bytes()
    }

    /// Decode a stored attribute value.
    pub const fn from_le_bytes(bytes: [u8; TEMPERATURE_VALUE_SIZE]) -> Self {
        Self::from_centi(i16::from_le_bytes(bytes))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
