//! Sensirion SHT31 driver (single-shot mode).
//!
//! Transaction:
//! ```text
//! write  [0x24, 0x00]          high repeatability, no clock stretching
//! wait   SHT31_SETTLE_MS
//! read   [T_msb, T_lsb, T_crc, RH_msb, RH_lsb, RH_crc]
//! ```
//! Only the temperature word is used; its CRC is checked.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::config::SHT31_SETTLE_MS;
use crate::error::SensorError;
use crate::sensor::Sensor;
use crate::temperature::Temperature;

/// Single-shot, high repeatability, clock stretching disabled.
const CMD_MEASURE_HIGH_REP: [u8; 2] = [0x24, 0x00];

/// Measurement frame length.
const FRAME_LEN: usize = 6;

pub struct Sht31<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C: I2c, D: DelayNs> Sht31<I2C, D> {
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
        }
    }

    /// Give the bus back.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    /// One measurement cycle, returning the raw 16-bit temperature word.
    pub async fn read_raw(&mut self) -> Result<u16, SensorError> {
        self.i2c
            .write(self.address, &CMD_MEASURE_HIGH_REP)
            .await
            .map_err(|_| SensorError::Bus)?;

        self.delay.delay_ms(SHT31_SETTLE_MS).await;

        let mut frame = [0u8; FRAME_LEN];
        self.i2c
            .read(self.address, &mut frame)
            .await
            .map_err(|_| SensorError::Bus)?;

        if crc8(&frame[0..2]) != frame[2] {
            return Err(SensorError::Crc);
        }
        Ok(u16::from_be_bytes([frame[0], frame[1]]))
    }
}

impl<I2C: I2c, D: DelayNs> Sensor for Sht31<I2C, D> {
    async fn measure(&mut self) -> Result<Temperature, SensorError> {
        let raw = self.read_raw().await?;
        Ok(Temperature::from_celsius(raw_to_celsius(raw)))
    }
}

/// Datasheet conversion: T = -45 + 175 * raw / (2^16 - 1).
pub fn raw_to_celsius(raw: u16) -> f32 {
    -45.0 + 175.0 * f32::from(raw) / 65535.0
}

/// CRC-8, polynomial 0x31, init 0xFF, no reflection, no final XOR.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0xFF;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ 0x31
            } else {
                crc << 1
            };
        }
    }
    crc
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
