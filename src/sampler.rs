//! Periodic sampling loop.
//!
//! One tick per `SAMPLE_TICK_MS`; on every `SAMPLE_EVERY_TICKS`-th tick
//! (tick 0 included) the sensor is read and the result published with
//! `notify = true, indicate = false`.  A failed read skips that tick:
//! no retry, no update, the loop simply continues.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;

use crate::ble::controller::PeripheralController;
use crate::ble::Radio;
use crate::error::Error;
use crate::sensor::Sensor;
use crate::temperature::Temperature;

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TickOutcome {
    /// Not a sampling tick.
    Idle,
    /// A reading was stored and pushed.
    Published(Temperature),
    /// The reading (or its publication) failed; nothing was stored.
    Skipped(Error),
}

pub struct Sampler {
    tick: u64,
    every: u32,
}

impl Sampler {
    /// Sample on every `every`-th tick. `0` is treated as 1.
    pub const fn new(every: u32) -> Self {
        Self {
            tick: 0,
            every: if every == 0 { 1 } else { every },
        }
    }

    /// Ticks elapsed so far.
    pub fn ticks(&self) -> u64 {
        self.tick
    }

    /// Whether the upcoming tick takes a reading.
    pub fn is_due(&self) -> bool {
        self.tick % u64::from(self.every) == 0
    }

    /// Run one tick.
    ///
    /// The sensor is read without holding `controller`; the lock is only
    /// taken for the publication itself.
    pub async fn tick<M, S, R>(
        &mut self,
        sensor: &mut S,
        controller: &Mutex<M, PeripheralController<R>>,
    ) -> TickOutcome
    where
        M: RawMutex,
        S: Sensor,
        R: Radio,
    {
        let outcome = if self.is_due() {
            self.sample(sensor, controller).await
        } else {
            TickOutcome::Idle
        };
        self.tick += 1;
        outcome
    }

    async fn sample<M, S, R>(
        &mut self,
        sensor: &mut S,
        controller: &Mutex<M, PeripheralController<R>>,
    ) -> TickOutcome
    where
        M: RawMutex,
        S: Sensor,
        R: Radio,
    {
        let value = match sensor.measure().await {
            Ok(value) => value,
            Err(e) => {
                warn!("Sensor read failed on tick {}: {:?}", self.tick, e);
                return TickOutcome::Skipped(Error::Sensor(e));
            }
        };

        let result = controller.lock().await.update(value, true, false);
        match result {
            Ok(delivery) => {
                debug!("Published to {} centrals", delivery.notified);
                TickOutcome::Published(value)
            }
            Err(e) => {
                warn!("Attribute write failed: {:?}", e);
                TickOutcome::Skipped(Error::Ble(e))
            }
        }
    }
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new(crate::config::SAMPLE_EVERY_TICKS)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
