//! Temperature sensor interface.
//!
//! A [`Sensor`] performs one complete trigger → settle → read cycle per
//! call.  The settle delay is the dominant latency of the whole firmware
//! (see `config::SHT31_SETTLE_MS`), so callers must not hold the
//! controller lock across a measurement.

pub mod sht31;

use crate::error::SensorError;
use crate::temperature::Temperature;

pub use sht31::Sht31;

/// Request/response access to a temperature transducer.
#[allow(async_fn_in_trait)]
pub trait Sensor {
    /// Trigger a measurement and return the physical value.
    async fn measure(&mut self) -> Result<Temperature, SensorError>;
}

#[cfg(feature = "embedded")]
pub use timed::Timed;

#[cfg(feature = "embedded")]
mod timed {
    use embassy_time::{with_timeout, Duration};

    use super::Sensor;
    use crate::error::SensorError;
    use crate::temperature::Temperature;

    /// Bounds every measurement of the inner sensor; expiry is reported as
    /// [`SensorError::Timeout`].
    pub struct Timed<S> {
        inner: S,
        timeout: Duration,
    }

    impl<S: Sensor> Timed<S> {
        pub fn new(inner: S, timeout: Duration) -> Self {
            Self { inner, timeout }
        }
    }

    impl<S: Sensor> Sensor for Timed<S> {
        async fn measure(&mut self) -> Result<Temperature, SensorError> {
            with_timeout(self.timeout, self.inner.measure())
                .await
                .map_err(|_| SensorError::Timeout)?
        }
    }
}
