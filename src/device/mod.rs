//! Sensor and actuator drivers
//!
//! Each driver is generic over the `embedded-hal` / `embedded-hal-async` traits so
//! the same code runs against RP2350 peripherals on the wristband and against
//! mocks on the host.

pub mod haptic;
pub mod pulse;
pub mod range;

pub use haptic::HapticActuator;
pub use pulse::{AnalogPulseSensor, AnalogSource};
pub use range::Hcsr04;

use crate::system::reading::{DistanceReading, PulseReading};

/// Obstacle ranging, one measurement per call
#[allow(async_fn_in_trait)]
pub trait RangeSensor {
    /// Never fails: timeouts and pin errors are reported as [`DistanceReading::NoEcho`]
    async fn measure(&mut self) -> DistanceReading;
}

/// Heart-rate proxy sampling, one raw sample per call
#[allow(async_fn_in_trait)]
pub trait PulseSensor {
    async fn sample(&mut self) -> PulseReading;
}
