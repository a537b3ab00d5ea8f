//! HC-SR04 ultrasonic ranger
//!
//! # Measurement
//! - Trigger pulse and echo timing come from the async `hcsr04_async` driver
//! - Distance is reported in centimeters with the speed of sound fixed at 343 m/s
//! - The whole measurement runs under the echo timeout so a silent sensor costs at
//!   most that much of the tick
//!
//! Driver errors and timeouts yield [`DistanceReading::NoEcho`].

use embassy_time::{with_timeout, Delay, Duration, Instant};
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal_async::digital::Wait;
use hcsr04_async::{Config, DistanceUnit, Now, TemperatureUnit};

use crate::device::RangeSensor;
use crate::system::reading::DistanceReading;

/// Air temperature handed to the driver. The driver uses 331.5 + 0.6·T m/s for
/// the speed of sound, which is 343 m/s (0.0343 cm/µs) at this temperature.
pub const AIR_TEMPERATURE_C: f64 = 19.17;

/// Microsecond clock backed by the embassy time driver
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Now for EmbassyClock {
    fn now_micros(&self) -> u64 {
        Instant::now().as_micros()
    }
}

pub struct Hcsr04<T, E, C = EmbassyClock>
where
    T: OutputPin,
    E: InputPin + Wait,
    C: Now,
{
    sensor: hcsr04_async::Hcsr04<T, E, C, Delay>,
    echo_timeout: Duration,
}

impl<T, E> Hcsr04<T, E>
where
    T: OutputPin,
    E: InputPin + Wait,
{
    pub fn new(trigger: T, echo: E, echo_timeout: Duration) -> Self {
        Self::with_clock(trigger, echo, EmbassyClock, echo_timeout)
    }
}

impl<T, E, C> Hcsr04<T, E, C>
where
    T: OutputPin,
    E: InputPin + Wait,
    C: Now,
{
    /// Uses `clock` to time the echo pulse
    pub fn with_clock(trigger: T, echo: E, clock: C, echo_timeout: Duration) -> Self {
        let config = Config {
            distance_unit: DistanceUnit::Centimeters,
            temperature_unit: TemperatureUnit::Celsius,
        };

        Self {
            sensor: hcsr04_async::Hcsr04::new(trigger, echo, config, clock, Delay),
            echo_timeout,
        }
    }
}

impl<T, E, C> RangeSensor for Hcsr04<T, E, C>
where
    T: OutputPin,
    E: InputPin + Wait,
    C: Now,
{
    async fn measure(&mut self) -> DistanceReading {
        match with_timeout(self.echo_timeout, self.sensor.measure(AIR_TEMPERATURE_C)).await {
            Ok(Ok(cm)) => DistanceReading::from_centimeters(cm as f32),
            Ok(Err(_)) => {
                debug!("ranger: echo missed or out of range");
                DistanceReading::NoEcho
            }
            Err(_) => {
                debug!("ranger: no echo within {} ms", self.echo_timeout.as_millis());
                DistanceReading::NoEcho
            }
        }
    }
}
