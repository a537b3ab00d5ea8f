//! Pulse sensor
//!
//! A single raw conversion per sample: no filtering, no beat detection, no
//! calibration. The value is a heart-rate proxy amplitude, reported as-is.

use crate::device::PulseSensor;
use crate::system::reading::{AdcResolution, PulseReading};

/// One-shot analog conversion, implemented by the board's ADC channel
#[allow(async_fn_in_trait)]
pub trait AnalogSource {
    type Error;

    async fn read(&mut self) -> Result<u16, Self::Error>;
}

pub struct AnalogPulseSensor<A> {
    source: A,
    resolution: AdcResolution,
}

impl<A: AnalogSource> AnalogPulseSensor<A> {
    pub fn new(source: A, resolution: AdcResolution) -> Self {
        Self { source, resolution }
    }
}

impl<A: AnalogSource> PulseSensor for AnalogPulseSensor<A> {
    async fn sample(&mut self) -> PulseReading {
        match self.source.read().await {
            Ok(raw) => PulseReading::clamped(raw, self.resolution),
            Err(_) => {
                warn!("pulse sensor read failed, reporting 0");
                PulseReading::default()
            }
        }
    }
}
