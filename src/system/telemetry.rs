//! Telemetry Records
//!
//! One record per tick, published on the telemetry topic as
//! `{"heartRate": <int>, "distance": <int>}`. Consumers parse this exact layout,
//! so the key order and spacing are fixed; there is no version field.

use core::fmt::{self, Write};

use heapless::String;

use crate::system::reading::{DistanceReading, PulseReading};

/// Encoded size limit. The longest record (`u16` pulse, `i32` distance) is 47 bytes.
pub const RECORD_CAPACITY: usize = 64;

/// Status record for one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryRecord {
    pub heart_rate: u16,
    /// Whole centimeters, 0 when no echo was received
    pub distance: i32,
}

impl TelemetryRecord {
    pub fn new(pulse: PulseReading, distance: DistanceReading) -> Self {
        Self {
            heart_rate: pulse.value(),
            distance: distance.whole_centimeters(),
        }
    }

    /// Text payload for one publish
    pub fn encode(&self) -> Result<String<RECORD_CAPACITY>, fmt::Error> {
        let mut payload = String::new();
        write!(payload, "{self}")?;
        Ok(payload)
    }
}

impl fmt::Display for TelemetryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{\"heartRate\": {}, \"distance\": {}}}",
            self.heart_rate, self.distance
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::reading::AdcResolution;

    #[test]
    fn encodes_fixed_layout() {
        let record = TelemetryRecord {
            heart_rate: 512,
            distance: 75,
        };

        assert_eq!(record.encode().unwrap().as_str(), r#"{"heartRate": 512, "distance": 75}"#);
    }

    #[test]
    fn builds_from_readings() {
        let record = TelemetryRecord::new(
            PulseReading::clamped(812, AdcResolution::Bits12),
            DistanceReading::Centimeters(123.8),
        );

        assert_eq!(record, TelemetryRecord { heart_rate: 812, distance: 123 });
    }

    #[test]
    fn no_echo_reports_zero_distance() {
        let record = TelemetryRecord::new(PulseReading::default(), DistanceReading::NoEcho);

        assert_eq!(record.encode().unwrap().as_str(), r#"{"heartRate": 0, "distance": 0}"#);
    }

    #[test]
    fn widest_record_fits() {
        let record = TelemetryRecord {
            heart_rate: u16::MAX,
            distance: i32::MIN,
        };

        let payload = record.encode().unwrap();
        assert!(payload.len() <= RECORD_CAPACITY);
        assert!(payload.starts_with(r#"{"heartRate": 65535, "distance": -2147483648"#));
    }
}
