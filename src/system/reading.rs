//! Sensor Readings
//!
//! One distance and one pulse reading are produced per control tick and consumed
//! in the same tick. Nothing here is retained between ticks.

/// Distance to the nearest obstacle as reported by the ranger
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DistanceReading {
    /// Echo received; distance in centimeters, always > 0
    Centimeters(f32),
    /// No echo within the sensor timeout
    NoEcho,
}

impl DistanceReading {
    /// Wraps a converted echo distance. Zero, negative and non-finite values are
    /// what a missed or garbled echo looks like, so they become `NoEcho`.
    pub fn from_centimeters(cm: f32) -> Self {
        if cm.is_finite() && cm > 0.0 {
            Self::Centimeters(cm)
        } else {
            Self::NoEcho
        }
    }

    pub fn centimeters(self) -> Option<f32> {
        match self {
            Self::Centimeters(cm) => Some(cm),
            Self::NoEcho => None,
        }
    }

    /// Distance truncated to whole centimeters for telemetry; `NoEcho` reports 0
    pub fn whole_centimeters(self) -> i32 {
        match self {
            // `as` truncates toward zero and saturates
            Self::Centimeters(cm) => cm as i32,
            Self::NoEcho => 0,
        }
    }
}

/// ADC resolution of the pulse sensor input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdcResolution {
    /// 0-1023
    Bits10,
    /// 0-4095 (RP2350)
    Bits12,
}

impl AdcResolution {
    pub const fn max(self) -> u16 {
        match self {
            Self::Bits10 => 1023,
            Self::Bits12 => 4095,
        }
    }
}

/// Raw pulse sensor sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseReading(u16);

impl PulseReading {
    /// Clamps a raw conversion to the configured resolution
    pub fn clamped(raw: u16, resolution: AdcResolution) -> Self {
        Self(raw.min(resolution.max()))
    }

    pub const fn value(self) -> u16 {
        self.0
    }
}
