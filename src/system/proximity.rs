//! Proximity Policy
//!
//! Maps the tick's distance reading to a vibration intensity: the closer the
//! obstacle, the stronger the vibration.
//!
//! # Mapping
//! ```text
//! distance <= 0 or >= max_range   -> 0 (nothing in range / invalid reading)
//! 0 < distance < max_range        -> near - (distance / max_range) * (near - far)
//! ```
//! With the defaults (200cm, 255 -> 50) an obstacle at 50cm gives 204.
//!
//! The result depends only on the current reading; there is no smoothing or
//! hysteresis between ticks.

use crate::system::config::ProximityConfig;
use crate::system::reading::DistanceReading;

/// Actuator duty cycle, 0 (off) to 255 (full)
///
/// Out-of-range values cannot be represented: anything wider saturates on the
/// way in, so the actuator never has to reject a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ActuatorIntensity(u8);

impl ActuatorIntensity {
    pub const OFF: Self = Self(0);
    pub const MAX: Self = Self(u8::MAX);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Clamps `value` into [0, 255]
    pub fn saturating_from(value: i32) -> Self {
        Self(value.clamp(0, i32::from(u8::MAX)) as u8)
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

/// Distance-to-intensity policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityPolicy {
    config: ProximityConfig,
}

impl Default for ProximityPolicy {
    fn default() -> Self {
        Self::new(ProximityConfig::default())
    }
}

impl ProximityPolicy {
    pub const fn new(config: ProximityConfig) -> Self {
        Self { config }
    }

    /// Intensity for a reading. `NoEcho` gets the configured no-echo intensity
    /// (0 by default, i.e. the same as "nothing in range").
    pub fn intensity(&self, reading: DistanceReading) -> ActuatorIntensity {
        match reading {
            DistanceReading::Centimeters(cm) => self.intensity_for(cm),
            DistanceReading::NoEcho => ActuatorIntensity::new(self.config.no_echo_intensity),
        }
    }

    /// Intensity for a raw distance in centimeters
    ///
    /// The fractional distance is kept and the result is rounded to the nearest
    /// step, so a reading just short of `max_range_cm` lands on `far_intensity`
    /// rather than a step or two above it. Truncating the distance and dividing
    /// in integers instead would give 52 at 199.9cm; this gives 50.
    pub fn intensity_for(&self, distance_cm: f32) -> ActuatorIntensity {
        let range = self.config.max_range_cm;
        // Also rejects NaN
        if !(distance_cm > 0.0 && distance_cm < range) {
            return ActuatorIntensity::OFF;
        }

        let near = f32::from(self.config.near_intensity);
        let far = f32::from(self.config.far_intensity);
        let intensity = near - (distance_cm / range) * (near - far);

        ActuatorIntensity::saturating_from(libm::roundf(intensity) as i32)
    }
}

/// Intensity for `distance_cm` under the default policy
pub fn intensity_for(distance_cm: f32) -> ActuatorIntensity {
    ProximityPolicy::default().intensity_for(distance_cm)
}
