//! Vibration motor driver
//!
//! Drives the motor's PWM channel at `intensity / 255` of full scale. The channel
//! is only written when the intensity changes, so driving the same value every
//! tick costs nothing.

use embedded_hal::pwm::SetDutyCycle;

use crate::system::proximity::ActuatorIntensity;

pub struct HapticActuator<D> {
    pwm: D,
    current: Option<ActuatorIntensity>,
}

impl<D: SetDutyCycle> HapticActuator<D> {
    /// Takes over the channel without touching its duty cycle
    pub fn new(pwm: D) -> Self {
        Self { pwm, current: None }
    }

    /// Sets the vibration strength. On error the last good intensity is kept.
    pub fn drive(&mut self, intensity: ActuatorIntensity) -> Result<(), D::Error> {
        if self.current == Some(intensity) {
            return Ok(());
        }
        self.pwm
            .set_duty_cycle_fraction(u16::from(intensity.value()), u16::from(u8::MAX))?;
        self.current = Some(intensity);
        Ok(())
    }

    /// Last intensity successfully driven, `OFF` before the first drive
    pub fn current(&self) -> ActuatorIntensity {
        self.current.unwrap_or(ActuatorIntensity::OFF)
    }

    pub fn stop(&mut self) -> Result<(), D::Error> {
        self.drive(ActuatorIntensity::OFF)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPwm, MOCK_PWM_MAX_DUTY};
    use std::cell::Cell;

    #[test]
    fn duty_scales_with_intensity() {
        let (duty, writes) = (Cell::new(0), Cell::new(0));
        let mut haptic = HapticActuator::new(MockPwm {
            duty: &duty,
            writes: &writes,
            fail: false,
        });

        haptic.drive(ActuatorIntensity::new(204)).unwrap();
        assert_eq!(duty.get(), 800);

        haptic.drive(ActuatorIntensity::MAX).unwrap();
        assert_eq!(duty.get(), MOCK_PWM_MAX_DUTY);

        haptic.stop().unwrap();
        assert_eq!(duty.get(), 0);
        assert_eq!(haptic.current(), ActuatorIntensity::OFF);
    }

    #[test]
    fn repeated_intensity_is_written_once() {
        let (duty, writes) = (Cell::new(0), Cell::new(0));
        let mut haptic = HapticActuator::new(MockPwm {
            duty: &duty,
            writes: &writes,
            fail: false,
        });

        for _ in 0..5 {
            haptic.drive(ActuatorIntensity::new(120)).unwrap();
        }

        assert_eq!(writes.get(), 1);
        assert_eq!(haptic.current().value(), 120);
    }

    #[test]
    fn failed_write_keeps_last_intensity() {
        let (duty, writes) = (Cell::new(0), Cell::new(0));
        let mut haptic = HapticActuator::new(MockPwm {
            duty: &duty,
            writes: &writes,
            fail: true,
        });

        assert!(haptic.drive(ActuatorIntensity::MAX).is_err());
        assert_eq!(haptic.current(), ActuatorIntensity::OFF);
        assert_eq!(writes.get(), 0);
    }
}
