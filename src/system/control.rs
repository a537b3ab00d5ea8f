//! Control Loop
//!
//! The wristband's only long-running logic. Every tick, in order:
//!
//! 1. Give the telemetry link one bounded recovery step
//! 2. Hand pending inbound commands to the command handler
//! 3. Measure the obstacle distance
//! 4. Map it to an intensity and drive the vibration motor
//! 5. Sample the pulse sensor
//! 6. Publish the tick's record (dropped if the link is down)
//!
//! then sleep for the tick interval. Actuation never waits on the network: each
//! link operation gives up after the link's step budget, so even a hung access
//! point or broker leaves the tick inside its interval.

use embassy_time::{Duration, Instant, Timer};
use embedded_hal::pwm::SetDutyCycle;

use crate::device::{HapticActuator, PulseSensor, RangeSensor};
use crate::system::backoff::BackoffPolicy;
use crate::system::config::Config;
use crate::system::link::{CommandHandler, ConnectionState, Network, PublishOutcome, TelemetryLink, Transport};
use crate::system::proximity::{ActuatorIntensity, ProximityPolicy};
use crate::system::reading::{DistanceReading, PulseReading};
use crate::system::telemetry::TelemetryRecord;

/// What happened during one tick
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TickReport {
    /// Link state after this tick's recovery step
    pub state: ConnectionState,
    /// Inbound commands delivered to the handler
    pub inbound: usize,
    pub distance: DistanceReading,
    pub intensity: ActuatorIntensity,
    pub pulse: PulseReading,
    pub published: PublishOutcome,
}

pub struct ControlLoop<R, P, D, N, T, B, C> {
    range: R,
    pulse: P,
    haptic: HapticActuator<D>,
    link: TelemetryLink<N, T, B>,
    commands: C,
    policy: ProximityPolicy,
    tick_interval: Duration,
}

impl<R, P, D, N, T, B, C> ControlLoop<R, P, D, N, T, B, C>
where
    R: RangeSensor,
    P: PulseSensor,
    D: SetDutyCycle,
    N: Network,
    T: Transport,
    B: BackoffPolicy,
    C: CommandHandler,
{
    pub fn new(
        range: R,
        pulse: P,
        haptic: HapticActuator<D>,
        link: TelemetryLink<N, T, B>,
        commands: C,
        config: &Config,
    ) -> Self {
        Self {
            range,
            pulse,
            haptic,
            link,
            commands,
            policy: ProximityPolicy::new(config.proximity),
            tick_interval: config.sampling.tick_interval,
        }
    }

    /// Runs one sense, actuate, report cycle
    pub async fn tick(&mut self, now: Instant) -> TickReport {
        let state = self.link.ensure_connected(now).await;
        let inbound = self.link.dispatch_incoming(&mut self.commands).await;

        let distance = self.range.measure().await;
        let intensity = self.policy.intensity(distance);
        if self.haptic.drive(intensity).is_err() {
            warn!("haptic drive to {} failed", intensity.value());
        }

        let pulse = self.pulse.sample().await;
        let record = TelemetryRecord::new(pulse, distance);
        let published = self.link.publish(&record).await;

        TickReport {
            state,
            inbound,
            distance,
            intensity,
            pulse,
            published,
        }
    }

    /// Ticks forever
    pub async fn run(&mut self) -> ! {
        info!("control loop running, tick every {} ms", self.tick_interval.as_millis());
        loop {
            let report = self.tick(Instant::now()).await;
            trace!(
                "tick: link {}, intensity {}, pulse {}",
                report.state,
                report.intensity.value(),
                report.pulse.value()
            );
            Timer::after(self.tick_interval).await;
        }
    }

    pub fn link(&self) -> &TelemetryLink<N, T, B> {
        &self.link
    }

    pub fn haptic(&self) -> &HapticActuator<D> {
        &self.haptic
    }

    pub fn commands(&self) -> &C {
        &self.commands
    }
}
