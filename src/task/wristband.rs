//! Wristband Control Task
//!
//! Builds the drivers on top of the assigned pins, wires them to the telemetry
//! link and hands everything to the control loop, which never returns.
//!
//! # Vibration PWM
//! 5kHz with `top = 29_999` at the 150MHz system clock, so the 0-255 intensity
//! maps onto a fine-grained duty cycle.

use deafnav_wristband::device::{AnalogPulseSensor, AnalogSource, Hcsr04, HapticActuator};
use deafnav_wristband::system::backoff::FixedBackoff;
use deafnav_wristband::system::config::Config;
use deafnav_wristband::system::control::ControlLoop;
use deafnav_wristband::system::link::{DiscardCommands, TelemetryLink};
use defmt::info;
use embassy_net::Stack;
use embassy_rp::adc::{self, Adc, Channel};
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::pwm::{self, Pwm};

use crate::task::broker::MqttTransport;
use crate::task::network::WifiAssociation;
use crate::task::resources::{HapticResources, Irqs, PulseResources, RangerResources};

/// PWM counter wrap for 5kHz at 150MHz
const VIBRATION_PWM_TOP: u16 = 29_999;

/// Pulse sensor input on ADC0
struct AdcPulseSource {
    adc: Adc<'static, adc::Async>,
    channel: Channel<'static>,
}

impl AnalogSource for AdcPulseSource {
    type Error = adc::Error;

    async fn read(&mut self) -> Result<u16, adc::Error> {
        self.adc.read(&mut self.channel).await
    }
}

/// Runs the sense, actuate, report loop forever
#[embassy_executor::task]
pub async fn wristband(
    ranger: RangerResources,
    haptic: HapticResources,
    pulse: PulseResources,
    stack: Stack<'static>,
    config: Config,
) {
    let trigger = Output::new(ranger.trigger_pin, Level::Low);
    let echo = Input::new(ranger.echo_pin, Pull::None);
    let range = Hcsr04::new(trigger, echo, config.sampling.echo_timeout);

    let mut pwm_config = pwm::Config::default();
    pwm_config.top = VIBRATION_PWM_TOP;
    let (vibration, _) = Pwm::new_output_a(haptic.slice, haptic.pin, pwm_config).split();
    let mut haptic = HapticActuator::new(vibration.expect("vibration PWM channel A not configured"));
    // Motor off until the first tick decides otherwise
    haptic.stop().ok();

    let source = AdcPulseSource {
        adc: Adc::new(pulse.adc, Irqs, adc::Config::default()),
        channel: Channel::new_pin(pulse.pin, Pull::None),
    };
    let pulse = AnalogPulseSensor::new(source, config.sampling.adc_resolution);

    let link = TelemetryLink::new(
        WifiAssociation::new(stack),
        MqttTransport::new(),
        FixedBackoff::new(config.link.retry_delay),
        config.broker,
        config.link,
    );

    info!(
        "wristband up: publishing to {}:{} as {}",
        config.broker.host, config.broker.port, config.broker.client_id
    );

    let mut control = ControlLoop::new(range, pulse, haptic, link, DiscardCommands, &config);
    control.run().await
}
