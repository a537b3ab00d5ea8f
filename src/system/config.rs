//! Wristband Configuration
//!
//! Everything the wristband needs to know about its surroundings, grouped per
//! collaborator and handed to each one at construction.
//!
//! # Sources
//! - Compiled-in defaults below
//! - `DEAFNAV_*` variables from the build environment or a `.env` file next to
//!   `Cargo.toml` (forwarded by `build.rs`), for credentials and broker endpoint
//!
//! Nothing here is mutable at runtime.

use embassy_time::Duration;

use crate::system::reading::AdcResolution;

/// Access point used when no `DEAFNAV_WIFI_SSID` is supplied
const DEFAULT_WIFI_SSID: &str = "YOUR_WIFI_SSID";
const DEFAULT_WIFI_PASSWORD: &str = "YOUR_WIFI_PASSWORD";

/// Public test broker, unencrypted
const DEFAULT_BROKER_HOST: &str = "broker.hivemq.com";
const DEFAULT_BROKER_PORT: u16 = 1883;

/// Brokers disconnect the older session when two devices share an identifier
const DEFAULT_CLIENT_ID: &str = "DeafNavWristband_001";

pub const TELEMETRY_TOPIC: &str = "deafnav/telemetry";
pub const COMMAND_TOPIC: &str = "deafnav/cmd";

/// MQTT keep-alive; telemetry goes out every tick so this only matters when publishing stalls
const KEEP_ALIVE_SECS: u16 = 60;

/// Time between control ticks (10 Hz)
const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Longest wait for a complete echo, rising and falling edge. 25ms covers the
/// HC-SR04's ~4m range and keeps a missed echo well inside one tick.
const ECHO_TIMEOUT: Duration = Duration::from_millis(25);

/// Delay between failed connection attempts
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// A connection attempt (association, broker connect and subscription) that has
/// not finished after this long counts as failed
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Longest a tick waits on any single link operation. Three of them plus the echo
/// timeout still fit inside one tick.
const STEP_BUDGET: Duration = Duration::from_millis(20);

/// Inbound commands handled per tick, so a chatty broker cannot starve sensing
const MAX_INBOUND_PER_TICK: usize = 4;

/// Complete wristband configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    pub network: NetworkConfig,
    pub broker: BrokerConfig,
    pub link: LinkConfig,
    pub proximity: ProximityConfig,
    pub sampling: SamplingConfig,
}

/// Access point credentials, consumed by the association collaborator
#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    pub ssid: &'static str,
    pub password: &'static str,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            ssid: option_env!("DEAFNAV_WIFI_SSID").unwrap_or(DEFAULT_WIFI_SSID),
            password: option_env!("DEAFNAV_WIFI_PASSWORD").unwrap_or(DEFAULT_WIFI_PASSWORD),
        }
    }
}

/// Broker endpoint and topics
#[derive(Debug, Clone, Copy)]
pub struct BrokerConfig {
    pub host: &'static str,
    pub port: u16,
    pub client_id: &'static str,
    pub telemetry_topic: &'static str,
    pub command_topic: &'static str,
    pub keep_alive_secs: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: option_env!("DEAFNAV_BROKER_HOST").unwrap_or(DEFAULT_BROKER_HOST),
            port: option_env!("DEAFNAV_BROKER_PORT")
                .and_then(|port| port.parse().ok())
                .unwrap_or(DEFAULT_BROKER_PORT),
            client_id: option_env!("DEAFNAV_CLIENT_ID").unwrap_or(DEFAULT_CLIENT_ID),
            telemetry_topic: TELEMETRY_TOPIC,
            command_topic: COMMAND_TOPIC,
            keep_alive_secs: KEEP_ALIVE_SECS,
        }
    }
}

/// Telemetry link timing
#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    /// Delay used by the default fixed backoff
    pub retry_delay: Duration,
    /// Deadline for a whole connection attempt, spread over as many ticks as it takes
    pub connect_timeout: Duration,
    /// Per-tick bound on each recovery step, publish and inbound pump
    pub step_budget: Duration,
    pub max_inbound_per_tick: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            retry_delay: RETRY_DELAY,
            connect_timeout: CONNECT_TIMEOUT,
            step_budget: STEP_BUDGET,
            max_inbound_per_tick: MAX_INBOUND_PER_TICK,
        }
    }
}

/// Distance-to-vibration mapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityConfig {
    /// Obstacles at or beyond this distance (cm) produce no vibration
    pub max_range_cm: f32,
    /// Intensity as the distance approaches zero
    pub near_intensity: u8,
    /// Intensity as the distance approaches `max_range_cm`
    pub far_intensity: u8,
    /// Intensity when the ranger reports no echo
    pub no_echo_intensity: u8,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        Self {
            max_range_cm: 200.0,
            near_intensity: 255,
            far_intensity: 50,
            no_echo_intensity: 0,
        }
    }
}

/// Sensor timing and resolution
#[derive(Debug, Clone, Copy)]
pub struct SamplingConfig {
    pub tick_interval: Duration,
    pub echo_timeout: Duration,
    pub adc_resolution: AdcResolution,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            tick_interval: TICK_INTERVAL,
            echo_timeout: ECHO_TIMEOUT,
            adc_resolution: AdcResolution::Bits12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_device() {
        let config = Config::default();

        assert_eq!(config.broker.telemetry_topic, "deafnav/telemetry");
        assert_eq!(config.broker.command_topic, "deafnav/cmd");
        assert_eq!(config.sampling.tick_interval, Duration::from_millis(100));
        assert_eq!(config.link.retry_delay, Duration::from_secs(5));
        assert_eq!(config.proximity.max_range_cm, 200.0);
        assert_eq!(config.proximity.no_echo_intensity, 0);
    }

    #[test]
    fn echo_timeout_fits_inside_a_tick() {
        let sampling = SamplingConfig::default();

        assert!(sampling.echo_timeout * 2 < sampling.tick_interval);
    }

    #[test]
    fn link_work_fits_inside_a_tick() {
        let config = Config::default();

        // Recovery step, inbound pump and publish, worst case each
        let link_work = config.link.step_budget * 3;
        assert!(link_work + config.sampling.echo_timeout < config.sampling.tick_interval);
        assert!(config.link.connect_timeout < config.link.retry_delay);
    }
}
