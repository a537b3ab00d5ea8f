//! DeafNav wristband core
//!
//! Hardware-agnostic half of the wristband firmware: the proximity policy, the
//! ranger/pulse/haptic drivers written against `embedded-hal` traits, the telemetry
//! link state machine and the control loop that ties them together. The Pico 2 W
//! binding lives in the `deafnav-wristband` binary (feature `firmware`).

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible in every module below.
#[macro_use]
mod fmt;

/// Sensor and actuator drivers
pub mod device;
/// Control logic, configuration and telemetry
pub mod system;

#[cfg(test)]
mod testing;
