//! Core system components for wristband operation
pub mod backoff;
pub mod config;
pub mod control;
pub mod link;
pub mod proximity;
pub mod reading;
pub mod telemetry;
