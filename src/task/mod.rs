//! Firmware tasks
pub mod control;
pub mod link;
pub mod telemetry;
