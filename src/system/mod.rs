//! Configuration, errors, hardware traits and the application context
pub mod buggy;
pub mod command;
pub mod config;
pub mod error;
pub mod hal;
pub mod protocol;
pub mod telemetry;
