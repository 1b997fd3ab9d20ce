//! Buggy motion control core
//!
//! Closed-loop control for a two-wheeled line-following buggy: wheel speed estimation from
//! encoder counts, line position from a six-channel IR array, odometry from absolute tick
//! counts and a cascaded PID structure that turns velocity/heading or line set-points into two
//! signed motor duty commands.
//!
//! The crate is `no_std`. Hardware is reached only through the traits in [`system::hal`], so the
//! whole pipeline runs on the host in tests and on the RP2350 in the `buggy` firmware binary
//! (feature `rp`).

#![cfg_attr(not(test), no_std)]

// Must stay first so the logging macros are visible to every module below
mod fmt;

/// Estimators, controllers and the maneuver sequencer
pub mod control;
/// Configuration, errors, hardware traits and the application context
pub mod system;
