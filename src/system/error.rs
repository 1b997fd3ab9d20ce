//! Error types
//!
//! Configuration errors are fatal at start-up: a buggy with an inverted clamp or a zero sample
//! period would otherwise divide by zero inside the frequency and derivative-filter formulas.
//! Command and protocol errors are recovered locally by rejecting the request.

use thiserror::Error;

/// Invalid configuration constant
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("sample period must be finite and positive")]
    InvalidSamplePeriod,
    #[error("gains must be finite")]
    NonFiniteGain,
    #[error("derivative filter time constant must be finite and non-negative")]
    InvalidTau,
    #[error("output limits are inverted or not finite")]
    InvalidOutputLimits,
    #[error("integrator limits are inverted, not finite or exclude zero")]
    InvalidIntegratorLimits,
    #[error("pulses per revolution and counts per pulse must be non-zero")]
    InvalidEncoderResolution,
    #[error("wheel radius and separation must be finite and positive")]
    InvalidGeometry,
    #[error("low-pass filter coefficients must be finite with a0 in (-1, 1)")]
    InvalidFilter,
    #[error("line sensor sample counts must be non-zero")]
    InvalidSampleCount,
    #[error("line sensor weights must be antisymmetric about the array centre")]
    AsymmetricLineWeights,
    #[error("calibration ceiling must lie above the floor for channel {0}")]
    InvalidCalibration(usize),
    #[error("velocity limits are inconsistent")]
    InvalidVelocity,
}

/// Rejected command, the controller state is left untouched
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    #[error("value is not a finite number")]
    NotFinite,
    #[error("duty cycle outside [-1, 1]")]
    DutyOutOfRange,
    #[error("velocity exceeds the configured maximum")]
    VelocityOutOfRange,
    #[error("gains rejected: {0}")]
    Gains(ConfigError),
    #[error("line sensor calibration failed: {0}")]
    Calibration(CalibrationError),
}

/// Failed line sensor calibration pass
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CalibrationError {
    #[error("measured floor of channel {channel} is not below its ceiling")]
    DegenerateSpan { channel: usize },
}

/// Frame that could not be turned into a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,
    #[error("frame does not fit the receive buffer")]
    Overflow,
    #[error("unknown command")]
    UnknownCommand,
    #[error("unknown target")]
    UnknownTarget,
    #[error("missing or malformed argument")]
    BadArgument,
}

impl From<CalibrationError> for CommandError {
    fn from(err: CalibrationError) -> Self {
        CommandError::Calibration(err)
    }
}
