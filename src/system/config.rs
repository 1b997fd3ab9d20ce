//! Buggy configuration
//!
//! All tuning lives here as compile-time constants, assembled into a [`BuggyConfig`] by its
//! `Default` impl. The firmware may override individual fields before handing the config to
//! [`Buggy::new`](crate::system::buggy::Buggy::new), which validates it once at start-up.
//!
//! # Units
//! - distances in metres, speeds in m/s, angles in degrees
//! - duty cycles normalised to [-1, 1], sign = direction
//! - line sensor channels normalised to [0, 1]

use crate::control::motion::SplitPolicy;
use crate::system::error::ConfigError;

/// Control tick rate (Hz)
pub const CONTROL_RATE_HZ: u32 = 100;

/// Telemetry emission period (ms)
pub const TELEMETRY_PERIOD_MS: u32 = 1000;

/// Distance between the wheel contact points (m)
pub const WHEEL_SEPARATION_M: f32 = 0.188;
/// Wheel radius (m)
pub const WHEEL_RADIUS_M: f32 = 0.0415;
/// Encoder pulses per wheel revolution
pub const PULSES_PER_REV: u32 = 256;
/// Counter increments per encoder pulse (x4 quadrature decoding)
pub const COUNTS_PER_PULSE: u32 = 4;
/// Counter increments per encoder pulse when only the rising edges of one channel are counted
pub const SINGLE_EDGE_COUNTS_PER_PULSE: u32 = 1;

/// Speed low-pass filter, designed for the 100 Hz tick.
/// Unity DC gain: (b0 + b1) / (1 - a0) = 1
pub const SPEED_FILTER: LowPassCoefficients = LowPassCoefficients {
    a0: 0.881_765_2,
    b0: 0.059_117_4,
    b1: 0.059_117_4,
};

/// Wheel velocity loop, shared by both wheels
pub const MOTOR_PID: PidTuning = PidTuning {
    gains: Gains {
        kp: 1.0,
        ki: 2.0,
        kd: 0.0,
    },
    tau: 1.0,
    output: Limits::new(-0.5, 0.5),
    integrator: Limits::new(-0.4, 0.4),
};

/// Heading hold loop, output is a wheel speed correction (m/s)
pub const HEADING_PID: PidTuning = PidTuning {
    gains: Gains {
        kp: 0.005,
        ki: 0.005,
        kd: 0.0,
    },
    tau: 1.0,
    output: Limits::new(-0.3, 0.3),
    integrator: Limits::new(-0.25, 0.25),
};

/// Line tracking loop, output is a wheel speed correction (m/s)
pub const LINE_PID: PidTuning = PidTuning {
    gains: Gains {
        kp: 0.04,
        ki: 0.01,
        kd: 0.001,
    },
    tau: 0.05,
    output: Limits::new(-0.3, 0.3),
    integrator: Limits::new(-0.1, 0.1),
};

/// Number of IR channels on the sensor board
pub const LINE_CHANNELS: usize = 6;
/// Reads averaged per channel and tick
pub const LINE_SAMPLE_COUNT: u32 = 5;
/// Reads averaged per channel during a calibration pass
pub const LINE_CALIBRATION_SAMPLES: u32 = 100;
/// Channel weights, channel 0 is the leftmost sensor
pub const LINE_WEIGHTS: [i8; LINE_CHANNELS] = [5, 3, 1, -1, -3, -5];
/// Scale from weighted channel sum to line offset
pub const LINE_ANGLE_COEFFICIENT: f32 = 1.0;
/// Calibrated channel value above which a channel sees the line
pub const LINE_DETECTION_THRESHOLD: f32 = 0.5;

/// Forward speed while the line-follow start ramp is active (m/s)
pub const LINE_STARTUP_VELOCITY: f32 = 0.2;
/// Forward speed once the ramp has elapsed (m/s)
pub const LINE_CRUISE_VELOCITY: f32 = 0.4;
/// Ticks spent at the start-up velocity (0.5 s at 100 Hz)
pub const LINE_RAMP_DWELL_TICKS: u32 = 50;
/// Travel without seeing the line before stopping to search (m)
pub const LINE_LOSS_DISTANCE_M: f32 = 0.05;
/// Wheel speed used to pivot while searching (m/s)
pub const LINE_SEARCH_TURN_SPEED: f32 = 0.1;

/// Length of one side of the square path (m)
pub const SQUARE_LEG_DISTANCE_M: f32 = 1.0;
/// Forward speed on the straight legs of the square (m/s)
pub const SQUARE_VELOCITY: f32 = 0.3;

/// Heading target of the PID test (deg)
pub const PID_TEST_HEADING_DEG: f32 = 90.0;
/// Travel after which the PID test ends (m)
pub const PID_TEST_DISTANCE_M: f32 = 0.5;

/// Largest forward velocity accepted from a command (m/s)
pub const MAX_VELOCITY: f32 = 1.0;

/// Closed interval used for output and integrator clamps
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Limits {
    pub min: f32,
    pub max: f32,
}

impl Limits {
    /// `[min, max]`, checked by [`BuggyConfig::validate`]
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Nearest value inside the interval
    pub fn clamp(&self, value: f32) -> f32 {
        if value > self.max {
            self.max
        } else if value < self.min {
            self.min
        } else {
            value
        }
    }

    /// Whether `value` lies inside the interval, bounds included
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min < self.max
    }
}

/// Proportional, integral and derivative gains
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Gains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Gains {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kp.is_finite() && self.ki.is_finite() && self.kd.is_finite() {
            Ok(())
        } else {
            Err(ConfigError::NonFiniteGain)
        }
    }
}

/// Static tuning of one PID loop
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidTuning {
    pub gains: Gains,
    /// Derivative low-pass time constant (s)
    pub tau: f32,
    pub output: Limits,
    pub integrator: Limits,
}

impl PidTuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gains.validate()?;
        validate_tau(self.tau)?;
        if !self.output.is_valid() {
            return Err(ConfigError::InvalidOutputLimits);
        }
        // A reset integrator must already satisfy its own clamp
        if !self.integrator.is_valid() || !self.integrator.contains(0.0) {
            return Err(ConfigError::InvalidIntegratorLimits);
        }
        Ok(())
    }
}

pub(crate) fn validate_tau(tau: f32) -> Result<(), ConfigError> {
    if tau.is_finite() && tau >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidTau)
    }
}

/// One-pole IIR: `y[n] = a0·y[n-1] + b0·x[n] + b1·x[n-1]`
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LowPassCoefficients {
    pub a0: f32,
    pub b0: f32,
    pub b1: f32,
}

impl LowPassCoefficients {
    /// Ratio of filtered to raw value for a constant input
    pub fn dc_gain(&self) -> f32 {
        (self.b0 + self.b1) / (1.0 - self.a0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = self.a0.is_finite() && self.b0.is_finite() && self.b1.is_finite();
        // |a0| < 1 keeps the pole inside the unit circle
        if finite && self.a0 > -1.0 && self.a0 < 1.0 {
            Ok(())
        } else {
            Err(ConfigError::InvalidFilter)
        }
    }
}

/// Wheel and encoder geometry shared by speed estimation and odometry
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveGeometry {
    pub wheel_radius_m: f32,
    pub wheel_separation_m: f32,
    pub pulses_per_rev: u32,
    pub counts_per_pulse: u32,
}

impl DriveGeometry {
    /// Counter increments per wheel revolution
    pub fn counts_per_rev(&self) -> f32 {
        (self.counts_per_pulse * self.pulses_per_rev) as f32
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pulses_per_rev == 0 || self.counts_per_pulse == 0 {
            return Err(ConfigError::InvalidEncoderResolution);
        }
        let positive = |v: f32| v.is_finite() && v > 0.0;
        if !positive(self.wheel_radius_m) || !positive(self.wheel_separation_m) {
            return Err(ConfigError::InvalidGeometry);
        }
        Ok(())
    }
}

impl Default for DriveGeometry {
    fn default() -> Self {
        Self {
            wheel_radius_m: WHEEL_RADIUS_M,
            wheel_separation_m: WHEEL_SEPARATION_M,
            pulses_per_rev: PULSES_PER_REV,
            counts_per_pulse: COUNTS_PER_PULSE,
        }
    }
}

/// Per-channel affine calibration of the line sensor
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelCalibration {
    pub min: [f32; LINE_CHANNELS],
    pub max: [f32; LINE_CHANNELS],
}

impl ChannelCalibration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for channel in 0..LINE_CHANNELS {
            let (min, max) = (self.min[channel], self.max[channel]);
            if !(min.is_finite() && max.is_finite() && min < max) {
                return Err(ConfigError::InvalidCalibration(channel));
            }
        }
        Ok(())
    }
}

impl Default for ChannelCalibration {
    fn default() -> Self {
        Self {
            min: [0.0; LINE_CHANNELS],
            max: [1.0; LINE_CHANNELS],
        }
    }
}

/// Line sensor array processing
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineSensorConfig {
    pub sample_count: u32,
    pub calibration_samples: u32,
    pub weights: [i8; LINE_CHANNELS],
    pub angle_coefficient: f32,
    pub detection_threshold: f32,
    /// Starting calibration; ceilings stay fixed, floors are replaced by a calibration pass
    pub calibration: ChannelCalibration,
    /// Apply `calibration` from the first update instead of after a calibration pass
    pub calibrated: bool,
    pub filter: LowPassCoefficients,
}

impl LineSensorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_count == 0 || self.calibration_samples == 0 {
            return Err(ConfigError::InvalidSampleCount);
        }
        // Antisymmetric weights sum to zero, so a uniform reading yields a zero offset
        for i in 0..LINE_CHANNELS / 2 {
            let (left, right) = (self.weights[i], self.weights[LINE_CHANNELS - 1 - i]);
            if i16::from(left) != -i16::from(right) {
                return Err(ConfigError::AsymmetricLineWeights);
            }
        }
        if !self.angle_coefficient.is_finite() || !self.detection_threshold.is_finite() {
            return Err(ConfigError::InvalidCalibration(0));
        }
        self.calibration.validate()?;
        self.filter.validate()
    }
}

impl Default for LineSensorConfig {
    fn default() -> Self {
        Self {
            sample_count: LINE_SAMPLE_COUNT,
            calibration_samples: LINE_CALIBRATION_SAMPLES,
            weights: LINE_WEIGHTS,
            angle_coefficient: LINE_ANGLE_COEFFICIENT,
            detection_threshold: LINE_DETECTION_THRESHOLD,
            calibration: ChannelCalibration::default(),
            calibrated: false,
            filter: SPEED_FILTER,
        }
    }
}

/// Line following behaviour of the motion controller
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LineFollowConfig {
    pub startup_velocity: f32,
    pub cruise_velocity: f32,
    pub ramp_dwell_ticks: u32,
    pub line_loss_distance_m: f32,
    pub search_turn_speed: f32,
    pub split: SplitPolicy,
}

impl Default for LineFollowConfig {
    fn default() -> Self {
        Self {
            startup_velocity: LINE_STARTUP_VELOCITY,
            cruise_velocity: LINE_CRUISE_VELOCITY,
            ramp_dwell_ticks: LINE_RAMP_DWELL_TICKS,
            line_loss_distance_m: LINE_LOSS_DISTANCE_M,
            search_turn_speed: LINE_SEARCH_TURN_SPEED,
            split: SplitPolicy::OneSided,
        }
    }
}

/// Scripted maneuvers run by the sequencer
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ManeuverConfig {
    pub square_leg_distance_m: f32,
    pub square_velocity: f32,
    pub pid_test_heading_deg: f32,
    pub pid_test_distance_m: f32,
}

impl Default for ManeuverConfig {
    fn default() -> Self {
        Self {
            square_leg_distance_m: SQUARE_LEG_DISTANCE_M,
            square_velocity: SQUARE_VELOCITY,
            pid_test_heading_deg: PID_TEST_HEADING_DEG,
            pid_test_distance_m: PID_TEST_DISTANCE_M,
        }
    }
}

/// Complete buggy configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BuggyConfig {
    pub control_rate_hz: u32,
    pub telemetry_period_ms: u32,
    pub geometry: DriveGeometry,
    pub speed_filter: LowPassCoefficients,
    pub left_motor_pid: PidTuning,
    pub right_motor_pid: PidTuning,
    pub heading_pid: PidTuning,
    pub line_pid: PidTuning,
    pub line_sensor: LineSensorConfig,
    pub line_follow: LineFollowConfig,
    pub maneuvers: ManeuverConfig,
    pub max_velocity: f32,
}

impl BuggyConfig {
    /// Control tick period (s)
    pub fn sample_period(&self) -> f32 {
        1.0 / self.control_rate_hz as f32
    }

    /// Control tick period (µs)
    pub fn sample_period_us(&self) -> u64 {
        1_000_000 / u64::from(self.control_rate_hz)
    }

    /// Check every constant once; any error here must stop start-up
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control_rate_hz == 0 || self.telemetry_period_ms == 0 {
            return Err(ConfigError::InvalidSamplePeriod);
        }
        self.geometry.validate()?;
        self.speed_filter.validate()?;
        let loops = [
            &self.left_motor_pid,
            &self.right_motor_pid,
            &self.heading_pid,
            &self.line_pid,
        ];
        for tuning in loops {
            tuning.validate()?;
        }
        self.line_sensor.validate()?;

        let follow = &self.line_follow;
        let speeds_ok = [
            follow.startup_velocity,
            follow.cruise_velocity,
            follow.search_turn_speed,
            self.maneuvers.square_velocity,
        ]
        .iter()
        .all(|v| v.is_finite() && libm::fabsf(*v) <= self.max_velocity);
        if !self.max_velocity.is_finite() || self.max_velocity <= 0.0 || !speeds_ok {
            return Err(ConfigError::InvalidVelocity);
        }
        if !(follow.line_loss_distance_m.is_finite() && follow.line_loss_distance_m >= 0.0) {
            return Err(ConfigError::InvalidGeometry);
        }
        Ok(())
    }
}

impl Default for BuggyConfig {
    fn default() -> Self {
        Self {
            control_rate_hz: CONTROL_RATE_HZ,
            telemetry_period_ms: TELEMETRY_PERIOD_MS,
            geometry: DriveGeometry::default(),
            speed_filter: SPEED_FILTER,
            left_motor_pid: MOTOR_PID,
            right_motor_pid: MOTOR_PID,
            heading_pid: HEADING_PID,
            line_pid: LINE_PID,
            line_sensor: LineSensorConfig::default(),
            line_follow: LineFollowConfig::default(),
            maneuvers: ManeuverConfig::default(),
            max_velocity: MAX_VELOCITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(BuggyConfig::default().validate(), Ok(()));
    }

    #[test]
    fn speed_filter_has_unity_dc_gain() {
        assert_abs_diff_eq!(SPEED_FILTER.dc_gain(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn default_line_weights_sum_to_zero() {
        let sum: i32 = LINE_WEIGHTS.iter().map(|w| i32::from(*w)).sum();
        assert_eq!(sum, 0);
        let wide: [i8; LINE_CHANNELS] = [15, 9, 3, -3, -9, -15];
        assert_eq!(wide.iter().map(|w| i32::from(*w)).sum::<i32>(), 0);
    }

    #[test]
    fn zero_rate_is_fatal() {
        let config = BuggyConfig {
            control_rate_hz: 0,
            ..BuggyConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidSamplePeriod));
    }

    #[test]
    fn inverted_clamps_are_fatal() {
        let mut config = BuggyConfig::default();
        config.heading_pid.output = Limits::new(0.3, -0.3);
        assert_eq!(config.validate(), Err(ConfigError::InvalidOutputLimits));

        let mut config = BuggyConfig::default();
        config.left_motor_pid.integrator = Limits::new(0.1, 0.4);
        assert_eq!(config.validate(), Err(ConfigError::InvalidIntegratorLimits));
    }

    #[test]
    fn lopsided_line_weights_are_rejected() {
        let mut config = BuggyConfig::default();
        config.line_sensor.weights = [5, 3, 1, -1, -3, -4];
        assert_eq!(config.validate(), Err(ConfigError::AsymmetricLineWeights));
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let mut config = BuggyConfig::default();
        config.geometry.pulses_per_rev = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidEncoderResolution));
    }

    #[test]
    fn limits_clamp_both_sides() {
        let limits = Limits::new(-0.5, 0.5);
        assert_eq!(limits.clamp(0.7), 0.5);
        assert_eq!(limits.clamp(-0.9), -0.5);
        assert_eq!(limits.clamp(0.2), 0.2);
    }
}
