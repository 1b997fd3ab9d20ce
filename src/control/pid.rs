//! Discrete-time PID controller
//!
//! Fixed-period controller used for both the per-wheel velocity loops and the outer heading and
//! line loops.
//!
//! # Algorithm
//! ```text
//! error      = set_point - measurement
//! P          = kp * error
//! I         += 0.5 * ki * T * (error + prev_error)          (trapezoidal, then clamped)
//! D          = -(2 * kd * (meas - prev_meas) + (2 * tau - T) * D) / (2 * tau + T)
//! output     = clamp(P + I + D)
//! ```
//! - The derivative acts on the measurement, so set-point steps do not kick the output.
//! - Anti-windup clamps the integrator itself before it is summed into the output.
//! - `tau = 0` degenerates to an unfiltered differentiator.

use crate::system::config::{validate_tau, Gains, Limits, PidTuning};
use crate::system::error::ConfigError;

/// Snapshot of a controller's internal terms after the latest update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PidTerms {
    /// Time accumulated since the last reset (s)
    pub time: f32,
    pub set_point: f32,
    pub measurement: f32,
    pub error: f32,
    pub proportional: f32,
    pub integrator: f32,
    pub differentiator: f32,
    pub output: f32,
}

/// PID controller with filtered derivative, integrator clamping and output saturation
#[derive(Debug, Clone)]
pub struct Pid {
    gains: Gains,
    tau: f32,
    output_limits: Limits,
    integrator_limits: Limits,
    sample_period: f32,
    // Controller memory
    prev_error: f32,
    prev_measurement: f32,
    terms: PidTerms,
}

impl Pid {
    /// Create a controller running at a fixed `sample_period` (s)
    pub fn new(tuning: PidTuning, sample_period: f32) -> Result<Self, ConfigError> {
        if !sample_period.is_finite() || sample_period <= 0.0 {
            return Err(ConfigError::InvalidSamplePeriod);
        }
        tuning.validate()?;

        Ok(Self {
            gains: tuning.gains,
            tau: tuning.tau,
            output_limits: tuning.output,
            integrator_limits: tuning.integrator,
            sample_period,
            prev_error: 0.0,
            prev_measurement: 0.0,
            terms: PidTerms::default(),
        })
    }

    /// Run one controller step; the result is available through [`Pid::output`]
    pub fn update(&mut self, set_point: f32, measurement: f32) {
        let Gains { kp, ki, kd } = self.gains;
        let t = self.sample_period;
        let terms = &mut self.terms;

        let error = set_point - measurement;
        let proportional = kp * error;

        let integrator = self
            .integrator_limits
            .clamp(terms.integrator + 0.5 * ki * t * (error + self.prev_error));

        // Derivative on measurement, hence the leading minus sign
        let differentiator = -(2.0 * kd * (measurement - self.prev_measurement)
            + (2.0 * self.tau - t) * terms.differentiator)
            / (2.0 * self.tau + t);

        let output = self.output_limits.clamp(proportional + integrator + differentiator);

        *terms = PidTerms {
            time: terms.time + t,
            set_point,
            measurement,
            error,
            proportional,
            integrator,
            differentiator,
            output,
        };
        self.prev_error = error;
        self.prev_measurement = measurement;
    }

    /// Output of the latest update, zero after a reset
    pub fn output(&self) -> f32 {
        self.terms.output
    }

    /// Internal terms of the latest update
    pub fn terms(&self) -> PidTerms {
        self.terms
    }

    /// Current gains
    pub fn gains(&self) -> Gains {
        self.gains
    }

    /// Replace the gains, memory and limits are kept
    pub fn set_constants(&mut self, kp: f32, ki: f32, kd: f32) -> Result<(), ConfigError> {
        let gains = Gains { kp, ki, kd };
        gains.validate()?;
        self.gains = gains;
        Ok(())
    }

    /// Replace the derivative filter time constant
    pub fn set_tau(&mut self, tau: f32) -> Result<(), ConfigError> {
        validate_tau(tau)?;
        self.tau = tau;
        Ok(())
    }

    /// Clear all controller memory; gains and limits are preserved
    pub fn reset(&mut self) {
        self.prev_error = 0.0;
        self.prev_measurement = 0.0;
        self.terms = PidTerms::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::config::{HEADING_PID, MOTOR_PID};
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    const T: f32 = 0.01;

    fn tuning(kp: f32, ki: f32, kd: f32) -> PidTuning {
        PidTuning {
            gains: Gains { kp, ki, kd },
            tau: 0.02,
            output: Limits::new(-1.0, 1.0),
            integrator: Limits::new(-0.5, 0.5),
        }
    }

    #[test]
    fn proportional_only_matches_clamped_gain() {
        let mut pid = Pid::new(tuning(0.8, 0.0, 0.0), T).unwrap();
        let cases = [(0.5, 0.0), (0.0, 0.3), (4.0, 1.0), (-3.0, 0.0), (0.2, 0.2)];
        for (set_point, measurement) in cases {
            pid.update(set_point, measurement);
            let expected = (0.8 * (set_point - measurement)).clamp(-1.0, 1.0);
            assert_eq!(pid.output(), expected);
        }
    }

    #[test]
    fn output_and_integrator_stay_within_clamps() {
        let mut pid = Pid::new(tuning(3.0, 40.0, 0.5), T).unwrap();
        let mut measurement = 0.0_f32;
        for i in 0..2_000 {
            let set_point = if (i / 100) % 2 == 0 { 10.0 } else { -10.0 };
            measurement += 0.37 * ((i % 7) as f32 - 3.0);
            pid.update(set_point, measurement);
            let terms = pid.terms();
            assert!((-1.0..=1.0).contains(&terms.output));
            assert!((-0.5..=0.5).contains(&terms.integrator));
        }
    }

    #[test]
    fn integrator_follows_trapezoidal_rule() {
        let mut pid = Pid::new(
            PidTuning {
                gains: Gains { kp: 1.0, ki: 0.1, kd: 0.0 },
                tau: 1.0,
                output: Limits::new(-1000.0, 1000.0),
                integrator: Limits::new(-1000.0, 1000.0),
            },
            T,
        )
        .unwrap();
        for _ in 0..1000 {
            pid.update(1.0, 0.0);
        }
        let expected = 0.1 * 1.0 * 1000.0 * T;
        assert_relative_eq!(pid.terms().integrator, expected, max_relative = 0.01);
        assert_relative_eq!(pid.terms().time, 1000.0 * T, max_relative = 1e-3);
    }

    #[test]
    fn reset_reproduces_fresh_controller() {
        let mut used = Pid::new(MOTOR_PID, T).unwrap();
        for i in 0..50 {
            used.update(0.3, i as f32 * 0.01);
        }
        used.reset();
        let mut fresh = Pid::new(MOTOR_PID, T).unwrap();

        assert_eq!(used.terms(), PidTerms::default());
        assert_eq!(used.gains(), fresh.gains());
        for _ in 0..20 {
            used.update(0.0, 0.0);
            fresh.update(0.0, 0.0);
            assert_eq!(used.terms(), fresh.terms());
        }
        // Same memory regardless of history for a non-trivial input as well
        used.update(0.25, 0.1);
        fresh.update(0.25, 0.1);
        assert_eq!(used.output(), fresh.output());
    }

    #[test]
    fn derivative_ignores_set_point_steps() {
        let mut pid = Pid::new(tuning(0.0, 0.0, 1.0), T).unwrap();
        pid.update(0.0, 0.0);
        pid.update(5.0, 0.0);
        assert_eq!(pid.terms().differentiator, 0.0);
    }

    #[test]
    fn derivative_opposes_measurement_rise() {
        let tau = 0.02;
        let mut pid = Pid::new(tuning(0.0, 0.0, 0.1), T).unwrap();
        pid.update(0.0, 0.0);
        pid.update(0.0, 0.1);
        let expected = -(2.0 * 0.1 * 0.1) / (2.0 * tau + T);
        assert_relative_eq!(pid.terms().differentiator, expected, max_relative = 1e-5);
    }

    #[test]
    fn zero_tau_is_a_plain_difference() {
        let mut config = tuning(0.0, 0.0, 0.05);
        config.tau = 0.0;
        config.output = Limits::new(-100.0, 100.0);
        let mut pid = Pid::new(config, T).unwrap();
        pid.update(0.0, 0.0);
        pid.update(0.0, 0.02);
        // 2·kd·Δ / T with the previous D = 0
        assert_relative_eq!(pid.output(), -2.0 * 0.05 * 0.02 / T, max_relative = 1e-5);
    }

    #[test]
    fn set_constants_keeps_memory() {
        let mut pid = Pid::new(HEADING_PID, T).unwrap();
        pid.update(90.0, 0.0);
        let integrator = pid.terms().integrator;
        pid.set_constants(0.01, 0.0, 0.0).unwrap();
        assert_eq!(pid.terms().integrator, integrator);
        assert_eq!(pid.gains(), Gains { kp: 0.01, ki: 0.0, kd: 0.0 });
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert_eq!(Pid::new(MOTOR_PID, 0.0).unwrap_err(), ConfigError::InvalidSamplePeriod);
        assert_eq!(Pid::new(MOTOR_PID, -0.01).unwrap_err(), ConfigError::InvalidSamplePeriod);

        let mut pid = Pid::new(MOTOR_PID, T).unwrap();
        assert_eq!(pid.set_constants(f32::NAN, 0.0, 0.0), Err(ConfigError::NonFiniteGain));
        assert_eq!(pid.set_tau(-1.0), Err(ConfigError::InvalidTau));
        assert_eq!(pid.gains(), MOTOR_PID.gains);
    }

    #[test]
    fn saturates_at_configured_output() {
        let mut pid = Pid::new(MOTOR_PID, T).unwrap();
        for _ in 0..500 {
            pid.update(5.0, 0.0);
        }
        assert_abs_diff_eq!(pid.output(), MOTOR_PID.output.max);
        assert_abs_diff_eq!(pid.terms().integrator, MOTOR_PID.integrator.max);
    }
}
