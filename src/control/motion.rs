//! Cascaded motion control
//!
//! The controller owns the four PID loops and decides, per mode, which outer loop produces the
//! differential correction `c` fed to the two inner wheel-speed loops.
//!
//! # Modes
//! - `Inactive`: both duties zero, no loop is updated
//! - `HeadingHold`: heading loop against odometry, symmetric split
//! - `LineFollow`: line loop against the filtered offset (target 0), ramped forward speed,
//!   configurable split
//! - `LineSearch`: entered when the line is lost, pivots on the spot toward the side it was last
//!   seen and returns to `LineFollow` once any channel sees it again
//! - `OpenLoop`: externally set duties are forwarded unchanged
//!
//! # Split policies
//! ```text
//! Symmetric:  left = v + c            right = v - c
//! OneSided:   c > 0: left = v         right = v - 2|c|
//!             c < 0: left = v - 2|c|  right = v
//! ```
//!
//! Every mode change resets all four loops and installs the new mode's set-points in the same
//! call, so no integrator energy crosses from one maneuver into the next.

use crate::control::pid::{Pid, PidTerms};
use crate::system::config::{BuggyConfig, Gains, LineFollowConfig};
use crate::system::error::ConfigError;
use crate::system::hal::Motor;

/// Control policy currently applied by the tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BuggyMode {
    #[default]
    Inactive,
    HeadingHold,
    LineFollow,
    LineSearch,
    OpenLoop,
}

/// How the outer correction is shared between the wheels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SplitPolicy {
    Symmetric,
    OneSided,
}

/// PID loop addressed by a gain update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PidLoop {
    Heading,
    Line,
    /// Both wheel velocity loops
    Motors,
}

/// Signed duties for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MotionCommand {
    pub left_duty: f32,
    pub right_duty: f32,
}

/// Estimator outputs consumed by one controller update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlInputs {
    pub left_speed: f32,
    pub right_speed: f32,
    pub heading_deg: f32,
    pub distance_m: f32,
    /// Filtered line offset
    pub line_offset: f32,
    pub line_detected: bool,
}

/// Terms of all four loops after the latest update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerTerms {
    pub heading: PidTerms,
    pub line: PidTerms,
    pub left: PidTerms,
    pub right: PidTerms,
}

/// Line tracking bookkeeping, cleared on every mode change
#[derive(Debug, Clone, Copy, Default)]
struct LineTracking {
    ticks: u32,
    /// Distance at which a channel last saw the line
    last_seen_m: Option<f32>,
    /// Sign of the filtered offset when the line was last seen, positive = left
    last_side: f32,
}

#[derive(Debug)]
pub struct MotionController {
    mode: BuggyMode,
    velocity: f32,
    heading_target: f32,
    open_loop: MotionCommand,
    follow: LineFollowConfig,
    tracking: LineTracking,
    heading_pid: Pid,
    line_pid: Pid,
    left_pid: Pid,
    right_pid: Pid,
    command: MotionCommand,
}

impl MotionController {
    /// Controller in `Inactive` with all four loops built from `config`
    pub fn new(config: &BuggyConfig) -> Result<Self, ConfigError> {
        let period = config.sample_period();
        Ok(Self {
            mode: BuggyMode::Inactive,
            velocity: 0.0,
            heading_target: 0.0,
            open_loop: MotionCommand::default(),
            follow: config.line_follow,
            tracking: LineTracking::default(),
            heading_pid: Pid::new(config.heading_pid, period)?,
            line_pid: Pid::new(config.line_pid, period)?,
            left_pid: Pid::new(config.left_motor_pid, period)?,
            right_pid: Pid::new(config.right_motor_pid, period)?,
            command: MotionCommand::default(),
        })
    }

    /// Enter `mode`, resetting every loop and installing the mode's set-points
    ///
    /// Re-entering the current mode restarts it.
    pub fn set_mode(&mut self, mode: BuggyMode) {
        if mode != self.mode {
            info!("mode {:?} -> {:?}", self.mode, mode);
        }
        self.mode = mode;
        self.reset_loops();
        self.tracking = LineTracking::default();
        self.heading_target = 0.0;
        self.open_loop = MotionCommand::default();
        self.velocity = match mode {
            BuggyMode::LineFollow => self.follow.startup_velocity,
            _ => 0.0,
        };
        if mode == BuggyMode::Inactive {
            self.command = MotionCommand::default();
        }
    }

    /// Forward velocity set-point (m/s)
    pub fn set_velocity(&mut self, velocity: f32) {
        self.velocity = velocity;
    }

    /// Heading set-point (deg) for heading hold
    pub fn set_heading(&mut self, heading_deg: f32) {
        self.heading_target = heading_deg;
    }

    /// Duty forwarded in open-loop mode
    pub fn set_open_loop_duty(&mut self, motor: Motor, duty: f32) {
        match motor {
            Motor::Left => self.open_loop.left_duty = duty,
            Motor::Right => self.open_loop.right_duty = duty,
        }
    }

    /// Replace the gains of one loop; memory and limits are kept
    pub fn set_gains(&mut self, target: PidLoop, gains: Gains) -> Result<(), ConfigError> {
        gains.validate()?;
        let Gains { kp, ki, kd } = gains;
        match target {
            PidLoop::Heading => self.heading_pid.set_constants(kp, ki, kd),
            PidLoop::Line => self.line_pid.set_constants(kp, ki, kd),
            PidLoop::Motors => {
                self.left_pid.set_constants(kp, ki, kd)?;
                self.right_pid.set_constants(kp, ki, kd)
            }
        }
    }

    /// Run one control step and return the duties to write
    pub fn update(&mut self, inputs: &ControlInputs) -> MotionCommand {
        self.command = match self.mode {
            BuggyMode::Inactive => MotionCommand::default(),
            BuggyMode::OpenLoop => self.open_loop,
            BuggyMode::HeadingHold => {
                self.heading_pid.update(self.heading_target, inputs.heading_deg);
                let correction = self.heading_pid.output();
                let (left, right) = split(SplitPolicy::Symmetric, self.velocity, correction);
                self.drive_wheels(left, right, inputs)
            }
            BuggyMode::LineFollow | BuggyMode::LineSearch => self.track_line(inputs),
        };
        self.command
    }

    fn track_line(&mut self, inputs: &ControlInputs) -> MotionCommand {
        if inputs.line_detected {
            if self.mode == BuggyMode::LineSearch {
                info!("line reacquired at {} m", inputs.distance_m);
                self.set_mode(BuggyMode::LineFollow);
            }
            self.tracking.last_seen_m = Some(inputs.distance_m);
            if inputs.line_offset > 0.0 {
                self.tracking.last_side = 1.0;
            } else if inputs.line_offset < 0.0 {
                self.tracking.last_side = -1.0;
            }
        } else if self.mode == BuggyMode::LineFollow {
            let last_seen = *self.tracking.last_seen_m.get_or_insert(inputs.distance_m);
            if libm::fabsf(inputs.distance_m - last_seen) > self.follow.line_loss_distance_m {
                warn!("line lost after {} m, searching", inputs.distance_m - last_seen);
                let side = self.tracking.last_side;
                self.set_mode(BuggyMode::LineSearch);
                self.tracking.last_side = side;
            }
        }

        if self.mode == BuggyMode::LineSearch {
            // Pivot toward the side the line was last seen on, positive = left
            let turn = self.follow.search_turn_speed;
            let (left, right) = if self.tracking.last_side >= 0.0 {
                (-turn, turn)
            } else {
                (turn, -turn)
            };
            return self.drive_wheels(left, right, inputs);
        }

        self.tracking.ticks = self.tracking.ticks.saturating_add(1);
        // A dwell of u32::MAX never ramps
        if Some(self.tracking.ticks) == self.follow.ramp_dwell_ticks.checked_add(1) {
            debug!("line follow ramp done");
            self.velocity = self.follow.cruise_velocity;
        }

        self.line_pid.update(0.0, inputs.line_offset);
        let (left, right) = split(self.follow.split, self.velocity, self.line_pid.output());
        self.drive_wheels(left, right, inputs)
    }

    fn drive_wheels(
        &mut self,
        left_set: f32,
        right_set: f32,
        inputs: &ControlInputs,
    ) -> MotionCommand {
        self.left_pid.update(left_set, inputs.left_speed);
        self.right_pid.update(right_set, inputs.right_speed);
        MotionCommand {
            left_duty: self.left_pid.output(),
            right_duty: self.right_pid.output(),
        }
    }

    fn reset_loops(&mut self) {
        self.heading_pid.reset();
        self.line_pid.reset();
        self.left_pid.reset();
        self.right_pid.reset();
    }

    /// Current mode
    pub fn mode(&self) -> BuggyMode {
        self.mode
    }

    /// Motor driver enable, released only while inactive
    pub fn drive_enabled(&self) -> bool {
        self.mode != BuggyMode::Inactive
    }

    /// Forward velocity set-point (m/s)
    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    /// Heading set-point (deg)
    pub fn heading_target(&self) -> f32 {
        self.heading_target
    }

    /// Duties produced by the latest update
    pub fn command(&self) -> MotionCommand {
        self.command
    }

    /// Terms of all four loops after the latest update
    pub fn terms(&self) -> ControllerTerms {
        ControllerTerms {
            heading: self.heading_pid.terms(),
            line: self.line_pid.terms(),
            left: self.left_pid.terms(),
            right: self.right_pid.terms(),
        }
    }

    /// Gains of `target`; for `Motors` those of the left wheel, both are kept equal
    pub fn gains(&self, target: PidLoop) -> Gains {
        match target {
            PidLoop::Heading => self.heading_pid.gains(),
            PidLoop::Line => self.line_pid.gains(),
            PidLoop::Motors => self.left_pid.gains(),
        }
    }
}

/// Wheel speed set-points for forward velocity `v` and correction `c`
fn split(policy: SplitPolicy, v: f32, c: f32) -> (f32, f32) {
    match policy {
        SplitPolicy::Symmetric => (v + c, v - c),
        SplitPolicy::OneSided if c >= 0.0 => (v, v - 2.0 * c),
        SplitPolicy::OneSided => (v + 2.0 * c, v),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::config::{HEADING_PID, LINE_LOSS_DISTANCE_M};
    use approx::assert_relative_eq;

    fn controller() -> MotionController {
        MotionController::new(&BuggyConfig::default()).unwrap()
    }

    fn on_line(offset: f32, distance_m: f32) -> ControlInputs {
        ControlInputs {
            distance_m,
            line_offset: offset,
            line_detected: true,
            ..ControlInputs::default()
        }
    }

    #[test]
    fn inactive_outputs_zero_without_touching_loops() {
        let mut motion = controller();
        let inputs = ControlInputs {
            left_speed: 0.3,
            heading_deg: 45.0,
            ..ControlInputs::default()
        };
        for _ in 0..10 {
            assert_eq!(motion.update(&inputs), MotionCommand::default());
        }
        assert_eq!(motion.terms(), ControllerTerms::default());
        assert!(!motion.drive_enabled());
    }

    #[test]
    fn heading_hold_entry_resets_integrators_immediately() {
        let mut motion = controller();
        motion.set_mode(BuggyMode::HeadingHold);
        motion.set_heading(-30.0);
        motion.set_velocity(0.2);
        for _ in 0..100 {
            motion.update(&ControlInputs::default());
        }
        assert!(motion.terms().heading.integrator != 0.0);
        assert!(motion.terms().left.integrator != 0.0);

        motion.set_mode(BuggyMode::Inactive);
        motion.update(&ControlInputs::default());

        motion.set_mode(BuggyMode::HeadingHold);
        motion.set_heading(90.0);
        // Straight after the transition, before any update
        let terms = motion.terms();
        assert_eq!(terms, ControllerTerms::default());

        // The transition tick integrates from zero
        motion.update(&ControlInputs::default());
        let expected = 0.5 * HEADING_PID.gains.ki * 0.01 * 90.0;
        assert_relative_eq!(motion.terms().heading.integrator, expected, max_relative = 1e-5);
        assert_relative_eq!(motion.terms().heading.time, 0.01, max_relative = 1e-5);
    }

    #[test]
    fn heading_hold_splits_symmetrically() {
        let mut motion = controller();
        motion.set_mode(BuggyMode::HeadingHold);
        motion.set_velocity(0.3);
        motion.set_heading(20.0);
        motion.update(&ControlInputs::default());

        let terms = motion.terms();
        let c = terms.heading.output;
        assert!(c > 0.0);
        assert_relative_eq!(terms.left.set_point, 0.3 + c);
        assert_relative_eq!(terms.right.set_point, 0.3 - c);
        // Each wheel loop closes on its own speed
        assert!(motion.command().left_duty > motion.command().right_duty);
    }

    #[test]
    fn one_sided_split_keeps_outside_wheel() {
        let mut motion = controller();
        motion.set_mode(BuggyMode::LineFollow);
        // Line on the left: correction is negative, the right wheel is outside
        motion.update(&on_line(2.0, 0.0));
        let terms = motion.terms();
        let c = terms.line.output;
        assert!(c < 0.0);
        assert_eq!(terms.right.set_point, motion.velocity());
        assert_relative_eq!(terms.left.set_point, motion.velocity() - 2.0 * c.abs());

        motion.set_mode(BuggyMode::LineFollow);
        motion.update(&on_line(-2.0, 0.0));
        let terms = motion.terms();
        assert_eq!(terms.left.set_point, motion.velocity());
        assert!(terms.right.set_point < motion.velocity());
    }

    #[test]
    fn symmetric_split_is_selectable_for_line_follow() {
        let mut config = BuggyConfig::default();
        config.line_follow.split = SplitPolicy::Symmetric;
        let mut motion = MotionController::new(&config).unwrap();
        motion.set_mode(BuggyMode::LineFollow);
        motion.update(&on_line(2.0, 0.0));
        let terms = motion.terms();
        let c = terms.line.output;
        assert_relative_eq!(terms.left.set_point, 0.2 + c);
        assert_relative_eq!(terms.right.set_point, 0.2 - c);
    }

    #[test]
    fn line_follow_ramps_to_cruise() {
        let config = BuggyConfig::default();
        let mut motion = MotionController::new(&config).unwrap();
        motion.set_mode(BuggyMode::LineFollow);
        assert_eq!(motion.velocity(), config.line_follow.startup_velocity);
        for _ in 0..config.line_follow.ramp_dwell_ticks {
            motion.update(&on_line(0.0, 0.0));
        }
        assert_eq!(motion.velocity(), config.line_follow.startup_velocity);
        motion.update(&on_line(0.0, 0.0));
        assert_eq!(motion.velocity(), config.line_follow.cruise_velocity);
    }

    #[test]
    fn longest_ramp_dwell_holds_startup_velocity() {
        let mut config = BuggyConfig::default();
        config.line_follow.ramp_dwell_ticks = u32::MAX;
        assert_eq!(config.validate(), Ok(()));
        let mut motion = MotionController::new(&config).unwrap();
        motion.set_mode(BuggyMode::LineFollow);
        for _ in 0..3 {
            motion.update(&on_line(0.0, 0.0));
        }
        assert_eq!(motion.velocity(), config.line_follow.startup_velocity);
    }

    #[test]
    fn losing_the_line_enters_search_and_recovers() {
        let mut motion = controller();
        motion.set_mode(BuggyMode::LineFollow);
        // Last seen slightly to the right
        motion.update(&on_line(-0.5, 0.10));

        let lost = |distance_m| ControlInputs {
            distance_m,
            ..ControlInputs::default()
        };
        motion.update(&lost(0.12));
        motion.update(&lost(0.10 + LINE_LOSS_DISTANCE_M * 0.9));
        assert_eq!(motion.mode(), BuggyMode::LineFollow);

        motion.update(&lost(0.10 + LINE_LOSS_DISTANCE_M * 1.5));
        assert_eq!(motion.mode(), BuggyMode::LineSearch);
        assert_eq!(motion.velocity(), 0.0);
        assert_eq!(motion.terms().line, PidTerms::default());
        // Pivot clockwise toward the right
        let terms = motion.terms();
        assert!(terms.left.set_point > 0.0);
        assert_eq!(terms.right.set_point, -terms.left.set_point);
        assert!(motion.drive_enabled());

        motion.update(&on_line(-0.2, 0.16));
        assert_eq!(motion.mode(), BuggyMode::LineFollow);
        assert_eq!(motion.velocity(), 0.2);
        assert_relative_eq!(motion.terms().line.time, 0.01, max_relative = 1e-5);
    }

    #[test]
    fn search_defaults_to_left_pivot() {
        let mut motion = controller();
        motion.set_mode(BuggyMode::LineFollow);
        motion.update(&on_line(0.8, 0.0));
        motion.update(&ControlInputs {
            distance_m: 1.0,
            ..ControlInputs::default()
        });
        assert_eq!(motion.mode(), BuggyMode::LineSearch);
        assert!(motion.terms().left.set_point < 0.0);
    }

    #[test]
    fn open_loop_forwards_duties() {
        let mut motion = controller();
        motion.set_mode(BuggyMode::OpenLoop);
        motion.set_open_loop_duty(Motor::Left, 0.4);
        motion.set_open_loop_duty(Motor::Right, -0.7);
        let command = motion.update(&ControlInputs {
            left_speed: 5.0,
            ..ControlInputs::default()
        });
        assert_eq!(command, MotionCommand { left_duty: 0.4, right_duty: -0.7 });
        assert_eq!(motion.terms(), ControllerTerms::default());

        motion.set_mode(BuggyMode::Inactive);
        assert_eq!(motion.command(), MotionCommand::default());
    }

    #[test]
    fn gain_updates_are_validated() {
        let mut motion = controller();
        let gains = Gains { kp: 0.5, ki: 1.0, kd: 0.01 };
        motion.set_gains(PidLoop::Motors, gains).unwrap();
        assert_eq!(motion.gains(PidLoop::Motors), gains);

        let before = motion.gains(PidLoop::Heading);
        let bad = Gains { kp: f32::INFINITY, ki: 0.0, kd: 0.0 };
        assert_eq!(motion.set_gains(PidLoop::Heading, bad), Err(ConfigError::NonFiniteGain));
        assert_eq!(motion.gains(PidLoop::Heading), before);
    }

    #[test]
    fn split_policies() {
        let (left, right) = split(SplitPolicy::Symmetric, 0.4, 0.1);
        assert_relative_eq!(left, 0.5);
        assert_relative_eq!(right, 0.3);
        let (left, right) = split(SplitPolicy::OneSided, 0.4, 0.1);
        assert_eq!(left, 0.4);
        assert_relative_eq!(right, 0.2);
        let (left, right) = split(SplitPolicy::OneSided, 0.4, -0.1);
        assert_relative_eq!(left, 0.2);
        assert_eq!(right, 0.4);
    }
}
