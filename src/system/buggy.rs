//! Buggy application context
//!
//! Owns every estimator and controller together with the hardware handles. The control task owns
//! the single `Buggy` value; everything else reaches it through the command queue and the
//! published telemetry.
//!
//! # Control tick
//! 1. apply the commands queued since the previous tick
//! 2. sample the line sensor array
//! 3. update both wheel speed estimators and the odometry
//! 4. step the maneuver sequencer
//! 5. run the motion controller and write both duties and the driver enable
//! 6. return the telemetry snapshot

use crate::control::line_sensor::LineSensorEstimator;
use crate::control::motion::{BuggyMode, ControlInputs, MotionController};
use crate::control::odometry::HeadingTracker;
use crate::control::sequencer::{Maneuver, Sequencer, SequencerAction};
use crate::control::speed::SpeedEstimator;
use crate::system::command::{Command, ModeRequest};
use crate::system::config::BuggyConfig;
use crate::system::error::{CalibrationError, CommandError, ConfigError};
use crate::system::hal::{Encoder, LineSensorArray, Motor, MotorDrive};
use crate::system::telemetry::Telemetry;

/// Hardware handles used by the control tick
pub struct Hardware<E, S, M> {
    pub left_encoder: E,
    pub right_encoder: E,
    pub line_sensor: S,
    pub motors: M,
}

/// Everything the control tick owns
pub struct Buggy<E, S, M> {
    config: BuggyConfig,
    hardware: Hardware<E, S, M>,
    left: SpeedEstimator,
    right: SpeedEstimator,
    odometry: HeadingTracker,
    line: LineSensorEstimator,
    controller: MotionController,
    sequencer: Sequencer,
    tick: u32,
}

impl<E, S, M> Buggy<E, S, M>
where
    E: Encoder,
    S: LineSensorArray,
    M: MotorDrive,
{
    /// Validate `config` and bring the hardware to a safe idle state
    pub fn new(config: BuggyConfig, mut hardware: Hardware<E, S, M>) -> Result<Self, ConfigError> {
        config.validate()?;

        let rate = config.control_rate_hz;
        let mut left = SpeedEstimator::new(&config.geometry, config.speed_filter, rate);
        let mut right = SpeedEstimator::new(&config.geometry, config.speed_filter, rate);
        left.reset_from(&mut hardware.left_encoder);
        right.reset_from(&mut hardware.right_encoder);

        hardware.motors.set_enabled(false);
        hardware.motors.write_duty(Motor::Left, 0.0);
        hardware.motors.write_duty(Motor::Right, 0.0);
        hardware.line_sensor.set_emitters(true);

        info!("buggy ready at {} Hz", rate);
        Ok(Self {
            left,
            right,
            odometry: HeadingTracker::new(&config.geometry),
            line: LineSensorEstimator::new(config.line_sensor),
            controller: MotionController::new(&config)?,
            sequencer: Sequencer::new(config.maneuvers),
            tick: 0,
            config,
            hardware,
        })
    }

    /// Run one control tick after applying `commands`
    pub fn tick<I>(&mut self, commands: I) -> Telemetry
    where
        I: IntoIterator<Item = Command>,
    {
        for command in commands {
            if let Err(err) = self.apply_command(command) {
                warn!("command {:?} rejected: {:?}", command, err);
            }
        }

        let hw = &mut self.hardware;
        self.line.update(&mut hw.line_sensor);
        self.left.update_from(&mut hw.left_encoder);
        self.right.update_from(&mut hw.right_encoder);
        self.odometry.update(self.left.tick_count(), self.right.tick_count());

        if let Some(action) = self.sequencer.step(&self.odometry.odometry()) {
            self.apply_action(action);
        }

        let inputs = ControlInputs {
            left_speed: self.left.filtered_speed(),
            right_speed: self.right.filtered_speed(),
            heading_deg: self.odometry.heading_deg(),
            distance_m: self.odometry.distance_m(),
            line_offset: self.line.filtered_offset(),
            line_detected: self.line.is_line_detected(),
        };
        let command = self.controller.update(&inputs);

        let motors = &mut self.hardware.motors;
        motors.set_enabled(self.controller.drive_enabled());
        motors.write_duty(Motor::Left, command.left_duty);
        motors.write_duty(Motor::Right, command.right_duty);

        self.tick = self.tick.wrapping_add(1);
        self.telemetry()
    }

    /// Validate and apply one command; a rejected command changes nothing
    pub fn apply_command(&mut self, command: Command) -> Result<(), CommandError> {
        command.validate(self.config.max_velocity)?;

        match command {
            Command::Stop => {
                self.sequencer.cancel();
                self.controller.set_mode(BuggyMode::Inactive);
            }
            Command::Execute(request) => self.execute(request),
            Command::SetVelocity(velocity) => self.controller.set_velocity(velocity),
            Command::SetHeading(heading) => self.controller.set_heading(heading),
            Command::SetGains { target, gains } => {
                self.controller.set_gains(target, gains).map_err(CommandError::Gains)?;
                info!("{:?} gains set to {} {} {}", target, gains.kp, gains.ki, gains.kd);
            }
            Command::SetDuty { motor, duty } => {
                for side in [Motor::Left, Motor::Right] {
                    if motor.includes(side) {
                        self.controller.set_open_loop_duty(side, duty);
                    }
                }
            }
            Command::Calibrate => self.calibrate_line_sensor()?,
            // Reporting is handled by the link
            Command::Get(..) | Command::ToggleContinuous => {}
        }
        Ok(())
    }

    /// Measure the line sensor floor over the background, then stop the buggy
    ///
    /// A failed pass keeps the old calibration and leaves the running mode alone.
    pub fn calibrate_line_sensor(&mut self) -> Result<(), CalibrationError> {
        self.line.calibrate_sensors(&mut self.hardware.line_sensor)?;
        self.sequencer.cancel();
        self.controller.set_mode(BuggyMode::Inactive);
        Ok(())
    }

    fn execute(&mut self, request: ModeRequest) {
        self.sequencer.cancel();
        match request {
            ModeRequest::Square => self.start_maneuver(Maneuver::Square),
            ModeRequest::PidTest => self.start_maneuver(Maneuver::PidTest),
            ModeRequest::LineFollow => {
                self.reset_odometry();
                self.line.reset();
                self.controller.set_mode(BuggyMode::LineFollow);
            }
            ModeRequest::EncoderTest => {
                self.reset_odometry();
                self.controller.set_mode(BuggyMode::OpenLoop);
            }
            ModeRequest::PwmTest => self.controller.set_mode(BuggyMode::OpenLoop),
        }
    }

    fn start_maneuver(&mut self, maneuver: Maneuver) {
        self.reset_odometry();
        self.controller.set_mode(BuggyMode::HeadingHold);
        let action = self.sequencer.start(maneuver);
        self.apply_action(action);
    }

    fn apply_action(&mut self, action: SequencerAction) {
        match action {
            SequencerAction::Track { velocity, heading_deg } => {
                self.controller.set_velocity(velocity);
                self.controller.set_heading(heading_deg);
            }
            SequencerAction::Finish => self.controller.set_mode(BuggyMode::Inactive),
        }
    }

    /// Re-baseline both wheel counters; heading and distance only exist relative to them
    fn reset_odometry(&mut self) {
        self.left.reset_from(&mut self.hardware.left_encoder);
        self.right.reset_from(&mut self.hardware.right_encoder);
        self.odometry.reset();
    }

    /// Snapshot of the current state; timing fields are left for the caller
    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            tick: self.tick,
            mode: self.controller.mode(),
            command: self.controller.command(),
            left: self.left.snapshot(),
            right: self.right.snapshot(),
            odometry: self.odometry.odometry(),
            line: self.line.reading(),
            terms: self.controller.terms(),
            tick_exec_us: 0,
            uptime_ms: 0,
        }
    }

    /// Current controller mode
    pub fn mode(&self) -> BuggyMode {
        self.controller.mode()
    }

    pub fn controller(&self) -> &MotionController {
        &self.controller
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn config(&self) -> &BuggyConfig {
        &self.config
    }

    /// Hardware handles, for inspection
    pub fn hardware(&self) -> &Hardware<E, S, M> {
        &self.hardware
    }
}
