//! Commands accepted by the buggy
//!
//! Commands are produced by the link task (from protocol frames) and consumed by the control
//! tick, which drains the [`CommandQueue`] before doing anything else. A command always travels
//! as one value, so a multi-field update such as new gains is never observed half-written.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::control::motion::PidLoop;
use crate::system::config::Gains;
use crate::system::error::CommandError;
use crate::system::hal::Motor;

/// Depth of the command queue between the link and the control tick
pub const COMMAND_QUEUE_DEPTH: usize = 8;

/// Maneuver or test mode requested by an execute command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModeRequest {
    Square,
    PidTest,
    LineFollow,
    /// Open loop with zero duty, ticks reported continuously
    EncoderTest,
    /// Open loop, duties set with `SP`
    PwmTest,
}

/// Motor(s) addressed by a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MotorSelect {
    Left,
    Right,
    Both,
}

impl MotorSelect {
    /// Whether `motor` is addressed
    pub fn includes(self, motor: Motor) -> bool {
        matches!(
            (self, motor),
            (MotorSelect::Both, _)
                | (MotorSelect::Left, Motor::Left)
                | (MotorSelect::Right, Motor::Right)
        )
    }
}

/// Value reported by a get request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryField {
    Duty,
    Ticks,
    /// Unfiltered wheel speed
    Speed,
    /// Filtered wheel speed
    Velocity,
    Heading,
    Distance,
    /// PID terms: wheel loops for `L`/`R`, the active outer loop for `B`
    PidTerms,
    /// Time since start-up
    Runtime,
    /// Control tick execution time
    TickTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Emergency stop, forces `Inactive`
    Stop,
    Execute(ModeRequest),
    /// Forward velocity set-point (m/s)
    SetVelocity(f32),
    /// Heading set-point (deg)
    SetHeading(f32),
    SetGains { target: PidLoop, gains: Gains },
    /// Open-loop duty in [-1, 1]
    SetDuty { motor: MotorSelect, duty: f32 },
    /// Line sensor calibration pass
    Calibrate,
    Get(TelemetryField, MotorSelect),
    ToggleContinuous,
}

impl Command {
    /// Range checks shared by the link (to reply) and the control tick (to reject)
    pub fn validate(&self, max_velocity: f32) -> Result<(), CommandError> {
        match *self {
            Command::SetVelocity(velocity) => {
                finite(velocity)?;
                if libm::fabsf(velocity) > max_velocity {
                    return Err(CommandError::VelocityOutOfRange);
                }
            }
            Command::SetHeading(heading) => finite(heading)?,
            Command::SetDuty { duty, .. } => {
                finite(duty)?;
                if libm::fabsf(duty) > 1.0 {
                    return Err(CommandError::DutyOutOfRange);
                }
            }
            Command::SetGains { gains, .. } => gains.validate().map_err(CommandError::Gains)?,
            _ => {}
        }
        Ok(())
    }

    /// Whether the control tick has to see this command
    pub fn is_control(&self) -> bool {
        !matches!(self, Command::Get(..) | Command::ToggleContinuous)
    }
}

fn finite(value: f32) -> Result<(), CommandError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(CommandError::NotFinite)
    }
}

/// Bounded queue of whole commands from the link task to the control tick
pub struct CommandQueue<const N: usize = COMMAND_QUEUE_DEPTH> {
    channel: Channel<CriticalSectionRawMutex, Command, N>,
}

impl<const N: usize> CommandQueue<N> {
    /// Empty queue, usable in a `static`
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
        }
    }

    /// Enqueue without waiting, hands the command back when the queue is full
    pub fn try_send(&self, command: Command) -> Result<(), Command> {
        self.channel.try_send(command).map_err(|err| match err {
            embassy_sync::channel::TrySendError::Full(command) => command,
        })
    }

    /// Take every queued command in arrival order
    pub fn drain(&self) -> impl Iterator<Item = Command> + '_ {
        core::iter::from_fn(move || self.channel.try_receive().ok())
    }

    /// Commands waiting for the next tick
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }
}

impl<const N: usize> Default for CommandQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_preserves_order_and_bound() {
        let queue: CommandQueue<2> = CommandQueue::new();
        assert!(queue.try_send(Command::SetVelocity(0.1)).is_ok());
        assert!(queue.try_send(Command::SetHeading(90.0)).is_ok());
        assert_eq!(queue.try_send(Command::Stop), Err(Command::Stop));
        assert_eq!(queue.len(), 2);

        let drained: Vec<Command> = queue.drain().collect();
        assert_eq!(drained, vec![Command::SetVelocity(0.1), Command::SetHeading(90.0)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn gains_travel_as_one_value() {
        let queue: CommandQueue = CommandQueue::new();
        let gains = Gains { kp: 1.0, ki: 2.0, kd: 0.5 };
        queue
            .try_send(Command::SetGains {
                target: PidLoop::Line,
                gains,
            })
            .unwrap();
        assert_eq!(
            queue.drain().next(),
            Some(Command::SetGains {
                target: PidLoop::Line,
                gains
            })
        );
    }

    #[test]
    fn validation_rejects_out_of_range_values() {
        let max = 1.0;
        assert_eq!(Command::SetVelocity(0.5).validate(max), Ok(()));
        assert_eq!(Command::SetVelocity(-1.5).validate(max), Err(CommandError::VelocityOutOfRange));
        assert_eq!(Command::SetHeading(f32::NAN).validate(max), Err(CommandError::NotFinite));
        let duty = |duty| Command::SetDuty {
            motor: MotorSelect::Both,
            duty,
        };
        assert_eq!(duty(-1.0).validate(max), Ok(()));
        assert_eq!(duty(1.01).validate(max), Err(CommandError::DutyOutOfRange));
        assert_eq!(duty(f32::INFINITY).validate(max), Err(CommandError::NotFinite));
        let gains = Command::SetGains {
            target: PidLoop::Heading,
            gains: Gains { kp: 0.0, ki: f32::NAN, kd: 0.0 },
        };
        assert!(matches!(gains.validate(max), Err(CommandError::Gains(_))));
    }

    #[test]
    fn motor_select_membership() {
        assert!(MotorSelect::Both.includes(Motor::Left));
        assert!(MotorSelect::Right.includes(Motor::Right));
        assert!(!MotorSelect::Left.includes(Motor::Right));
        assert!(!Command::ToggleContinuous.is_control());
        assert!(Command::Calibrate.is_control());
    }
}
