//! Text command protocol of the serial link
//!
//! Frames are short ASCII strings terminated by `/`. The first letter selects the command class,
//! the following letters the operation and target, and whitespace separated numbers follow:
//!
//! | Frame               | Command                                        |
//! |---------------------|------------------------------------------------|
//! | `ES`                | emergency stop                                 |
//! | `EQ` `EP` `EF`      | square path, PID test, line follow             |
//! | `EE` `EM`           | encoder test, PWM test (open loop)             |
//! | `EK`                | line sensor calibration                        |
//! | `SP<L|R|B> d`       | open-loop duty                                 |
//! | `SV v`              | velocity set-point (m/s)                       |
//! | `SA a`              | heading set-point (deg)                        |
//! | `SG<A|L|M> p i d`   | gains of the heading, line or motor loops      |
//! | `G<P|T|S|V|H|D|I|R|X> [L|R|B]` | report a telemetry field once       |
//! | `C`                 | toggle continuous reporting                    |
//!
//! Letters are case-insensitive.

use heapless::Vec;

use crate::control::motion::PidLoop;
use crate::system::command::{Command, ModeRequest, MotorSelect, TelemetryField};
use crate::system::config::Gains;
use crate::system::error::ProtocolError;

/// Ends every frame
pub const FRAME_TERMINATOR: u8 = b'/';

/// Longest frame accepted, terminator excluded
pub const FRAME_CAPACITY: usize = 48;

/// Accumulates received bytes into frames
///
/// An overlong frame is reported once and the rest of it, up to its terminator, is dropped so
/// its tail can never parse as a command of its own.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    bytes: Vec<u8, FRAME_CAPACITY>,
    discarding: bool,
}

impl FrameBuffer {
    /// Empty buffer
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            discarding: false,
        }
    }

    /// Feed one received byte, returns the parse result once a frame is complete
    pub fn push(&mut self, byte: u8) -> Option<Result<Command, ProtocolError>> {
        if byte == FRAME_TERMINATOR {
            if self.discarding {
                self.discarding = false;
                return None;
            }
            let result = parse_frame(&self.bytes);
            self.bytes.clear();
            return Some(result);
        }
        if self.discarding {
            return None;
        }
        if self.bytes.push(byte).is_err() {
            self.bytes.clear();
            self.discarding = true;
            return Some(Err(ProtocolError::Overflow));
        }
        None
    }

    /// Drop any partial frame, e.g. after a receive error
    pub fn clear(&mut self) {
        self.bytes.clear();
        self.discarding = false;
    }
}

/// Parse one frame without its terminator
pub fn parse_frame(frame: &[u8]) -> Result<Command, ProtocolError> {
    let text = core::str::from_utf8(frame).map_err(|_| ProtocolError::UnknownCommand)?;
    let mut tokens = text.split_ascii_whitespace();
    let head = tokens.next().ok_or(ProtocolError::Empty)?;

    let mut letters = head.bytes().map(|b| b.to_ascii_uppercase());
    let class = letters.next().ok_or(ProtocolError::Empty)?;
    let op = letters.next();
    let target = letters.next();
    if letters.next().is_some() {
        return Err(ProtocolError::UnknownCommand);
    }

    let command = match (class, op) {
        (b'C', None) => Command::ToggleContinuous,
        (b'E', Some(op)) if target.is_none() => execute(op)?,
        (b'S', Some(b'P')) => Command::SetDuty {
            motor: motor_select(target.ok_or(ProtocolError::UnknownTarget)?)?,
            duty: arguments::<1>(&mut tokens)?[0],
        },
        (b'S', Some(b'V')) if target.is_none() => {
            Command::SetVelocity(arguments::<1>(&mut tokens)?[0])
        }
        (b'S', Some(b'A')) if target.is_none() => {
            Command::SetHeading(arguments::<1>(&mut tokens)?[0])
        }
        (b'S', Some(b'G')) => {
            let target = match target.ok_or(ProtocolError::UnknownTarget)? {
                b'A' => PidLoop::Heading,
                b'L' => PidLoop::Line,
                b'M' => PidLoop::Motors,
                _ => return Err(ProtocolError::UnknownTarget),
            };
            let [kp, ki, kd] = arguments::<3>(&mut tokens)?;
            Command::SetGains {
                target,
                gains: Gains { kp, ki, kd },
            }
        }
        (b'G', Some(op)) => {
            let field = telemetry_field(op)?;
            // Target letter may be glued to the field or given as its own token
            let select = match (target, tokens.next()) {
                (Some(letter), _) => motor_select(letter)?,
                (None, Some(token)) => match token.as_bytes() {
                    [letter] => motor_select(letter.to_ascii_uppercase())?,
                    _ => return Err(ProtocolError::UnknownTarget),
                },
                (None, None) => MotorSelect::Both,
            };
            Command::Get(field, select)
        }
        _ => return Err(ProtocolError::UnknownCommand),
    };

    if tokens.next().is_some() {
        return Err(ProtocolError::BadArgument);
    }
    Ok(command)
}

fn execute(op: u8) -> Result<Command, ProtocolError> {
    let request = match op {
        b'S' => return Ok(Command::Stop),
        b'K' => return Ok(Command::Calibrate),
        b'Q' => ModeRequest::Square,
        b'P' => ModeRequest::PidTest,
        b'F' => ModeRequest::LineFollow,
        b'E' => ModeRequest::EncoderTest,
        b'M' => ModeRequest::PwmTest,
        _ => return Err(ProtocolError::UnknownCommand),
    };
    Ok(Command::Execute(request))
}

fn motor_select(letter: u8) -> Result<MotorSelect, ProtocolError> {
    match letter {
        b'L' => Ok(MotorSelect::Left),
        b'R' => Ok(MotorSelect::Right),
        b'B' => Ok(MotorSelect::Both),
        _ => Err(ProtocolError::UnknownTarget),
    }
}

fn telemetry_field(letter: u8) -> Result<TelemetryField, ProtocolError> {
    Ok(match letter {
        b'P' => TelemetryField::Duty,
        b'T' => TelemetryField::Ticks,
        b'S' => TelemetryField::Speed,
        b'V' => TelemetryField::Velocity,
        b'H' => TelemetryField::Heading,
        b'D' => TelemetryField::Distance,
        b'I' => TelemetryField::PidTerms,
        b'R' => TelemetryField::Runtime,
        b'X' => TelemetryField::TickTime,
        _ => return Err(ProtocolError::UnknownCommand),
    })
}

fn arguments<'a, const N: usize>(
    tokens: &mut impl Iterator<Item = &'a str>,
) -> Result<[f32; N], ProtocolError> {
    let mut values = [0.0; N];
    for value in values.iter_mut() {
        let token = tokens.next().ok_or(ProtocolError::BadArgument)?;
        *value = token.parse().map_err(|_| ProtocolError::BadArgument)?;
    }
    Ok(values)
}
