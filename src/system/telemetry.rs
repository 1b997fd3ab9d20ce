//! Telemetry snapshot and reporting
//!
//! The control tick publishes a [`Telemetry`] value into a [`TelemetryCell`] at the end of every
//! tick. The link task reads the latest snapshot when the low-rate telemetry ticker fires and
//! turns the selected field into a text reply through a [`Reporter`].

use core::cell::Cell;
use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::String;

use crate::control::motion::{BuggyMode, ControllerTerms, MotionCommand};
use crate::control::odometry::Odometry;
use crate::control::line_sensor::LineReading;
use crate::control::pid::PidTerms;
use crate::control::speed::WheelSpeed;
use crate::system::command::{Command, ModeRequest, MotorSelect, TelemetryField};

/// Longest text reply
pub const REPLY_CAPACITY: usize = 96;

/// One line of text sent back over the link
pub type Reply = String<REPLY_CAPACITY>;

/// Reply to a frame that could not be parsed or validated
pub const INVALID_COMMAND: &str = "Invalid Command";

/// State of the buggy at the end of a control tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Telemetry {
    /// Control ticks since start-up
    pub tick: u32,
    pub mode: BuggyMode,
    pub command: MotionCommand,
    pub left: WheelSpeed,
    pub right: WheelSpeed,
    pub odometry: Odometry,
    pub line: LineReading,
    pub terms: ControllerTerms,
    /// Execution time of the previous control tick (µs)
    pub tick_exec_us: u32,
    /// Time since start-up (ms)
    pub uptime_ms: u64,
}

impl Telemetry {
    /// Terms of the outer loop that drives the current mode
    pub fn outer_terms(&self) -> PidTerms {
        match self.mode {
            BuggyMode::LineFollow | BuggyMode::LineSearch => self.terms.line,
            _ => self.terms.heading,
        }
    }
}

/// Latest telemetry, written by the control tick and read by the link
pub struct TelemetryCell {
    inner: Mutex<CriticalSectionRawMutex, Cell<Option<Telemetry>>>,
}

impl TelemetryCell {
    /// Empty cell, usable in a `static`
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Cell::new(None)),
        }
    }

    /// Replace the stored snapshot
    pub fn publish(&self, telemetry: Telemetry) {
        self.inner.lock(|cell| cell.set(Some(telemetry)));
    }

    /// `None` until the first tick has run
    pub fn latest(&self) -> Option<Telemetry> {
        self.inner.lock(Cell::get)
    }
}

impl Default for TelemetryCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks which field the link reports and whether it reports continuously
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reporter {
    field: TelemetryField,
    select: MotorSelect,
    continuous: bool,
    send_once: bool,
}

impl Reporter {
    /// Ticks of both wheels, reported on request only
    pub const fn new() -> Self {
        Self {
            field: TelemetryField::Ticks,
            select: MotorSelect::Both,
            continuous: false,
            send_once: false,
        }
    }

    /// Update the report selection from a command seen by the link
    pub fn observe(&mut self, command: &Command) {
        match *command {
            Command::Get(field, select) => {
                self.field = field;
                self.select = select;
                self.send_once = true;
            }
            Command::ToggleContinuous => self.continuous = !self.continuous,
            Command::Execute(ModeRequest::EncoderTest) => {
                self.field = TelemetryField::Ticks;
                self.select = MotorSelect::Both;
                self.continuous = true;
            }
            Command::Execute(ModeRequest::PwmTest) => {
                self.field = TelemetryField::Duty;
                self.select = MotorSelect::Both;
                self.continuous = true;
            }
            _ => {}
        }
    }

    /// Reply due at this telemetry period, if any
    pub fn report(&mut self, telemetry: &Telemetry) -> Option<Reply> {
        if !(self.continuous || self.send_once) {
            return None;
        }
        self.send_once = false;
        Some(format_field(telemetry, self.field, self.select))
    }

    /// Whether a report goes out every telemetry period
    pub fn is_continuous(&self) -> bool {
        self.continuous
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Render one telemetry field; replies longer than [`REPLY_CAPACITY`] are truncated
///
/// Replies never contain the frame terminator, the link appends it after each one.
pub fn format_field(t: &Telemetry, field: TelemetryField, select: MotorSelect) -> Reply {
    let mut reply = Reply::new();
    let (left, right) = (t.command.left_duty, t.command.right_duty);
    // Overflow only truncates the line
    let _ = match (field, select) {
        (TelemetryField::Duty, MotorSelect::Left) => write!(reply, "DC L: {:.2}", left),
        (TelemetryField::Duty, MotorSelect::Right) => write!(reply, "DC R: {:.2}", right),
        (TelemetryField::Duty, MotorSelect::Both) => {
            write!(reply, "DC L:{:.2} R:{:.2}", left, right)
        }
        (TelemetryField::Ticks, MotorSelect::Left) => write!(reply, "Ticks L: {}", t.left.ticks),
        (TelemetryField::Ticks, MotorSelect::Right) => {
            write!(reply, "Ticks R: {}", t.right.ticks)
        }
        (TelemetryField::Ticks, MotorSelect::Both) => {
            write!(reply, "L:{:7} R:{:7}", t.left.ticks, t.right.ticks)
        }
        (TelemetryField::Speed, MotorSelect::Left) => {
            write!(reply, "Speed L: {:.4}", t.left.speed)
        }
        (TelemetryField::Speed, MotorSelect::Right) => {
            write!(reply, "Speed R: {:.4}", t.right.speed)
        }
        (TelemetryField::Speed, MotorSelect::Both) => {
            write!(reply, "S L:{:.3} R:{:.3}", t.left.speed, t.right.speed)
        }
        (TelemetryField::Velocity, MotorSelect::Left) => {
            write!(reply, "V L: {:.4}", t.left.filtered_speed)
        }
        (TelemetryField::Velocity, MotorSelect::Right) => {
            write!(reply, "V R: {:.4}", t.right.filtered_speed)
        }
        (TelemetryField::Velocity, MotorSelect::Both) => write!(
            reply,
            "V L:{:.3} R:{:.3}",
            t.left.filtered_speed, t.right.filtered_speed
        ),
        (TelemetryField::Heading, _) => write!(reply, "Heading: {:.2}", t.odometry.heading_deg),
        (TelemetryField::Distance, _) => write!(reply, "Distance: {:.3}", t.odometry.distance_m),
        (TelemetryField::PidTerms, select) => {
            let (label, terms) = match select {
                MotorSelect::Left => ("L", t.terms.left),
                MotorSelect::Right => ("R", t.terms.right),
                MotorSelect::Both => ("O", t.outer_terms()),
            };
            write_terms(&mut reply, label, &terms)
        }
        (TelemetryField::Runtime, _) => write!(
            reply,
            "Runtime: {}.{:03}",
            t.uptime_ms / 1000,
            t.uptime_ms % 1000
        ),
        (TelemetryField::TickTime, _) => write!(reply, "ISR: {}us", t.tick_exec_us),
    };
    reply
}

fn write_terms(reply: &mut Reply, label: &str, terms: &PidTerms) -> core::fmt::Result {
    write!(
        reply,
        "PID {}: sp {:.2} m {:.2} e {:.2} P {:.3} I {:.3} D {:.3} u {:.3}",
        label,
        terms.set_point,
        terms.measurement,
        terms.error,
        terms.proportional,
        terms.integrator,
        terms.differentiator,
        terms.output
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Telemetry {
        Telemetry {
            tick: 42,
            mode: BuggyMode::HeadingHold,
            command: MotionCommand {
                left_duty: 0.25,
                right_duty: -0.5,
            },
            left: WheelSpeed {
                ticks: 1024,
                speed: 0.2,
                filtered_speed: 0.19,
                ..WheelSpeed::default()
            },
            right: WheelSpeed {
                ticks: -12,
                ..WheelSpeed::default()
            },
            odometry: Odometry {
                heading_deg: 39.734,
                distance_m: 0.5,
            },
            tick_exec_us: 180,
            uptime_ms: 61_042,
            ..Telemetry::default()
        }
    }

    #[test]
    fn fields_render_like_the_link_expects() {
        let t = sample();
        assert_eq!(format_field(&t, TelemetryField::Duty, MotorSelect::Left), "DC L: 0.25");
        assert_eq!(
            format_field(&t, TelemetryField::Duty, MotorSelect::Both),
            "DC L:0.25 R:-0.50"
        );
        assert_eq!(
            format_field(&t, TelemetryField::Ticks, MotorSelect::Both),
            "L:   1024 R:    -12"
        );
        assert_eq!(format_field(&t, TelemetryField::Ticks, MotorSelect::Right), "Ticks R: -12");
        assert_eq!(format_field(&t, TelemetryField::Heading, MotorSelect::Both), "Heading: 39.73");
        assert_eq!(format_field(&t, TelemetryField::TickTime, MotorSelect::Both), "ISR: 180us");
        let runtime = format_field(&t, TelemetryField::Runtime, MotorSelect::Both);
        assert_eq!(runtime, "Runtime: 61.042");
        let terms = format_field(&t, TelemetryField::PidTerms, MotorSelect::Left);
        assert!(terms.starts_with("PID L: sp 0.00"));
    }

    #[test]
    fn replies_never_contain_the_terminator() {
        let t = sample();
        let fields = [
            TelemetryField::Duty,
            TelemetryField::Ticks,
            TelemetryField::Speed,
            TelemetryField::Velocity,
            TelemetryField::Heading,
            TelemetryField::Distance,
            TelemetryField::PidTerms,
            TelemetryField::Runtime,
            TelemetryField::TickTime,
        ];
        for field in fields {
            for select in [MotorSelect::Left, MotorSelect::Right, MotorSelect::Both] {
                let reply = format_field(&t, field, select);
                assert!(!reply.contains('/'), "{:?} {:?}: {}", field, select, reply);
            }
        }
    }

    #[test]
    fn get_reports_once_continuous_repeats() {
        let t = sample();
        let mut reporter = Reporter::new();
        assert_eq!(reporter.report(&t), None);

        reporter.observe(&Command::Get(TelemetryField::Distance, MotorSelect::Both));
        assert_eq!(reporter.report(&t).as_deref(), Some("Distance: 0.500"));
        assert_eq!(reporter.report(&t), None);

        reporter.observe(&Command::ToggleContinuous);
        assert!(reporter.report(&t).is_some());
        assert!(reporter.report(&t).is_some());
        reporter.observe(&Command::ToggleContinuous);
        assert_eq!(reporter.report(&t), None);
    }

    #[test]
    fn test_modes_stream_their_field() {
        let t = sample();
        let mut reporter = Reporter::new();
        reporter.observe(&Command::Execute(ModeRequest::PwmTest));
        assert!(reporter.is_continuous());
        assert_eq!(reporter.report(&t).as_deref(), Some("DC L:0.25 R:-0.50"));
    }

    #[test]
    fn cell_holds_latest_snapshot() {
        let cell = TelemetryCell::new();
        assert_eq!(cell.latest(), None);
        cell.publish(sample());
        let mut next = sample();
        next.tick = 43;
        cell.publish(next);
        assert_eq!(cell.latest().map(|t| t.tick), Some(43));
    }
}
