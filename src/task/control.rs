//! Control Task
//!
//! Runs the buggy's control tick at a fixed rate on the high-priority interrupt executor. Each
//! tick drains the command queue, updates the estimators and the controller, writes the motor
//! duties and publishes a telemetry snapshot for the link.

use buggy_control::system::buggy::Buggy;
use buggy_control::system::command::{Command, CommandQueue};
use buggy_control::system::telemetry::{Telemetry, TelemetryCell};
use defmt::{info, warn};
use embassy_time::{Duration, Instant, Ticker};

use crate::board::encoder::WheelEncoder;
use crate::board::line_sensor::IrArray;
use crate::board::motor::DriveBoard;

/// The buggy wired to this board
pub type BoardBuggy = Buggy<WheelEncoder, IrArray, DriveBoard>;

/// Commands from the link, drained at the start of every tick
static COMMANDS: CommandQueue = CommandQueue::new();

/// Snapshot written at the end of every tick
static TELEMETRY: TelemetryCell = TelemetryCell::new();

/// Queues a command for the next tick
///
/// Never waits, the link must stay responsive; a full queue hands the command back.
pub fn send(command: Command) -> Result<(), Command> {
    COMMANDS.try_send(command)
}

/// Latest telemetry, `None` before the first tick
pub fn latest() -> Option<Telemetry> {
    TELEMETRY.latest()
}

#[embassy_executor::task]
pub async fn control(mut buggy: BoardBuggy) {
    let period_us = buggy.config().sample_period_us();
    let mut ticker = Ticker::every(Duration::from_micros(period_us));
    let mut exec_us: u32 = 0;
    info!("control tick every {}us", period_us);

    loop {
        ticker.next().await;
        let start = Instant::now();

        let mut telemetry = buggy.tick(COMMANDS.drain());
        telemetry.tick_exec_us = exec_us;
        telemetry.uptime_ms = start.as_millis();
        TELEMETRY.publish(telemetry);

        let elapsed = start.elapsed().as_micros();
        if elapsed > period_us {
            warn!("control tick overran: {}us", elapsed);
        }
        exec_us = elapsed.min(u64::from(u32::MAX)) as u32;
    }
}
