//! Buggy firmware entry point
//!
//! Brings up the board, builds the buggy from the default configuration and starts two executors:
//! the control tick runs on a high-priority interrupt executor so link traffic can never delay it,
//! the telemetry ticker and the serial link run in thread mode.

#![no_std]
#![no_main]

use buggy_control::system::buggy::{Buggy, Hardware};
use buggy_control::system::config::{BuggyConfig, SINGLE_EDGE_COUNTS_PER_PULSE};
use defmt::info;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_rp::block::ImageDef;
use embassy_rp::config::Config;
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use {defmt_rtt as _, panic_probe as _};

use crate::board::encoder::WheelEncoder;
use crate::board::line_sensor::IrArray;
use crate::board::motor::DriveBoard;
use crate::board::resources::{
    AssignedResources, EncoderResources, LineSensorResources, LinkResources, MotorDriverResources,
};
use crate::task::{control::control, link::link, telemetry::telemetry};

/// Firmware image type for bootloader
#[link_section = ".start_block"]
#[used]
pub static IMAGE_DEF: ImageDef = ImageDef::secure_exe();

/// Board support
mod board;
/// Task implementations
mod task;

/// Runs the control tick above thread mode
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn SWI_IRQ_1() {
    EXECUTOR_HIGH.on_interrupt()
}

/// Firmware entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let p = embassy_rp::init(Config::default());
    let r = split_resources!(p);

    let mut config = BuggyConfig::default();
    // The PWM slices count rising edges of one encoder channel, not x4 quadrature
    config.geometry.counts_per_pulse = SINGLE_EDGE_COUNTS_PER_PULSE;
    let (left_encoder, right_encoder) = WheelEncoder::pair(r.encoders);
    let hardware = Hardware {
        left_encoder,
        right_encoder,
        line_sensor: IrArray::new(r.line_sensor),
        motors: DriveBoard::new(r.motor_driver),
    };
    // A bad configuration is a build mistake, refuse to drive
    let buggy = Buggy::new(config, hardware).unwrap();
    info!("buggy ready");

    interrupt::SWI_IRQ_1.set_priority(Priority::P2);
    let high = EXECUTOR_HIGH.start(interrupt::SWI_IRQ_1);
    high.spawn(control(buggy)).unwrap();

    spawner.spawn(telemetry(config.telemetry_period_ms)).unwrap();
    spawner.spawn(link(r.link, config.max_velocity)).unwrap();
}
