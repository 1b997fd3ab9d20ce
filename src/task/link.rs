//! Serial Link Task
//!
//! Talks to the Bluetooth module on UART0. Received bytes are framed and parsed into commands;
//! commands the control tick needs are queued for it, report selections stay here. Whenever the
//! telemetry ticker fires the selected field is formatted from the latest snapshot and sent back.
//!
//! Every reply ends with the frame terminator so the phone app can split lines the same way it
//! splits commands.

use buggy_control::system::command::Command;
use buggy_control::system::protocol::{FrameBuffer, FRAME_TERMINATOR};
use buggy_control::system::telemetry::{Reply, Reporter, INVALID_COMMAND};
use defmt::{debug, info, warn};
use embassy_futures::select::{select, Either};
use embassy_rp::uart::{Config, Uart};

use crate::board::resources::{Irqs, LinkResources};
use crate::task::{control, telemetry};

/// HC-05 default baud rate
const BAUD_RATE: u32 = 9600;

/// Reply when the control tick has not caught up with the queued commands
const QUEUE_FULL: &str = "Busy";

#[embassy_executor::task]
pub async fn link(r: LinkResources, max_velocity: f32) {
    let mut config = Config::default();
    config.baudrate = BAUD_RATE;
    let uart = Uart::new(r.uart, r.tx_pin, r.rx_pin, Irqs, r.tx_dma, r.rx_dma, config);
    let (mut tx, mut rx) = uart.split();

    let mut frames = FrameBuffer::new();
    let mut reporter = Reporter::new();
    let mut report = Reply::new();
    let mut byte = [0u8; 1];
    info!("link up at {} baud", BAUD_RATE);

    loop {
        let event = select(rx.read(&mut byte), telemetry::wait()).await;
        let reply: Option<&[u8]> = match event {
            Either::First(Ok(())) => match frames.push(byte[0]) {
                Some(Ok(command)) => {
                    accept(command, max_velocity, &mut reporter).map(str::as_bytes)
                }
                Some(Err(err)) => {
                    debug!("bad frame: {:?}", err);
                    Some(INVALID_COMMAND.as_bytes())
                }
                None => None,
            },
            Either::First(Err(err)) => {
                warn!("uart receive error: {:?}", err);
                frames.clear();
                None
            }
            Either::Second(()) => match control::latest().and_then(|t| reporter.report(&t)) {
                Some(line) => {
                    report = line;
                    Some(report.as_bytes())
                }
                None => None,
            },
        };

        if let Some(reply) = reply {
            if tx.write(reply).await.is_err() || tx.write(&[FRAME_TERMINATOR]).await.is_err() {
                warn!("uart transmit failed");
            }
        }
    }
}

/// Route a parsed command, returns an immediate reply if it was refused
///
/// The report selection only follows commands that were actually accepted.
fn accept(command: Command, max_velocity: f32, reporter: &mut Reporter) -> Option<&'static str> {
    if command.validate(max_velocity).is_err() {
        return Some(INVALID_COMMAND);
    }
    if command.is_control() {
        if let Err(dropped) = control::send(command) {
            warn!("command queue full, dropped {:?}", dropped);
            return Some(QUEUE_FULL);
        }
    }
    reporter.observe(&command);
    None
}
