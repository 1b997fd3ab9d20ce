//! Telemetry Ticker
//!
//! Low-rate timer that tells the link when a report is due. The report itself is formatted by the
//! link so the ticker never touches the UART.

use defmt::info;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};

/// Raised once per telemetry period
static REPORT_DUE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Waits for the next telemetry period
pub async fn wait() {
    REPORT_DUE.wait().await
}

#[embassy_executor::task]
pub async fn telemetry(period_ms: u32) {
    info!("telemetry every {}ms", period_ms);
    let mut ticker = Ticker::every(Duration::from_millis(u64::from(period_ms)));
    loop {
        ticker.next().await;
        REPORT_DUE.signal(());
    }
}
