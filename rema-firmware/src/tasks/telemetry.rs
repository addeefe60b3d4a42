//! Telemetry task
//!
//! Publishes an engine snapshot every 100 ms. A reader taking the snapshot
//! is the keepalive: the watchdog is refreshed only when the previous
//! snapshot was consumed, so moves halt once nobody is listening.

use defmt::*;
use embassy_time::{Duration, Ticker};

use crate::channels::STATUS;
use crate::motion::{now_ms, with_engine};

/// Snapshot period
const TELEMETRY_PERIOD_MS: u64 = 100;

#[embassy_executor::task]
pub async fn telemetry_task() {
    info!("Telemetry task started");

    let mut ticker = Ticker::every(Duration::from_millis(TELEMETRY_PERIOD_MS));
    loop {
        ticker.next().await;

        let consumed = !STATUS.signaled();
        let now = now_ms();
        let status = with_engine(|e| {
            if consumed {
                e.safety().update_watchdog(now);
            }
            e.status()
        });
        if let Some(status) = status {
            STATUS.signal(status);
        }
    }
}
