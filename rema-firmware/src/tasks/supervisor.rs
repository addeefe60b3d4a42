//! Per-pair supervisor task
//!
//! Woken by the step interrupt once per update period (and once more when
//! a move finishes). Each pass re-reads the encoders, runs the stall,
//! probe-protection and watchdog checks, and retunes the step rate.
//!
//! The encoder link is driven only while the engine is unlocked, so the
//! step interrupt of the other pair never waits on a transfer.

use defmt::*;

use rema_core::coordinator::SupervisorOutcome;
use rema_core::engine::PairId;

use crate::channels::{gate, wake};
use crate::motion::{now_ms, with_engine, ENCODERS};

/// Supervisor task for one axis pair
#[embassy_executor::task(pool_size = 2)]
pub async fn supervisor_task(id: PairId) {
    info!("{:?} supervisor task started", id);

    let signal = wake(id);
    loop {
        signal.wait().await;

        let _gate = gate(id).lock().await;
        let mut encoders = ENCODERS.lock().await;
        let Some(link) = encoders.as_mut() else {
            continue;
        };
        let Some(channels) = with_engine(|e| e.pair(id).channels()) else {
            continue;
        };
        let positions = channels.read(link);

        let now = now_ms();
        let Some(pass) = with_engine(|e| e.pair_mut(id).supervise_with(positions, now)) else {
            continue;
        };

        let mut outcome = pass.outcome;
        if !pass.writes.is_empty() {
            let flushed = pass.writes.flush(link);
            if let Some(Err(_)) = with_engine(|e| e.pair_mut(id).complete_writes(flushed)) {
                outcome = SupervisorOutcome::PositionFault;
            }
        }
        drop(encoders);

        match outcome {
            SupervisorOutcome::Idle => trace!("{:?}: idle", id),
            SupervisorOutcome::Continue { frequency } => trace!("{:?}: {} Hz", id, frequency),
            SupervisorOutcome::Stalled { first, second } => {
                error!(
                    "{:?}: stall detected (first: {}, second: {}), control disabled",
                    id, first, second
                )
            }
            SupervisorOutcome::ProbeProtection => warn!("{:?}: stopped by touch-probe protection", id),
            SupervisorOutcome::WatchdogExpired => warn!("{:?}: keepalive lost, stopped", id),
            SupervisorOutcome::PositionFault => error!("{:?}: encoder transfer failed, stopped", id),
            SupervisorOutcome::TimerFault(e) => error!("{:?}: step timer rejected rate: {:?}", id, e),
        }
    }
}
