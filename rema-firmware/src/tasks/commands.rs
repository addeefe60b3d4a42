//! Per-pair command task
//!
//! Dequeues MOVE / SOFT_STOP / HARD_STOP requests and runs them against
//! the pair's coordinator. The pair's gate is held for the whole dispatch
//! so the supervisor task cannot interleave with a move start.
//!
//! Encoder transfers run with only the link held; the engine is locked
//! just to compute the move.

use defmt::*;
use embassy_time::Timer;

use rema_core::command::{AxesCommand, CommandError, Dispatch, MoveOutcome};
use rema_core::engine::PairId;

use crate::channels::{commands, gate};
use crate::motion::{now_ms, with_engine, ENCODERS};

/// Command task for one axis pair
#[embassy_executor::task(pool_size = 2)]
pub async fn command_task(id: PairId) {
    info!("{:?} command task started", id);

    let queue = commands(id);
    loop {
        let command = queue.receive().await;
        debug!("{:?}: {:?}", id, command);

        let _gate = gate(id).lock().await;
        match execute(id, command).await {
            Ok(Some(MoveOutcome::AlreadyThere)) => info!("{:?}: already there", id),
            Ok(Some(MoveOutcome::Started { frequency })) => {
                info!("{:?}: moving at {} Hz", id, frequency)
            }
            Ok(None) => {}
            Err(e) => warn!("{:?}: {:?} rejected: {:?}", id, command, e),
        }
    }
}

async fn execute(id: PairId, command: AxesCommand) -> Result<Option<MoveOutcome>, CommandError> {
    let Some(dispatch) = with_engine(|e| e.pair_mut(id).dispatch(command)) else {
        warn!("Motion engine not ready");
        return Ok(None);
    };

    let plan = match dispatch {
        Dispatch::Move(plan) => plan,
        Dispatch::Stopped => {
            info!("{:?}: stopped", id);
            return Ok(None);
        }
        Dispatch::Ignored => return Ok(None),
    };

    // Brake relay settle happens here, outside any critical section
    if let Some(Some(settle_ms)) = with_engine(|e| e.pair(id).prepare_move()).transpose()? {
        debug!("{:?}: brakes released, waiting {} ms", id, settle_ms);
        Timer::after_millis(settle_ms as u64).await;
    }

    let mut encoders = ENCODERS.lock().await;
    let Some(link) = encoders.as_mut() else {
        return Err(CommandError::PositionSource);
    };
    let Some(channels) = with_engine(|e| e.pair(id).channels()) else {
        return Ok(None);
    };
    let positions = channels.read(link);

    let now = now_ms();
    let Some(start) = with_engine(|e| e.pair_mut(id).start_move(plan, positions, now)) else {
        return Ok(None);
    };
    let start = start?;

    let flushed = start.writes.flush(link);
    with_engine(|e| e.pair_mut(id).complete_writes(flushed)).transpose()?;
    Ok(Some(start.outcome))
}
