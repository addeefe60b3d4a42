//! Engine-wide request task
//!
//! Applies control-gate, brake, safety toggle, tuning and homing requests
//! from the command layer. A position set is applied to the engine first
//! and its counter write sent to the encoder link afterwards.

use defmt::*;
use embassy_time::Timer;

use crate::channels::CONTROL;
use crate::motion::{with_engine, ENCODERS};

#[embassy_executor::task]
pub async fn control_task() {
    info!("Control task started");

    loop {
        let command = CONTROL.receive().await;

        let applied = match with_engine(|e| e.apply(command)) {
            Some(Ok(applied)) => applied,
            Some(Err(e)) => {
                warn!("{:?} rejected: {:?}", command, e);
                continue;
            }
            None => {
                warn!("Motion engine not ready, dropped {:?}", command);
                continue;
            }
        };

        if let Some(write) = applied.write {
            let mut encoders = ENCODERS.lock().await;
            match encoders.as_mut().map(|link| write.send(link)) {
                Some(Ok(())) => {}
                Some(Err(_)) => error!("{:?}: encoder write failed", command),
                None => warn!("{:?}: encoder link not ready", command),
            }
        }

        match applied.settle_ms {
            Some(settle_ms) => {
                info!("{:?} applied, waiting {} ms for the brakes", command, settle_ms);
                Timer::after_millis(settle_ms as u64).await;
            }
            None => debug!("{:?} applied", command),
        }
    }
}
