//! Limit-switch interrupt task
//!
//! The encoder peripheral raises its interrupt line when a hard limit or
//! a target-reached bit changes. Both pairs are paused while the limit
//! register is read and acknowledged, then either stopped or resumed.

use defmt::*;
use embassy_rp::gpio::Input;

use rema_core::traits::PositionSource;

use crate::motion::{with_engine, ENCODERS};

#[embassy_executor::task]
pub async fn limits_task(mut irq: Input<'static>) {
    info!("Limits task started");

    loop {
        irq.wait_for_rising_edge().await;

        let mut encoders = ENCODERS.lock().await;
        let Some(link) = encoders.as_mut() else {
            continue;
        };

        with_engine(|e| e.pause_all());
        match link.acknowledge_limits() {
            Ok(limits) => {
                let Some(outcome) = with_engine(|e| e.on_limits(limits)) else {
                    continue;
                };
                if outcome.hard_limit {
                    error!("Hard limit reached (inputs {=u8:b}), all motion stopped", limits.hard);
                }
                if outcome.xy_arrived {
                    info!("XY: already there");
                }
                if outcome.z_arrived {
                    info!("Z: already there");
                }
            }
            Err(e) => {
                error!("Limit register read failed: {:?}, stopping", Debug2Format(&e));
                with_engine(|engine| engine.stop_all());
            }
        }
    }
}
