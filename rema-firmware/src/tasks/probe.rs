//! Touch-probe input task
//!
//! Owns the probe input pin. Every edge updates the level seen by the
//! safety I/O and is passed to the engine, which stops all motion on a
//! debounced contact.

use defmt::*;
use embassy_rp::gpio::Input;
use portable_atomic::{AtomicBool, Ordering};

use rema_hal::InputPin;

use crate::motion::{now_ms, with_engine};

/// Last probe level read by [`probe_task`]
static PROBE_LEVEL: AtomicBool = AtomicBool::new(false);

/// Probe input as seen by the safety I/O
///
/// The pin itself belongs to [`probe_task`], which awaits its edges.
pub struct ProbeLevel;

impl InputPin for ProbeLevel {
    fn is_high(&self) -> bool {
        PROBE_LEVEL.load(Ordering::Relaxed)
    }
}

#[embassy_executor::task]
pub async fn probe_task(mut input: Input<'static>) {
    info!("Touch probe task started");
    PROBE_LEVEL.store(input.is_high(), Ordering::Relaxed);

    loop {
        input.wait_for_any_edge().await;
        let touching = input.is_high();
        PROBE_LEVEL.store(touching, Ordering::Relaxed);

        let now = now_ms();
        if with_engine(|e| e.on_touch_probe_edge(touching, now)) == Some(true) {
            warn!("Touch probe contact, all motion stopped");
        } else {
            trace!("Probe edge ignored (touching: {})", touching);
        }
    }
}
