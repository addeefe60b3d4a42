//! Motion engine storage and the step-timer interrupt
//!
//! The engine lives in a critical-section cell shared by the tasks and the
//! `PWM_IRQ_WRAP` handler. Tasks hold it only for the duration of one core
//! call; the encoder link sits behind its own async mutex and is always
//! locked before the engine.

use core::cell::RefCell;

use defmt::*;
use embassy_rp::interrupt;
use embassy_rp::interrupt::{InterruptExt, Priority};
use embassy_rp::peripherals::SPI0;
use embassy_rp::spi::{Blocking, Spi};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use embassy_time::Instant;

use rema_core::engine::{MotionEngine, PairId};
use rema_drivers::{EncoderLink, GpioSafetyIo};
use rema_hal::OutputPin;
use rema_hal_rp2040::{BlockingSpi, PwmStepTimer, RpOutput};

use crate::channels::wake;
use crate::tasks::ProbeLevel;

/// PWM slice timing the XY pair
pub const XY_SLICE: usize = 0;

/// PWM slice timing the Z pair
pub const Z_SLICE: usize = 1;

pub type SafetyPins = GpioSafetyIo<RpOutput<'static>, RpOutput<'static>, RpOutput<'static>, ProbeLevel>;

pub type Engine = MotionEngine<'static, PwmStepTimer<'static>, SafetyPins>;

pub type Encoders = EncoderLink<BlockingSpi<Spi<'static, SPI0, Blocking>>, RpOutput<'static>>;

/// Step outputs of one pair (a dummy partner has none)
pub struct StepLines {
    first: RpOutput<'static>,
    second: Option<RpOutput<'static>>,
}

impl StepLines {
    pub fn new(first: RpOutput<'static>, second: Option<RpOutput<'static>>) -> Self {
        Self { first, second }
    }
}

/// Engine plus the step lines the interrupt toggles
pub struct Motion {
    engine: Engine,
    xy: StepLines,
    z: StepLines,
}

impl Motion {
    pub fn new(engine: Engine, xy: StepLines, z: StepLines) -> Self {
        Self { engine, xy, z }
    }

    fn step_edge(&mut self, id: PairId, now_ms: u32) {
        let edge = self.engine.pair_mut(id).on_step_edge(now_ms);
        let lines = match id {
            PairId::Xy => &mut self.xy,
            PairId::Z => &mut self.z,
        };
        if edge.pulses.first {
            lines.first.toggle();
        }
        if edge.pulses.second {
            if let Some(second) = lines.second.as_mut() {
                second.toggle();
            }
        }
        if edge.wake_supervisor {
            wake(id).signal(());
        }
    }
}

static MOTION: BlockingMutex<CriticalSectionRawMutex, RefCell<Option<Motion>>> =
    BlockingMutex::new(RefCell::new(None));

/// Encoder peripheral link, shared by every task that touches positions
pub static ENCODERS: Mutex<CriticalSectionRawMutex, Option<Encoders>> = Mutex::new(None);

/// Store the engine and unmask the step interrupt
pub fn install(motion: Motion) {
    MOTION.lock(|cell| cell.replace(Some(motion)));

    interrupt::PWM_IRQ_WRAP.set_priority(Priority::P1);
    unsafe { interrupt::PWM_IRQ_WRAP.enable() };
    info!("Step interrupt enabled");
}

/// Run `f` with exclusive access to the engine
///
/// Returns `None` before [`install`].
pub fn with_engine<R>(f: impl FnOnce(&mut Engine) -> R) -> Option<R> {
    MOTION.lock(|cell| cell.borrow_mut().as_mut().map(|motion| f(&mut motion.engine)))
}

/// Milliseconds since boot, wrapping
pub fn now_ms() -> u32 {
    Instant::now().as_millis() as u32
}

#[interrupt]
fn PWM_IRQ_WRAP() {
    let xy = PwmStepTimer::take_wrap(XY_SLICE);
    let z = PwmStepTimer::take_wrap(Z_SLICE);
    let now = now_ms();

    MOTION.lock(|cell| {
        if let Some(motion) = cell.borrow_mut().as_mut() {
            if xy {
                motion.step_edge(PairId::Xy, now);
            }
            if z {
                motion.step_edge(PairId::Z, now);
            }
        }
    });
}
