//! REMA - Remote Terminal Unit Motion Firmware
//!
//! Firmware binary for the RP2040 motion board of a three-axis CNC stage.
//! The engine, the encoder link and the safety I/O are wired together
//! here; everything else runs in the spawned tasks and the step
//! interrupt.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::gpio::{Input, Level, Output, Pull};
use embassy_rp::spi::Spi;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use rema_core::axis::POSITION_THRESHOLD;
use rema_core::config::EngineConfig;
use rema_core::engine::{MotionEngine, PairId};
use rema_core::safety::SafetySupervisor;
use rema_drivers::{EncoderLink, GpioSafetyIo};
use rema_hal::spi::SpiConfig;
use rema_hal_rp2040::spi::rp_config;
use rema_hal_rp2040::{BlockingSpi, PwmStepTimer, RpOutput};

use crate::motion::{Motion, SafetyPins, StepLines, ENCODERS, XY_SLICE, Z_SLICE};
use crate::tasks::ProbeLevel;

mod channels;
mod motion;
mod tasks;

/// Board description validated and serialized by the build script
const CONFIG_BLOB: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/config.bin"));

/// Encoder peripheral clock
const ENCODER_SPI_HZ: u32 = 1_000_000;

static SAFETY: StaticCell<SafetySupervisor<SafetyPins>> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("REMA motion firmware starting...");

    let p = embassy_rp::init(Default::default());
    info!("Peripherals initialized");

    let config = load_config();

    // Relays and probe come up safe before anything else runs
    let safety_io = GpioSafetyIo::new(
        RpOutput::new(Output::new(p.PIN_6, Level::Low)),
        RpOutput::new(Output::new(p.PIN_7, Level::High)),
        RpOutput::new(Output::new(p.PIN_8, Level::High)),
        ProbeLevel,
    );
    let safety = SAFETY.init(SafetySupervisor::new(safety_io, &config.safety));
    safety.init_outputs();
    let safety = &*safety;

    // Encoder peripheral
    let spi_config = SpiConfig {
        frequency: ENCODER_SPI_HZ,
        ..Default::default()
    };
    let spi = Spi::new_blocking(p.SPI0, p.PIN_18, p.PIN_19, p.PIN_16, rp_config(&spi_config));
    let cs = RpOutput::new(Output::new(p.PIN_17, Level::High));
    let mut encoders = EncoderLink::new(BlockingSpi::new(spi), cs);
    match encoders.init(POSITION_THRESHOLD) {
        Ok(limits) => info!("Encoder link up, limits {=u8:b}", limits.hard),
        Err(e) => error!("Encoder init failed: {:?}", Debug2Format(&e)),
    }
    *ENCODERS.lock().await = Some(encoders);

    // Step timers and lines
    let xy_timer = PwmStepTimer::new(p.PWM_SLICE0, XY_SLICE);
    let z_timer = PwmStepTimer::new(p.PWM_SLICE1, Z_SLICE);
    let engine = MotionEngine::new(&config, xy_timer, z_timer, safety);

    let xy_lines = StepLines::new(
        RpOutput::new(Output::new(p.PIN_2, Level::Low)),
        Some(RpOutput::new(Output::new(p.PIN_3, Level::Low))),
    );
    let z_lines = StepLines::new(RpOutput::new(Output::new(p.PIN_4, Level::Low)), None);
    motion::install(Motion::new(engine, xy_lines, z_lines));

    let limits_irq = Input::new(p.PIN_20, Pull::Down);
    let probe_input = Input::new(p.PIN_9, Pull::Down);

    // Spawn tasks
    for id in PairId::ALL {
        spawner.spawn(tasks::command_task(id)).unwrap();
        spawner.spawn(tasks::supervisor_task(id)).unwrap();
    }
    spawner.spawn(tasks::limits_task(limits_irq)).unwrap();
    spawner.spawn(tasks::probe_task(probe_input)).unwrap();
    spawner.spawn(tasks::telemetry_task()).unwrap();
    spawner.spawn(tasks::control_task()).unwrap();

    info!("All tasks spawned, firmware running");

    loop {
        embassy_time::Timer::after_secs(60).await;
        trace!("Main loop heartbeat");
    }
}

/// Decode the embedded board description
///
/// Falls back to the built-in defaults if the blob does not decode.
fn load_config() -> EngineConfig {
    match postcard::from_bytes::<EngineConfig>(CONFIG_BLOB) {
        Ok(config) => {
            info!("Loaded machine config");
            config
        }
        Err(e) => {
            warn!("Embedded config unreadable ({:?}), using defaults", Debug2Format(&e));
            EngineConfig::default()
        }
    }
}
