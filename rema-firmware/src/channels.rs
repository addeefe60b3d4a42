//! Inter-task communication channels
//!
//! Static channels and signals between the command layer, the motion
//! tasks and the step-timer interrupt.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use embassy_sync::signal::Signal;

use rema_core::command::{AxesCommand, EngineCommand};
use rema_core::engine::PairId;
use rema_core::status::EngineStatus;

/// Queue depth per axis pair
pub const COMMAND_QUEUE_SIZE: usize = 5;

/// Queue depth for engine-wide requests
pub const CONTROL_QUEUE_SIZE: usize = 4;

/// Move and stop requests for the XY pair
pub static XY_COMMANDS: Channel<CriticalSectionRawMutex, AxesCommand, COMMAND_QUEUE_SIZE> = Channel::new();

/// Move and stop requests for the Z pair
pub static Z_COMMANDS: Channel<CriticalSectionRawMutex, AxesCommand, COMMAND_QUEUE_SIZE> = Channel::new();

/// Engine-wide requests (control gate, brakes, tuning, homing)
pub static CONTROL: Channel<CriticalSectionRawMutex, EngineCommand, CONTROL_QUEUE_SIZE> = Channel::new();

/// Supervisor wake for the XY pair (signalled from the step interrupt)
pub static XY_WAKE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Supervisor wake for the Z pair
pub static Z_WAKE: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Held by the command task during a move dispatch and by the supervisor
/// task for each pass
pub static XY_GATE: Mutex<CriticalSectionRawMutex, ()> = Mutex::new(());

pub static Z_GATE: Mutex<CriticalSectionRawMutex, ()> = Mutex::new(());

/// Latest telemetry snapshot
///
/// The telemetry task only refreshes the keepalive watchdog once a reader
/// has taken the previous snapshot.
pub static STATUS: Signal<CriticalSectionRawMutex, EngineStatus> = Signal::new();

pub fn commands(id: PairId) -> &'static Channel<CriticalSectionRawMutex, AxesCommand, COMMAND_QUEUE_SIZE> {
    match id {
        PairId::Xy => &XY_COMMANDS,
        PairId::Z => &Z_COMMANDS,
    }
}

pub fn wake(id: PairId) -> &'static Signal<CriticalSectionRawMutex, ()> {
    match id {
        PairId::Xy => &XY_WAKE,
        PairId::Z => &Z_WAKE,
    }
}

pub fn gate(id: PairId) -> &'static Mutex<CriticalSectionRawMutex, ()> {
    match id {
        PairId::Xy => &XY_GATE,
        PairId::Z => &Z_GATE,
    }
}
