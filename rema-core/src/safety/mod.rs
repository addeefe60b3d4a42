//! Safety supervision
//!
//! Process-wide interlocks shared by every coordinator.

pub mod supervisor;

pub use supervisor::{
    BrakeRelease, BrakesMode, SafetySupervisor, BRAKES_RELEASE_DELAY_MS, WATCHDOG_TIME_MS,
};
