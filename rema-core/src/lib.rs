//! Board-agnostic motion engine for the REMA remote terminal unit
//!
//! This crate contains all motion logic that does not depend on specific
//! hardware implementations:
//!
//! - Hardware contracts (step timer, position source, safety I/O)
//! - Axis state and stall detection
//! - Proportional frequency controller with ramp-up
//! - Bresenham synchronizer and the per-pair coordinator
//! - Encoder bus traffic planned outside the engine lock
//! - Safety supervisor (control gate, brakes, watchdog, touch probe)
//! - The motion engine context owning both axis pairs
//! - Configuration and telemetry types
//!
//! Nothing here reads a clock: every time-dependent operation takes the
//! current time in milliseconds.

#![no_std]
#![deny(unsafe_code)]

pub mod axis;
pub mod bresenham;
pub mod bus;
pub mod command;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod engine;
pub mod safety;
pub mod status;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;
