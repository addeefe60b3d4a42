//! RP2040-specific HAL for the motion controller
//!
//! This crate provides RP2040 implementations of the shared `rema-hal`
//! traits and of the `rema-core` step timer contract:
//!
//! - GPIO output wrapper for step and relay lines
//! - Blocking SPI adapter for the encoder link
//! - PWM-slice step timer (one wrap interrupt per step edge)

#![no_std]

pub mod gpio;
pub mod spi;
pub mod step_timer;

pub use gpio::RpOutput;
pub use spi::BlockingSpi;
pub use step_timer::{PwmStepTimer, SYS_CLK_HZ};
