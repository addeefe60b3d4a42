//! Peripheral drivers
//!
//! Concrete implementations of the `rema-core` hardware contracts on top
//! of the `rema-hal` bus and pin traits:
//!
//! - Quadrature encoder peripheral over SPI (positions, target
//!   comparators, direction lines, limit switches)
//! - Relay and probe GPIO for the safety supervisor

#![no_std]
#![deny(unsafe_code)]

pub mod encoders;
pub mod safety_io;

pub use encoders::{EncoderError, EncoderLink};
pub use safety_io::GpioSafetyIo;
