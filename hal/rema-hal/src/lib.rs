//! REMA Hardware Abstraction Layer
//!
//! This crate defines the small set of hardware traits the motion
//! controller needs from a chip HAL, plus the timer arithmetic shared by
//! every step-timer implementation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application (rema-firmware)            │
//! └─────────────────────────────────────────┘
//!          │                      │
//!          ▼                      ▼
//! ┌─────────────────┐   ┌───────────────────┐
//! │  rema-drivers   │   │  rema-core        │
//! │  (encoder link, │   │  (StepTimer,      │
//! │   safety I/O)   │   │   PositionSource) │
//! └─────────────────┘   └───────────────────┘
//!          │                      │
//!          ▼                      │
//! ┌─────────────────────────────┐ │
//! │  rema-hal (this crate)      │ │
//! └─────────────────────────────┘ │
//!          │                      │
//!          ▼                      ▼
//! ┌─────────────────────────────────────────┐
//! │  rema-hal-rp2040                        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`], [`gpio::InputPin`] - Digital I/O (step lines, brakes, probe)
//! - [`spi::SpiBus`] - SPI link to the encoder peripheral
//! - [`timer`] - Step timer reload computation

#![no_std]
#![deny(unsafe_code)]

pub mod gpio;
pub mod spi;
pub mod timer;

// Re-export key traits at crate root for convenience
pub use gpio::{InputPin, OutputPin};
pub use spi::SpiBus;
pub use timer::{TimerDivider, TimerSettings};
