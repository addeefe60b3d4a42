//! GPIO wrappers
//!
//! Newtype around the embassy output driver so it can implement the
//! `rema-hal` pin trait. Inputs stay raw embassy `Input`s, owned by the
//! tasks that await their edges.

use embassy_rp::gpio::{Level, Output};

/// Push-pull output
pub struct RpOutput<'d>(Output<'d>);

impl<'d> RpOutput<'d> {
    pub fn new(pin: Output<'d>) -> Self {
        Self(pin)
    }
}

impl rema_hal::OutputPin for RpOutput<'_> {
    fn set_high(&mut self) {
        self.0.set_high();
    }

    fn set_low(&mut self) {
        self.0.set_low();
    }

    fn toggle(&mut self) {
        self.0.toggle();
    }

    fn set_state(&mut self, high: bool) {
        self.0.set_level(Level::from(high));
    }

    fn is_set_high(&self) -> bool {
        self.0.is_set_high()
    }
}
