//! Relay and probe GPIO
//!
//! Line levels:
//!
//! | Line            | High                | Low               |
//! |-----------------|---------------------|-------------------|
//! | brakes          | released            | applied           |
//! | shutdown        | drivers disabled    | drivers enabled   |
//! | probe actuator  | retracted           | extended          |
//! | probe input     | touching            | clear             |

use rema_core::traits::SafetyIo;
use rema_hal::{InputPin, OutputPin};

/// Safety I/O on four GPIO lines
pub struct GpioSafetyIo<B, S, P, I> {
    brakes: B,
    shutdown: S,
    probe_actuator: P,
    probe_input: I,
}

impl<B, S, P, I> GpioSafetyIo<B, S, P, I>
where
    B: OutputPin,
    S: OutputPin,
    P: OutputPin,
    I: InputPin,
{
    /// Take the pins and drive every output to its safe level
    ///
    /// Brakes applied, drivers shut down, probe retracted.
    pub fn new(brakes: B, shutdown: S, probe_actuator: P, probe_input: I) -> Self {
        let mut io = Self {
            brakes,
            shutdown,
            probe_actuator,
            probe_input,
        };
        io.set_brakes_released(false);
        io.set_shutdown(true);
        io.set_probe_extended(false);
        io
    }
}

impl<B, S, P, I> SafetyIo for GpioSafetyIo<B, S, P, I>
where
    B: OutputPin,
    S: OutputPin,
    P: OutputPin,
    I: InputPin,
{
    fn set_brakes_released(&mut self, released: bool) {
        self.brakes.set_state(released);
    }

    fn set_shutdown(&mut self, shutdown: bool) {
        self.shutdown.set_state(shutdown);
    }

    fn set_probe_extended(&mut self, extended: bool) {
        // Actuator is active low
        self.probe_actuator.set_state(!extended);
    }

    fn probe_touching(&self) -> bool {
        self.probe_input.is_high()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MockPin {
        high: bool,
    }

    impl OutputPin for MockPin {
        fn set_high(&mut self) {
            self.high = true;
        }

        fn set_low(&mut self) {
            self.high = false;
        }

        fn toggle(&mut self) {
            self.high = !self.high;
        }

        fn is_set_high(&self) -> bool {
            self.high
        }
    }

    impl InputPin for MockPin {
        fn is_high(&self) -> bool {
            self.high
        }
    }

    fn io() -> GpioSafetyIo<MockPin, MockPin, MockPin, MockPin> {
        GpioSafetyIo::new(
            MockPin::default(),
            MockPin::default(),
            MockPin::default(),
            MockPin::default(),
        )
    }

    #[test]
    fn test_starts_safe() {
        let io = io();
        assert!(io.brakes.is_set_low());
        assert!(io.shutdown.is_set_high());
        // Retracted probe holds the actuator line high
        assert!(io.probe_actuator.is_set_high());
    }

    #[test]
    fn test_line_levels() {
        let mut io = io();

        io.set_brakes_released(true);
        assert!(io.brakes.is_set_high());

        io.set_shutdown(false);
        assert!(io.shutdown.is_set_low());

        io.set_probe_extended(true);
        assert!(io.probe_actuator.is_set_low());
        io.set_probe_extended(false);
        assert!(io.probe_actuator.is_set_high());
    }

    #[test]
    fn test_probe_input() {
        let mut io = io();
        assert!(!io.probe_touching());
        io.probe_input.high = true;
        assert!(io.probe_touching());
    }
}
