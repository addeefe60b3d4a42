//! Bresenham step synchronizer
//!
//! Interleaves step pulses for two axes so both arrive together along a
//! straight line. The accumulator starts at `first_delta - second_delta`;
//! every first-axis step subtracts `second_delta` and every second-axis
//! step adds `first_delta`, so its drift from the start value is the
//! cross product `second_steps * first_delta - first_steps * second_delta`,
//! i.e. how far the path has strayed from the ideal line.

/// Which step lines to toggle on this edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepPulses {
    pub first: bool,
    pub second: bool,
}

impl StepPulses {
    pub fn any(&self) -> bool {
        self.first || self.second
    }
}

/// Axis with the larger remaining distance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Leader {
    First,
    Second,
}

/// Error accumulator for one synchronized move
#[derive(Debug, Clone, Default)]
pub struct Bresenham {
    first_delta: u32,
    second_delta: u32,
    /// Widened so the doubled value cannot overflow
    error: i64,
}

impl Bresenham {
    pub fn new(first_delta: u32, second_delta: u32) -> Self {
        Self {
            first_delta,
            second_delta,
            error: first_delta as i64 - second_delta as i64,
        }
    }

    pub fn leader(&self) -> Leader {
        if self.first_delta > self.second_delta {
            Leader::First
        } else {
            Leader::Second
        }
    }

    pub fn error(&self) -> i64 {
        self.error
    }

    /// Advance one edge
    ///
    /// An axis already at its target is not stepped, but the accumulator
    /// is updated as if it were so the other axis keeps its cadence.
    pub fn step(&mut self, first_there: bool, second_there: bool) -> StepPulses {
        let error2 = self.error << 1;
        let mut pulses = StepPulses::default();

        if error2 >= -(self.second_delta as i64) {
            self.error -= self.second_delta as i64;
            pulses.first = !first_there;
        }
        if error2 <= self.first_delta as i64 {
            self.error += self.first_delta as i64;
            pulses.second = !second_there;
        }
        pulses
    }
}
