//! Host-side stand-ins for the hardware contracts

use crate::axis::Direction;
use crate::traits::{Limits, PositionSource, SafetyIo, StepTimer, TimerError, MAX_STEP_FREQ_HZ};

#[derive(Debug, Default)]
pub struct FakeSafetyIo {
    pub brakes_released: bool,
    pub shutdown: bool,
    pub probe_extended: bool,
    pub touching: bool,
}

impl SafetyIo for FakeSafetyIo {
    fn set_brakes_released(&mut self, released: bool) {
        self.brakes_released = released;
    }

    fn set_shutdown(&mut self, shutdown: bool) {
        self.shutdown = shutdown;
    }

    fn set_probe_extended(&mut self, extended: bool) {
        self.probe_extended = extended;
    }

    fn probe_touching(&self) -> bool {
        self.touching
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError;

/// Encoder peripheral with three channels (X, Y, Z)
#[derive(Debug, Default)]
pub struct SimEncoder {
    counts: [i32; 3],
    targets: [i32; 3],
    directions: [Option<Direction>; 3],
    pub limits: Limits,
    pub fail: bool,
    pub acks: u32,
    touched: bool,
}

fn index(axis: char) -> usize {
    (axis as u8 - b'X') as usize
}

impl SimEncoder {
    pub fn set_count(&mut self, axis: char, counts: i32) {
        self.counts[index(axis)] = counts;
    }

    pub fn count(&self, axis: char) -> i32 {
        self.counts[index(axis)]
    }

    pub fn target(&self, axis: char) -> i32 {
        self.targets[index(axis)]
    }

    pub fn direction(&self, axis: char) -> Option<Direction> {
        self.directions[index(axis)]
    }

    pub fn is_untouched(&self) -> bool {
        !self.touched
    }

    fn access(&mut self) -> Result<(), SimError> {
        self.touched = true;
        if self.fail {
            Err(SimError)
        } else {
            Ok(())
        }
    }
}

impl PositionSource for SimEncoder {
    type Error = SimError;

    fn read_position(&mut self, axis: char) -> Result<i32, SimError> {
        self.access()?;
        Ok(self.counts[index(axis)])
    }

    fn set_target(&mut self, axis: char, counts: i32) -> Result<(), SimError> {
        self.access()?;
        self.targets[index(axis)] = counts;
        Ok(())
    }

    fn set_counter(&mut self, axis: char, counts: i32) -> Result<(), SimError> {
        self.access()?;
        self.counts[index(axis)] = counts;
        Ok(())
    }

    fn set_direction(&mut self, axis: char, direction: Direction) -> Result<(), SimError> {
        self.access()?;
        self.directions[index(axis)] = Some(direction);
        Ok(())
    }

    fn read_limits(&mut self) -> Result<Limits, SimError> {
        self.access()?;
        Ok(self.limits)
    }

    fn acknowledge_limits(&mut self) -> Result<Limits, SimError> {
        self.access()?;
        self.acks += 1;
        Ok(self.limits)
    }
}

/// Step timer that records how it was programmed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MockTimer {
    pub freq: u32,
    pub started: bool,
    pub programmed: u32,
    pub stops: u32,
    /// Refuse every rate with this error
    pub reject: Option<TimerError>,
}

impl StepTimer for MockTimer {
    fn set_frequency(&mut self, hz: u32) -> Result<(), TimerError> {
        if hz > MAX_STEP_FREQ_HZ {
            return Err(TimerError::FrequencyTooHigh);
        }
        if let Some(e) = self.reject {
            return Err(e);
        }
        self.freq = hz;
        self.programmed += 1;
        Ok(())
    }

    fn start(&mut self) {
        self.started = true;
    }

    fn stop(&mut self) {
        self.started = false;
        self.stops += 1;
    }

    fn is_started(&self) -> bool {
        self.started
    }
}
