//! Proportional frequency controller with ramp-up
//!
//! The drive frequency is proportional to the leader axis position error,
//! clamped to `[out_min, out_max]`. During the first [`RAMP_STEPS`]
//! evaluations after [`Controller::restart`] the output is scaled up
//! linearly so a fresh move never starts at full speed. The ramped value
//! is floored back to `out_min`, so the output never leaves the clamp
//! range.

use crate::axis::distance;
use crate::config::{ConfigError, ControllerConfig};

/// Number of evaluations over which a fresh move ramps up
pub const RAMP_STEPS: u32 = 25;

/// Proportional controller
#[derive(Debug, Clone)]
pub struct Controller {
    gain: f32,
    out_min: u32,
    out_max: u32,
    /// Evaluations since the last restart (saturating)
    num_times_ran: u32,
}

impl Controller {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            gain: config.gain,
            out_min: config.min_freq,
            out_max: config.max_freq,
            num_times_ran: 0,
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn out_min(&self) -> u32 {
        self.out_min
    }

    pub fn out_max(&self) -> u32 {
        self.out_max
    }

    /// Evaluations since the last restart
    pub fn run_count(&self) -> u32 {
        self.num_times_ran
    }

    /// Change the gain; negative or non-finite values are ignored
    pub fn set_tunings(&mut self, gain: f32) {
        if !gain.is_finite() || gain < 0.0 {
            return;
        }
        self.gain = gain;
    }

    /// Change the output clamp
    pub fn set_output_limits(&mut self, min: u32, max: u32) -> Result<(), ConfigError> {
        let config = ControllerConfig {
            gain: self.gain,
            min_freq: min,
            max_freq: max,
        };
        config.validate()?;
        self.out_min = min;
        self.out_max = max;
        Ok(())
    }

    /// Re-enable the ramp for the next [`run`](Self::run)
    pub fn restart(&mut self) {
        self.num_times_ran = 0;
    }

    /// Clamped proportional output without the ramp
    pub fn run_unattenuated(&self, setpoint: i32, measured: i32) -> u32 {
        let p_term = self.gain * distance(setpoint, measured) as f32;
        if p_term >= self.out_max as f32 {
            self.out_max
        } else if p_term <= self.out_min as f32 {
            self.out_min
        } else {
            p_term as u32
        }
    }

    /// Clamped proportional output scaled by the ramp
    pub fn run(&mut self, setpoint: i32, measured: i32) -> u32 {
        let output = self.run_unattenuated(setpoint, measured);

        self.num_times_ran = self.num_times_ran.saturating_add(1);

        let ramped = if self.num_times_ran < RAMP_STEPS {
            (output as u64 * self.num_times_ran as u64 / RAMP_STEPS as u64) as u32
        } else {
            output
        };

        ramped.max(self.out_min)
    }
}
