//! Commands accepted by a coordinator and the errors they can produce

use crate::config::{ConfigError, ControllerConfig};
use crate::engine::PairId;
use crate::safety::BrakesMode;
use crate::traits::TimerError;

/// Request queued to a coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxesCommand {
    /// Move both axes to absolute positions (encoder counts)
    Move { first: i32, second: i32 },
    /// Decelerate over a short distance and stop
    SoftStop,
    /// Stop stepping immediately
    HardStop,
}

impl AxesCommand {
    /// Absolute move from positions in inches
    pub fn move_inches(first: f32, second: f32, first_counts_per_inch: u32, second_counts_per_inch: u32) -> Self {
        AxesCommand::Move {
            first: inches_to_counts(first, first_counts_per_inch),
            second: inches_to_counts(second, second_counts_per_inch),
        }
    }
}

/// Convert a distance in inches to encoder counts, saturating at the i32 range
pub fn inches_to_counts(inches: f32, counts_per_inch: u32) -> i32 {
    // `as` saturates float to int conversions
    (inches * counts_per_inch as f32) as i32
}

/// Engine-wide request from the command layer
///
/// Applied with [`MotionEngine::apply`](crate::engine::MotionEngine::apply).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EngineCommand {
    /// Open or close the control gate
    SetControlEnabled(bool),
    SetBrakesMode(BrakesMode),
    SetStallControl(bool),
    SetTouchProbeProtection(bool),
    SetTouchProbeDebounce { ms: u32 },
    /// Extend or retract the touch probe
    TouchProbe { extend: bool },
    /// Overwrite an axis position (homing)
    SetPosition { axis: char, counts: i32 },
    SetStallMaxCount { axis: char, count: u32 },
    SetTouchMaxCount { pair: PairId, count: u32 },
    /// Controller tuning and supervisor period of a pair
    SetTuning {
        pair: PairId,
        tuning: ControllerConfig,
        step_time_ms: u32,
    },
}

/// How the controller is seeded for a move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MoveKind {
    /// New move: the controller ramps up from zero
    Fresh,
    /// Shortened continuation of a running move: no ramp
    SoftStop,
}

/// Setpoints handed from command dispatch to move execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MovePlan {
    pub first: i32,
    pub second: i32,
    pub kind: MoveKind,
}

/// Result of dispatching a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Dispatch {
    /// A move must be executed
    Move(MovePlan),
    /// The pair was halted
    Stopped,
    /// Nothing to do (soft stop while idle)
    Ignored,
}

/// Outcome of a successful move request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MoveOutcome {
    /// Both axes were already within threshold
    AlreadyThere,
    /// Stepping started at this rate (Hz)
    Started { frequency: u32 },
}

/// Command-level failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Global control gate is closed
    ControlDisabled,
    /// Brakes are applied on a braked pair
    BrakesEngaged,
    /// The step timer refused the rate
    Timer(TimerError),
    /// The encoder peripheral could not be reached
    PositionSource,
    /// No axis with that name
    UnknownAxis(char),
    /// Rejected tuning value
    Config(ConfigError),
}

impl From<TimerError> for CommandError {
    fn from(e: TimerError) -> Self {
        CommandError::Timer(e)
    }
}

impl From<ConfigError> for CommandError {
    fn from(e: ConfigError) -> Self {
        CommandError::Config(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inches_to_counts() {
        assert_eq!(inches_to_counts(1.5, 20_000), 30_000);
        assert_eq!(inches_to_counts(-0.25, 20_000), -5_000);
        assert_eq!(inches_to_counts(1.0e9, 20_000), i32::MAX);
    }

    #[test]
    fn test_move_inches() {
        assert_eq!(
            AxesCommand::move_inches(1.0, -2.0, 20_000, 10_000),
            AxesCommand::Move {
                first: 20_000,
                second: -20_000
            }
        );
    }
}
