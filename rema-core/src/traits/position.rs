//! Position and limit source contract
//!
//! The encoder counters, the per-axis target comparators and the limit
//! switch inputs live on an external peripheral. Axes are identified by
//! their single-character name.

use crate::axis::Direction;

/// Hard-limit inputs that stop motion
pub const HARD_LIMITS_MASK: u8 = 0b0011_1111;

/// Limit switch and target-reached snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Limits {
    /// Hard-limit input bits
    pub hard: u8,
    /// Target-reached bits (bit 0 = X, bit 1 = Y, bit 2 = Z)
    pub targets: u8,
}

impl Limits {
    /// Check if any enabled hard-limit input is active
    pub fn hard_limit_hit(&self) -> bool {
        self.hard & HARD_LIMITS_MASK != 0
    }

    /// Check the target-reached bit for an axis index
    pub fn target_reached(&self, bit: u8) -> bool {
        self.targets & (1 << bit) != 0
    }
}

/// External position/limit source
///
/// Calls may block on a bus transfer but never on the motion engine.
pub trait PositionSource {
    /// Error type for bus failures
    type Error;

    /// Read the raw encoder counter of an axis
    fn read_position(&mut self, axis: char) -> Result<i32, Self::Error>;

    /// Program the target comparator of an axis
    fn set_target(&mut self, axis: char, counts: i32) -> Result<(), Self::Error>;

    /// Overwrite the encoder counter of an axis
    fn set_counter(&mut self, axis: char, counts: i32) -> Result<(), Self::Error>;

    /// Set the direction line of an axis
    fn set_direction(&mut self, axis: char, direction: Direction) -> Result<(), Self::Error>;

    /// Read the limit and target-reached state
    fn read_limits(&mut self) -> Result<Limits, Self::Error>;

    /// Read the limit state and acknowledge the pending interrupt
    fn acknowledge_limits(&mut self) -> Result<Limits, Self::Error>;
}
