//! Hardware contracts
//!
//! These traits define what the motion engine needs from the outside
//! world. Chip HALs and drivers implement them; the core only calls them.

pub mod position;
pub mod safety_io;
pub mod timer;

pub use position::{Limits, PositionSource, HARD_LIMITS_MASK};
pub use safety_io::SafetyIo;
pub use timer::{StepTimer, TimerError, MAX_STEP_FREQ_HZ};
