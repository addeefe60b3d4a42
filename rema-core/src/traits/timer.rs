//! Step timer contract
//!
//! A step timer raises one interrupt per step-line edge. The owning
//! coordinator handles each edge with
//! [`Coordinator::on_step_edge`](crate::coordinator::Coordinator::on_step_edge).

/// Highest step rate any timer accepts
pub const MAX_STEP_FREQ_HZ: u32 = 500_000;

/// Step timer errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerError {
    /// Requested rate is above [`MAX_STEP_FREQ_HZ`]
    FrequencyTooHigh,
    /// Requested rate cannot be produced by the hardware
    FrequencyUnreachable,
}

/// Hardware step timer
///
/// Implementations program the hardware at twice the step rate, since a
/// step pulse is one rising and one falling edge.
pub trait StepTimer {
    /// Program the edge schedule for `hz` steps per second
    ///
    /// Fails without touching the hardware if `hz` exceeds
    /// [`MAX_STEP_FREQ_HZ`].
    fn set_frequency(&mut self, hz: u32) -> Result<(), TimerError>;

    /// Enable edge interrupts
    fn start(&mut self);

    /// Disable edge interrupts
    ///
    /// No edge is delivered after this returns.
    fn stop(&mut self);

    /// Check if edge interrupts are enabled
    fn is_started(&self) -> bool;

    /// Reprogram a running timer
    ///
    /// The old schedule is stopped first. If the new rate is rejected the
    /// timer stays stopped.
    fn change_frequency(&mut self, hz: u32) -> Result<(), TimerError> {
        self.stop();
        self.set_frequency(hz)?;
        self.start();
        Ok(())
    }
}
