//! Safety supervisor
//!
//! Holds the control-enable gate, the brake policy, the keepalive watchdog
//! and the touch-probe settings. One instance is shared by reference with
//! every coordinator; all state is behind atomics or a critical-section
//! cell, so queries are safe from interrupt context.

use core::cell::RefCell;

use critical_section::Mutex;
use portable_atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::SafetyConfig;
use crate::traits::SafetyIo;

/// Keepalive timeout
pub const WATCHDOG_TIME_MS: u32 = 1000;

/// Time the brakes need to disengage after release
pub const BRAKES_RELEASE_DELAY_MS: u32 = 200;

/// Brake relay policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum BrakesMode {
    /// Brakes held released
    Off = 0,
    /// Released for each move, applied when the pair stops
    #[default]
    Auto = 1,
    /// Brakes held applied, moves on braked pairs are rejected
    On = 2,
}

impl BrakesMode {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => BrakesMode::Off,
            2 => BrakesMode::On,
            _ => BrakesMode::Auto,
        }
    }

    fn allows_release(self) -> bool {
        matches!(self, BrakesMode::Auto | BrakesMode::Off)
    }

    fn allows_apply(self) -> bool {
        matches!(self, BrakesMode::Auto | BrakesMode::On)
    }
}

/// Result of a brake release request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BrakeRelease {
    /// Relay switched, wait this many milliseconds before moving
    Settle(u32),
    /// Brakes were already released
    AlreadyReleased,
    /// The current mode keeps the brakes applied
    NotPermitted,
}

/// Process-wide safety state
pub struct SafetySupervisor<IO> {
    io: Mutex<RefCell<IO>>,
    control_enabled: AtomicBool,
    brakes_mode: AtomicU8,
    brakes_released: AtomicBool,
    stall_control: AtomicBool,
    touch_probe_protection: AtomicBool,
    touch_probe_debounce_ms: AtomicU32,
    last_keepalive_ms: AtomicU32,
    last_probe_release_ms: AtomicU32,
}

impl<IO: SafetyIo> SafetySupervisor<IO> {
    /// Create a supervisor with control disabled
    ///
    /// Call [`init_outputs`](Self::init_outputs) once before use to put the
    /// relays in their safe state.
    pub fn new(io: IO, config: &SafetyConfig) -> Self {
        Self {
            io: Mutex::new(RefCell::new(io)),
            control_enabled: AtomicBool::new(false),
            brakes_mode: AtomicU8::new(config.brakes_mode as u8),
            brakes_released: AtomicBool::new(false),
            stall_control: AtomicBool::new(config.stall_control),
            touch_probe_protection: AtomicBool::new(config.touch_probe_protection),
            touch_probe_debounce_ms: AtomicU32::new(config.touch_probe_debounce_ms),
            last_keepalive_ms: AtomicU32::new(0),
            last_probe_release_ms: AtomicU32::new(0),
        }
    }

    pub(crate) fn with_io<R>(&self, f: impl FnOnce(&mut IO) -> R) -> R {
        critical_section::with(|cs| f(&mut self.io.borrow_ref_mut(cs)))
    }

    /// Apply the brakes and shut the drivers down
    pub fn init_outputs(&self) {
        self.brakes_apply();
        self.with_io(|io| io.set_shutdown(true));
    }

    /// Open or close the control gate
    ///
    /// Also drives the driver shutdown line. Clearing stall flags on enable
    /// is done by [`MotionEngine::set_control_enabled`](crate::engine::MotionEngine::set_control_enabled),
    /// which owns the axes.
    pub fn control_enabled_set(&self, enabled: bool) {
        self.control_enabled.store(enabled, Ordering::Relaxed);
        self.with_io(|io| io.set_shutdown(!enabled));
    }

    /// Check the control gate
    pub fn control_enabled(&self) -> bool {
        self.control_enabled.load(Ordering::Relaxed)
    }

    /// Current brake policy
    pub fn brakes_mode(&self) -> BrakesMode {
        BrakesMode::from_u8(self.brakes_mode.load(Ordering::Relaxed))
    }

    /// Change the brake policy
    ///
    /// `Off` releases the brakes right away and `On` applies them. Returns
    /// the relay settle time when the caller has to wait for it.
    pub fn set_brakes_mode(&self, mode: BrakesMode) -> Option<u32> {
        self.brakes_mode.store(mode as u8, Ordering::Relaxed);
        match mode {
            BrakesMode::Off => match self.brakes_release() {
                BrakeRelease::Settle(ms) => Some(ms),
                _ => None,
            },
            BrakesMode::Auto => None,
            BrakesMode::On => {
                self.brakes_apply();
                None
            }
        }
    }

    /// Release the brakes if the policy permits
    ///
    /// Never waits itself; a `Settle` result must be honoured by the caller
    /// before stepping starts.
    pub fn brakes_release(&self) -> BrakeRelease {
        if !self.brakes_mode().allows_release() {
            return BrakeRelease::NotPermitted;
        }
        if self.brakes_released.swap(true, Ordering::Relaxed) {
            return BrakeRelease::AlreadyReleased;
        }
        self.with_io(|io| io.set_brakes_released(true));
        BrakeRelease::Settle(BRAKES_RELEASE_DELAY_MS)
    }

    /// Apply the brakes if the policy permits
    pub fn brakes_apply(&self) {
        if !self.brakes_mode().allows_apply() {
            return;
        }
        self.brakes_released.store(false, Ordering::Relaxed);
        self.with_io(|io| io.set_brakes_released(false));
    }

    /// Check if the brake relay is released
    pub fn brakes_released(&self) -> bool {
        self.brakes_released.load(Ordering::Relaxed)
    }

    /// Record a keepalive
    pub fn update_watchdog(&self, now_ms: u32) {
        self.last_keepalive_ms.store(now_ms, Ordering::Relaxed);
    }

    /// Check if the last keepalive is older than [`WATCHDOG_TIME_MS`]
    pub fn is_watchdog_expired(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.last_keepalive_ms.load(Ordering::Relaxed)) > WATCHDOG_TIME_MS
    }

    pub fn stall_control(&self) -> bool {
        self.stall_control.load(Ordering::Relaxed)
    }

    pub fn set_stall_control(&self, enabled: bool) {
        self.stall_control.store(enabled, Ordering::Relaxed);
    }

    pub fn touch_probe_protection(&self) -> bool {
        self.touch_probe_protection.load(Ordering::Relaxed)
    }

    pub fn set_touch_probe_protection(&self, enabled: bool) {
        self.touch_probe_protection.store(enabled, Ordering::Relaxed);
    }

    pub fn touch_probe_debounce_ms(&self) -> u32 {
        self.touch_probe_debounce_ms.load(Ordering::Relaxed)
    }

    pub fn set_touch_probe_debounce_ms(&self, ms: u32) {
        self.touch_probe_debounce_ms.store(ms, Ordering::Relaxed);
    }

    /// Read the probe contact
    pub fn is_touch_probe_touching(&self) -> bool {
        self.with_io(|io| io.probe_touching())
    }

    pub fn touch_probe_extend(&self) {
        self.with_io(|io| io.set_probe_extended(true));
    }

    pub fn touch_probe_retract(&self) {
        self.with_io(|io| io.set_probe_extended(false));
    }

    /// Debounce a probe input edge
    ///
    /// Returns true for a contact edge arriving more than the debounce time
    /// after the last accepted release. Releases inside the debounce window
    /// are ignored.
    pub fn probe_edge(&self, touching: bool, now_ms: u32) -> bool {
        let since = now_ms.wrapping_sub(self.last_probe_release_ms.load(Ordering::Relaxed));
        let settled = since > self.touch_probe_debounce_ms();
        if !touching {
            if settled {
                self.last_probe_release_ms.store(now_ms, Ordering::Relaxed);
            }
            return false;
        }
        settled
    }

    /// Run a closure with the physical I/O
    ///
    /// Used by tests and board bring-up to inspect relay state.
    pub fn io<R>(&self, f: impl FnOnce(&IO) -> R) -> R {
        critical_section::with(|cs| f(&self.io.borrow_ref(cs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSafetyIo;

    fn supervisor() -> SafetySupervisor<FakeSafetyIo> {
        let s = SafetySupervisor::new(FakeSafetyIo::default(), &SafetyConfig::default());
        s.init_outputs();
        s
    }

    #[test]
    fn test_defaults() {
        let s = supervisor();
        assert!(!s.control_enabled());
        assert_eq!(s.brakes_mode(), BrakesMode::Auto);
        assert!(s.stall_control());
        assert!(s.touch_probe_protection());
        assert!(s.io(|io| io.shutdown));
        assert!(!s.io(|io| io.brakes_released));
    }

    #[test]
    fn test_control_drives_shutdown_line() {
        let s = supervisor();
        s.control_enabled_set(true);
        assert!(s.control_enabled());
        assert!(!s.io(|io| io.shutdown));

        s.control_enabled_set(false);
        assert!(s.io(|io| io.shutdown));
    }

    #[test]
    fn test_release_waits_once() {
        let s = supervisor();
        assert_eq!(s.brakes_release(), BrakeRelease::Settle(BRAKES_RELEASE_DELAY_MS));
        assert!(s.io(|io| io.brakes_released));
        assert_eq!(s.brakes_release(), BrakeRelease::AlreadyReleased);

        s.brakes_apply();
        assert!(!s.brakes_released());
        assert_eq!(s.brakes_release(), BrakeRelease::Settle(BRAKES_RELEASE_DELAY_MS));
    }

    #[test]
    fn test_mode_on_blocks_release() {
        let s = supervisor();
        s.set_brakes_mode(BrakesMode::On);
        assert_eq!(s.brakes_release(), BrakeRelease::NotPermitted);
        assert!(!s.io(|io| io.brakes_released));
    }

    #[test]
    fn test_mode_off_keeps_brakes_released() {
        let s = supervisor();
        assert_eq!(s.set_brakes_mode(BrakesMode::Off), Some(BRAKES_RELEASE_DELAY_MS));
        s.brakes_apply();
        assert!(s.brakes_released());
        assert!(s.io(|io| io.brakes_released));
    }

    #[test]
    fn test_mode_on_applies_immediately() {
        let s = supervisor();
        s.brakes_release();
        s.set_brakes_mode(BrakesMode::On);
        assert!(!s.io(|io| io.brakes_released));
    }

    #[test]
    fn test_watchdog() {
        let s = supervisor();
        s.update_watchdog(5_000);
        assert!(!s.is_watchdog_expired(5_000 + WATCHDOG_TIME_MS));
        assert!(s.is_watchdog_expired(5_000 + WATCHDOG_TIME_MS + 1));

        s.update_watchdog(6_500);
        assert!(!s.is_watchdog_expired(6_600));
    }

    #[test]
    fn test_watchdog_across_wraparound() {
        let s = supervisor();
        s.update_watchdog(u32::MAX - 100);
        assert!(!s.is_watchdog_expired(200));
        assert!(s.is_watchdog_expired(WATCHDOG_TIME_MS));
    }

    #[test]
    fn test_probe_actuator() {
        let s = supervisor();
        s.touch_probe_extend();
        assert!(s.io(|io| io.probe_extended));
        s.touch_probe_retract();
        assert!(!s.io(|io| io.probe_extended));
    }

    #[test]
    fn test_probe_debounce() {
        let s = supervisor();
        s.set_touch_probe_debounce_ms(50);

        // Release at t=100, bounce back at t=120 is ignored
        assert!(!s.probe_edge(false, 100));
        assert!(!s.probe_edge(true, 120));
        // Real contact later
        assert!(s.probe_edge(true, 200));
    }
}
