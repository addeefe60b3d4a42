//! Telemetry snapshots

use crate::safety::BrakesMode;

/// Axis telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AxisStatus {
    pub name: char,
    pub current_counts: i32,
    pub destination_counts: i32,
    pub stalled: bool,
    pub already_there: bool,
}

/// Axis pair telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PairStatus {
    pub first: AxisStatus,
    pub second: AxisStatus,
    pub is_moving: bool,
    /// Last commanded step rate, 0 when stopped
    pub current_freq: u32,
    pub already_there: bool,
    pub was_soft_stopped: bool,
    pub was_stopped_by_probe: bool,
    pub was_stopped_by_probe_protection: bool,
}

impl PairStatus {
    /// Arrived at a commanded target (not at a soft-stop point)
    pub fn on_condition(&self) -> bool {
        self.already_there && !self.was_soft_stopped
    }
}

/// Whole-engine telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EngineStatus {
    pub xy: PairStatus,
    pub z: PairStatus,
    pub control_enabled: bool,
    pub stall_control: bool,
    pub brakes_mode: BrakesMode,
    pub touch_probe_protection: bool,
    pub probe_touching: bool,
}
