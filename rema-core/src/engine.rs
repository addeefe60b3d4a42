//! Motion engine context
//!
//! Owns both axis pairs and routes the engine-wide events (hard limits,
//! limit-switch interrupts, touch-probe edges, control enable) to them.

use crate::bus::BusWrite;
use crate::command::{CommandError, EngineCommand};
use crate::config::EngineConfig;
use crate::coordinator::Coordinator;
use crate::safety::SafetySupervisor;
use crate::status::EngineStatus;
use crate::traits::{Limits, SafetyIo, StepTimer};

/// Axis pair selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PairId {
    Xy,
    Z,
}

impl PairId {
    pub const ALL: [PairId; 2] = [PairId::Xy, PairId::Z];
}

/// What a limit-switch interrupt did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LimitsOutcome {
    /// A hard limit was active; every pair was stopped
    pub hard_limit: bool,
    /// The XY pair reached its target
    pub xy_arrived: bool,
    /// The Z pair reached its target
    pub z_arrived: bool,
}

/// What an engine-wide request left for the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Applied {
    /// Brake relay settle time to wait out
    pub settle_ms: Option<u32>,
    /// Register write for the encoder peripheral
    pub write: Option<BusWrite>,
}

/// Both axis pairs plus the shared safety supervisor
pub struct MotionEngine<'a, T, IO> {
    xy: Coordinator<'a, T, IO>,
    z: Coordinator<'a, T, IO>,
    safety: &'a SafetySupervisor<IO>,
}

impl<'a, T: StepTimer, IO: SafetyIo> MotionEngine<'a, T, IO> {
    /// Build the engine from a validated configuration
    pub fn new(config: &EngineConfig, xy_timer: T, z_timer: T, safety: &'a SafetySupervisor<IO>) -> Self {
        Self {
            xy: Coordinator::new(&config.xy, xy_timer, safety),
            z: Coordinator::new(&config.z, z_timer, safety),
            safety,
        }
    }

    pub fn safety(&self) -> &'a SafetySupervisor<IO> {
        self.safety
    }

    pub fn pair(&self, id: PairId) -> &Coordinator<'a, T, IO> {
        match id {
            PairId::Xy => &self.xy,
            PairId::Z => &self.z,
        }
    }

    pub fn pair_mut(&mut self, id: PairId) -> &mut Coordinator<'a, T, IO> {
        match id {
            PairId::Xy => &mut self.xy,
            PairId::Z => &mut self.z,
        }
    }

    /// Pair that owns the named axis
    pub fn pair_of(&self, axis: char) -> Option<PairId> {
        PairId::ALL.into_iter().find(|id| {
            let pair = self.pair(*id);
            [pair.first(), pair.second()]
                .into_iter()
                .any(|a| !a.is_dummy() && a.name() == axis)
        })
    }

    /// Open or close the control gate
    ///
    /// Enabling clears stall flags on every axis. Disabling stops all
    /// motion.
    pub fn set_control_enabled(&mut self, enabled: bool) {
        if enabled {
            self.xy.stall_reset();
            self.z.stall_reset();
        } else {
            self.stop_all();
        }
        self.safety.control_enabled_set(enabled);
    }

    /// Stop every pair
    pub fn stop_all(&mut self) {
        self.xy.stop();
        self.z.stop();
    }

    /// A hard limit switch tripped
    pub fn hard_limits_reached(&mut self) {
        self.stop_all();
    }

    /// Suspend step edges of every pair while the limit state is read
    pub fn pause_all(&mut self) {
        self.xy.pause();
        self.z.pause();
    }

    pub fn resume_all(&mut self) {
        self.xy.resume();
        self.z.resume();
    }

    /// Handle a limit snapshot read after a limit-switch interrupt
    ///
    /// Hard limits stop everything. Otherwise each pair takes its
    /// target-reached bits and either stops (arrived) or resumes.
    pub fn on_limits(&mut self, limits: Limits) -> LimitsOutcome {
        if limits.hard_limit_hit() {
            self.hard_limits_reached();
            return LimitsOutcome {
                hard_limit: true,
                ..LimitsOutcome::default()
            };
        }
        LimitsOutcome {
            hard_limit: false,
            xy_arrived: self.xy.is_moving() && self.xy.apply_limits(&limits),
            z_arrived: self.z.is_moving() && self.z.apply_limits(&limits),
        }
    }

    /// Handle a touch-probe input edge
    ///
    /// A debounced contact stops all motion. Returns true if it did.
    pub fn on_touch_probe_edge(&mut self, touching: bool, now_ms: u32) -> bool {
        if !self.safety.probe_edge(touching, now_ms) {
            return false;
        }
        self.xy.stop_by_probe();
        self.z.stop_by_probe();
        true
    }

    /// Overwrite the position of a named axis
    ///
    /// Returns the counter write to send to the encoder peripheral.
    pub fn set_position(&mut self, axis: char, counts: i32) -> Result<Option<BusWrite>, CommandError> {
        let id = self.pair_of(axis).ok_or(CommandError::UnknownAxis(axis))?;
        let axis = self
            .pair_mut(id)
            .axis_mut(axis)
            .ok_or(CommandError::UnknownAxis(axis))?;
        Ok(axis.set_position(counts))
    }

    /// Change the stall threshold of a named axis
    pub fn set_stall_max_count(&mut self, axis: char, count: u32) -> Result<(), CommandError> {
        let id = self.pair_of(axis).ok_or(CommandError::UnknownAxis(axis))?;
        let axis = self
            .pair_mut(id)
            .axis_mut(axis)
            .ok_or(CommandError::UnknownAxis(axis))?;
        axis.set_stall_max_count(count);
        Ok(())
    }

    /// Apply an engine-wide request
    ///
    /// Never touches the encoder peripheral: a position set hands its
    /// counter write back in [`Applied::write`].
    pub fn apply(&mut self, command: EngineCommand) -> Result<Applied, CommandError> {
        match command {
            EngineCommand::SetControlEnabled(enabled) => self.set_control_enabled(enabled),
            EngineCommand::SetBrakesMode(mode) => {
                return Ok(Applied {
                    settle_ms: self.safety.set_brakes_mode(mode),
                    write: None,
                })
            }
            EngineCommand::SetStallControl(enabled) => self.safety.set_stall_control(enabled),
            EngineCommand::SetTouchProbeProtection(enabled) => self.safety.set_touch_probe_protection(enabled),
            EngineCommand::SetTouchProbeDebounce { ms } => self.safety.set_touch_probe_debounce_ms(ms),
            EngineCommand::TouchProbe { extend: true } => self.safety.touch_probe_extend(),
            EngineCommand::TouchProbe { extend: false } => self.safety.touch_probe_retract(),
            EngineCommand::SetPosition { axis, counts } => {
                return Ok(Applied {
                    settle_ms: None,
                    write: self.set_position(axis, counts)?,
                })
            }
            EngineCommand::SetStallMaxCount { axis, count } => self.set_stall_max_count(axis, count)?,
            EngineCommand::SetTouchMaxCount { pair, count } => self.pair_mut(pair).set_touch_max_count(count),
            EngineCommand::SetTuning {
                pair,
                tuning,
                step_time_ms,
            } => self.pair_mut(pair).set_tuning(&tuning, step_time_ms)?,
        }
        Ok(Applied::default())
    }

    /// Telemetry snapshot
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            xy: self.xy.status(),
            z: self.z.status(),
            control_enabled: self.safety.control_enabled(),
            stall_control: self.safety.stall_control(),
            brakes_mode: self.safety.brakes_mode(),
            touch_probe_protection: self.safety.touch_probe_protection(),
            probe_touching: self.safety.is_touch_probe_touching(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{AxesCommand, Dispatch};
    use crate::config::{ConfigError, ControllerConfig, SafetyConfig};
    use crate::safety::{BrakesMode, BRAKES_RELEASE_DELAY_MS};
    use crate::testing::{FakeSafetyIo, MockTimer, SimEncoder};

    fn safety() -> SafetySupervisor<FakeSafetyIo> {
        let s = SafetySupervisor::new(FakeSafetyIo::default(), &SafetyConfig::default());
        s.init_outputs();
        s.control_enabled_set(true);
        s
    }

    fn engine(s: &SafetySupervisor<FakeSafetyIo>) -> MotionEngine<'_, MockTimer, FakeSafetyIo> {
        MotionEngine::new(&EngineConfig::default(), MockTimer::default(), MockTimer::default(), s)
    }

    fn start(engine: &mut MotionEngine<'_, MockTimer, FakeSafetyIo>, id: PairId, enc: &mut SimEncoder) {
        let pair = engine.pair_mut(id);
        let Dispatch::Move(plan) = pair.dispatch(AxesCommand::Move {
            first: 10_000,
            second: 10_000,
        }) else {
            panic!("move must dispatch");
        };
        pair.prepare_move().unwrap();
        pair.move_to(plan, enc, 0).unwrap();
    }

    #[test]
    fn test_pair_of() {
        let s = safety();
        let e = engine(&s);
        assert_eq!(e.pair_of('X'), Some(PairId::Xy));
        assert_eq!(e.pair_of('Y'), Some(PairId::Xy));
        assert_eq!(e.pair_of('Z'), Some(PairId::Z));
        // Dummy partner is not addressable
        assert_eq!(e.pair_of('D'), None);
        assert_eq!(e.pair_of('Q'), None);
    }

    #[test]
    fn test_hard_limit_stops_every_pair() {
        let s = safety();
        let mut enc = SimEncoder::default();
        let mut e = engine(&s);
        start(&mut e, PairId::Xy, &mut enc);
        start(&mut e, PairId::Z, &mut enc);

        e.pause_all();
        let outcome = e.on_limits(Limits {
            hard: 0b0000_0100,
            targets: 0,
        });
        assert!(outcome.hard_limit);
        assert!(!e.pair(PairId::Xy).is_moving());
        assert!(!e.pair(PairId::Z).is_moving());
        assert!(!e.pair(PairId::Xy).timer().started);
    }

    #[test]
    fn test_masked_hard_limit_bits_ignored() {
        let s = safety();
        let mut enc = SimEncoder::default();
        let mut e = engine(&s);
        start(&mut e, PairId::Xy, &mut enc);

        e.pause_all();
        let outcome = e.on_limits(Limits {
            hard: 0b1100_0000,
            targets: 0,
        });
        assert_eq!(outcome, LimitsOutcome::default());
        assert!(e.pair(PairId::Xy).is_moving());
        assert!(e.pair(PairId::Xy).timer().started);
    }

    #[test]
    fn test_limits_route_target_bits() {
        let s = safety();
        let mut enc = SimEncoder::default();
        let mut e = engine(&s);
        start(&mut e, PairId::Xy, &mut enc);
        start(&mut e, PairId::Z, &mut enc);

        e.pause_all();
        let outcome = e.on_limits(Limits {
            hard: 0,
            targets: 0b100,
        });
        assert!(outcome.z_arrived);
        assert!(!outcome.xy_arrived);
        assert!(!e.pair(PairId::Z).is_moving());
        assert!(e.pair(PairId::Xy).timer().started);
    }

    #[test]
    fn test_idle_pair_ignores_target_bits() {
        let s = safety();
        let mut e = engine(&s);
        let outcome = e.on_limits(Limits {
            hard: 0,
            targets: 0b111,
        });
        assert_eq!(outcome, LimitsOutcome::default());
    }

    #[test]
    fn test_probe_edge_stops_all() {
        let s = safety();
        let mut enc = SimEncoder::default();
        let mut e = engine(&s);
        start(&mut e, PairId::Z, &mut enc);

        assert!(e.on_touch_probe_edge(true, 10));
        assert!(!e.pair(PairId::Z).is_moving());
        assert!(e.pair(PairId::Z).was_stopped_by_probe());
        // The idle XY pair is not flagged
        assert!(!e.pair(PairId::Xy).was_stopped_by_probe());
    }

    #[test]
    fn test_probe_release_edge_does_nothing() {
        let s = safety();
        let mut enc = SimEncoder::default();
        let mut e = engine(&s);
        start(&mut e, PairId::Z, &mut enc);

        assert!(!e.on_touch_probe_edge(false, 10));
        assert!(e.pair(PairId::Z).is_moving());
    }

    #[test]
    fn test_enable_clears_stalls() {
        let s = safety();
        let mut e = engine(&s);
        let x = e.pair_mut(PairId::Xy).axis_mut('X').unwrap();
        x.set_stall_max_count(1);
        x.step();
        x.step();
        // Two half-pulses at 25000:500 is less than one count, so no stall yet
        assert!(!x.check_for_stall());
        for _ in 0..1000 {
            x.step();
        }
        assert!(x.check_for_stall());
        assert!(e.pair(PairId::Xy).first().is_stalled());

        e.set_control_enabled(false);
        assert!(!s.control_enabled());
        e.set_control_enabled(true);
        assert!(s.control_enabled());
        assert!(!e.pair(PairId::Xy).first().is_stalled());
        s.with_io(|io| assert!(!io.shutdown));
    }

    #[test]
    fn test_disable_stops_motion() {
        let s = safety();
        let mut enc = SimEncoder::default();
        let mut e = engine(&s);
        start(&mut e, PairId::Xy, &mut enc);

        e.set_control_enabled(false);
        assert!(!e.pair(PairId::Xy).is_moving());
        s.with_io(|io| assert!(io.shutdown));
    }

    #[test]
    fn test_set_position() {
        let s = safety();
        let mut enc = SimEncoder::default();
        let mut e = engine(&s);

        let write = e.set_position('Y', 1234).unwrap();
        assert_eq!(write, Some(BusWrite::Counter { axis: 'Y', counts: 1234 }));
        assert_eq!(e.pair(PairId::Xy).second().current_counts(), 1234);
        write.unwrap().send(&mut enc).unwrap();
        assert_eq!(enc.count('Y'), 1234);

        // Z has a reversed encoder
        assert_eq!(
            e.set_position('Z', 50),
            Ok(Some(BusWrite::Counter { axis: 'Z', counts: -50 }))
        );
        assert_eq!(e.pair(PairId::Z).first().current_counts(), 50);

        assert_eq!(e.set_position('W', 0), Err(CommandError::UnknownAxis('W')));
    }

    #[test]
    fn test_set_stall_max_count() {
        let s = safety();
        let mut e = engine(&s);
        e.set_stall_max_count('Z', 9).unwrap();
        assert_eq!(e.pair(PairId::Z).first().stall_max_count(), 9);
        assert_eq!(e.set_stall_max_count('D', 9), Err(CommandError::UnknownAxis('D')));
    }

    #[test]
    fn test_status_reflects_safety() {
        let s = safety();
        let e = engine(&s);
        let status = e.status();
        assert!(status.control_enabled);
        assert!(status.stall_control);
        assert!(!status.probe_touching);
        assert!(!status.xy.is_moving);
        assert_eq!(status.z.first.name, 'Z');
    }

    #[test]
    fn test_apply_safety_toggles() {
        let s = safety();
        let mut e = engine(&s);

        e.apply(EngineCommand::SetStallControl(false)).unwrap();
        e.apply(EngineCommand::SetTouchProbeProtection(false)).unwrap();
        e.apply(EngineCommand::SetTouchProbeDebounce { ms: 40 }).unwrap();
        assert!(!s.stall_control());
        assert!(!s.touch_probe_protection());
        assert_eq!(s.touch_probe_debounce_ms(), 40);

        e.apply(EngineCommand::TouchProbe { extend: true }).unwrap();
        s.io(|io| assert!(io.probe_extended));
        e.apply(EngineCommand::TouchProbe { extend: false }).unwrap();
        s.io(|io| assert!(!io.probe_extended));
    }

    #[test]
    fn test_apply_brakes_mode_reports_settle() {
        let s = safety();
        let mut e = engine(&s);

        assert_eq!(
            e.apply(EngineCommand::SetBrakesMode(BrakesMode::Off)).map(|a| a.settle_ms),
            Ok(Some(BRAKES_RELEASE_DELAY_MS))
        );
        assert!(s.brakes_released());
        assert_eq!(
            e.apply(EngineCommand::SetBrakesMode(BrakesMode::On)),
            Ok(Applied::default())
        );
        assert!(!s.brakes_released());
        assert_eq!(e.status().brakes_mode, BrakesMode::On);
    }

    #[test]
    fn test_apply_tuning() {
        let s = safety();
        let mut e = engine(&s);

        let tuning = ControllerConfig {
            gain: 20.0,
            min_freq: 1_000,
            max_freq: 30_000,
        };
        e.apply(EngineCommand::SetTuning {
            pair: PairId::Z,
            tuning,
            step_time_ms: 50,
        })
        .unwrap();
        assert_eq!(e.pair(PairId::Z).controller().out_max(), 30_000);
        assert_eq!(e.pair(PairId::Z).step_time_ms(), 50);
        // The other pair keeps its tuning
        assert_eq!(e.pair(PairId::Xy).controller().out_max(), 60_000);

        let inverted = ControllerConfig {
            gain: 20.0,
            min_freq: 30_000,
            max_freq: 1_000,
        };
        assert_eq!(
            e.apply(EngineCommand::SetTuning {
                pair: PairId::Xy,
                tuning: inverted,
                step_time_ms: 50,
            }),
            Err(CommandError::Config(ConfigError::InvalidFrequencyRange))
        );

        e.apply(EngineCommand::SetTouchMaxCount { pair: PairId::Z, count: 7 })
            .unwrap();
        assert_eq!(e.pair(PairId::Z).touch_max_count(), 7);
    }

    #[test]
    fn test_apply_set_position_returns_write() {
        let s = safety();
        let mut e = engine(&s);
        assert_eq!(
            e.apply(EngineCommand::SetPosition { axis: 'X', counts: -7 }),
            Ok(Applied {
                settle_ms: None,
                write: Some(BusWrite::Counter { axis: 'X', counts: -7 }),
            })
        );
        assert_eq!(e.pair(PairId::Xy).first().current_counts(), -7);
        assert_eq!(
            e.apply(EngineCommand::SetPosition { axis: 'Q', counts: 0 }),
            Err(CommandError::UnknownAxis('Q'))
        );
    }
}
