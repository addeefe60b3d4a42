//! Axis pair coordinator
//!
//! Owns two axes, a controller and a step timer, and drives them through a
//! synchronized move:
//!
//! ```text
//!            MOVE / SOFT_STOP                 targets reached,
//!   Idle ───────────────────────▶ Moving ───  HARD_STOP, stall,
//!    ▲                             │  ▲       probe, watchdog
//!    └─────────────────────────────┘  │ SOFT_STOP: shortened target,
//!                                     └ no controller ramp
//! ```
//!
//! Three contexts touch a coordinator and each owns a slice of the work:
//!
//! - the command task calls [`dispatch`](Coordinator::dispatch),
//!   [`prepare_move`](Coordinator::prepare_move) and
//!   [`move_to`](Coordinator::move_to) to start motion;
//! - the step timer interrupt calls [`on_step_edge`](Coordinator::on_step_edge),
//!   which only advances the synchronizer and detects arrival;
//! - the supervisor task calls [`supervise`](Coordinator::supervise) when
//!   woken, to re-read encoders, enforce the interlocks and retune the
//!   step rate.
//!
//! The firmware serializes these with a lock around the coordinator and
//! keeps the supervisor out while a command is being dispatched. Encoder
//! transfers happen outside that lock: the task reads positions through
//! [`channels`](Coordinator::channels), hands them to
//! [`start_move`](Coordinator::start_move) or
//! [`supervise_with`](Coordinator::supervise_with), sends the returned
//! writes and finishes with [`complete_writes`](Coordinator::complete_writes).

use heapless::String;

use crate::axis::{distance, Axis};
use crate::bus::{BusWrites, PairChannels, Positions};
use crate::bresenham::{Bresenham, Leader, StepPulses};
use crate::command::{AxesCommand, CommandError, Dispatch, MoveKind, MoveOutcome, MovePlan};
use crate::config::{ConfigError, ControllerConfig, PairConfig, MAX_NAME_LEN};
use crate::controller::Controller;
use crate::safety::{BrakeRelease, BrakesMode, SafetySupervisor};
use crate::status::{AxisStatus, PairStatus};
use crate::traits::{Limits, PositionSource, SafetyIo, StepTimer, TimerError, MAX_STEP_FREQ_HZ};

/// Soft-stop distance at the controller's minimum rate
pub const SOFT_STOP_MIN_COUNTS: u32 = 200;

/// Soft-stop distance at the controller's maximum rate
pub const SOFT_STOP_MAX_COUNTS: u32 = 1000;

/// Setpoints are kept within half the i32 range so the doubled
/// synchronizer error has headroom.
const SETPOINT_MIN: i32 = i32::MIN / 2;
const SETPOINT_MAX: i32 = i32::MAX / 2;

/// Result of handling one timer edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EdgeOutcome {
    /// Step lines to toggle
    pub pulses: StepPulses,
    /// The supervisor task should run
    pub wake_supervisor: bool,
    /// Both axes arrived and the pair was stopped
    pub finished: bool,
}

/// Result of one supervisor pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SupervisorOutcome {
    /// Pair is not moving; positions were refreshed only
    Idle,
    /// Still moving at the recomputed rate
    Continue { frequency: u32 },
    /// An axis stalled; the pair stopped and control was disabled
    Stalled { first: bool, second: bool },
    /// The probe stayed asserted; the pair stopped
    ProbeProtection,
    /// No keepalive within the watchdog window; the pair stopped
    WatchdogExpired,
    /// The encoder peripheral failed; the pair stopped
    PositionFault,
    /// The step timer refused the new rate; the pair stopped
    TimerFault(TimerError),
}

/// Move start computed with the coordinator locked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveStart {
    pub outcome: MoveOutcome,
    /// Targets and directions to send before stepping resumes
    pub writes: BusWrites,
}

/// Supervisor pass computed with the coordinator locked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorPass {
    pub outcome: SupervisorOutcome,
    /// Direction changes to send before stepping resumes
    pub writes: BusWrites,
}

/// Synchronized axis pair
pub struct Coordinator<'a, T, IO> {
    name: String<MAX_NAME_LEN>,
    first: Axis,
    second: Axis,
    controller: Controller,
    timer: T,
    safety: &'a SafetySupervisor<IO>,
    has_brakes: bool,
    is_moving: bool,
    already_there: bool,
    current_freq: u32,
    step_time_ms: u32,
    bresenham: Bresenham,
    /// Time of the last supervisor wake (or move start)
    last_wake_ms: u32,
    touching_counter: u32,
    touch_max_count: u32,
    was_soft_stopped: bool,
    was_stopped_by_probe: bool,
    was_stopped_by_probe_protection: bool,
}

impl<'a, T: StepTimer, IO: SafetyIo> Coordinator<'a, T, IO> {
    pub fn new(config: &PairConfig, timer: T, safety: &'a SafetySupervisor<IO>) -> Self {
        Self {
            name: config.name.clone(),
            first: Axis::new(&config.first),
            second: Axis::new(&config.second),
            controller: Controller::new(&config.controller),
            timer,
            safety,
            has_brakes: config.has_brakes,
            is_moving: false,
            already_there: false,
            current_freq: 0,
            step_time_ms: config.step_time_ms,
            bresenham: Bresenham::default(),
            last_wake_ms: 0,
            touching_counter: 0,
            touch_max_count: config.touch_max_count,
            was_soft_stopped: false,
            was_stopped_by_probe: false,
            was_stopped_by_probe_protection: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn first(&self) -> &Axis {
        &self.first
    }

    pub fn second(&self) -> &Axis {
        &self.second
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    pub fn current_freq(&self) -> u32 {
        self.current_freq
    }

    pub fn has_brakes(&self) -> bool {
        self.has_brakes
    }

    pub fn step_time_ms(&self) -> u32 {
        self.step_time_ms
    }

    pub fn was_soft_stopped(&self) -> bool {
        self.was_soft_stopped
    }

    pub fn was_stopped_by_probe(&self) -> bool {
        self.was_stopped_by_probe
    }

    pub fn was_stopped_by_probe_protection(&self) -> bool {
        self.was_stopped_by_probe_protection
    }

    /// Encoder counters to read before a move start or supervisor pass
    pub fn channels(&self) -> PairChannels {
        PairChannels {
            first: self.first.encoder_channel(),
            second: self.second.encoder_channel(),
        }
    }

    /// Look up one of the pair's axes by name
    pub fn axis_mut(&mut self, name: char) -> Option<&mut Axis> {
        if self.first.name() == name {
            Some(&mut self.first)
        } else if self.second.name() == name {
            Some(&mut self.second)
        } else {
            None
        }
    }

    /// Change controller tuning and the supervisor period
    pub fn set_tuning(&mut self, tuning: &ControllerConfig, step_time_ms: u32) -> Result<(), ConfigError> {
        tuning.validate()?;
        if step_time_ms == 0 {
            return Err(ConfigError::ZeroStepTime);
        }
        self.controller.set_output_limits(tuning.min_freq, tuning.max_freq)?;
        self.controller.set_tunings(tuning.gain);
        self.step_time_ms = step_time_ms;
        Ok(())
    }

    /// Change the touch-probe protection threshold (minimum 1)
    pub fn set_touch_max_count(&mut self, count: u32) {
        self.touch_max_count = count.max(1);
    }

    pub fn touch_max_count(&self) -> u32 {
        self.touch_max_count
    }

    /// Clear stall flags on both axes
    pub fn stall_reset(&mut self) {
        self.first.stall_reset();
        self.second.stall_reset();
    }

    /// Check the gates a move must pass, without changing anything
    ///
    /// Command layers call this to reject a request before queueing it.
    pub fn check_ready(&self) -> Result<(), CommandError> {
        if !self.safety.control_enabled() {
            return Err(CommandError::ControlDisabled);
        }
        if self.has_brakes && self.safety.brakes_mode() == BrakesMode::On {
            return Err(CommandError::BrakesEngaged);
        }
        if self.controller.out_max() > MAX_STEP_FREQ_HZ {
            return Err(CommandError::Timer(TimerError::FrequencyTooHigh));
        }
        Ok(())
    }

    /// Turn a queued command into the work it requires
    ///
    /// A move clears the termination flags from the previous move. A soft
    /// stop while moving computes shortened targets and marks the move as
    /// soft-stopped. A hard stop halts the timer before returning.
    pub fn dispatch(&mut self, command: AxesCommand) -> Dispatch {
        match command {
            AxesCommand::Move { first, second } => {
                self.was_stopped_by_probe = false;
                self.was_stopped_by_probe_protection = false;
                self.was_soft_stopped = false;
                Dispatch::Move(MovePlan {
                    first,
                    second,
                    kind: MoveKind::Fresh,
                })
            }
            AxesCommand::SoftStop => {
                if !self.is_moving {
                    return Dispatch::Ignored;
                }
                let counts = self.soft_stop_distance();
                let first = soft_stop_target(&self.first, counts);
                let second = soft_stop_target(&self.second, counts);
                self.was_soft_stopped = true;
                Dispatch::Move(MovePlan {
                    first,
                    second,
                    kind: MoveKind::SoftStop,
                })
            }
            AxesCommand::HardStop => {
                self.stop();
                Dispatch::Stopped
            }
        }
    }

    /// Deceleration distance for the current rate
    ///
    /// Linear between [`SOFT_STOP_MIN_COUNTS`] at the controller minimum
    /// and [`SOFT_STOP_MAX_COUNTS`] at its maximum.
    pub fn soft_stop_distance(&self) -> u32 {
        let (x1, x2) = (self.controller.out_min(), self.controller.out_max());
        if x2 <= x1 {
            return SOFT_STOP_MIN_COUNTS;
        }
        let x = self.current_freq.clamp(x1, x2);
        let span = (SOFT_STOP_MAX_COUNTS - SOFT_STOP_MIN_COUNTS) as u64;
        SOFT_STOP_MIN_COUNTS + (span * (x - x1) as u64 / (x2 - x1) as u64) as u32
    }

    /// Check the gates and release the brakes
    ///
    /// Returns the relay settle time the caller must wait before
    /// [`move_to`](Self::move_to). The wait happens in task context, never
    /// with the coordinator locked.
    pub fn prepare_move(&self) -> Result<Option<u32>, CommandError> {
        self.check_ready()?;
        if !self.has_brakes {
            return Ok(None);
        }
        match self.safety.brakes_release() {
            BrakeRelease::Settle(ms) => Ok(Some(ms)),
            BrakeRelease::AlreadyReleased => Ok(None),
            BrakeRelease::NotPermitted => Err(CommandError::BrakesEngaged),
        }
    }

    /// Start a synchronized move, doing the encoder transfers in line
    ///
    /// Fails without touching any state, the bus included, if control is
    /// disabled or the brakes of a braked pair are not released.
    pub fn move_to<S: PositionSource>(
        &mut self,
        plan: MovePlan,
        source: &mut S,
        now_ms: u32,
    ) -> Result<MoveOutcome, CommandError> {
        self.check_can_move()?;
        let positions = self.channels().read(source);
        let start = self.start_move(plan, positions, now_ms)?;
        let flushed = start.writes.flush(source);
        self.complete_writes(flushed)?;
        Ok(start.outcome)
    }

    /// Start a synchronized move from freshly read positions
    ///
    /// Fails without touching any state if control is disabled or the
    /// brakes of a braked pair are not released. A failed read stops the
    /// pair. On success the step timer is programmed but left paused until
    /// [`complete_writes`](Self::complete_writes).
    pub fn start_move<E>(
        &mut self,
        plan: MovePlan,
        positions: Result<Positions, E>,
        now_ms: u32,
    ) -> Result<MoveStart, CommandError> {
        let first_setpoint = plan.first.clamp(SETPOINT_MIN, SETPOINT_MAX);
        let second_setpoint = plan.second.clamp(SETPOINT_MIN, SETPOINT_MAX);

        self.check_can_move()?;

        self.is_moving = true;
        self.already_there = false;
        self.stall_reset();
        self.touching_counter = 0;

        let Ok(positions) = positions else {
            self.stop();
            return Err(CommandError::PositionSource);
        };
        self.update_positions(positions);

        let mut writes = BusWrites::new();
        writes.push(self.first.set_destination(first_setpoint));
        writes.push(self.second.set_destination(second_setpoint));
        self.calculate(&mut writes, true);

        if self.first.is_already_there() && self.second.is_already_there() {
            self.already_there = true;
            self.stop();
            return Ok(MoveStart {
                outcome: MoveOutcome::AlreadyThere,
                writes,
            });
        }

        let frequency = match plan.kind {
            MoveKind::Fresh => {
                self.controller.restart();
                self.run_controller()
            }
            MoveKind::SoftStop => self.run_controller(),
        };
        self.current_freq = frequency;
        self.last_wake_ms = now_ms;

        self.timer.stop();
        if let Err(e) = self.timer.set_frequency(frequency) {
            self.stop();
            return Err(e.into());
        }
        Ok(MoveStart {
            outcome: MoveOutcome::Started { frequency },
            writes,
        })
    }

    /// Finish a move start or supervisor pass once its writes were sent
    ///
    /// Resumes stepping on success. A failed transfer stops the pair.
    pub fn complete_writes<E>(&mut self, flushed: Result<(), E>) -> Result<(), CommandError> {
        match flushed {
            Ok(()) => {
                self.resume();
                Ok(())
            }
            Err(_) => {
                self.stop();
                Err(CommandError::PositionSource)
            }
        }
    }

    fn check_can_move(&self) -> Result<(), CommandError> {
        self.check_ready()?;
        if self.has_brakes && !self.safety.brakes_released() {
            return Err(CommandError::BrakesEngaged);
        }
        Ok(())
    }

    fn update_positions(&mut self, positions: Positions) {
        if let Some(counts) = positions.first {
            self.first.update_position(counts);
        }
        if let Some(counts) = positions.second {
            self.second.update_position(counts);
        }
    }

    /// Recompute distances, directions and the synchronizer state
    ///
    /// Queues a direction write for each axis whose direction changed, or
    /// for every axis with `all_directions`.
    fn calculate(&mut self, writes: &mut BusWrites, all_directions: bool) {
        let first_delta = self.first.update_delta();
        let second_delta = self.second.update_delta();
        for axis in [&mut self.first, &mut self.second] {
            if axis.set_direction() || all_directions {
                writes.push(axis.direction_write());
            }
        }
        self.bresenham = Bresenham::new(first_delta, second_delta);
    }

    /// Evaluate the controller on the leader axis
    fn run_controller(&mut self) -> u32 {
        let leader = match self.bresenham.leader() {
            Leader::First => &self.first,
            Leader::Second => &self.second,
        };
        let (setpoint, measured) = (leader.destination_counts(), leader.current_counts());
        if self.was_soft_stopped {
            self.controller.run_unattenuated(setpoint, measured)
        } else {
            self.controller.run(setpoint, measured)
        }
    }

    /// Handle one step-timer edge (interrupt context)
    ///
    /// Never reads the encoder or evaluates the controller. When both axes
    /// have arrived the pair is stopped and the supervisor is woken to
    /// refresh positions; otherwise one synchronizer step is taken and the
    /// supervisor is woken once per `step_time`.
    pub fn on_step_edge(&mut self, now_ms: u32) -> EdgeOutcome {
        if !self.is_moving {
            return EdgeOutcome::default();
        }

        self.already_there = self.first.is_already_there() && self.second.is_already_there();
        if self.already_there {
            self.stop();
            return EdgeOutcome {
                pulses: StepPulses::default(),
                wake_supervisor: true,
                finished: true,
            };
        }

        let wanted = self
            .bresenham
            .step(self.first.is_already_there(), self.second.is_already_there());
        let pulses = StepPulses {
            first: wanted.first && self.first.step(),
            second: wanted.second && self.second.step(),
        };

        let wake_supervisor = now_ms.wrapping_sub(self.last_wake_ms) > self.step_time_ms;
        if wake_supervisor {
            self.last_wake_ms = now_ms;
        }

        EdgeOutcome {
            pulses,
            wake_supervisor,
            finished: false,
        }
    }

    /// One supervisor pass, doing the encoder transfers in line
    pub fn supervise<S: PositionSource>(&mut self, source: &mut S, now_ms: u32) -> SupervisorOutcome {
        let positions = self.channels().read(source);
        let pass = self.supervise_with(positions, now_ms);
        let flushed = pass.writes.flush(source);
        match self.complete_writes(flushed) {
            Ok(()) => pass.outcome,
            Err(_) => SupervisorOutcome::PositionFault,
        }
    }

    /// One supervisor pass from freshly read positions (task context)
    ///
    /// Checks run in order: stall, probe protection, watchdog. The first
    /// one that trips stops the pair. Both stall checks always run so
    /// neither axis's counter is skipped.
    ///
    /// When an axis changed direction the step timer is left paused until
    /// the returned writes are sent and
    /// [`complete_writes`](Self::complete_writes) is called.
    pub fn supervise_with<E>(&mut self, positions: Result<Positions, E>, now_ms: u32) -> SupervisorPass {
        let mut writes = BusWrites::new();
        let outcome = self.supervise_pass(positions, now_ms, &mut writes);
        SupervisorPass { outcome, writes }
    }

    fn supervise_pass<E>(
        &mut self,
        positions: Result<Positions, E>,
        now_ms: u32,
        writes: &mut BusWrites,
    ) -> SupervisorOutcome {
        let Ok(positions) = positions else {
            if self.is_moving {
                self.stop();
            }
            return SupervisorOutcome::PositionFault;
        };
        self.update_positions(positions);

        if !self.is_moving {
            return SupervisorOutcome::Idle;
        }

        if self.safety.stall_control() {
            let first = self.first.check_for_stall();
            let second = self.second.check_for_stall();
            if first || second {
                self.stop();
                self.safety.control_enabled_set(false);
                return SupervisorOutcome::Stalled { first, second };
            }
        }

        if self.safety.touch_probe_protection() {
            if self.safety.is_touch_probe_touching() {
                self.touching_counter += 1;
                if self.touching_counter >= self.touch_max_count {
                    self.touching_counter = 0;
                    self.was_stopped_by_probe_protection = true;
                    self.stop();
                    return SupervisorOutcome::ProbeProtection;
                }
            } else {
                self.touching_counter = 0;
            }
        }

        if self.safety.is_watchdog_expired(now_ms) {
            self.stop();
            return SupervisorOutcome::WatchdogExpired;
        }

        // Re-derive the synchronizer from fresh encoder positions
        self.calculate(writes, false);

        let frequency = self.run_controller();
        self.current_freq = frequency;
        let programmed = if writes.is_empty() {
            self.timer.change_frequency(frequency)
        } else {
            // Stepping resumes once the new directions are out
            self.timer.stop();
            self.timer.set_frequency(frequency)
        };
        match programmed {
            Ok(()) => SupervisorOutcome::Continue { frequency },
            Err(e) => {
                self.stop();
                SupervisorOutcome::TimerFault(e)
            }
        }
    }

    /// Halt stepping and apply the brakes of a braked pair
    pub fn stop(&mut self) {
        self.is_moving = false;
        self.timer.stop();
        self.current_freq = 0;
        if self.has_brakes {
            self.safety.brakes_apply();
        }
    }

    /// Halt stepping after a touch-probe contact
    pub fn stop_by_probe(&mut self) {
        if self.is_moving {
            self.was_stopped_by_probe = true;
        }
        self.stop();
    }

    /// Suspend step edges without ending the move
    pub fn pause(&mut self) {
        if self.is_moving {
            self.timer.stop();
        }
    }

    /// Resume step edges of a paused move
    pub fn resume(&mut self) {
        if self.is_moving {
            self.timer.start();
        }
    }

    /// Apply target-reached bits from the position source
    ///
    /// Stops the pair and returns true if every axis has arrived; otherwise
    /// resumes a paused move.
    pub fn apply_limits(&mut self, limits: &Limits) -> bool {
        for axis in [&mut self.first, &mut self.second] {
            if let Some(channel) = axis_channel(axis) {
                axis.set_target_reached(limits.target_reached(channel));
            }
        }
        if self.first.is_already_there() && self.second.is_already_there() {
            self.already_there = true;
            self.stop();
            true
        } else {
            self.resume();
            false
        }
    }

    /// Telemetry snapshot
    pub fn status(&self) -> PairStatus {
        PairStatus {
            first: axis_status(&self.first),
            second: axis_status(&self.second),
            is_moving: self.is_moving,
            current_freq: self.current_freq,
            already_there: self.already_there,
            was_soft_stopped: self.was_soft_stopped,
            was_stopped_by_probe: self.was_stopped_by_probe,
            was_stopped_by_probe_protection: self.was_stopped_by_probe_protection,
        }
    }
}

/// Encoder channel of a physical axis (X = 0, Y = 1, Z = 2)
fn axis_channel(axis: &Axis) -> Option<u8> {
    if axis.is_dummy() {
        return None;
    }
    (axis.name() as u32)
        .checked_sub('X' as u32)
        .filter(|c| *c < 8)
        .map(|c| c as u8)
}

/// Target `counts` ahead of the current position, never past the destination
fn soft_stop_target(axis: &Axis, counts: u32) -> i32 {
    let current = axis.current_counts();
    let destination = axis.destination_counts();
    let step = counts.min(distance(destination, current)) as i64;

    let mut target = current as i64;
    if destination > current {
        target += step;
    }
    // Not an else: an axis already at its destination keeps it
    if destination < current {
        target -= step;
    }
    target as i32
}

fn axis_status(axis: &Axis) -> AxisStatus {
    AxisStatus {
        name: axis.name(),
        current_counts: axis.current_counts(),
        destination_counts: axis.destination_counts(),
        stalled: axis.is_stalled(),
        already_there: axis.is_already_there(),
    }
}
