//! Single stepper axis
//!
//! Position is kept in encoder counts. `current_counts` changes only when
//! the encoder is read or the position is explicitly set;
//! `destination_counts` changes only when a move starts.
//!
//! A dummy axis stands in for the missing partner of a single-axis pair:
//! it never talks to the position source, is always at its target and
//! never stalls.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bus::{BusWrite, EncoderChannel};
use crate::config::AxisConfig;

/// Distance (in counts) under which an axis is at its target
pub const POSITION_THRESHOLD: u32 = 1;

/// Motor rotation direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Direction {
    /// Clockwise rotation
    Clockwise,
    /// Counter-clockwise rotation
    CounterClockwise,
}

impl Direction {
    /// Get the opposite direction
    pub fn opposite(self) -> Self {
        match self {
            Direction::Clockwise => Direction::CounterClockwise,
            Direction::CounterClockwise => Direction::Clockwise,
        }
    }

    /// Level of the direction line (CW drives it low)
    pub fn as_level(self) -> bool {
        matches!(self, Direction::CounterClockwise)
    }
}

/// Per-motor state
#[derive(Debug, Clone)]
pub struct Axis {
    name: char,
    dummy: bool,
    direction: Option<Direction>,
    current_counts: i32,
    destination_counts: i32,
    delta: u32,
    already_there: bool,
    reversed_direction: bool,
    reversed_encoder: bool,
    motor_resolution: u32,
    encoder_resolution: u32,
    /// Position at the previous stall check
    last_pos: i32,
    stalled: bool,
    stalled_counter: u32,
    stall_max_count: u32,
    /// Step-line edges issued since start-up
    half_pulses: u32,
    /// Step-line edges issued since the previous stall check
    half_pulses_stall: u32,
}

impl Axis {
    pub fn new(config: &AxisConfig) -> Self {
        Self {
            name: config.name,
            dummy: config.dummy,
            direction: None,
            current_counts: 0,
            destination_counts: 0,
            delta: 0,
            already_there: config.dummy,
            reversed_direction: config.reversed_direction,
            reversed_encoder: config.reversed_encoder,
            motor_resolution: config.motor_resolution,
            encoder_resolution: config.encoder_resolution,
            last_pos: 0,
            stalled: false,
            stalled_counter: 0,
            stall_max_count: config.stall_max_count,
            half_pulses: 0,
            half_pulses_stall: 0,
        }
    }

    pub fn name(&self) -> char {
        self.name
    }

    pub fn is_dummy(&self) -> bool {
        self.dummy
    }

    /// Direction of the current move, `None` before the first move
    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn current_counts(&self) -> i32 {
        self.current_counts
    }

    pub fn destination_counts(&self) -> i32 {
        self.destination_counts
    }

    /// Distance to the destination at the last synchronizer pass
    pub fn delta(&self) -> u32 {
        self.delta
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn stall_max_count(&self) -> u32 {
        self.stall_max_count
    }

    /// Change the stall threshold (values below 1 are raised to 1)
    pub fn set_stall_max_count(&mut self, count: u32) {
        self.stall_max_count = count.max(1);
    }

    /// Step-line edges issued since start-up
    pub fn half_pulses(&self) -> u32 {
        self.half_pulses
    }

    /// Direction that reduces `error` (destination minus current)
    pub fn direction_for(&self, error: i64) -> Direction {
        let dir = if error < 0 {
            Direction::Clockwise
        } else {
            Direction::CounterClockwise
        };
        if self.reversed_direction {
            dir.opposite()
        } else {
            dir
        }
    }

    /// Recompute the distance to the destination
    pub(crate) fn update_delta(&mut self) -> u32 {
        self.delta = distance(self.destination_counts, self.current_counts);
        self.delta
    }

    /// Encoder counter of the axis, `None` for a dummy
    pub fn encoder_channel(&self) -> Option<EncoderChannel> {
        (!self.dummy).then(|| EncoderChannel::new(self.name, self.reversed_encoder))
    }

    /// Point the motor toward the destination
    ///
    /// Returns true if the direction changed.
    pub fn set_direction(&mut self) -> bool {
        let error = self.destination_counts as i64 - self.current_counts as i64;
        let dir = self.direction_for(error);
        let changed = self.direction != Some(dir);
        self.direction = Some(dir);
        changed
    }

    /// Direction line write for the current direction
    ///
    /// The direction line lives on the position source. A dummy axis has
    /// none.
    pub fn direction_write(&self) -> Option<BusWrite> {
        if self.dummy {
            return None;
        }
        self.direction.map(|direction| BusWrite::Direction {
            axis: self.name,
            direction,
        })
    }

    /// Set a new destination
    ///
    /// Returns the target comparator write, `None` for a dummy.
    pub fn set_destination(&mut self, target: i32) -> Option<BusWrite> {
        self.destination_counts = target;
        let channel = self.encoder_channel()?;
        self.already_there = distance(target, self.current_counts) < POSITION_THRESHOLD;
        Some(BusWrite::Target {
            axis: self.name,
            counts: channel.to_encoder(target),
        })
    }

    /// Take a position read through the axis's [`EncoderChannel`]
    pub fn update_position(&mut self, counts: i32) {
        if !self.dummy {
            self.current_counts = counts;
        }
    }

    /// Overwrite the position (homing, operator zeroing)
    ///
    /// Returns the counter write, `None` for a dummy.
    pub fn set_position(&mut self, counts: i32) -> Option<BusWrite> {
        self.current_counts = counts;
        let channel = self.encoder_channel()?;
        Some(BusWrite::Counter {
            axis: self.name,
            counts: channel.to_encoder(counts),
        })
    }

    /// Check if the axis is at its target
    pub fn is_already_there(&self) -> bool {
        self.dummy || self.already_there
    }

    /// Record the target comparator state reported by the position source
    pub fn set_target_reached(&mut self, reached: bool) {
        self.already_there = reached;
    }

    /// Account for one step-line edge
    ///
    /// Returns true if the caller should toggle the step line.
    pub fn step(&mut self) -> bool {
        if self.dummy {
            return false;
        }
        self.half_pulses = self.half_pulses.wrapping_add(1);
        self.half_pulses_stall = self.half_pulses_stall.saturating_add(1);
        true
    }

    /// Compare encoder progress with the steps issued since the last check
    ///
    /// Returns true once progress fell short on `stall_max_count`
    /// consecutive checks. The axis then stays flagged until
    /// [`stall_reset`](Self::stall_reset).
    pub fn check_for_stall(&mut self) -> bool {
        if self.dummy {
            return false;
        }
        let expected = ((self.half_pulses_stall >> 1) as u64 * self.encoder_resolution as u64
            / self.motor_resolution.max(1) as u64) as u32;
        let progress = distance(self.current_counts, self.last_pos);

        if progress < expected {
            self.stalled_counter += 1;
            if self.stalled_counter >= self.stall_max_count {
                self.stalled_counter = 0;
                self.stalled = true;
                return true;
            }
        } else {
            self.stalled_counter = 0;
        }

        self.half_pulses_stall = 0;
        self.last_pos = self.current_counts;
        false
    }

    /// Clear the stall flag and counter
    pub fn stall_reset(&mut self) {
        self.stalled = false;
        self.stalled_counter = 0;
    }
}

/// Absolute distance between two positions
pub(crate) fn distance(a: i32, b: i32) -> u32 {
    (a as i64 - b as i64).unsigned_abs().min(u32::MAX as u64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimEncoder;

    /// Edges per expected encoder count with the stock resolutions
    const EDGES_PER_COUNT: u32 = 2 * 25_000 / 500;

    fn axis(name: char) -> Axis {
        Axis::new(&AxisConfig::new(name))
    }

    fn issue_edges(axis: &mut Axis, edges: u32) {
        for _ in 0..edges {
            axis.step();
        }
    }

    #[test]
    fn test_direction_from_error_sign() {
        let x = axis('X');
        assert_eq!(x.direction_for(-10), Direction::Clockwise);
        assert_eq!(x.direction_for(10), Direction::CounterClockwise);
        assert_eq!(x.direction_for(0), Direction::CounterClockwise);
    }

    #[test]
    fn test_reversed_direction() {
        let z = Axis::new(&AxisConfig {
            reversed_direction: true,
            ..AxisConfig::new('Z')
        });
        assert_eq!(z.direction_for(-10), Direction::CounterClockwise);
        assert_eq!(z.direction_for(10), Direction::Clockwise);
    }

    #[test]
    fn test_set_direction_reports_change() {
        let mut x = axis('X');
        x.set_destination(-500);
        assert!(x.set_direction());
        assert_eq!(x.direction(), Some(Direction::Clockwise));
        assert_eq!(
            x.direction_write(),
            Some(BusWrite::Direction {
                axis: 'X',
                direction: Direction::Clockwise
            })
        );

        // Same side of the destination: nothing to rewrite
        assert!(!x.set_direction());

        x.set_destination(500);
        assert!(x.set_direction());
        assert_eq!(x.direction(), Some(Direction::CounterClockwise));
    }

    #[test]
    fn test_set_destination_marks_already_there() {
        let mut x = axis('X');
        assert_eq!(x.set_destination(0), Some(BusWrite::Target { axis: 'X', counts: 0 }));
        assert!(x.is_already_there());

        x.set_destination(1);
        assert!(!x.is_already_there());
    }

    #[test]
    fn test_reversed_encoder_sign() {
        let mut enc = SimEncoder::default();
        enc.set_count('Z', 250);
        let mut z = Axis::new(&AxisConfig {
            reversed_encoder: true,
            ..AxisConfig::new('Z')
        });
        let channel = z.encoder_channel().unwrap();

        z.update_position(channel.read(&mut enc).unwrap());
        assert_eq!(z.current_counts(), -250);

        assert_eq!(z.set_destination(-1000), Some(BusWrite::Target { axis: 'Z', counts: 1000 }));

        z.set_position(40).unwrap().send(&mut enc).unwrap();
        assert_eq!(enc.count('Z'), -40);
        assert_eq!(z.current_counts(), 40);
        assert_eq!(channel.read(&mut enc).unwrap(), 40);
    }

    #[test]
    fn test_dummy_axis_is_inert() {
        let mut d = Axis::new(&AxisConfig::dummy('D'));

        assert_eq!(d.encoder_channel(), None);
        assert_eq!(d.set_destination(1234), None);
        assert!(d.is_already_there());
        d.set_direction();
        assert_eq!(d.direction_write(), None);
        d.update_position(99);
        assert_eq!(d.current_counts(), 0);
        assert!(!d.step());
        assert_eq!(d.half_pulses(), 0);
        assert!(!d.check_for_stall());
    }

    #[test]
    fn test_stall_after_max_count_checks() {
        let mut x = axis('X');
        for i in 1..=5 {
            issue_edges(&mut x, 2 * EDGES_PER_COUNT);
            let stalled = x.check_for_stall();
            assert_eq!(stalled, i == 5, "check {}", i);
        }
        assert!(x.is_stalled());
    }

    #[test]
    fn test_four_low_progress_checks_do_not_stall() {
        let mut x = axis('X');
        for _ in 0..4 {
            issue_edges(&mut x, 2 * EDGES_PER_COUNT);
            assert!(!x.check_for_stall());
        }
        assert!(!x.is_stalled());
    }

    #[test]
    fn test_progress_resets_stall_counter() {
        let mut x = axis('X');
        for _ in 0..4 {
            issue_edges(&mut x, 2 * EDGES_PER_COUNT);
            assert!(!x.check_for_stall());
        }

        // Encoder catches up with the steps issued
        issue_edges(&mut x, 2 * EDGES_PER_COUNT);
        x.update_position(2);
        assert!(!x.check_for_stall());

        for _ in 0..4 {
            issue_edges(&mut x, 2 * EDGES_PER_COUNT);
            assert!(!x.check_for_stall());
        }
        assert!(!x.is_stalled());
    }

    #[test]
    fn test_idle_axis_never_stalls() {
        let mut x = axis('X');
        for _ in 0..20 {
            assert!(!x.check_for_stall());
        }
    }

    #[test]
    fn test_stall_reset() {
        let mut x = axis('X');
        x.set_stall_max_count(1);
        issue_edges(&mut x, 2 * EDGES_PER_COUNT);
        assert!(x.check_for_stall());
        x.stall_reset();
        assert!(!x.is_stalled());
    }

    #[test]
    fn test_step_counts_edges() {
        let mut x = axis('X');
        assert!(x.step());
        assert!(x.step());
        assert_eq!(x.half_pulses(), 2);
    }

    #[test]
    fn test_distance_extremes() {
        assert_eq!(distance(i32::MAX, i32::MIN), u32::MAX);
        assert_eq!(distance(-5, 5), 10);
    }
}
