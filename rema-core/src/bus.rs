//! Encoder-peripheral traffic planned by the engine
//!
//! Bus transfers never run while the engine is locked, since the step
//! interrupt shares that lock. A pass is split in three phases:
//!
//! 1. read positions through the pair's [`PairChannels`] (bus only),
//! 2. update the engine from the [`Positions`] (engine only), which yields
//!    the [`BusWrites`] it needs and leaves the step timer paused if there
//!    are any,
//! 3. flush the writes (bus only) and resume the pair.
//!
//! The host-side [`Coordinator::move_to`](crate::coordinator::Coordinator::move_to)
//! and [`Coordinator::supervise`](crate::coordinator::Coordinator::supervise)
//! run all three phases back to back.

use heapless::Vec;

use crate::axis::Direction;
use crate::traits::PositionSource;

/// Most writes one pass can produce (two targets, two directions)
pub const MAX_BUS_WRITES: usize = 4;

/// Encoder counter of a physical axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EncoderChannel {
    axis: char,
    reversed: bool,
}

impl EncoderChannel {
    pub(crate) fn new(axis: char, reversed: bool) -> Self {
        Self { axis, reversed }
    }

    pub fn axis(&self) -> char {
        self.axis
    }

    /// Read the counter in axis coordinates
    pub fn read<S: PositionSource>(&self, source: &mut S) -> Result<i32, S::Error> {
        source.read_position(self.axis).map(|raw| self.to_encoder(raw))
    }

    /// Convert between axis and encoder coordinates (an involution)
    pub(crate) fn to_encoder(&self, counts: i32) -> i32 {
        if self.reversed {
            counts.wrapping_neg()
        } else {
            counts
        }
    }
}

/// Fresh positions of a pair; `None` for a dummy axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Positions {
    pub first: Option<i32>,
    pub second: Option<i32>,
}

/// Encoder counters of a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PairChannels {
    pub first: Option<EncoderChannel>,
    pub second: Option<EncoderChannel>,
}

impl PairChannels {
    /// Read both counters; dummy axes cost no transfer
    pub fn read<S: PositionSource>(&self, source: &mut S) -> Result<Positions, S::Error> {
        Ok(Positions {
            first: self.first.map(|c| c.read(source)).transpose()?,
            second: self.second.map(|c| c.read(source)).transpose()?,
        })
    }
}

/// One register write to the encoder peripheral, in encoder coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusWrite {
    Target { axis: char, counts: i32 },
    Counter { axis: char, counts: i32 },
    Direction { axis: char, direction: Direction },
}

impl BusWrite {
    pub fn send<S: PositionSource>(self, source: &mut S) -> Result<(), S::Error> {
        match self {
            BusWrite::Target { axis, counts } => source.set_target(axis, counts),
            BusWrite::Counter { axis, counts } => source.set_counter(axis, counts),
            BusWrite::Direction { axis, direction } => source.set_direction(axis, direction),
        }
    }
}

/// Writes left pending by an engine update, sent in order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BusWrites(Vec<BusWrite, MAX_BUS_WRITES>);

impl BusWrites {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn push(&mut self, write: Option<BusWrite>) {
        if let Some(write) = write {
            let _ = self.0.push(write);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[BusWrite] {
        &self.0
    }

    /// Send every write, stopping at the first failure
    pub fn flush<S: PositionSource>(&self, source: &mut S) -> Result<(), S::Error> {
        self.0.iter().try_for_each(|w| w.send(source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimEncoder;

    #[test]
    fn test_reversed_channel_negates() {
        let mut enc = SimEncoder::default();
        enc.set_count('Z', 250);
        let z = EncoderChannel::new('Z', true);
        assert_eq!(z.read(&mut enc).unwrap(), -250);
        assert_eq!(z.to_encoder(-250), 250);
    }

    #[test]
    fn test_dummy_axis_costs_no_transfer() {
        let mut enc = SimEncoder::default();
        let channels = PairChannels {
            first: None,
            second: None,
        };
        assert_eq!(channels.read(&mut enc).unwrap(), Positions::default());
        assert!(enc.is_untouched());
    }

    #[test]
    fn test_flush_in_order() {
        let mut enc = SimEncoder::default();
        let mut writes = BusWrites::new();
        writes.push(Some(BusWrite::Counter { axis: 'X', counts: 5 }));
        writes.push(None);
        writes.push(Some(BusWrite::Direction {
            axis: 'X',
            direction: Direction::Clockwise,
        }));
        assert_eq!(writes.as_slice().len(), 2);

        writes.flush(&mut enc).unwrap();
        assert_eq!(enc.count('X'), 5);
        assert_eq!(enc.direction('X'), Some(Direction::Clockwise));
    }

    #[test]
    fn test_flush_reports_failure() {
        let mut enc = SimEncoder::default();
        enc.fail = true;
        let mut writes = BusWrites::new();
        writes.push(Some(BusWrite::Target { axis: 'Y', counts: 1 }));
        assert!(writes.flush(&mut enc).is_err());
    }
}
