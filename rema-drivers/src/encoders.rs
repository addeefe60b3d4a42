//! Quadrature encoder peripheral (SPI)
//!
//! A companion microcontroller counts the encoder quadrature signals,
//! compares each counter with a programmed target, drives the motor
//! direction lines and watches the limit switches. It raises an interrupt
//! line whenever a limit or target-reached bit changes.
//!
//! # Frame format
//!
//! Every transaction is one chip-select frame:
//!
//! ```text
//! ┌──────────┬────────────────────────────┐
//! │ address  │ data (4 bytes, big-endian) │
//! └──────────┴────────────────────────────┘
//! ```
//!
//! Bit 7 of the address selects a write. Per-axis registers sit at
//! `base + index + 1`, where the index is 0 for X, 1 for Y and 2 for Z.
//! Reading the limit register with the write bit set acknowledges the
//! pending interrupt.

use rema_core::axis::Direction;
use rema_core::traits::{Limits, PositionSource};
use rema_hal::{OutputPin, SpiBus};

/// Register map
pub mod reg {
    /// Write flag in the address byte
    pub const WRITE_MASK: u8 = 0x80;
    /// Limit and target-reached bits
    pub const LIMITS: u8 = 0x00;
    /// Encoder counters
    pub const COUNTERS: u8 = 0x10;
    /// Target comparators
    pub const TARGETS: u8 = 0x20;
    /// Direction outputs
    pub const DIRECTIONS: u8 = 0x30;
    /// Target comparator tolerance (shared by all axes)
    pub const POS_THRESHOLDS: u8 = 0x40;
}

/// Number of axes the peripheral counts
pub const NUM_CHANNELS: u8 = 3;

/// Encoder link error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncoderError<E> {
    /// SPI transfer failed
    Bus(E),
    /// Axis name has no channel on the peripheral
    UnknownAxis(char),
}

/// Register address for an axis
pub fn axis_register(base: u8, axis: char) -> Option<u8> {
    let index = (axis as u32).checked_sub('X' as u32)?;
    if index >= NUM_CHANNELS as u32 {
        return None;
    }
    Some(base + index as u8 + 1)
}

/// Encode a register value
pub fn encode_value(value: i32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Decode a register value
pub fn decode_value(bytes: [u8; 4]) -> i32 {
    i32::from_be_bytes(bytes)
}

/// SPI link to the encoder peripheral
pub struct EncoderLink<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI: SpiBus, CS: OutputPin> EncoderLink<SPI, CS> {
    /// Create a link with chip select deasserted
    pub fn new(spi: SPI, mut cs: CS) -> Self {
        cs.set_high();
        Self { spi, cs }
    }

    /// Program the target tolerance and clear any stale interrupt
    pub fn init(&mut self, threshold: u32) -> Result<Limits, EncoderError<SPI::Error>> {
        self.write_register(reg::POS_THRESHOLDS, threshold as i32)?;
        self.acknowledge_limits()
    }

    /// Give the bus and chip select back
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    fn frame<R>(
        &mut self,
        f: impl FnOnce(&mut SPI) -> Result<R, SPI::Error>,
    ) -> Result<R, EncoderError<SPI::Error>> {
        self.cs.set_low();
        let result = f(&mut self.spi).and_then(|r| self.spi.flush().map(|_| r));
        self.cs.set_high();
        result.map_err(EncoderError::Bus)
    }

    /// Write a 32-bit register
    pub fn write_register(&mut self, address: u8, value: i32) -> Result<(), EncoderError<SPI::Error>> {
        self.frame(|spi| {
            spi.write(&[address | reg::WRITE_MASK])?;
            spi.write(&encode_value(value))
        })
    }

    /// Read a 32-bit register
    pub fn read_register(&mut self, address: u8) -> Result<[u8; 4], EncoderError<SPI::Error>> {
        self.frame(|spi| {
            let mut rx = [0u8; 4];
            spi.write(&[address])?;
            spi.read(&mut rx)?;
            Ok(rx)
        })
    }

    fn axis_register(base: u8, axis: char) -> Result<u8, EncoderError<SPI::Error>> {
        axis_register(base, axis).ok_or(EncoderError::UnknownAxis(axis))
    }
}

impl<SPI: SpiBus, CS: OutputPin> PositionSource for EncoderLink<SPI, CS> {
    type Error = EncoderError<SPI::Error>;

    fn read_position(&mut self, axis: char) -> Result<i32, Self::Error> {
        let address = Self::axis_register(reg::COUNTERS, axis)?;
        self.read_register(address).map(decode_value)
    }

    fn set_target(&mut self, axis: char, counts: i32) -> Result<(), Self::Error> {
        let address = Self::axis_register(reg::TARGETS, axis)?;
        self.write_register(address, counts)
    }

    fn set_counter(&mut self, axis: char, counts: i32) -> Result<(), Self::Error> {
        let address = Self::axis_register(reg::COUNTERS, axis)?;
        self.write_register(address, counts)
    }

    fn set_direction(&mut self, axis: char, direction: Direction) -> Result<(), Self::Error> {
        let address = Self::axis_register(reg::DIRECTIONS, axis)?;
        self.write_register(address, direction.as_level() as i32)
    }

    fn read_limits(&mut self) -> Result<Limits, Self::Error> {
        let rx = self.read_register(reg::LIMITS)?;
        Ok(Limits {
            hard: rx[0],
            targets: rx[1],
        })
    }

    fn acknowledge_limits(&mut self) -> Result<Limits, Self::Error> {
        let rx = self.read_register(reg::LIMITS | reg::WRITE_MASK)?;
        Ok(Limits {
            hard: rx[0],
            targets: rx[1],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct BusFault;

    /// SPI bus that records MOSI bytes and replays canned MISO bytes
    #[derive(Default)]
    struct MockSpi {
        written: Vec<u8, 64>,
        reply: Vec<u8, 16>,
        fail: bool,
    }

    impl SpiBus for MockSpi {
        type Error = BusFault;

        fn write(&mut self, data: &[u8]) -> Result<(), BusFault> {
            if self.fail {
                return Err(BusFault);
            }
            self.written.extend_from_slice(data).map_err(|_| BusFault)
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<(), BusFault> {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = self.reply.get(i).copied().unwrap_or(0);
            }
            Ok(())
        }
    }

    /// Chip select that counts frames
    #[derive(Default)]
    struct MockCs {
        high: bool,
        frames: u32,
    }

    impl OutputPin for MockCs {
        fn set_high(&mut self) {
            self.high = true;
        }

        fn set_low(&mut self) {
            self.high = false;
            self.frames += 1;
        }

        fn toggle(&mut self) {
            self.high = !self.high;
        }

        fn is_set_high(&self) -> bool {
            self.high
        }
    }

    fn link() -> EncoderLink<MockSpi, MockCs> {
        EncoderLink::new(MockSpi::default(), MockCs::default())
    }

    #[test]
    fn test_axis_register() {
        assert_eq!(axis_register(reg::COUNTERS, 'X'), Some(0x11));
        assert_eq!(axis_register(reg::COUNTERS, 'Y'), Some(0x12));
        assert_eq!(axis_register(reg::TARGETS, 'Z'), Some(0x23));
        assert_eq!(axis_register(reg::TARGETS, 'W'), None);
        assert_eq!(axis_register(reg::TARGETS, 'D'), None);
        assert_eq!(axis_register(reg::TARGETS, '['), None);
    }

    #[test]
    fn test_values_are_big_endian() {
        assert_eq!(encode_value(0x0102_0304), [1, 2, 3, 4]);
        assert_eq!(encode_value(-2), [0xFF, 0xFF, 0xFF, 0xFE]);
        assert_eq!(decode_value([0xFF, 0xFF, 0xFC, 0x18]), -1000);
    }

    #[test]
    fn test_set_target_frame() {
        let mut link = link();
        link.set_target('Y', 1000).unwrap();

        let (spi, cs) = link.release();
        assert_eq!(spi.written.as_slice(), &[0xA2, 0x00, 0x00, 0x03, 0xE8]);
        assert_eq!(cs.frames, 1);
        assert!(cs.high);
    }

    #[test]
    fn test_set_direction_frame() {
        let mut link = link();
        link.set_direction('Z', Direction::CounterClockwise).unwrap();
        link.set_direction('X', Direction::Clockwise).unwrap();

        let (spi, _) = link.release();
        assert_eq!(
            spi.written.as_slice(),
            &[0xB3, 0, 0, 0, 1, 0xB1, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_read_position() {
        let mut spi = MockSpi::default();
        spi.reply.extend_from_slice(&[0xFF, 0xFF, 0xFC, 0x18]).unwrap();
        let mut link = EncoderLink::new(spi, MockCs::default());

        assert_eq!(link.read_position('X'), Ok(-1000));
        let (spi, _) = link.release();
        // Address only; no write flag
        assert_eq!(spi.written.as_slice(), &[0x11]);
    }

    #[test]
    fn test_limits_and_acknowledge() {
        let mut spi = MockSpi::default();
        spi.reply.extend_from_slice(&[0b0000_0010, 0b0000_0101, 0, 0]).unwrap();
        let mut link = EncoderLink::new(spi, MockCs::default());

        let limits = link.read_limits().unwrap();
        assert_eq!(limits, Limits { hard: 0b10, targets: 0b101 });
        assert!(limits.hard_limit_hit());
        assert!(limits.target_reached(2));
        assert!(!limits.target_reached(1));

        link.acknowledge_limits().unwrap();
        let (spi, cs) = link.release();
        assert_eq!(spi.written.as_slice(), &[0x00, 0x80]);
        assert_eq!(cs.frames, 2);
    }

    #[test]
    fn test_init_sets_threshold_and_acks() {
        let mut link = link();
        link.init(1).unwrap();
        let (spi, _) = link.release();
        assert_eq!(spi.written.as_slice(), &[0xC0, 0, 0, 0, 1, 0x80]);
    }

    #[test]
    fn test_unknown_axis_touches_nothing() {
        let mut link = link();
        assert_eq!(link.set_counter('Q', 5), Err(EncoderError::UnknownAxis('Q')));
        let (spi, cs) = link.release();
        assert!(spi.written.is_empty());
        assert_eq!(cs.frames, 0);
    }

    #[test]
    fn test_bus_fault_releases_chip_select() {
        let mut spi = MockSpi::default();
        spi.fail = true;
        let mut link = EncoderLink::new(spi, MockCs::default());

        assert_eq!(link.set_counter('X', 0), Err(EncoderError::Bus(BusFault)));
        let (_, cs) = link.release();
        assert!(cs.high);
    }
}
