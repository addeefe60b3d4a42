//! SPI adapter
//!
//! Any blocking `embedded-hal` SPI bus (the embassy `Spi` in blocking mode
//! included) can serve as the encoder link.

use embassy_rp::spi;
use embedded_hal::spi::SpiBus as EhSpiBus;
use rema_hal::spi::{Phase, Polarity, SpiConfig};

/// Blocking SPI bus exposed through [`rema_hal::SpiBus`]
pub struct BlockingSpi<B>(B);

impl<B> BlockingSpi<B> {
    pub fn new(bus: B) -> Self {
        Self(bus)
    }
}

impl<B: EhSpiBus<u8>> rema_hal::SpiBus for BlockingSpi<B> {
    type Error = B::Error;

    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.0.write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.0.read(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush()
    }
}

/// Translate a bus configuration into the embassy one
pub fn rp_config(config: &SpiConfig) -> spi::Config {
    let (polarity, phase): (Polarity, Phase) = config.mode.into();
    let mut rp = spi::Config::default();
    rp.frequency = config.frequency;
    rp.polarity = match polarity {
        Polarity::IdleLow => spi::Polarity::IdleLow,
        Polarity::IdleHigh => spi::Polarity::IdleHigh,
    };
    rp.phase = match phase {
        Phase::CaptureOnFirstTransition => spi::Phase::CaptureOnFirstTransition,
        Phase::CaptureOnSecondTransition => spi::Phase::CaptureOnSecondTransition,
    };
    rp
}
