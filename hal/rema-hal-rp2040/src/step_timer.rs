//! PWM-slice step timer
//!
//! Each axis pair gets one PWM slice used purely as a periodic timer: the
//! counter wraps once per step edge and raises `PWM_IRQ_WRAP`. The step
//! lines themselves are plain GPIO toggled from the interrupt, so the
//! synchronizer can decide per edge which axes move.
//!
//! All slices share the single wrap interrupt. The handler checks
//! [`PwmStepTimer::take_wrap`] for each slice it owns.

use embassy_rp::pac;
use embassy_rp::pwm::{Config, Pwm, Slice};
use embassy_rp::Peri;
use fixed::types::extra::U4;
use fixed::FixedU16;

use rema_core::traits::{StepTimer, TimerError, MAX_STEP_FREQ_HZ};
use rema_hal::timer::TimerSettings;

/// System clock the PWM slices run from
pub const SYS_CLK_HZ: u32 = 125_000_000;

/// Step timer on one PWM slice
pub struct PwmStepTimer<'d> {
    pwm: Pwm<'d>,
    slice: usize,
    config: Config,
    started: bool,
}

impl<'d> PwmStepTimer<'d> {
    /// Take a PWM slice and enable its wrap interrupt
    ///
    /// `slice` is the slice number of the peripheral (0-7). The counter
    /// stays disabled until [`start`](StepTimer::start).
    pub fn new<S: Slice>(peri: Peri<'d, S>, slice: usize) -> Self {
        let mut config = Config::default();
        config.enable = false;
        let pwm = Pwm::new_free(peri, config.clone());

        pac::PWM.intr().write(|w| w.set_ch(slice, true));
        pac::PWM.inte().modify(|w| w.set_ch(slice, true));

        Self {
            pwm,
            slice,
            config,
            started: false,
        }
    }

    /// Clear this slice's wrap flag, returning true if it was set
    ///
    /// Called from the `PWM_IRQ_WRAP` handler.
    pub fn take_wrap(slice: usize) -> bool {
        if !pac::PWM.ints().read().ch(slice) {
            return false;
        }
        pac::PWM.intr().write(|w| w.set_ch(slice, true));
        true
    }

    pub fn slice(&self) -> usize {
        self.slice
    }

    fn apply(&mut self) {
        self.config.enable = self.started;
        self.pwm.set_config(&self.config);
    }
}

impl StepTimer for PwmStepTimer<'_> {
    fn set_frequency(&mut self, hz: u32) -> Result<(), TimerError> {
        if hz > MAX_STEP_FREQ_HZ {
            return Err(TimerError::FrequencyTooHigh);
        }
        let settings = TimerSettings::for_step_rate(SYS_CLK_HZ, hz).ok_or(TimerError::FrequencyUnreachable)?;
        let bits = ((settings.divider.integer as u16) << 4) | settings.divider.fraction as u16;
        self.config.divider = FixedU16::<U4>::from_bits(bits);
        self.config.top = settings.top;
        self.apply();
        Ok(())
    }

    fn start(&mut self) {
        self.started = true;
        self.apply();
    }

    fn stop(&mut self) {
        self.started = false;
        self.apply();
        pac::PWM.intr().write(|w| w.set_ch(self.slice, true));
    }

    fn is_started(&self) -> bool {
        self.started
    }
}
