//! Step timer arithmetic
//!
//! A step pulse needs two timer edges (rise and fall), so a step rate of
//! `hz` is programmed as an edge rate of `2 * hz`. Chip HALs turn that edge
//! rate into a clock divider and a counter wrap value with
//! [`TimerSettings::for_step_rate`].
//!
//! The divider is 8.4 fixed point and the counter is 16 bits wide, which
//! matches the PWM slices of the RP2040 and most general purpose timers.

/// Largest counter wrap value
pub const MAX_TOP: u32 = 0xFFFF;

/// Smallest divider (1.0) in 1/16 units
const MIN_DIV_X16: u64 = 16;

/// Largest divider (255 + 15/16) in 1/16 units
const MAX_DIV_X16: u64 = 255 * 16 + 15;

/// Timer edges needed per step pulse
pub const EDGES_PER_STEP: u32 = 2;

/// Convert a step rate into the timer edge rate
pub const fn edge_rate_hz(step_hz: u32) -> u32 {
    step_hz.saturating_mul(EDGES_PER_STEP)
}

/// 8.4 fixed-point clock divider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerDivider {
    /// Integer part (1-255)
    pub integer: u8,
    /// Fractional part in 1/16 (0-15)
    pub fraction: u8,
}

impl TimerDivider {
    fn from_x16(div_x16: u64) -> Self {
        Self {
            integer: (div_x16 / 16) as u8,
            fraction: (div_x16 % 16) as u8,
        }
    }

    fn as_x16(&self) -> u64 {
        self.integer as u64 * 16 + self.fraction as u64
    }
}

/// Divider and wrap value producing one interrupt per edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerSettings {
    /// Clock divider
    pub divider: TimerDivider,
    /// Counter wrap value (the counter runs 0..=top)
    pub top: u16,
}

impl TimerSettings {
    /// Compute settings for `step_hz` steps per second
    ///
    /// Returns `None` for a zero rate, or when the edge rate cannot be
    /// reached with the fastest divider. Rates below the slowest reachable
    /// one are clamped to it.
    pub fn for_step_rate(clock_hz: u32, step_hz: u32) -> Option<Self> {
        let edge_hz = edge_rate_hz(step_hz) as u64;
        if edge_hz == 0 {
            return None;
        }
        let clock_x16 = clock_hz as u64 * 16;

        // Smallest divider that keeps the wrap value within 16 bits
        let div_x16 = clock_x16
            .div_ceil(edge_hz * (MAX_TOP as u64 + 1))
            .clamp(MIN_DIV_X16, MAX_DIV_X16);

        let period = clock_x16 / (div_x16 * edge_hz);
        if period < 2 {
            return None;
        }
        let top = (period - 1).min(MAX_TOP as u64) as u16;

        Some(Self {
            divider: TimerDivider::from_x16(div_x16),
            top,
        })
    }

    /// Edge rate actually produced by these settings
    pub fn edge_rate_hz(&self, clock_hz: u32) -> u32 {
        let clock_x16 = clock_hz as u64 * 16;
        (clock_x16 / (self.divider.as_x16() * (self.top as u64 + 1))) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLK: u32 = 125_000_000;

    fn relative_error(actual: u32, wanted: u32) -> f64 {
        (actual as f64 - wanted as f64).abs() / wanted as f64
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert_eq!(TimerSettings::for_step_rate(CLK, 0), None);
    }

    #[test]
    fn test_edge_rate_doubles_step_rate() {
        assert_eq!(edge_rate_hz(10_000), 20_000);
        assert_eq!(edge_rate_hz(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_controller_range_is_accurate() {
        for hz in [10_000, 25_000, 60_000, 500_000] {
            let settings = TimerSettings::for_step_rate(CLK, hz).unwrap();
            let actual = settings.edge_rate_hz(CLK);
            assert!(
                relative_error(actual, edge_rate_hz(hz)) < 0.001,
                "{} Hz -> {} edges/s",
                hz,
                actual
            );
        }
    }

    #[test]
    fn test_slow_rate_uses_divider() {
        let settings = TimerSettings::for_step_rate(CLK, 100).unwrap();
        assert!(settings.divider.integer > 1);
        assert!(relative_error(settings.edge_rate_hz(CLK), 200) < 0.01);
    }

    #[test]
    fn test_unreachable_rate() {
        // Needs a wrap value below 1
        assert_eq!(TimerSettings::for_step_rate(CLK, CLK), None);
    }

    #[test]
    fn test_very_slow_rate_clamped() {
        let settings = TimerSettings::for_step_rate(CLK, 1).unwrap();
        assert_eq!(settings.divider.integer, 255);
        assert_eq!(settings.divider.fraction, 15);
    }
}
