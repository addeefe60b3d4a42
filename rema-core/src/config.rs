//! Configuration types
//!
//! Board description for both axis pairs. The firmware build script reads
//! these from `machine.toml`, validates them and embeds them as postcard
//! binary data; the defaults below describe the stock machine.

use heapless::String;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::safety::BrakesMode;
use crate::traits::MAX_STEP_FREQ_HZ;

/// Maximum pair name length
pub const MAX_NAME_LEN: usize = 8;

/// Default stepper resolution (microsteps per turn)
pub const DEFAULT_MOTOR_RESOLUTION: u32 = 25_000;

/// Default encoder resolution (lines per turn)
pub const DEFAULT_ENCODER_RESOLUTION: u32 = 500;

/// Default lead screw pitch
pub const DEFAULT_TURNS_PER_INCH: u32 = 10;

/// Counts per encoder line with full quadrature decoding
pub const QUADRATURE_FACTOR: u32 = 4;

/// Default supervisor period
pub const DEFAULT_STEP_TIME_MS: u32 = 100;

/// Consecutive low-progress checks before an axis is declared stalled
pub const DEFAULT_STALL_MAX_COUNT: u32 = 5;

/// Consecutive probe-asserted checks before protection trips
pub const DEFAULT_TOUCH_MAX_COUNT: u32 = 3;

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Motor, encoder or screw resolution is zero
    ZeroResolution(char),
    /// Stall counter threshold is zero
    ZeroStallCount(char),
    /// Axis name is not one the encoder peripheral knows
    UnknownAxis(char),
    /// Two physical axes share a name
    DuplicateAxis(char),
    /// The first axis of a pair is a placeholder
    DummyFirstAxis,
    /// Frequency limits are zero, inverted or above the timer maximum
    InvalidFrequencyRange,
    /// Proportional gain is negative or not finite
    InvalidGain,
    /// Supervisor period is zero
    ZeroStepTime,
    /// Touch-probe threshold is zero
    ZeroTouchCount,
}

/// Single axis configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisConfig {
    /// Axis name, also the encoder channel
    pub name: char,
    /// Microsteps per motor turn
    pub motor_resolution: u32,
    /// Encoder lines per turn
    pub encoder_resolution: u32,
    /// Lead screw turns per inch of travel
    pub turns_per_inch: u32,
    /// Invert the direction output
    pub reversed_direction: bool,
    /// Invert the encoder count
    pub reversed_encoder: bool,
    /// Placeholder axis with no motor
    pub dummy: bool,
    /// Stall detection threshold
    pub stall_max_count: u32,
}

impl AxisConfig {
    /// Physical axis with the stock resolutions
    pub fn new(name: char) -> Self {
        Self {
            name,
            motor_resolution: DEFAULT_MOTOR_RESOLUTION,
            encoder_resolution: DEFAULT_ENCODER_RESOLUTION,
            turns_per_inch: DEFAULT_TURNS_PER_INCH,
            reversed_direction: false,
            reversed_encoder: false,
            dummy: false,
            stall_max_count: DEFAULT_STALL_MAX_COUNT,
        }
    }

    /// Placeholder partner for a single-axis pair
    pub fn dummy(name: char) -> Self {
        Self {
            dummy: true,
            ..Self::new(name)
        }
    }

    /// Encoder counts per inch of travel, saturating at `u32::MAX`
    pub fn counts_per_inch(&self) -> u32 {
        self.turns_per_inch
            .saturating_mul(self.encoder_resolution)
            .saturating_mul(QUADRATURE_FACTOR)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dummy {
            return Ok(());
        }
        if !matches!(self.name, 'X' | 'Y' | 'Z') {
            return Err(ConfigError::UnknownAxis(self.name));
        }
        if self.motor_resolution == 0 || self.encoder_resolution == 0 || self.turns_per_inch == 0 {
            return Err(ConfigError::ZeroResolution(self.name));
        }
        if self.stall_max_count == 0 {
            return Err(ConfigError::ZeroStallCount(self.name));
        }
        Ok(())
    }
}

/// Proportional controller tuning
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ControllerConfig {
    /// Hz per count of position error
    pub gain: f32,
    /// Lowest commanded step rate (Hz)
    pub min_freq: u32,
    /// Highest commanded step rate (Hz)
    pub max_freq: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            gain: 100.0,
            min_freq: 10_000,
            max_freq: 60_000,
        }
    }
}

impl ControllerConfig {
    /// Check gain and frequency limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gain.is_finite() || self.gain < 0.0 {
            return Err(ConfigError::InvalidGain);
        }
        if self.min_freq == 0 || self.min_freq > self.max_freq || self.max_freq > MAX_STEP_FREQ_HZ {
            return Err(ConfigError::InvalidFrequencyRange);
        }
        Ok(())
    }
}

/// Axis pair configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairConfig {
    /// Pair name for logs
    pub name: String<MAX_NAME_LEN>,
    /// First axis
    pub first: AxisConfig,
    /// Second axis
    pub second: AxisConfig,
    /// Pair is held by the brake relay when idle
    pub has_brakes: bool,
    /// Controller tuning
    pub controller: ControllerConfig,
    /// Supervisor period in milliseconds
    pub step_time_ms: u32,
    /// Touch-probe protection threshold
    pub touch_max_count: u32,
}

impl PairConfig {
    /// Stock XY table: two physical axes behind the brakes
    pub fn xy() -> Self {
        Self {
            name: pair_name("xy_axes"),
            first: AxisConfig::new('X'),
            second: AxisConfig::new('Y'),
            has_brakes: true,
            controller: ControllerConfig::default(),
            step_time_ms: DEFAULT_STEP_TIME_MS,
            touch_max_count: DEFAULT_TOUCH_MAX_COUNT,
        }
    }

    /// Stock Z column: one reversed axis with a placeholder partner
    pub fn z() -> Self {
        Self {
            name: pair_name("z_axis"),
            first: AxisConfig {
                reversed_direction: true,
                reversed_encoder: true,
                ..AxisConfig::new('Z')
            },
            second: AxisConfig::dummy('D'),
            has_brakes: false,
            controller: ControllerConfig::default(),
            step_time_ms: DEFAULT_STEP_TIME_MS,
            touch_max_count: DEFAULT_TOUCH_MAX_COUNT,
        }
    }

    /// Check both axes and the pair settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.first.dummy {
            return Err(ConfigError::DummyFirstAxis);
        }
        self.first.validate()?;
        self.second.validate()?;
        if !self.second.dummy && self.first.name == self.second.name {
            return Err(ConfigError::DuplicateAxis(self.first.name));
        }
        self.controller.validate()?;
        if self.step_time_ms == 0 {
            return Err(ConfigError::ZeroStepTime);
        }
        if self.touch_max_count == 0 {
            return Err(ConfigError::ZeroTouchCount);
        }
        Ok(())
    }

    fn physical_axes(&self) -> impl Iterator<Item = &AxisConfig> {
        [&self.first, &self.second].into_iter().filter(|a| !a.dummy)
    }
}

fn pair_name(name: &str) -> String<MAX_NAME_LEN> {
    let mut s = String::new();
    for c in name.chars() {
        if s.push(c).is_err() {
            break;
        }
    }
    s
}

/// Safety defaults applied at boot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SafetyConfig {
    /// Brake relay policy
    pub brakes_mode: BrakesMode,
    /// Halt and disable control on stall
    pub stall_control: bool,
    /// Halt when the probe stays asserted while moving
    pub touch_probe_protection: bool,
    /// Minimum time between a probe release and the next contact
    pub touch_probe_debounce_ms: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            brakes_mode: BrakesMode::Auto,
            stall_control: true,
            touch_probe_protection: true,
            touch_probe_debounce_ms: 0,
        }
    }
}

/// Complete machine configuration
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// XY pair
    pub xy: PairConfig,
    /// Z pair
    pub z: PairConfig,
    /// Safety defaults
    #[cfg_attr(feature = "serde", serde(default))]
    pub safety: SafetyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            xy: PairConfig::xy(),
            z: PairConfig::z(),
            safety: SafetyConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Check every pair and that no encoder channel is used twice
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.xy.validate()?;
        self.z.validate()?;
        for a in self.xy.physical_axes() {
            if self.z.physical_axes().any(|b| b.name == a.name) {
                return Err(ConfigError::DuplicateAxis(a.name));
            }
        }
        Ok(())
    }
}
