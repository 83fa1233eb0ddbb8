use pid::{AdaptivePID, PIDConfig, PIDError, TrimConfig, TrimEstimator};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration for loop {name}: {source}")]
    Loop {
        name: &'static str,
        #[source]
        source: PIDError,
    },

    #[error("Invalid trim configuration: {0}")]
    Trim(#[source] PIDError),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: f32 },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

fn check_range(name: &'static str, value: f32, lo: f32, hi: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= lo && value <= hi {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue { name, value })
    }
}

fn build_loop(name: &'static str, config: PIDConfig) -> Result<AdaptivePID, ConfigError> {
    AdaptivePID::new(config).map_err(|source| ConfigError::Loop { name, source })
}

/// Cyclic law tuning. Loop names follow the cascade from the outside in:
/// position offset, body velocity, attitude, attitude rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CyclicConfig {
    /// Stick magnitude at which an axis counts as manually flown
    pub manual_deadband: f32,
    /// Stick magnitude above which the smoothed auto output is blended with the stick
    pub blend_threshold: f32,
    /// Length of the cruise pitch averaging window
    pub pitch_history_seconds: f32,
    /// Pitch is only recorded while lateral stick stays below this
    pub pitch_history_lateral_limit: f32,
    /// Position offset clamp in meters
    pub offset_limit: f32,
    /// Attitude loop integral gain while cruising; zero while hovering
    pub cruise_attitude_ki: f32,
    /// Fade rate, per second, of an engage offset the loops could not absorb
    pub handover_slew: f32,

    pub right_offset: PIDConfig,
    pub right_v: PIDConfig,
    pub roll: PIDConfig,
    pub roll_rate: PIDConfig,
    pub forward_offset: PIDConfig,
    pub forward_v: PIDConfig,
    pub pitch: PIDConfig,
    pub pitch_rate: PIDConfig,
}

impl Default for CyclicConfig {
    fn default() -> Self {
        let base = PIDConfig::default();
        Self {
            manual_deadband: 0.02,
            blend_threshold: 0.01,
            pitch_history_seconds: 0.1,
            pitch_history_lateral_limit: 0.05,
            offset_limit: 3.5,
            cruise_attitude_ki: 0.24,
            handover_slew: 0.5,

            right_offset: base.with_gains(0.5, 0.3, 0.01).with_limits(20.0, 40.0).with_skip(2),
            right_v: base.with_gains(0.02, 0.0001, 0.0).with_limits(0.34, 0.68).with_skip(3),
            roll: base.with_gains(3.0, 0.0, 0.0).with_limits(5.0, 10.0).with_skip(4),
            roll_rate: base.with_gains(0.2, 0.05, 0.05).with_limits(0.35, 8.0),
            forward_offset: base.with_gains(0.5, 0.3, 0.01).with_limits(8.0, 40.0).with_skip(2),
            forward_v: base.with_gains(0.05, 0.0001, 0.0).with_limits(0.34, 0.68).with_skip(3),
            pitch: base.with_gains(3.0, 0.0, 0.0).with_limits(0.5, 1.0).with_skip(4),
            pitch_rate: base.with_gains(2.0, 0.05, 0.5).with_limits(0.35, 8.0),
        }
    }
}

impl CyclicConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("cyclic.manual_deadband", self.manual_deadband, 0.0, 1.0)?;
        check_range("cyclic.blend_threshold", self.blend_threshold, 0.0, 1.0)?;
        check_range("cyclic.pitch_history_seconds", self.pitch_history_seconds, 0.0, 60.0)?;
        check_range("cyclic.pitch_history_lateral_limit", self.pitch_history_lateral_limit, 0.0, 1.0)?;
        check_range("cyclic.offset_limit", self.offset_limit, 0.0, f32::MAX)?;
        check_range("cyclic.cruise_attitude_ki", self.cruise_attitude_ki, f32::MIN, f32::MAX)?;
        check_range("cyclic.handover_slew", self.handover_slew, f32::MIN_POSITIVE, f32::MAX)?;
        for (name, config) in self.loops() {
            build_loop(name, config)?;
        }
        Ok(())
    }

    pub fn loops(&self) -> [(&'static str, PIDConfig); 8] {
        [
            ("cyclic.right_offset", self.right_offset),
            ("cyclic.right_v", self.right_v),
            ("cyclic.roll", self.roll),
            ("cyclic.roll_rate", self.roll_rate),
            ("cyclic.forward_offset", self.forward_offset),
            ("cyclic.forward_v", self.forward_v),
            ("cyclic.pitch", self.pitch),
            ("cyclic.pitch_rate", self.pitch_rate),
        ]
    }
}

/// How learned trim reaches the yaw output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrimBlend {
    /// Add the slew-limited trim to the output and let the integral settle
    #[default]
    OutputSlew,
    /// Add the trim and shift the rate integral by the opposite amount
    IntegratorCompensation,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YawConfig {
    pub manual_deadband: f32,
    /// Heading is captured once |yaw rate| falls to this (rad/s)
    pub capture_rate_threshold: f32,
    /// Heading errors beyond this (rad) re-latch the target instead of steering
    pub relatch_tolerance: f32,
    pub trim_enabled: bool,
    pub trim_blend: TrimBlend,
    /// Starting trim estimate, e.g. a value learned in an earlier session
    pub initial_trim: f32,

    pub heading: PIDConfig,
    pub rate: PIDConfig,
    pub trim: TrimConfig,
}

impl Default for YawConfig {
    fn default() -> Self {
        let base = PIDConfig::default();
        Self {
            manual_deadband: 0.02,
            capture_rate_threshold: 0.05,
            relatch_tolerance: 0.2,
            trim_enabled: true,
            trim_blend: TrimBlend::OutputSlew,
            initial_trim: 0.0,
            heading: base.with_gains(0.75, 0.0, 0.0).with_limits(0.5, 1.0).with_skip(2),
            rate: base.with_gains(0.5, 0.1, 0.08).with_limits(0.7, 8.0),
            trim: TrimConfig::default(),
        }
    }
}

impl YawConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("yaw.manual_deadband", self.manual_deadband, 0.0, 1.0)?;
        check_range("yaw.capture_rate_threshold", self.capture_rate_threshold, 0.0, f32::MAX)?;
        check_range("yaw.relatch_tolerance", self.relatch_tolerance, 0.0, core::f32::consts::PI)?;
        check_range("yaw.initial_trim", self.initial_trim, self.trim.trim_min, self.trim.trim_max)?;
        build_loop("yaw.heading", self.heading)?;
        build_loop("yaw.rate", self.rate)?;
        TrimEstimator::new(self.trim).map_err(ConfigError::Trim)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub expo_cyclic: f32,
    pub expo_yaw: f32,
    /// Stick slew away from center, per second
    pub rate_up: f32,
    /// Stick slew toward center, per second
    pub rate_down: f32,
    pub dither_threshold: f32,
    pub dither_amplitude: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            expo_cyclic: 0.5,
            expo_yaw: 0.5,
            rate_up: 1.0,
            rate_down: 2.0,
            dither_threshold: 0.001,
            dither_amplitude: 0.001,
        }
    }
}

impl InputConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("input.expo_cyclic", self.expo_cyclic, 0.0, 1.0)?;
        check_range("input.expo_yaw", self.expo_yaw, 0.0, 1.0)?;
        check_range("input.rate_up", self.rate_up, 0.0, f32::MAX)?;
        check_range("input.rate_down", self.rate_down, 0.0, f32::MAX)?;
        check_range("input.dither_threshold", self.dither_threshold, 0.0, 1.0)?;
        check_range("input.dither_amplitude", self.dither_amplitude, 0.0, 1.0)?;
        Ok(())
    }
}

/// Complete assist configuration. Every level has defaults, so a partial
/// TOML file only needs the values it changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// Nominal control period
    pub period_ms: u32,
    /// EMA alpha shared by body acceleration and output blending filters
    pub ema_alpha: f32,

    pub cyclic: CyclicConfig,
    pub yaw: YawConfig,
    pub input: InputConfig,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            period_ms: 20,
            ema_alpha: 0.25,
            cyclic: CyclicConfig::default(),
            yaw: YawConfig::default(),
            input: InputConfig::default(),
        }
    }
}

impl AssistConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AssistConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Nominal period in seconds
    pub fn period(&self) -> f32 {
        self.period_ms as f32 / 1000.0
    }

    /// Check every value and build every loop once so bad gains surface
    /// before the control loop starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.period_ms == 0 {
            return Err(ConfigError::InvalidValue { name: "period_ms", value: 0.0 });
        }
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(ConfigError::InvalidValue { name: "ema_alpha", value: self.ema_alpha });
        }
        self.cyclic.validate()?;
        self.yaw.validate()?;
        self.input.validate()?;
        Ok(())
    }
}
