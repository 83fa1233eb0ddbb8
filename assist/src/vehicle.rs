use core::fmt;

use hal::{AxisOutput, ManualInput, ModeCommand, MotionSample};
use motion::{rad_to_deg, MotionState};

use crate::config::{AssistConfig, ConfigError};
use crate::cyclic::CyclicLaw;
use crate::input::InputProcessor;
use crate::mode::{CyclicMode, ModeChange, ModeState};
use crate::yaw::YawLaw;

/// Per-tick orchestration of the assist.
///
/// Order within a tick is fixed: motion state, input shaping, control laws,
/// output dither. Mode commands take `&mut self`, so they always land between
/// ticks.
pub struct Assist {
    config: AssistConfig,
    motion: MotionState,
    input: InputProcessor,
    cyclic: CyclicLaw,
    yaw: YawLaw,
    modes: ModeState,
    last_output: AxisOutput,
    ticks: u64,
}

impl Assist {
    pub fn new(config: AssistConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let input = InputProcessor::new(config.input);
        Self::build(config, input)
    }

    /// Same as [`Assist::new`] with a deterministic dither sequence.
    pub fn with_seed(config: AssistConfig, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let input = InputProcessor::with_seed(config.input, seed);
        Self::build(config, input)
    }

    fn build(config: AssistConfig, input: InputProcessor) -> Result<Self, ConfigError> {
        let cyclic = CyclicLaw::new(config.cyclic, config.ema_alpha, config.period())
            .map_err(|source| ConfigError::Loop { name: "cyclic", source })?;
        let yaw = YawLaw::new(config.yaw).map_err(|source| ConfigError::Loop { name: "yaw", source })?;
        Ok(Self {
            motion: MotionState::new(config.ema_alpha),
            input,
            cyclic,
            yaw,
            modes: ModeState::default(),
            last_output: AxisOutput::HOLD,
            ticks: 0,
            config,
        })
    }

    pub fn apply_command(&mut self, command: ModeCommand) {
        match self.modes.apply(command) {
            ModeChange::Cyclic(mode) => {
                if mode == CyclicMode::Off {
                    self.cyclic.reset();
                }
                log::info!("Cyclic assist: {}", mode);
            }
            ModeChange::YawHold(enabled) => {
                self.yaw.reset();
                log::info!("Yaw assist: {}", if enabled { "ON" } else { "OFF" });
            }
            ModeChange::Blocked(blocked) => {
                log::info!("Assist output {}", if blocked { "frozen" } else { "released" });
            }
            ModeChange::Unchanged => {}
        }
    }

    /// Run one control tick and return the command for the output device.
    ///
    /// A non-positive or non-finite `dt` leaves every axis where it is.
    pub fn tick(&mut self, sample: &MotionSample, raw: ManualInput, dt: f32) -> AxisOutput {
        if !dt.is_finite() || dt <= 0.0 {
            log::warn!("Skipping tick with invalid dt {}", dt);
            return AxisOutput::HOLD;
        }
        self.ticks += 1;

        self.motion.update(sample);
        let raw = self.input.sanitize(raw);
        let shaped = self.input.process(raw, dt);
        let blocked = self.modes.blocked;

        let (cyclic_x, cyclic_y) = if self.modes.cyclic.is_enabled() {
            let hovering = self.modes.cyclic.is_hovering();
            match self
                .cyclic
                .update(&self.motion, shaped.cyclic_x, shaped.cyclic_y, hovering, blocked, dt)
            {
                Some((x, y)) => (Some(x), Some(y)),
                None => (None, None),
            }
        } else if blocked {
            (None, None)
        } else {
            let curved = self.input.curve_only(raw);
            (Some(curved.cyclic_x), Some(curved.cyclic_y))
        };

        let yaw = if self.modes.yaw_hold {
            self.yaw.update(&self.motion, shaped.yaw, blocked, dt)
        } else if blocked {
            None
        } else {
            Some(raw.yaw)
        };

        let output = self.input.dither(AxisOutput::new(cyclic_x, cyclic_y, yaw));
        if !output.is_hold() {
            self.last_output = output;
        }
        log::trace!("tick {}: {:?}", self.ticks, output);
        output
    }

    pub fn status(&self) -> AssistStatus {
        AssistStatus {
            modes: self.modes,
            output: self.last_output,
            target_pitch: self.cyclic.target_pitch(),
            target_yaw: self.yaw.target_yaw(),
            trim: self.yaw.trim_applied(),
            forward_v: self.motion.forward_v(),
            right_v: self.motion.right_v(),
        }
    }

    pub fn modes(&self) -> &ModeState {
        &self.modes
    }

    pub fn motion(&self) -> &MotionState {
        &self.motion
    }

    pub fn cyclic(&self) -> &CyclicLaw {
        &self.cyclic
    }

    pub fn yaw(&self) -> &YawLaw {
        &self.yaw
    }

    pub fn config(&self) -> &AssistConfig {
        &self.config
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

/// Snapshot for periodic logging.
#[derive(Debug, Clone, Copy)]
pub struct AssistStatus {
    pub modes: ModeState,
    pub output: AxisOutput,
    pub target_pitch: f32,
    pub target_yaw: Option<f32>,
    pub trim: f32,
    pub forward_v: f32,
    pub right_v: f32,
}

impl fmt::Display for AssistStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cyclic={} yaw_hold={} fwd_v={:+.2} right_v={:+.2} target_pitch={:+.3}",
            self.modes.cyclic, self.modes.yaw_hold, self.forward_v, self.right_v, self.target_pitch
        )?;
        if let (Some(x), Some(y)) = (self.output.cyclic_x, self.output.cyclic_y) {
            write!(f, " CyclicX={:+.2} CyclicY={:+.2}", x, y)?;
        }
        if let Some(yaw) = self.output.yaw {
            write!(f, " Yaw={:+.2} Trim={:+.3}", yaw, self.trim)?;
        }
        if let Some(target) = self.target_yaw {
            write!(f, " TargetYaw={:+.1}deg", rad_to_deg(target))?;
        }
        if self.modes.blocked {
            write!(f, " [frozen]")?;
        }
        Ok(())
    }
}
