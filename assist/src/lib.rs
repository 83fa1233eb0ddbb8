//! Helicopter control assist: cascaded cyclic and yaw laws on top of the
//! adaptive PID and trim primitives.

mod board;
mod config;
mod cyclic;
mod input;
mod mode;
mod rc;
mod vehicle;
mod yaw;

pub use board::{Board, Resources};
pub use config::{AssistConfig, ConfigError, CyclicConfig, InputConfig, TrimBlend, YawConfig};
pub use cyclic::CyclicLaw;
pub use input::{apply_expo, InputProcessor};
pub use mode::{CyclicMode, ModeChange, ModeState};
pub use rc::{RcInput, RcMapper};
pub use vehicle::{Assist, AssistStatus};
pub use yaw::YawLaw;
