//! # Motion
//!
//! Converts world-frame telemetry into the heading-relative body frame
//! (forward / right / up) used by the control laws, and keeps the previous
//! sample around for derivative reconstruction.

pub mod state;
pub mod utils;

pub use state::MotionState;
pub use utils::{angle_diff, rad_to_deg, world_to_body, wrap_angle};
