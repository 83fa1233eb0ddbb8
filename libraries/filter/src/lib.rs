//! Small single-state filters shared by the control laws.

mod ema;
mod kalman;
mod slew;

pub use ema::Ema;
pub use kalman::BiasKalman;
pub use slew::{sign, slew_toward};
