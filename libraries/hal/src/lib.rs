mod input;
mod output;
mod snapshot;
mod telemetry;
mod types;

pub use input::*;
pub use output::*;
pub use snapshot::*;
pub use telemetry::*;
pub use types::*;
