mod pid;
mod trim;

pub use pid::{AdaptivePID, PIDConfig, PIDError};
pub use trim::{TrimConfig, TrimDiagnostics, TrimEstimator};
