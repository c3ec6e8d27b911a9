pub mod failure;
pub mod signal;
pub mod types;
pub mod validity;

pub use failure::{FailureReason, ValueMismatch};
pub use signal::TerminationSignal;
pub use types::{Block, NodeId, TrialIndex, TxId};
pub use validity::Validity;
