pub mod converge;
pub mod observable;
pub mod termination;
pub mod values;
pub mod verify;

pub use converge::{await_convergence, converge, ConvergeConfig, Convergence};
pub use observable::{observable, Observable, Publisher};
pub use termination::{termination, TerminationHandle, TerminationNotifier};
pub use verify::{verify, NodeProbe, Snapshot, Verification};
