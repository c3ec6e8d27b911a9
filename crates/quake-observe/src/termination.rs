use crate::observable::{observable, Observable, Publisher};

/// Resolved by the process supervisor when a node process exits.
#[derive(Debug)]
pub struct TerminationNotifier(Publisher<i32>);

/// Non-blocking view of whether a node process has exited.
#[derive(Debug, Clone)]
pub struct TerminationHandle(Observable<i32>);

pub fn termination() -> (TerminationNotifier, TerminationHandle) {
    let (publisher, obs) = observable();
    (TerminationNotifier(publisher), TerminationHandle(obs))
}

impl TerminationNotifier {
    /// Record the exit status. Later calls overwrite earlier ones.
    pub fn resolve(&self, exit_status: i32) {
        self.0.publish(exit_status);
    }
}

impl TerminationHandle {
    /// A handle that never resolves, for nodes without a supervised process.
    pub fn never() -> Self {
        Self(Observable::silent())
    }

    /// The exit status if the process has already ended.
    pub fn poll(&self) -> Option<i32> {
        self.0.sample()
    }

    pub fn is_resolved(&self) -> bool {
        self.poll().is_some()
    }
}
