use serde::{Deserialize, Serialize};

use crate::types::TrialIndex;

/// What the driver should do after a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationSignal {
    StopSuccess,
    StopFailure,
    Continue,
}

impl TerminationSignal {
    pub fn is_stop(self) -> bool {
        !matches!(self, TerminationSignal::Continue)
    }

    /// Absorbing-left merge: a stop on the left is final, `Continue`
    /// defers to the right.
    pub fn combine(self, later: TerminationSignal) -> TerminationSignal {
        match self {
            TerminationSignal::Continue => later,
            stop => stop,
        }
    }
}

/// Predicate that stops successfully once `trials` trials have passed.
///
/// `trials` must be at least 1; a zero limit behaves like 1.
pub fn stop_after(trials: u64) -> impl FnMut(TrialIndex) -> TerminationSignal + Send {
    move |index| {
        if index + 1 >= trials {
            TerminationSignal::StopSuccess
        } else {
            TerminationSignal::Continue
        }
    }
}

/// Predicate that never stops on its own; the run ends at the first failure.
pub fn until_failure() -> impl FnMut(TrialIndex) -> TerminationSignal + Send {
    |_| TerminationSignal::Continue
}
