//! Two-state verdict and its left-priority reducer.
//!
//! `Verified` is the identity; when both sides are `Falsified` the left
//! reason wins. Reducing a sequence therefore reports the earliest failure
//! and drops the rest, so output does not depend on how many checks ran.

use serde::{Deserialize, Serialize};

use crate::failure::FailureReason;

/// Outcome of one check, or of several checks merged with [`combine`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validity {
    #[default]
    Verified,
    Falsified(FailureReason),
}

impl Validity {
    pub fn is_verified(&self) -> bool {
        matches!(self, Validity::Verified)
    }

    /// The failure reason, if any.
    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            Validity::Verified => None,
            Validity::Falsified(reason) => Some(reason),
        }
    }

    /// Convert into a `Result` so a failure can be propagated with `?`.
    pub fn into_result(self) -> Result<(), FailureReason> {
        match self {
            Validity::Verified => Ok(()),
            Validity::Falsified(reason) => Err(reason),
        }
    }
}

impl From<Result<(), FailureReason>> for Validity {
    fn from(result: Result<(), FailureReason>) -> Self {
        match result {
            Ok(()) => Validity::Verified,
            Err(reason) => Validity::Falsified(reason),
        }
    }
}

/// Merge two verdicts. The left reason takes priority.
pub fn combine(left: Validity, right: Validity) -> Validity {
    match left {
        Validity::Falsified(_) => left,
        Validity::Verified => right,
    }
}

/// Reduce checks left to right with [`combine`], starting from `Verified`.
pub fn reduce<I>(checks: I) -> Validity
where
    I: IntoIterator<Item = Validity>,
{
    checks.into_iter().fold(Validity::Verified, combine)
}
