//! The closed failure taxonomy.
//!
//! Every defect a trial can detect maps to exactly one [`FailureReason`]
//! variant. There is no catch-all variant: a new defect class is a new
//! variant, and every `match` on the taxonomy has to handle it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{display_last_block, Block, NodeId, TxId};

/// A single unexpected application-level read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMismatch {
    pub node: NodeId,
    pub expected: i64,
    /// The value read, or the error message if the read itself failed.
    pub actual: Result<i64, String>,
}

/// Why a trial failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum FailureReason {
    /// Two sampled last-block observations disagree.
    #[error("wrong block order: {} vs {}", display_last_block(.before), display_last_block(.after))]
    WrongOrder {
        before: Option<Block>,
        after: Option<Block>,
    },

    /// All nodes agreed, but on "nothing produced yet".
    #[error("no block found: every node agrees no block has been produced")]
    NoBlockFound,

    /// A node process exited while the trial was running.
    #[error("a node terminated unexpectedly")]
    TerminatedUnexpectedly,

    /// Submitted transactions that never showed up as committed.
    #[error("lost {} transaction(s): {}", .0.len(), join(.0.iter()))]
    LostTransactions(BTreeSet<TxId>),

    #[error("failed to add member")]
    AddMemberFailure,

    #[error("failed to remove member")]
    RemoveMemberFailure,

    /// Application-level reads returned unexpected values or errored.
    #[error("wrong value on {} node(s): {}", .0.len(), describe_mismatches(.0))]
    WrongValue(Vec<ValueMismatch>),

    /// Nodes disagreed and did not converge before the deadline.
    #[error("blocks diverged: [{}]", join(.0.iter().map(display_last_block)))]
    BlockDivergence(Vec<Option<Block>>),

    /// Convergence did not settle before the deadline and no values were seen.
    #[error("timed out waiting for convergence")]
    ConvergenceTimeout,

    /// A remote call to a node failed.
    #[error("remote call failed: {0}")]
    RemoteCallFailure(String),
}

impl FailureReason {
    /// Reasons that may be convergence lag rather than a real defect, and
    /// therefore earn one extra wait-and-recheck before being final.
    pub fn is_transient(&self) -> bool {
        match self {
            FailureReason::WrongOrder { .. } | FailureReason::NoBlockFound => true,
            FailureReason::TerminatedUnexpectedly
            | FailureReason::LostTransactions(_)
            | FailureReason::AddMemberFailure
            | FailureReason::RemoveMemberFailure
            | FailureReason::WrongValue(_)
            | FailureReason::BlockDivergence(_)
            | FailureReason::ConvergenceTimeout
            | FailureReason::RemoteCallFailure(_) => false,
        }
    }

    /// Short stable tag, used in structured logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::WrongOrder { .. } => "wrong_order",
            FailureReason::NoBlockFound => "no_block_found",
            FailureReason::TerminatedUnexpectedly => "terminated_unexpectedly",
            FailureReason::LostTransactions(_) => "lost_transactions",
            FailureReason::AddMemberFailure => "add_member_failure",
            FailureReason::RemoveMemberFailure => "remove_member_failure",
            FailureReason::WrongValue(_) => "wrong_value",
            FailureReason::BlockDivergence(_) => "block_divergence",
            FailureReason::ConvergenceTimeout => "convergence_timeout",
            FailureReason::RemoteCallFailure(_) => "remote_call_failure",
        }
    }
}

fn join<I, T>(items: I) -> String
where
    I: IntoIterator<Item = T>,
    T: std::fmt::Display,
{
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_mismatches(mismatches: &[ValueMismatch]) -> String {
    join(mismatches.iter().map(|m| match &m.actual {
        Ok(actual) => format!("{} expected {} got {}", m.node, m.expected, actual),
        Err(e) => format!("{} expected {} got error '{}'", m.node, m.expected, e),
    }))
}
