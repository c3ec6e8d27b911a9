//! Post-scenario verification.
//!
//! Takes one best-effort snapshot of every node's observables and reduces
//! three independent checks to a single verdict, in this order:
//!
//! 1. no node process has terminated
//! 2. every node reports the same, non-empty last block
//! 3. no submitted transaction is still outstanding on any node
//!
//! The earliest failing check wins (see [`quake_verdict::validity::reduce`]).

use std::collections::BTreeSet;

use quake_verdict::validity::reduce;
use quake_verdict::{Block, FailureReason, NodeId, TxId, Validity};

use crate::observable::Observable;
use crate::termination::TerminationHandle;

/// Everything the verification engine reads from one node.
#[derive(Debug, Clone)]
pub struct NodeProbe {
    pub node: NodeId,
    pub last_block: Observable<Block>,
    pub outstanding: Observable<BTreeSet<TxId>>,
    pub termination: TerminationHandle,
}

/// A point-in-time sample of all probes, in probe order.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub nodes: Vec<NodeId>,
    pub last_blocks: Vec<Option<Block>>,
    pub outstanding: Vec<BTreeSet<TxId>>,
    /// Exit status of nodes whose process already ended.
    pub terminated: Vec<(NodeId, i32)>,
}

impl Snapshot {
    /// Sample every probe without blocking.
    pub fn take(probes: &[NodeProbe]) -> Self {
        let mut snapshot = Snapshot {
            nodes: Vec::with_capacity(probes.len()),
            last_blocks: Vec::with_capacity(probes.len()),
            outstanding: Vec::with_capacity(probes.len()),
            terminated: Vec::new(),
        };
        for probe in probes {
            snapshot.nodes.push(probe.node);
            snapshot.last_blocks.push(probe.last_block.sample());
            snapshot
                .outstanding
                .push(probe.outstanding.sample().unwrap_or_default());
            if let Some(status) = probe.termination.poll() {
                snapshot.terminated.push((probe.node, status));
            }
        }
        snapshot
    }

    /// Outstanding transaction count for each node that has any.
    pub fn outstanding_counts(&self) -> Vec<(NodeId, usize)> {
        self.nodes
            .iter()
            .zip(&self.outstanding)
            .filter(|(_, set)| !set.is_empty())
            .map(|(node, set)| (*node, set.len()))
            .collect()
    }
}

/// Result of one verification pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub validity: Validity,
    pub snapshot: Snapshot,
}

/// Any terminated node is a defect; nodes are never expected to exit mid-trial.
pub fn check_termination(terminated: &[(NodeId, i32)]) -> Validity {
    if terminated.is_empty() {
        Validity::Verified
    } else {
        Validity::Falsified(FailureReason::TerminatedUnexpectedly)
    }
}

/// All nodes must report the same last block, and it must exist.
pub fn check_last_blocks(last_blocks: &[Option<Block>]) -> Validity {
    let first = last_blocks.first().cloned().flatten();
    if let Some(other) = last_blocks.iter().find(|b| **b != first) {
        return Validity::Falsified(FailureReason::WrongOrder {
            before: first,
            after: other.clone(),
        });
    }
    match first {
        Some(_) => Validity::Verified,
        None => Validity::Falsified(FailureReason::NoBlockFound),
    }
}

/// A transaction still outstanding on any node counts as lost.
pub fn check_outstanding(outstanding: &[BTreeSet<TxId>]) -> Validity {
    let lost: BTreeSet<TxId> = outstanding.iter().flatten().cloned().collect();
    if lost.is_empty() {
        Validity::Verified
    } else {
        Validity::Falsified(FailureReason::LostTransactions(lost))
    }
}

/// Transactions submitted but not yet confirmed.
pub fn pending(submitted: &BTreeSet<TxId>, confirmed: &BTreeSet<TxId>) -> BTreeSet<TxId> {
    submitted.difference(confirmed).cloned().collect()
}

/// Snapshot every probe and reduce the three checks to one verdict.
pub fn verify(probes: &[NodeProbe]) -> Verification {
    let snapshot = Snapshot::take(probes);

    for (node, status) in &snapshot.terminated {
        tracing::warn!(node = %node, exit_status = status, "node process has exited");
    }
    for (node, count) in snapshot.outstanding_counts() {
        tracing::info!(node = %node, outstanding = count, "outstanding transactions");
    }

    let validity = reduce([
        check_termination(&snapshot.terminated),
        check_last_blocks(&snapshot.last_blocks),
        check_outstanding(&snapshot.outstanding),
    ]);

    if let Some(reason) = validity.reason() {
        tracing::debug!(reason = reason.kind(), "verification falsified");
    }

    Verification { validity, snapshot }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(n: u64) -> Option<Block> {
        Some(Block::new(n, format!("h{n}")))
    }

    #[test]
    fn test_equal_blocks_verified() {
        assert_eq!(
            check_last_blocks(&[block(3), block(3), block(3)]),
            Validity::Verified
        );
    }

    #[test]
    fn test_differing_block_reports_both_values() {
        assert_eq!(
            check_last_blocks(&[block(3), block(4), block(3)]),
            Validity::Falsified(FailureReason::WrongOrder {
                before: block(3),
                after: block(4),
            })
        );
    }

    #[test]
    fn test_missing_block_on_one_node_is_wrong_order() {
        assert_eq!(
            check_last_blocks(&[None, block(1)]),
            Validity::Falsified(FailureReason::WrongOrder {
                before: None,
                after: block(1),
            })
        );
    }

    #[test]
    fn test_all_empty_is_no_block_found() {
        assert_eq!(
            check_last_blocks(&[None, None, None]),
            Validity::Falsified(FailureReason::NoBlockFound)
        );
        assert_eq!(
            check_last_blocks(&[]),
            Validity::Falsified(FailureReason::NoBlockFound)
        );
    }

    #[test]
    fn test_pending_is_set_difference() {
        let submitted: BTreeSet<TxId> = ["a", "b", "c"].into_iter().map(TxId::new).collect();
        let confirmed: BTreeSet<TxId> = ["a", "c", "z"].into_iter().map(TxId::new).collect();
        let expected: BTreeSet<TxId> = [TxId::new("b")].into_iter().collect();
        assert_eq!(pending(&submitted, &confirmed), expected);
    }

    #[test]
    fn test_termination_check() {
        assert_eq!(check_termination(&[]), Validity::Verified);
        assert_eq!(
            check_termination(&[(NodeId(2), 1)]),
            Validity::Falsified(FailureReason::TerminatedUnexpectedly)
        );
    }
}
