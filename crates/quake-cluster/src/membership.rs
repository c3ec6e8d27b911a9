//! Add/remove-member operations mapped into the failure taxonomy.

use std::time::Duration;

use quake_verdict::{FailureReason, NodeId};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::node::{MemberOp, NodeHandle};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipConfig {
    /// Pause before issuing a membership request, so it does not race an
    /// in-flight election or log append.
    pub settle_ms: u64,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self { settle_ms: 5_000 }
    }
}

impl MembershipConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Ask `initiator` to add `candidate` to the cluster.
pub async fn add_member(
    initiator: &NodeHandle,
    candidate: NodeId,
    config: &MembershipConfig,
) -> Result<(), FailureReason> {
    change_member(initiator, candidate, MemberOp::Add, config)
        .await
        .map_err(|_| FailureReason::AddMemberFailure)
}

/// Ask `initiator` to remove `target` from the cluster.
pub async fn remove_member(
    initiator: &NodeHandle,
    target: NodeId,
    config: &MembershipConfig,
) -> Result<(), FailureReason> {
    change_member(initiator, target, MemberOp::Remove, config)
        .await
        .map_err(|_| FailureReason::RemoveMemberFailure)
}

async fn change_member(
    initiator: &NodeHandle,
    member: NodeId,
    op: MemberOp,
    config: &MembershipConfig,
) -> Result<(), RemoteError> {
    tracing::info!(initiator = %initiator.id, member = %member, ?op, "changing membership");
    tokio::time::sleep(config.settle()).await;

    let result = initiator.client.change_member(member, op).await;
    match &result {
        Ok(()) => {
            tracing::info!(initiator = %initiator.id, member = %member, ?op, "membership changed");
        }
        Err(e) => {
            // Only the taxonomy class is surfaced; the detail stays in the log.
            tracing::warn!(
                initiator = %initiator.id,
                member = %member,
                ?op,
                error = %e,
                "membership change rejected"
            );
        }
    }
    result
}
