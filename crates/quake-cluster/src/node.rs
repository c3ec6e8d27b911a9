use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use quake_observe::{NodeProbe, Observable};
use quake_verdict::{NodeId, TxId};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Role a node reports once leader election has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Leader,
    Follower,
    Learner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberOp {
    Add,
    Remove,
}

/// Remote operations the driver and scenarios issue against a node.
///
/// Implemented by whatever talks to real node processes (JSON-RPC, gRPC, ...)
/// and by [`crate::sim::SimNode`].
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Ask this node to add or remove `member` from the cluster.
    async fn change_member(&self, member: NodeId, op: MemberOp) -> Result<(), RemoteError>;

    /// Submit one transaction, returning the id the node assigned to it.
    async fn submit_transaction(&self, payload: Vec<u8>) -> Result<TxId, RemoteError>;

    /// Read the application-level value this node currently holds.
    async fn read_value(&self) -> Result<i64, RemoteError>;
}

/// One provisioned node: its observables plus a client for remote calls.
#[derive(Clone)]
pub struct NodeHandle {
    pub id: NodeId,
    pub probe: NodeProbe,
    pub role: Observable<Role>,
    pub client: Arc<dyn NodeClient>,
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("role", &self.role.sample())
            .field("last_block", &self.probe.last_block.sample())
            .field("client", &"<client>")
            .finish()
    }
}
