//! Per-trial cluster environments.
//!
//! A [`Provisioner`] builds a fresh cluster for every trial: credentials,
//! bootstrap process, node processes and, when requested, the privacy-layer
//! service. Nothing is shared between two clusters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use quake_observe::NodeProbe;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::ProvisionError;
use crate::node::{NodeHandle, Role};

/// How long background tasks get to wind down after cancellation.
const TEARDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusKind {
    Raft,
    Clique,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyMode {
    Disabled,
    Enabled,
}

/// Shape of the cluster under test, fixed for a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub node_count: usize,
    pub consensus: ConsensusKind,
    pub privacy: PrivacyMode,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create a fresh cluster. The returned nodes may not have elected yet.
    async fn provision(&self, spec: &ClusterSpec) -> Result<Cluster, ProvisionError>;
}

#[async_trait]
impl<P: Provisioner + ?Sized> Provisioner for Arc<P> {
    async fn provision(&self, spec: &ClusterSpec) -> Result<Cluster, ProvisionError> {
        (**self).provision(spec).await
    }
}

/// A provisioned cluster and the background tasks scoped to it.
#[derive(Debug)]
pub struct Cluster {
    pub nodes: Vec<NodeHandle>,
    pub privacy_service_running: bool,
    shutdown: CancellationToken,
    background: Vec<JoinHandle<()>>,
}

impl Cluster {
    pub fn new(nodes: Vec<NodeHandle>) -> Self {
        Self {
            nodes,
            privacy_service_running: false,
            shutdown: CancellationToken::new(),
            background: Vec::new(),
        }
    }

    /// Token that background tasks should watch to know when to stop.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Attach a background task (node process supervisor, bootstrap process,
    /// privacy service) whose lifetime ends with this cluster.
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.background.push(task);
    }

    pub fn probes(&self) -> Vec<NodeProbe> {
        self.nodes.iter().map(|n| n.probe.clone()).collect()
    }

    /// Cancel every background task, give them a grace period, then abort
    /// whatever is still running.
    pub async fn teardown(mut self) {
        self.shutdown.cancel();
        let pending = join_all(self.background.iter_mut());
        if tokio::time::timeout(TEARDOWN_GRACE, pending).await.is_err() {
            tracing::warn!("cluster background tasks ignored shutdown, aborting");
        }
        for task in &self.background {
            task.abort();
        }
    }
}

impl Drop for Cluster {
    // Reached without `teardown` when a trial panics or is cancelled.
    fn drop(&mut self) {
        self.shutdown.cancel();
        for task in &self.background {
            task.abort();
        }
    }
}

/// Wait, without a deadline, until every node reports a role.
pub async fn await_role_assumption(nodes: &[NodeHandle]) -> Result<Vec<Role>, ProvisionError> {
    let waits = nodes.iter().map(|node| {
        let mut role = node.role.clone();
        let id = node.id;
        async move { role.first_value().await.ok_or(ProvisionError::NodeLost(id)) }
    });
    let roles = join_all(waits)
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(nodes = roles.len(), "all nodes assumed a role");
    Ok(roles)
}
