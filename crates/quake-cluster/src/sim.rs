//! In-process simulated cluster.
//!
//! [`SimProvisioner`] stands in for real node processes: every node is a
//! [`SimNode`] whose observables are driven directly, so scenarios and tests
//! can script elections, commits, crashes, lost transactions and failing
//! remote calls without launching anything.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use quake_observe::{
    observable, termination, NodeProbe, Observable, Publisher, TerminationNotifier,
};
use quake_verdict::{Block, NodeId, TxId};

use crate::error::{ProvisionError, RemoteError};
use crate::node::{MemberOp, NodeClient, NodeHandle, Role};
use crate::provision::{Cluster, ClusterSpec, PrivacyMode, Provisioner};

#[derive(Debug, Default)]
struct SimState {
    members: BTreeSet<NodeId>,
    value: i64,
    submitted: u64,
    hold_transactions: bool,
    reject_member_changes: bool,
    read_error: Option<String>,
}

/// A scripted cluster member.
#[derive(Debug)]
pub struct SimNode {
    id: NodeId,
    last_block: Publisher<Block>,
    outstanding: Publisher<BTreeSet<TxId>>,
    role: Publisher<Role>,
    exit: TerminationNotifier,
    probe: NodeProbe,
    role_obs: Observable<Role>,
    state: Mutex<SimState>,
}

impl SimNode {
    pub fn new(id: NodeId) -> Arc<Self> {
        let (last_block, last_block_obs) = observable();
        let (outstanding, outstanding_obs) = observable();
        let (role, role_obs) = observable();
        let (exit, exit_handle) = termination();
        outstanding.publish(BTreeSet::new());

        Arc::new(Self {
            id,
            last_block,
            outstanding,
            role,
            exit,
            probe: NodeProbe {
                node: id,
                last_block: last_block_obs,
                outstanding: outstanding_obs,
                termination: exit_handle,
            },
            role_obs,
            state: Mutex::new(SimState::default()),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn handle(self: &Arc<Self>) -> NodeHandle {
        NodeHandle {
            id: self.id,
            probe: self.probe.clone(),
            role: self.role_obs.clone(),
            client: Arc::clone(self) as Arc<dyn NodeClient>,
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Scripting ───────────────────────────────────────────────────

    pub fn elect(&self, role: Role) {
        self.role.publish(role);
    }

    pub fn commit(&self, block: Block) {
        self.last_block.publish(block);
    }

    /// Simulate the node process exiting.
    pub fn terminate(&self, exit_status: i32) {
        self.exit.resolve(exit_status);
    }

    /// While held, submitted transactions stay outstanding instead of
    /// being confirmed. Releasing confirms everything held so far.
    pub fn hold_transactions(&self, hold: bool) {
        self.state().hold_transactions = hold;
        if !hold {
            self.outstanding.publish(BTreeSet::new());
        }
    }

    /// Mark a transaction as outstanding on this node.
    pub fn add_outstanding(&self, tx: TxId) {
        self.outstanding.update(|set| {
            set.insert(tx);
        });
    }

    pub fn reject_member_changes(&self, reject: bool) {
        self.state().reject_member_changes = reject;
    }

    pub fn set_value(&self, value: i64) {
        self.state().value = value;
    }

    pub fn fail_reads(&self, message: impl Into<String>) {
        self.state().read_error = Some(message.into());
    }

    pub fn set_members(&self, members: impl IntoIterator<Item = NodeId>) {
        self.state().members = members.into_iter().collect();
    }

    // ── Inspection ──────────────────────────────────────────────────

    /// Transactions accepted by this node so far.
    pub fn submitted(&self) -> u64 {
        self.state().submitted
    }

    pub fn members(&self) -> BTreeSet<NodeId> {
        self.state().members.clone()
    }
}

#[async_trait]
impl NodeClient for SimNode {
    async fn change_member(&self, member: NodeId, op: MemberOp) -> Result<(), RemoteError> {
        let mut state = self.state();
        if state.reject_member_changes {
            return Err(RemoteError::Rejected(format!(
                "{} refused {op:?} of {member}",
                self.id
            )));
        }
        let changed = match op {
            MemberOp::Add => state.members.insert(member),
            MemberOp::Remove => state.members.remove(&member),
        };
        if changed {
            Ok(())
        } else {
            Err(RemoteError::Rejected(format!(
                "{op:?} of {member} is a no-op on {}",
                self.id
            )))
        }
    }

    async fn submit_transaction(&self, payload: Vec<u8>) -> Result<TxId, RemoteError> {
        if self.probe.termination.is_resolved() {
            return Err(RemoteError::Unavailable(self.id));
        }
        let (tx, hold) = {
            let mut state = self.state();
            state.submitted += 1;
            let tx = TxId::new(format!(
                "{}-{}-{}",
                self.id,
                state.submitted,
                payload.len()
            ));
            (tx, state.hold_transactions)
        };
        if hold {
            self.add_outstanding(tx.clone());
        }
        Ok(tx)
    }

    async fn read_value(&self) -> Result<i64, RemoteError> {
        let state = self.state();
        match &state.read_error {
            Some(message) => Err(RemoteError::Transport(message.clone())),
            None => Ok(state.value),
        }
    }
}

/// Hook run after each cluster is bootstrapped: `(provision count, nodes)`.
pub type SimSetup = Box<dyn Fn(usize, &[Arc<SimNode>]) + Send + Sync>;

/// Provisions [`SimNode`] clusters.
///
/// By default every node elects (node 0 leads), commits a genesis block and
/// lists every node as a member. A setup hook can then script the trial.
pub struct SimProvisioner {
    genesis: bool,
    setup: Option<SimSetup>,
    provisioned: AtomicUsize,
    latest: Mutex<Vec<Arc<SimNode>>>,
}

impl Default for SimProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl SimProvisioner {
    pub fn new() -> Self {
        Self {
            genesis: true,
            setup: None,
            provisioned: AtomicUsize::new(0),
            latest: Mutex::new(Vec::new()),
        }
    }

    /// Skip committing the genesis block.
    pub fn without_genesis(mut self) -> Self {
        self.genesis = false;
        self
    }

    pub fn with_setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(usize, &[Arc<SimNode>]) + Send + Sync + 'static,
    {
        self.setup = Some(Box::new(setup));
        self
    }

    /// Number of clusters provisioned so far.
    pub fn provisioned(&self) -> usize {
        self.provisioned.load(Ordering::SeqCst)
    }

    /// Nodes of the most recently provisioned cluster.
    pub fn latest(&self) -> Vec<Arc<SimNode>> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Provisioner for SimProvisioner {
    async fn provision(&self, spec: &ClusterSpec) -> Result<Cluster, ProvisionError> {
        if spec.node_count == 0 {
            return Err(ProvisionError::InvalidSpec(
                "cluster needs at least one node".to_string(),
            ));
        }
        let index = self.provisioned.fetch_add(1, Ordering::SeqCst);

        let ids: Vec<NodeId> = (0..spec.node_count as u32).map(NodeId).collect();
        let nodes: Vec<Arc<SimNode>> = ids.iter().map(|id| SimNode::new(*id)).collect();
        for (i, node) in nodes.iter().enumerate() {
            node.set_members(ids.iter().copied());
            node.elect(if i == 0 { Role::Leader } else { Role::Follower });
            if self.genesis {
                node.commit(Block::new(1, "genesis"));
            }
        }
        if let Some(setup) = &self.setup {
            setup(index, &nodes);
        }

        tracing::debug!(
            trial_cluster = index,
            nodes = nodes.len(),
            consensus = ?spec.consensus,
            "provisioned simulated cluster"
        );

        let mut cluster = Cluster::new(nodes.iter().map(SimNode::handle).collect());
        cluster.privacy_service_running = spec.privacy == PrivacyMode::Enabled;

        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = nodes;
        Ok(cluster)
    }
}
