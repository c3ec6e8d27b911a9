//! The trial-execution driver.
//!
//! Each trial provisions a fresh cluster, waits for election, runs the
//! caller's scenario, then verifies. `WrongOrder` and `NoBlockFound` may be
//! convergence lag, so those two get one recheck after a grace interval;
//! every other failure is final. The cluster is torn down at the end of
//! every trial whatever the verdict.

use std::future::Future;

use quake_cluster::{
    await_role_assumption, with_load, Cluster, LoadConfig, MembershipConfig, NodeHandle,
    ProvisionError, Provisioner,
};
use quake_observe::{await_convergence, verify, ConvergeConfig, NodeProbe, Observable};
use quake_verdict::{Block, FailureReason, NodeId, TerminationSignal, TrialIndex, Validity};
use tokio::time::Instant;

use crate::config::{ConfigError, RunConfig};
use crate::report::{self, RunReport, TrialRecord};

/// Errors that end a run without a verdict.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// What a scenario body gets for one trial.
#[derive(Debug, Clone)]
pub struct TrialContext {
    pub index: TrialIndex,
    pub nodes: Vec<NodeHandle>,
    pub privacy_service_running: bool,
    pub membership: MembershipConfig,
    pub converge: ConvergeConfig,
    pub load: LoadConfig,
}

impl TrialContext {
    fn new(index: TrialIndex, cluster: &Cluster, config: &RunConfig) -> Self {
        Self {
            index,
            nodes: cluster.nodes.clone(),
            privacy_service_running: cluster.privacy_service_running,
            membership: config.membership.clone(),
            converge: config.converge.clone(),
            load: config.load.clone(),
        }
    }

    pub fn probes(&self) -> Vec<NodeProbe> {
        self.nodes.iter().map(|n| n.probe.clone()).collect()
    }

    /// Run `body` with background load against every node of the trial.
    pub async fn with_load<T, F>(&self, body: F) -> Result<T, FailureReason>
    where
        F: Future<Output = Result<T, FailureReason>>,
    {
        with_load(&self.nodes, &self.load, body).await
    }

    pub async fn add_member(
        &self,
        initiator: &NodeHandle,
        candidate: NodeId,
    ) -> Result<(), FailureReason> {
        quake_cluster::add_member(initiator, candidate, &self.membership).await
    }

    pub async fn remove_member(
        &self,
        initiator: &NodeHandle,
        target: NodeId,
    ) -> Result<(), FailureReason> {
        quake_cluster::remove_member(initiator, target, &self.membership).await
    }

    /// Wait for every node's last block to agree.
    pub async fn await_convergence(&self) -> Result<Block, FailureReason> {
        let blocks: Vec<Observable<Block>> =
            self.nodes.iter().map(|n| n.probe.last_block.clone()).collect();
        await_convergence(&blocks, &self.converge).await
    }
}

pub struct TrialDriver<P> {
    provisioner: P,
    config: RunConfig,
}

impl<P: Provisioner> TrialDriver<P> {
    pub fn new(provisioner: P, config: RunConfig) -> Result<Self, DriverError> {
        config.validate()?;
        Ok(Self {
            provisioner,
            config,
        })
    }

    /// Run trials until one fails or `predicate` asks to stop.
    ///
    /// `predicate` is consulted only after a verified trial, with that
    /// trial's index.
    pub async fn run<S, Fut, Pred>(
        &self,
        scenario: S,
        mut predicate: Pred,
    ) -> Result<RunReport, DriverError>
    where
        S: Fn(TrialContext) -> Fut,
        Fut: Future<Output = Result<(), FailureReason>>,
        Pred: FnMut(TrialIndex) -> TerminationSignal,
    {
        let started = Instant::now();
        let mut trials = Vec::new();
        let mut index: TrialIndex = 0;

        let outcome = loop {
            let record = self.run_trial(index, &scenario).await?;
            let signal = match record.verdict.reason() {
                Some(reason) => {
                    report::report_failure(index, reason);
                    TerminationSignal::StopFailure
                }
                None => predicate(index),
            };
            trials.push(record);

            if signal.is_stop() {
                break signal;
            }
            index += 1;
        };

        Ok(RunReport {
            trials,
            outcome,
            elapsed_ms: elapsed_ms(started),
        })
    }

    /// Run exactly `trials` trials, stopping early only on failure.
    ///
    /// `trials` must be at least 1.
    pub async fn run_trials<S, Fut>(&self, scenario: S, trials: u64) -> Result<RunReport, DriverError>
    where
        S: Fn(TrialContext) -> Fut,
        Fut: Future<Output = Result<(), FailureReason>>,
    {
        if trials == 0 {
            return Err(
                ConfigError::Invalid("trial count must be at least 1".to_string()).into(),
            );
        }
        self.run(scenario, quake_verdict::signal::stop_after(trials))
            .await
    }

    /// Provision, run the scenario, verify, tear down.
    pub async fn run_trial<S, Fut>(
        &self,
        index: TrialIndex,
        scenario: &S,
    ) -> Result<TrialRecord, DriverError>
    where
        S: Fn(TrialContext) -> Fut,
        Fut: Future<Output = Result<(), FailureReason>>,
    {
        let started = Instant::now();
        report::announce_trial(index);

        let cluster = self
            .provisioner
            .provision(&self.config.cluster_spec())
            .await?;
        if let Err(e) = await_role_assumption(&cluster.nodes).await {
            cluster.teardown().await;
            return Err(e.into());
        }
        if cluster.privacy_service_running {
            tracing::debug!(trial = index, "privacy service running");
        }

        // If the scenario panics, dropping `cluster` still cancels its tasks.
        let context = TrialContext::new(index, &cluster, &self.config);
        let (verdict, rechecked) = match scenario(context).await {
            Ok(()) => self.verify_cluster(index, &cluster).await,
            Err(reason) => (Validity::Falsified(reason), false),
        };
        cluster.teardown().await;

        let record = TrialRecord {
            index,
            verdict,
            rechecked,
            elapsed_ms: elapsed_ms(started),
        };
        tracing::info!(
            trial = index,
            verified = record.verdict.is_verified(),
            rechecked,
            elapsed_ms = record.elapsed_ms,
            "trial finished"
        );
        Ok(record)
    }

    async fn verify_cluster(&self, index: TrialIndex, cluster: &Cluster) -> (Validity, bool) {
        let verify_config = &self.config.verify;
        let probes = cluster.probes();

        tokio::time::sleep(verify_config.settle()).await;
        let first = verify(&probes);
        report::report_outstanding(&first.snapshot);

        match first.validity.reason() {
            Some(reason) if reason.is_transient() => {
                tracing::info!(
                    trial = index,
                    reason = reason.kind(),
                    grace_ms = verify_config.recheck_grace_ms,
                    "possibly transient failure, rechecking after grace"
                );
                tokio::time::sleep(verify_config.recheck_grace()).await;
                let second = verify(&probes);
                report::report_outstanding(&second.snapshot);
                (second.validity, true)
            }
            _ => (first.validity, false),
        }
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}
