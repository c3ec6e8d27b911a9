use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use quake_cluster::sim::{SimNode, SimProvisioner};
use quake_cluster::{Cluster, ClusterSpec, ProvisionError, Provisioner};
use quake_core::{
    run, ConfigError, DriverError, RunConfig, TrialContext, TrialDriver, EXIT_FAILURE, EXIT_FATAL,
    EXIT_SUCCESS,
};
use quake_verdict::{Block, FailureReason, NodeId, TerminationSignal, TxId, Validity};

fn config(trial_limit: Option<u64>) -> RunConfig {
    RunConfig {
        node_count: 3,
        trial_limit,
        ..RunConfig::default()
    }
}

async fn passing(_ctx: TrialContext) -> Result<(), FailureReason> {
    Ok(())
}

struct BrokenProvisioner;

#[async_trait]
impl Provisioner for BrokenProvisioner {
    async fn provision(&self, _spec: &ClusterSpec) -> Result<Cluster, ProvisionError> {
        Err(ProvisionError::Bootstrap("genesis file missing".to_string()))
    }
}

/// Raises its flag when the owning task ends, whether it returns or is aborted.
struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Attaches a supervisor task to each simulated cluster and records
/// whether it was told to shut down.
struct SupervisedProvisioner {
    inner: SimProvisioner,
    stopped: Arc<AtomicBool>,
}

#[async_trait]
impl Provisioner for SupervisedProvisioner {
    async fn provision(&self, spec: &ClusterSpec) -> Result<Cluster, ProvisionError> {
        let mut cluster = self.inner.provision(spec).await?;
        let token = cluster.shutdown_token();
        let guard = SetOnDrop(Arc::clone(&self.stopped));
        cluster.attach(tokio::spawn(async move {
            let _guard = guard;
            token.cancelled().await;
        }));
        Ok(cluster)
    }
}

async fn exploding(_ctx: TrialContext) -> Result<(), FailureReason> {
    panic!("scenario bug");
}

// ── Trial budget ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_fixed_trial_count_runs_exactly_k_trials() {
    let provisioner = Arc::new(SimProvisioner::new());
    let driver = TrialDriver::new(Arc::clone(&provisioner), config(None)).unwrap();

    let report = driver.run_trials(passing, 4).await.unwrap();
    assert_eq!(report.trials.len(), 4);
    assert_eq!(report.outcome, TerminationSignal::StopSuccess);
    assert_eq!(report.exit_code(), EXIT_SUCCESS);
    assert_eq!(provisioner.provisioned(), 4);
    let indices: Vec<u64> = report.trials.iter().map(|t| t.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_zero_trial_count_is_rejected_without_provisioning() {
    let provisioner = Arc::new(SimProvisioner::new());
    let driver = TrialDriver::new(Arc::clone(&provisioner), config(None)).unwrap();

    let err = driver.run_trials(passing, 0).await.unwrap_err();
    assert!(matches!(err, DriverError::Config(ConfigError::Invalid(_))));
    assert_eq!(provisioner.provisioned(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_run_entry_point_exits_zero_after_limit() {
    let status = run(config(Some(2)), SimProvisioner::new(), passing).await;
    assert_eq!(status, EXIT_SUCCESS);
}

#[tokio::test(start_paused = true)]
async fn test_failure_on_third_trial_stops_run() {
    let provisioner = SimProvisioner::new().with_setup(|index, nodes| {
        if index == 2 {
            nodes[1].terminate(137);
        }
    });
    let provisioner = Arc::new(provisioner);
    let driver = TrialDriver::new(Arc::clone(&provisioner), config(None)).unwrap();

    let report = driver
        .run(passing, |_| TerminationSignal::Continue)
        .await
        .unwrap();
    assert_eq!(report.trials.len(), 3);
    assert_eq!(report.exit_code(), EXIT_FAILURE);
    assert_eq!(
        report.failure(),
        Some((2, &FailureReason::TerminatedUnexpectedly))
    );
    assert_eq!(provisioner.provisioned(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_run_entry_point_exits_nonzero_on_failure() {
    let provisioner = SimProvisioner::new().with_setup(|index, nodes| {
        if index == 2 {
            nodes[0].add_outstanding(TxId::new("t-lost"));
        }
    });
    let status = run(config(Some(10)), provisioner, passing).await;
    assert_eq!(status, EXIT_FAILURE);
}

#[tokio::test(start_paused = true)]
async fn test_predicate_can_stop_early() {
    let driver = TrialDriver::new(SimProvisioner::new(), config(None)).unwrap();
    let report = driver
        .run(passing, |index| {
            if index == 1 {
                TerminationSignal::StopSuccess
            } else {
                TerminationSignal::Continue
            }
        })
        .await
        .unwrap();
    assert_eq!(report.trials.len(), 2);
    assert_eq!(report.exit_code(), EXIT_SUCCESS);
}

#[tokio::test(start_paused = true)]
async fn test_predicate_stop_failure_after_verified_trial() {
    let driver = TrialDriver::new(SimProvisioner::new(), config(None)).unwrap();
    let report = driver
        .run(passing, |_| TerminationSignal::StopFailure)
        .await
        .unwrap();
    assert_eq!(report.trials.len(), 1);
    assert!(report.trials[0].verdict.is_verified());
    assert_eq!(report.failure(), None);
    assert_eq!(report.exit_code(), EXIT_FAILURE);
}

// ── Recheck policy ──────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_late_block_passes_on_recheck() {
    let provisioner = SimProvisioner::new()
        .without_genesis()
        .with_setup(|_, nodes| {
            let nodes: Vec<Arc<SimNode>> = nodes.to_vec();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(10)).await;
                for node in &nodes {
                    node.commit(Block::new(1, "late"));
                }
            });
        });
    let driver = TrialDriver::new(provisioner, config(None)).unwrap();

    let record = driver.run_trial(0, &passing).await.unwrap();
    assert_eq!(record.verdict, Validity::Verified);
    assert!(record.rechecked);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_divergence_fails_after_recheck() {
    let provisioner = SimProvisioner::new().with_setup(|_, nodes| {
        nodes[2].commit(Block::new(2, "fork"));
    });
    let driver = TrialDriver::new(provisioner, config(None)).unwrap();

    let record = driver.run_trial(0, &passing).await.unwrap();
    assert!(record.rechecked);
    assert_eq!(
        record.verdict,
        Validity::Falsified(FailureReason::WrongOrder {
            before: Some(Block::new(1, "genesis")),
            after: Some(Block::new(2, "fork")),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_lost_transactions_are_not_rechecked() {
    let provisioner = SimProvisioner::new().with_setup(|_, nodes| {
        nodes[1].add_outstanding(TxId::new("t1"));
    });
    let driver = TrialDriver::new(provisioner, config(None)).unwrap();

    let record = driver.run_trial(0, &passing).await.unwrap();
    assert!(!record.rechecked);
    assert_eq!(
        record.verdict,
        Validity::Falsified(FailureReason::LostTransactions(
            [TxId::new("t1")].into_iter().collect()
        ))
    );
    assert!(record.elapsed_ms < 20_000);
}

// ── Scenario bodies ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_scenario_failure_short_circuits_verification() {
    let provisioner = SimProvisioner::new().with_setup(|_, nodes| {
        nodes[0].reject_member_changes(true);
    });
    let driver = TrialDriver::new(provisioner, config(None)).unwrap();

    let scenario = |ctx: TrialContext| async move {
        let leader = &ctx.nodes[0];
        ctx.add_member(leader, NodeId(9)).await
    };
    let report = driver.run_trials(scenario, 5).await.unwrap();
    assert_eq!(report.trials.len(), 1);
    assert_eq!(
        report.trials[0].verdict,
        Validity::Falsified(FailureReason::AddMemberFailure)
    );
    assert!(!report.trials[0].rechecked);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_under_load_with_membership_and_convergence() {
    let provisioner = Arc::new(SimProvisioner::new());
    let driver = TrialDriver::new(Arc::clone(&provisioner), config(None)).unwrap();

    let scenario = |ctx: TrialContext| async move {
        let leader = &ctx.nodes[0];
        ctx.with_load(async {
            ctx.add_member(leader, NodeId(3)).await?;
            ctx.remove_member(leader, NodeId(3)).await
        })
        .await?;
        let block = ctx.await_convergence().await?;
        assert_eq!(block, Block::new(1, "genesis"));
        Ok::<(), FailureReason>(())
    };
    let report = driver.run_trials(scenario, 2).await.unwrap();
    assert_eq!(report.exit_code(), EXIT_SUCCESS);

    let nodes = provisioner.latest();
    let submitted: u64 = nodes.iter().map(|n| n.submitted()).sum();
    assert!(submitted > 0);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(nodes.iter().map(|n| n.submitted()).sum::<u64>(), submitted);
}

#[tokio::test(start_paused = true)]
async fn test_privacy_mode_reaches_scenario() {
    let mut config = config(Some(1));
    config.privacy = quake_cluster::PrivacyMode::Enabled;
    let driver = TrialDriver::new(SimProvisioner::new(), config).unwrap();

    let scenario = |ctx: TrialContext| async move {
        if ctx.privacy_service_running {
            Ok(())
        } else {
            Err(FailureReason::RemoteCallFailure("privacy service down".to_string()))
        }
    };
    let report = driver.run_trials(scenario, 1).await.unwrap();
    assert!(report.trials[0].verdict.is_verified());
}

// ── Fatal errors ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_provisioning_error_is_fatal() {
    let driver = TrialDriver::new(BrokenProvisioner, config(None)).unwrap();
    let err = driver.run_trials(passing, 3).await.unwrap_err();
    assert!(matches!(
        err,
        DriverError::Provision(ProvisionError::Bootstrap(_))
    ));

    let status = run(config(Some(3)), BrokenProvisioner, passing).await;
    assert_eq!(status, EXIT_FATAL);
}

#[tokio::test]
async fn test_invalid_config_is_fatal() {
    let bad = RunConfig {
        node_count: 0,
        ..RunConfig::default()
    };
    assert!(matches!(
        TrialDriver::new(SimProvisioner::new(), bad.clone()),
        Err(DriverError::Config(_))
    ));
    assert_eq!(run(bad, SimProvisioner::new(), passing).await, EXIT_FATAL);
}

// ── Isolation ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_panicking_scenario_still_stops_cluster_tasks() {
    let stopped = Arc::new(AtomicBool::new(false));
    let provisioner = SupervisedProvisioner {
        inner: SimProvisioner::new(),
        stopped: Arc::clone(&stopped),
    };
    let driver = TrialDriver::new(provisioner, config(None)).unwrap();

    let outcome = AssertUnwindSafe(driver.run_trial(0, &exploding))
        .catch_unwind()
        .await;
    assert!(outcome.is_err());

    for _ in 0..10 {
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(stopped.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_stopped_after_normal_trial() {
    let stopped = Arc::new(AtomicBool::new(false));
    let provisioner = SupervisedProvisioner {
        inner: SimProvisioner::new(),
        stopped: Arc::clone(&stopped),
    };
    let driver = TrialDriver::new(provisioner, config(None)).unwrap();

    let record = driver.run_trial(0, &passing).await.unwrap();
    assert!(record.verdict.is_verified());
    assert!(stopped.load(Ordering::SeqCst));
}
