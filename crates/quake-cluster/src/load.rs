//! Background transaction load scoped to a caller's body.
//!
//! [`with_load`] starts one generator task, runs the body, and stops the
//! generator on every exit path before returning the body's result. The
//! generator is also stopped if the enclosing future is dropped mid-body.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quake_verdict::{FailureReason, NodeId};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::node::{NodeClient, NodeHandle};

/// Size of each synthetic transaction payload, in bytes.
const PAYLOAD_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Transactions submitted per second across the whole node set.
    pub rate_per_sec: u32,
    /// Seed for target selection and payloads, for reproducible runs.
    pub seed: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 10,
            seed: 42,
        }
    }
}

impl LoadConfig {
    fn period(&self) -> Duration {
        Duration::from_micros((1_000_000 / u64::from(self.rate_per_sec.max(1))).max(1))
    }
}

/// Counters kept by a running generator.
#[derive(Debug, Default)]
pub struct LoadStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl LoadStats {
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// A running load generator. Stopped by [`LoadGenerator::stop`] or on drop.
#[derive(Debug)]
pub struct LoadGenerator {
    token: CancellationToken,
    task: JoinHandle<()>,
    stats: Arc<LoadStats>,
}

impl LoadGenerator {
    pub fn stats(&self) -> Arc<LoadStats> {
        Arc::clone(&self.stats)
    }

    /// Cancel the generator. Does not wait for an in-flight submission.
    pub fn stop(self) {
        self.halt();
        tracing::debug!(
            accepted = self.stats.accepted(),
            rejected = self.stats.rejected(),
            "load generator stopped"
        );
    }

    fn halt(&self) {
        self.token.cancel();
        self.task.abort();
    }
}

impl Drop for LoadGenerator {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Start submitting synthetic transactions to `nodes` at the configured rate.
pub fn start_load(nodes: &[NodeHandle], config: &LoadConfig) -> LoadGenerator {
    let targets: Vec<(NodeId, Arc<dyn NodeClient>)> = nodes
        .iter()
        .map(|n| (n.id, Arc::clone(&n.client)))
        .collect();
    let token = CancellationToken::new();
    let stats = Arc::new(LoadStats::default());

    tracing::info!(
        nodes = targets.len(),
        rate_per_sec = config.rate_per_sec,
        "starting load generator"
    );

    let task = tokio::spawn(generate(
        targets,
        config.clone(),
        token.clone(),
        Arc::clone(&stats),
    ));

    LoadGenerator { token, task, stats }
}

async fn generate(
    targets: Vec<(NodeId, Arc<dyn NodeClient>)>,
    config: LoadConfig,
    token: CancellationToken,
    stats: Arc<LoadStats>,
) {
    if targets.is_empty() {
        return;
    }
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut ticker = tokio::time::interval(config.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let (node, client) = &targets[rng.gen_range(0..targets.len())];
        let mut payload = vec![0u8; PAYLOAD_LEN];
        rng.fill(payload.as_mut_slice());

        tokio::select! {
            _ = token.cancelled() => return,
            result = client.submit_transaction(payload) => match result {
                Ok(tx) => {
                    stats.accepted.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(node = %node, tx = %tx, "submitted transaction");
                }
                Err(e) => {
                    stats.rejected.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(node = %node, error = %e, "transaction rejected");
                }
            },
        }
    }
}

/// Run `body` while a load generator submits against `nodes`.
///
/// The generator is stopped before this returns, whether `body` succeeded
/// or failed.
pub async fn with_load<T, F>(
    nodes: &[NodeHandle],
    config: &LoadConfig,
    body: F,
) -> Result<T, FailureReason>
where
    F: Future<Output = Result<T, FailureReason>>,
{
    let generator = start_load(nodes, config);
    let result = body.await;
    generator.stop();
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_from_rate() {
        let config = LoadConfig {
            rate_per_sec: 4,
            seed: 1,
        };
        assert_eq!(config.period(), Duration::from_millis(250));
    }

    #[test]
    fn test_zero_rate_does_not_panic() {
        let config = LoadConfig {
            rate_per_sec: 0,
            seed: 1,
        };
        assert_eq!(config.period(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_empty_node_set_exits_immediately() {
        let generator = start_load(&[], &LoadConfig::default());
        tokio::task::yield_now().await;
        assert_eq!(generator.stats().accepted(), 0);
        generator.stop();
    }
}
