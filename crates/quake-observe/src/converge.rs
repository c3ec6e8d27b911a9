//! Convergence polling with a deadline.
//!
//! [`converge`] spawns a polling task that samples a set of observables at a
//! fixed interval and finishes once they all hold one equal value. While they
//! disagree it keeps the latest sample vector in a single-slot cell.
//! [`await_convergence`] bounds that task with a deadline and turns the
//! outcome into the failure taxonomy:
//!
//! - converged before the deadline: the agreed block
//! - deadline elapsed, values were seen: `BlockDivergence` with the last sample
//! - deadline elapsed, nothing was seen: `ConvergenceTimeout`

use std::time::Duration;

use quake_verdict::{Block, FailureReason};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::observable::Observable;

/// Poll interval and deadline for convergence checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergeConfig {
    /// Delay between two samples of all observables.
    pub poll_interval_ms: u64,
    /// Overall bound on one convergence check.
    pub deadline_ms: u64,
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            deadline_ms: 60_000,
        }
    }
}

impl ConvergeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

/// A running convergence poll. Dropping it cancels the polling task.
#[derive(Debug)]
pub struct Convergence<T> {
    task: JoinHandle<T>,
    last_seen: watch::Receiver<Option<Vec<Option<T>>>>,
}

impl<T: Clone> Convergence<T> {
    /// The most recent sample vector that contained at least one value.
    pub fn last_seen(&self) -> Option<Vec<Option<T>>> {
        self.last_seen.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl<T> Drop for Convergence<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start polling `observables` every `interval` until they all agree.
///
/// An empty set never converges. A zero interval is treated as 1 ms.
pub fn converge<T>(observables: Vec<Observable<T>>, interval: Duration) -> Convergence<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    let (tx, last_seen) = watch::channel(None);
    let interval = interval.max(Duration::from_millis(1));
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let samples: Vec<Option<T>> = observables.iter().map(Observable::sample).collect();
            if samples.iter().any(Option::is_some) {
                tx.send_replace(Some(samples.clone()));
            }
            if let Some(agreed) = agreed_value(&samples) {
                return agreed;
            }
        }
    });
    Convergence { task, last_seen }
}

fn agreed_value<T: Clone + PartialEq>(samples: &[Option<T>]) -> Option<T> {
    let first = samples.first()?.as_ref()?;
    samples
        .iter()
        .all(|s| s.as_ref() == Some(first))
        .then(|| first.clone())
}

/// Wait for the last-block observables to agree, bounded by the deadline.
pub async fn await_convergence(
    observables: &[Observable<Block>],
    config: &ConvergeConfig,
) -> Result<Block, FailureReason> {
    let mut convergence = converge(observables.to_vec(), config.poll_interval());

    match tokio::time::timeout(config.deadline(), &mut convergence.task).await {
        Ok(Ok(block)) => {
            tracing::debug!(block = %block, "observables converged");
            return Ok(block);
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "convergence polling task failed");
        }
        Err(_) => {
            convergence.cancel();
            tracing::debug!(
                deadline_ms = config.deadline_ms,
                "convergence deadline elapsed"
            );
        }
    }

    match convergence.last_seen() {
        Some(values) => Err(FailureReason::BlockDivergence(values)),
        None => Err(FailureReason::ConvergenceTimeout),
    }
}
