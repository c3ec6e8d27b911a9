//! Fault-injection trial driver for replicated-log clusters.
//!
//! [`run`] is the process-level entry point: it repeatedly provisions a fresh
//! cluster, runs a caller-supplied scenario against it, verifies the cluster
//! state and maps the run's outcome to an exit status.

pub mod config;
pub mod driver;
pub mod logging;
pub mod report;

use std::future::Future;

use colored::Colorize;
use quake_cluster::Provisioner;
use quake_verdict::signal::{stop_after, until_failure};
use quake_verdict::{FailureReason, TerminationSignal, TrialIndex};

pub use config::{ConfigError, RunConfig, VerifyConfig};
pub use driver::{DriverError, TrialContext, TrialDriver};
pub use report::{RunReport, TrialRecord, EXIT_FAILURE, EXIT_FATAL, EXIT_SUCCESS};

/// Run trials per `config` and return the process exit status.
///
/// With a trial limit the run stops successfully after that many verified
/// trials; without one it continues until a trial fails.
pub async fn run<P, S, Fut>(config: RunConfig, provisioner: P, scenario: S) -> u8
where
    P: Provisioner,
    S: Fn(TrialContext) -> Fut,
    Fut: Future<Output = Result<(), FailureReason>>,
{
    let predicate: Box<dyn FnMut(TrialIndex) -> TerminationSignal + Send> =
        match config.trial_limit {
            Some(trials) => Box::new(stop_after(trials)),
            None => Box::new(until_failure()),
        };

    let result = match TrialDriver::new(provisioner, config) {
        Ok(driver) => driver.run(scenario, predicate).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(report) => {
            report::report_summary(&report);
            report.exit_code()
        }
        Err(e) => {
            tracing::error!(error = %e, "run aborted");
            eprintln!("{} {e}", "fatal:".red().bold());
            EXIT_FATAL
        }
    }
}
