//! Trial records, the run report, and operator-facing output.

use std::fmt;

use colored::{ColoredString, Colorize};
use quake_observe::Snapshot;
use quake_verdict::{FailureReason, TerminationSignal, TrialIndex, Validity};
use serde::{Deserialize, Serialize};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
/// Provisioning or configuration failed; no verdict was reached.
pub const EXIT_FATAL: u8 = 2;

/// Outcome of one trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub index: TrialIndex,
    pub verdict: Validity,
    /// Whether verification was repeated after the grace interval.
    pub rechecked: bool,
    pub elapsed_ms: u64,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub trials: Vec<TrialRecord>,
    pub outcome: TerminationSignal,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            TerminationSignal::StopSuccess => EXIT_SUCCESS,
            TerminationSignal::StopFailure | TerminationSignal::Continue => EXIT_FAILURE,
        }
    }

    /// The first failing trial, if any.
    pub fn failure(&self) -> Option<(TrialIndex, &FailureReason)> {
        self.trials
            .iter()
            .find_map(|t| t.verdict.reason().map(|r| (t.index, r)))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rechecked = self.trials.iter().filter(|t| t.rechecked).count();
        write!(
            f,
            "{} trial(s), {} rechecked, outcome {:?} after {} ms",
            self.trials.len(),
            rechecked,
            self.outcome,
            self.elapsed_ms
        )?;
        if let Some((index, reason)) = self.failure() {
            write!(f, "; trial {index} failed: {reason}")?;
        }
        Ok(())
    }
}

// ── Operator output ─────────────────────────────────────────────────

pub fn announce_trial(index: TrialIndex) {
    tracing::info!(trial = index, "starting trial");
    println!("{}", format!("==> trial {index}").bold());
}

/// Color-coded one-line description of a failure.
pub fn describe_failure(reason: &FailureReason) -> ColoredString {
    let text = reason.to_string();
    match reason {
        FailureReason::WrongOrder { .. } | FailureReason::BlockDivergence(_) => text.red(),
        FailureReason::NoBlockFound | FailureReason::ConvergenceTimeout => text.yellow(),
        FailureReason::TerminatedUnexpectedly => text.bright_red().bold(),
        FailureReason::LostTransactions(_) => text.magenta(),
        FailureReason::AddMemberFailure | FailureReason::RemoveMemberFailure => text.cyan(),
        FailureReason::WrongValue(_) => text.bright_magenta(),
        FailureReason::RemoteCallFailure(_) => text.bright_yellow(),
    }
}

pub fn report_failure(index: TrialIndex, reason: &FailureReason) {
    tracing::error!(trial = index, reason = reason.kind(), "trial failed: {reason}");
    println!("{} {}", format!("trial {index} failed:").red().bold(), describe_failure(reason));
}

pub fn report_outstanding(snapshot: &Snapshot) {
    for (node, count) in snapshot.outstanding_counts() {
        println!("    {node}: {} outstanding transaction(s)", count.to_string().yellow());
    }
}

pub fn report_summary(report: &RunReport) {
    tracing::info!(
        trials = report.trials.len(),
        outcome = ?report.outcome,
        elapsed_ms = report.elapsed_ms,
        "run finished"
    );
    let line = report.to_string();
    match report.exit_code() {
        EXIT_SUCCESS => println!("{}", line.bright_green().bold()),
        _ => println!("{}", line.red().bold()),
    }
}
