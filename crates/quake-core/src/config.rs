//! Run configuration.
//!
//! Everything fixed for the whole run: cluster shape, trial budget and the
//! timing knobs of each phase. Read from JSON; absent fields take defaults.

use std::path::Path;
use std::time::Duration;

use quake_cluster::{ClusterSpec, ConsensusKind, LoadConfig, MembershipConfig, PrivacyMode};
use quake_observe::ConvergeConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Post-scenario verification timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Pause between the end of the scenario and the first verification.
    pub settle_ms: u64,
    /// Extra wait before re-verifying a possibly transient failure.
    pub recheck_grace_ms: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            settle_ms: 5_000,
            recheck_grace_ms: 20_000,
        }
    }
}

impl VerifyConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn recheck_grace(&self) -> Duration {
        Duration::from_millis(self.recheck_grace_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub node_count: usize,
    pub consensus: ConsensusKind,
    pub privacy: PrivacyMode,
    /// `None` runs until a trial fails.
    pub trial_limit: Option<u64>,
    pub verify: VerifyConfig,
    pub membership: MembershipConfig,
    pub converge: ConvergeConfig,
    pub load: LoadConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            node_count: 4,
            consensus: ConsensusKind::Raft,
            privacy: PrivacyMode::Disabled,
            trial_limit: None,
            verify: VerifyConfig::default(),
            membership: MembershipConfig::default(),
            converge: ConvergeConfig::default(),
            load: LoadConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count == 0 {
            return Err(ConfigError::Invalid(
                "node_count must be at least 1".to_string(),
            ));
        }
        if self.converge.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "converge.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.trial_limit == Some(0) {
            return Err(ConfigError::Invalid(
                "trial_limit must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn cluster_spec(&self) -> ClusterSpec {
        ClusterSpec {
            node_count: self.node_count,
            consensus: self.consensus,
            privacy: self.privacy,
        }
    }
}
