use quake_verdict::{FailureReason, NodeId};

/// A remote call to a node did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("{0} is unavailable")]
    Unavailable(NodeId),
}

/// Cluster setup failed. Fatal to the whole run, never retried.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("invalid cluster spec: {0}")]
    InvalidSpec(String),

    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("{0} went away before assuming a role")]
    NodeLost(NodeId),
}

impl From<RemoteError> for FailureReason {
    fn from(e: RemoteError) -> Self {
        FailureReason::RemoteCallFailure(e.to_string())
    }
}
