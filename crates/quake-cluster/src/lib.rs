pub mod calls;
pub mod error;
pub mod load;
pub mod membership;
pub mod node;
pub mod provision;
pub mod sim;

pub use error::{ProvisionError, RemoteError};
pub use load::{start_load, with_load, LoadConfig, LoadGenerator};
pub use membership::{add_member, remove_member, MembershipConfig};
pub use node::{MemberOp, NodeClient, NodeHandle, Role};
pub use provision::{
    await_role_assumption, Cluster, ClusterSpec, ConsensusKind, PrivacyMode, Provisioner,
};
