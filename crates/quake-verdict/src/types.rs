use std::fmt;

use serde::{Deserialize, Serialize};

/// Zero-based index of a trial within one driver run.
pub type TrialIndex = u64;

// ── Nodes ────────────────────────────────────────────────────────────

/// Identifier of one cluster member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

// ── Replicated log ───────────────────────────────────────────────────

/// A committed unit of the replicated log as reported by a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    /// Height in the log, starting at 1 for the first committed block.
    pub number: u64,
    /// Content hash, hex encoded.
    pub hash: String,
}

impl Block {
    pub fn new(number: u64, hash: impl Into<String>) -> Self {
        Self {
            number,
            hash: hash.into(),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.number, self.hash)
    }
}

/// Identifier of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub String);

impl TxId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render a possibly-absent last block the way operators read it.
pub fn display_last_block(block: &Option<Block>) -> String {
    match block {
        Some(b) => b.to_string(),
        None => "<no block>".to_string(),
    }
}
