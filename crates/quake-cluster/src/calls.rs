use futures::future::join_all;
use quake_observe::values::check_values;
use quake_verdict::{FailureReason, TxId, Validity};

use crate::node::NodeHandle;

/// Submit `count` synthetic transactions to one node, in order.
pub async fn submit_transactions(
    node: &NodeHandle,
    count: usize,
) -> Result<Vec<TxId>, FailureReason> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let payload = format!("{}-spam-{i}", node.id).into_bytes();
        ids.push(node.client.submit_transaction(payload).await?);
    }
    tracing::info!(node = %node.id, count, "submitted transaction burst");
    Ok(ids)
}

/// Read the application value from every node and compare against `expected`.
pub async fn read_values(nodes: &[NodeHandle], expected: i64) -> Validity {
    let reads = nodes.iter().map(|node| async move {
        let actual = node.client.read_value().await.map_err(|e| e.to_string());
        (node.id, expected, actual)
    });
    check_values(join_all(reads).await)
}
