use quake_verdict::{FailureReason, NodeId, Validity, ValueMismatch};

/// Compare application-level reads against their expected values.
///
/// Every reading that differs from its expectation, or that errored, is
/// reported in input order.
pub fn check_values<I>(readings: I) -> Validity
where
    I: IntoIterator<Item = (NodeId, i64, Result<i64, String>)>,
{
    let mismatches: Vec<ValueMismatch> = readings
        .into_iter()
        .filter(|(_, expected, actual)| actual.as_ref() != Ok(expected))
        .map(|(node, expected, actual)| ValueMismatch {
            node,
            expected,
            actual,
        })
        .collect();

    if mismatches.is_empty() {
        Validity::Verified
    } else {
        Validity::Falsified(FailureReason::WrongValue(mismatches))
    }
}
