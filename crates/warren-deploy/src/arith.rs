//! Pure deployment arithmetic, kept separate so the policies are
//! testable without a cluster.

use warren_types::InstanceId;

/// Splits `total` replicas at a canary weight (percent).
///
/// Rounds down, with a floor of one canary replica; the stable side
/// keeps the residual. At weight 100 the stable side reaches zero.
pub(crate) fn canary_split(total: u32, weight: u8) -> (u32, u32) {
    let canary = ((u64::from(total) * u64::from(weight)) / 100) as u32;
    let canary = canary.max(1).min(total.max(1));
    (canary, total.saturating_sub(canary))
}

/// Partitions instances into rolling-update batches of `parallelism`.
pub(crate) fn batches(instances: Vec<InstanceId>, parallelism: u32) -> Vec<Vec<InstanceId>> {
    let size = parallelism.max(1) as usize;
    instances
        .chunks(size)
        .map(<[InstanceId]>::to_vec)
        .collect()
}
