//! Weighted least-allocated node scoring

use crate::quantity::ResourceName;
use std::collections::BTreeMap;

/// Highest score a node can receive
pub const MAX_NODE_SCORE: i64 = 100;

/// Lowest score a node can receive
pub const MIN_NODE_SCORE: i64 = 0;

/// Fraction of `capacity` left free after `requested`, scaled to `[0, MAX_NODE_SCORE]`
pub fn least_requested_score(requested: i64, capacity: i64) -> i64 {
    if capacity <= 0 || requested > capacity {
        return MIN_NODE_SCORE;
    }
    // i128 keeps (capacity - requested) * 100 exact for byte-sized capacities
    let free = (capacity - requested.max(0)) as i128;
    ((free * MAX_NODE_SCORE as i128) / capacity as i128) as i64
}

/// Weighted average of per-resource least-requested scores.
///
/// Zero-weight resources do not take part. Returns `MIN_NODE_SCORE` when no
/// resource carries a positive weight; validated configurations never do that.
pub fn load_aware_score(
    weights: &BTreeMap<ResourceName, i64>,
    used: &BTreeMap<ResourceName, i64>,
    allocatable: &BTreeMap<ResourceName, i64>,
) -> i64 {
    let mut node_score = 0i64;
    let mut weight_sum = 0i64;

    for (resource, &weight) in weights.iter().filter(|(_, w)| **w > 0) {
        let score = least_requested_score(
            used.get(resource).copied().unwrap_or(0),
            allocatable.get(resource).copied().unwrap_or(0),
        );
        node_score += score * weight;
        weight_sum += weight;
    }

    if weight_sum == 0 {
        return MIN_NODE_SCORE;
    }
    node_score / weight_sum
}
