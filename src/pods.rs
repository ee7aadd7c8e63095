//! Pod readiness filtering.
//!
//! A pod qualifies for backup only when every status condition it
//! reports has the value `True`. There is no condition-type filtering
//! and no partial credit: a single `False` or `Unknown` condition
//! disqualifies the whole pod. A pod reporting no conditions at all is
//! vacuously ready.

use k8s_openapi::api::core::v1::Pod;

const CONDITION_TRUE: &str = "True";

/// Returns `true` when every reported status condition is `True`.
#[must_use]
pub fn pod_is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .is_none_or(|conditions| {
            conditions
                .iter()
                .all(|condition| condition.status == CONDITION_TRUE)
        })
}

/// Filters a pod list down to the names of ready pods.
///
/// Ordering is whatever the underlying list call returned; callers that
/// need determinism must sort the result themselves.
#[must_use]
pub fn ready_pod_names(pods: &[Pod]) -> Vec<String> {
    pods.iter()
        .filter(|pod| pod_is_ready(pod))
        .filter_map(|pod| pod.metadata.name.clone())
        .collect()
}
