//! Pod resource usage estimation
//!
//! Turns a pod's declared requests and limits into a predicted footprint per
//! weighted resource. The same request/limit aggregation also feeds the
//! batch-tier admission filter.

use crate::extension::{
    is_cpu_class, is_memory_class, priority_class_of, ResourceTranslator, RESOURCE_CPU,
};
use crate::models::Pod;
use crate::quantity::{Quantity, ResourceList, ResourceName};
use std::collections::BTreeMap;

/// Default CPU estimate for pods that declare neither request nor limit (0.25 core)
pub const DEFAULT_MILLI_CPU_REQUEST: i64 = 250;

/// Default memory estimate for pods that declare neither request nor limit (200 MiB)
pub const DEFAULT_MEMORY_REQUEST: i64 = 200 * 1024 * 1024;

/// Predicted usage per weighted resource. CPU is in milli-units, everything else in base units.
pub type Estimate = BTreeMap<ResourceName, i64>;

fn add_list(total: &mut ResourceList, list: &ResourceList) {
    for (name, quantity) in list {
        let entry = total.entry(name.clone()).or_default();
        *entry = entry.saturating_add(*quantity);
    }
}

fn max_list(total: &mut ResourceList, list: &ResourceList) {
    for (name, quantity) in list {
        let entry = total.entry(name.clone()).or_default();
        if *quantity > *entry {
            *entry = *quantity;
        }
    }
}

/// Effective pod requests: `max(sum(containers), each init container) + overhead`
pub fn pod_requests(pod: &Pod) -> ResourceList {
    pod_requests_and_limits(pod).0
}

/// Effective pod requests and limits.
///
/// Main containers run together, so their amounts are summed. Init containers
/// run one at a time before them, so each only raises the total to its own
/// amount. Overhead is added to every request and to limits that are set.
pub fn pod_requests_and_limits(pod: &Pod) -> (ResourceList, ResourceList) {
    let mut requests = ResourceList::new();
    let mut limits = ResourceList::new();

    for container in &pod.containers {
        add_list(&mut requests, &container.resources.requests);
        add_list(&mut limits, &container.resources.limits);
    }

    for container in &pod.init_containers {
        max_list(&mut requests, &container.resources.requests);
        max_list(&mut limits, &container.resources.limits);
    }

    if let Some(overhead) = &pod.overhead {
        add_list(&mut requests, overhead);
        for (name, quantity) in overhead {
            if let Some(limit) = limits.get_mut(name) {
                *limit = limit.saturating_add(*quantity);
            }
        }
    }

    (requests, limits)
}

/// Quantity in the unit estimates use for `resource`
pub fn resource_amount(resource: &str, quantity: Quantity) -> i64 {
    if resource == RESOURCE_CPU {
        quantity.milli_value()
    } else {
        quantity.value()
    }
}

/// Estimate one resource from aggregated requests and limits.
///
/// A limit above the request is taken as the expected usage. Otherwise the
/// request is scaled by `scaling_factor` percent, rounded, and capped at the
/// limit when one is set.
pub fn estimate_by_resource(
    requests: &ResourceList,
    limits: &ResourceList,
    resource: &str,
    scaling_factor: i64,
) -> i64 {
    let limit = limits.get(resource).copied().unwrap_or_default();
    let request = requests.get(resource).copied().unwrap_or_default();

    let (quantity, factor) = if limit > request {
        (limit, 100)
    } else {
        (request, scaling_factor)
    };

    if quantity.is_zero() {
        if is_cpu_class(resource) {
            return DEFAULT_MILLI_CPU_REQUEST;
        }
        if is_memory_class(resource) {
            return DEFAULT_MEMORY_REQUEST;
        }
        return 0;
    }

    let scaled = (resource_amount(resource, quantity) as f64 * factor as f64 / 100.0).round() as i64;
    if limit.is_zero() {
        scaled
    } else {
        scaled.min(resource_amount(resource, limit))
    }
}

/// Estimate a pod's usage for every resource in `weights`.
///
/// The result is keyed by the weighted resource name even when the pod is
/// billed against a translated resource.
pub fn estimate_pod_usage(
    pod: &Pod,
    weights: &BTreeMap<ResourceName, i64>,
    scaling_factors: &BTreeMap<ResourceName, i64>,
    translator: &ResourceTranslator,
) -> Estimate {
    let (requests, limits) = pod_requests_and_limits(pod);
    let class = priority_class_of(pod);

    weights
        .keys()
        .map(|resource| {
            let billed = translator(resource.as_str(), class);
            let factor = scaling_factors.get(resource).copied().unwrap_or(0);
            (
                resource.clone(),
                estimate_by_resource(&requests, &limits, &billed, factor),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::{
        default_translator, PriorityClass, BATCH_CPU, BATCH_MEMORY, LABEL_PRIORITY_CLASS,
    };
    use crate::models::{Container, ResourceRequirements};

    fn list(entries: &[(&str, &str)]) -> ResourceList {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.parse().unwrap()))
            .collect()
    }

    fn container(requests: &[(&str, &str)], limits: &[(&str, &str)]) -> Container {
        Container {
            name: "c".to_string(),
            resources: ResourceRequirements {
                requests: list(requests),
                limits: list(limits),
            },
        }
    }

    fn weights() -> BTreeMap<ResourceName, i64> {
        [("cpu".to_string(), 1), ("memory".to_string(), 1)].into()
    }

    #[test]
    fn test_requests_sum_main_and_max_init() {
        let pod = Pod {
            containers: vec![
                container(&[("cpu", "500m"), ("memory", "1Gi")], &[]),
                container(&[("cpu", "500m")], &[]),
            ],
            init_containers: vec![
                container(&[("cpu", "2")], &[]),
                container(&[("memory", "512Mi")], &[]),
            ],
            ..Default::default()
        };

        let requests = pod_requests(&pod);
        assert_eq!(requests["cpu"].milli_value(), 2000);
        assert_eq!(requests["memory"].value(), 1 << 30);
    }

    #[test]
    fn test_overhead_added_to_requests_and_existing_limits() {
        let pod = Pod {
            containers: vec![container(
                &[("cpu", "100m"), ("memory", "100Mi")],
                &[("cpu", "200m")],
            )],
            overhead: Some(list(&[("cpu", "50m"), ("memory", "10Mi")])),
            ..Default::default()
        };

        let (requests, limits) = pod_requests_and_limits(&pod);
        assert_eq!(requests["cpu"].milli_value(), 150);
        assert_eq!(requests["memory"].value(), 110 * 1024 * 1024);
        assert_eq!(limits["cpu"].milli_value(), 250);
        assert!(!limits.contains_key("memory"));
    }

    #[test]
    fn test_scaled_request_rounds() {
        let requests = list(&[("cpu", "100m")]);
        let limits = list(&[("cpu", "100m")]);
        assert_eq!(estimate_by_resource(&requests, &limits, "cpu", 33), 33);
        assert_eq!(estimate_by_resource(&requests, &limits, "cpu", 50), 50);

        // 0.5 rounds away from zero
        let requests = list(&[("cpu", "5m")]);
        assert_eq!(estimate_by_resource(&requests, &ResourceList::new(), "cpu", 50), 3);
    }

    #[test]
    fn test_limit_above_request_forces_full_limit() {
        let requests = list(&[("cpu", "50m")]);
        let limits = list(&[("cpu", "150m")]);
        for factor in [0, 33, 85, 100] {
            assert_eq!(estimate_by_resource(&requests, &limits, "cpu", factor), 150);
        }
    }

    #[test]
    fn test_request_without_limit_is_not_clamped() {
        let requests = list(&[("memory", "1000")]);
        assert_eq!(
            estimate_by_resource(&requests, &ResourceList::new(), "memory", 70),
            700
        );
    }

    #[test]
    fn test_scaled_estimate_never_exceeds_limit() {
        let requests = list(&[("cpu", "100m")]);
        let limits = list(&[("cpu", "100m")]);
        assert_eq!(estimate_by_resource(&requests, &limits, "cpu", 100), 100);
    }

    #[test]
    fn test_zero_quantity_defaults() {
        let empty = ResourceList::new();
        assert_eq!(estimate_by_resource(&empty, &empty, "cpu", 85), 250);
        assert_eq!(
            estimate_by_resource(&empty, &empty, "memory", 70),
            200 * 1024 * 1024
        );
        assert_eq!(estimate_by_resource(&empty, &empty, BATCH_CPU, 85), 250);
        assert_eq!(
            estimate_by_resource(&empty, &empty, BATCH_MEMORY, 70),
            200 * 1024 * 1024
        );
        assert_eq!(estimate_by_resource(&empty, &empty, "nvidia.com/gpu", 100), 0);
    }

    #[test]
    fn test_estimate_pod_usage_with_scaling_factors() {
        let pod = Pod {
            containers: vec![container(&[("cpu", "1"), ("memory", "1000")], &[])],
            ..Default::default()
        };
        let factors: BTreeMap<ResourceName, i64> =
            [("cpu".to_string(), 85), ("memory".to_string(), 70)].into();

        let estimate = estimate_pod_usage(&pod, &weights(), &factors, &default_translator());
        assert_eq!(estimate["cpu"], 850);
        assert_eq!(estimate["memory"], 700);
    }

    #[test]
    fn test_estimate_batch_pod_uses_batch_resources() {
        let mut pod = Pod {
            containers: vec![container(
                &[(BATCH_CPU, "2000"), (BATCH_MEMORY, "4Gi"), ("cpu", "8")],
                &[],
            )],
            ..Default::default()
        };
        pod.labels
            .insert(LABEL_PRIORITY_CLASS.to_string(), "koord-batch".to_string());

        let factors: BTreeMap<ResourceName, i64> =
            [("cpu".to_string(), 100), ("memory".to_string(), 100)].into();
        let estimate = estimate_pod_usage(&pod, &weights(), &factors, &default_translator());

        // batch-cpu is an integer count of milli-cores
        assert_eq!(estimate["cpu"], 2000);
        assert_eq!(estimate["memory"], 4 << 30);
    }

    #[test]
    fn test_estimate_uses_injected_translator() {
        let pod = Pod {
            containers: vec![container(&[("example.com/vcpu", "3")], &[])],
            ..Default::default()
        };
        let translator: ResourceTranslator =
            std::sync::Arc::new(|resource: &str, _class: PriorityClass| {
                if resource == "cpu" {
                    "example.com/vcpu".to_string()
                } else {
                    resource.to_string()
                }
            });
        let weights: BTreeMap<ResourceName, i64> = [("cpu".to_string(), 1)].into();
        let factors: BTreeMap<ResourceName, i64> = [("cpu".to_string(), 100)].into();

        let estimate = estimate_pod_usage(&pod, &weights, &factors, &translator);
        assert_eq!(estimate["cpu"], 3);
    }

    #[test]
    fn test_weighted_resource_without_factor_estimates_zero() {
        let gpu = "nvidia.com/gpu";
        let weights: BTreeMap<ResourceName, i64> = [(gpu.to_string(), 1)].into();

        let pod = Pod {
            containers: vec![container(&[(gpu, "4")], &[(gpu, "4")])],
            ..Default::default()
        };
        let estimate = estimate_pod_usage(&pod, &weights, &BTreeMap::new(), &default_translator());
        assert_eq!(estimate[gpu], 0);

        // A limit above the request still counts in full
        let pod = Pod {
            containers: vec![container(&[(gpu, "2")], &[(gpu, "4")])],
            ..Default::default()
        };
        let estimate = estimate_pod_usage(&pod, &weights, &BTreeMap::new(), &default_translator());
        assert_eq!(estimate[gpu], 4);
    }
}
