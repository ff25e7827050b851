//! Backend weight assignment.
//!
//! Cluster and ENI policies spread weight uniformly. The Local policy only
//! sends traffic to nodes running endpoints, so a node's weight grows with
//! the number of pods it hosts. Targets of the Local policy arrive one per
//! endpoint and are collapsed to one target per node here.

use crate::model::{BackendKey, BackendTarget, TrafficPolicy};
use std::collections::HashMap;

/// Weight used when no explicit weight is requested
pub const DEFAULT_WEIGHT: i32 = 100;

/// Assign weights to `targets` under `policy`.
///
/// With an explicit weight `w` each unit gets `max(w / n, 1)` where `n` is
/// the number of input targets; `w == 0` drains every target.
pub fn assign_weights(policy: TrafficPolicy, targets: Vec<BackendTarget>, explicit_weight: Option<i32>) -> Vec<BackendTarget> {
    if targets.is_empty() {
        return targets;
    }
    let count = i32::try_from(targets.len()).unwrap_or(i32::MAX);
    let unit = |default: i32| match explicit_weight {
        None => default,
        Some(0) => 0,
        Some(w) => std::cmp::max(w / count, 1),
    };

    match policy {
        TrafficPolicy::Cluster | TrafficPolicy::Eni => {
            let weight = unit(DEFAULT_WEIGHT);
            targets
                .into_iter()
                .map(|mut t| {
                    t.weight = weight;
                    t
                })
                .collect()
        }
        TrafficPolicy::Local => {
            let per_pod = unit(1);
            let mut pods: HashMap<BackendKey, i32> = HashMap::new();
            let mut collapsed: Vec<BackendTarget> = Vec::new();
            for target in targets {
                let key = target.key();
                let seen = pods.entry(key).or_insert(0);
                *seen += 1;
                if *seen == 1 {
                    collapsed.push(target);
                }
            }
            for target in &mut collapsed {
                let on_node = pods.get(&target.key()).copied().unwrap_or(1);
                target.weight = on_node.saturating_mul(per_pod);
            }
            collapsed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BackendKind;

    fn target(id: &str) -> BackendTarget {
        BackendTarget {
            server_id: id.to_string(),
            server_ip: None,
            port: 30080,
            weight: 0,
            kind: BackendKind::Ecs,
            description: String::new(),
        }
    }

    fn weights(targets: &[BackendTarget]) -> Vec<(String, i32)> {
        targets.iter().map(|t| (t.server_id.clone(), t.weight)).collect()
    }

    #[test]
    fn test_empty_input_is_total() {
        for policy in [TrafficPolicy::Cluster, TrafficPolicy::Local, TrafficPolicy::Eni] {
            assert!(assign_weights(policy, Vec::new(), Some(100)).is_empty());
            assert!(assign_weights(policy, Vec::new(), None).is_empty());
        }
    }

    #[test]
    fn test_cluster_policy_is_uniform() {
        let targets = vec![target("i-1"), target("i-2"), target("i-3")];

        let default = assign_weights(TrafficPolicy::Cluster, targets.clone(), None);
        assert!(default.iter().all(|t| t.weight == DEFAULT_WEIGHT));

        let explicit = assign_weights(TrafficPolicy::Cluster, targets.clone(), Some(60));
        assert!(explicit.iter().all(|t| t.weight == 20));

        let floored = assign_weights(TrafficPolicy::Eni, targets.clone(), Some(2));
        assert!(floored.iter().all(|t| t.weight == 1));

        let drained = assign_weights(TrafficPolicy::Cluster, targets, Some(0));
        assert!(drained.iter().all(|t| t.weight == 0));
    }

    #[test]
    fn test_local_policy_follows_pods_per_node() {
        // two pods on i-1, one on i-2
        let targets = vec![target("i-1"), target("i-2"), target("i-1")];

        let default = assign_weights(TrafficPolicy::Local, targets.clone(), None);
        assert_eq!(weights(&default), vec![("i-1".to_string(), 2), ("i-2".to_string(), 1)]);

        let explicit = assign_weights(TrafficPolicy::Local, targets.clone(), Some(90));
        assert_eq!(weights(&explicit), vec![("i-1".to_string(), 60), ("i-2".to_string(), 30)]);
        let total: i32 = explicit.iter().map(|t| t.weight).sum();
        assert!(total <= 90);

        let drained = assign_weights(TrafficPolicy::Local, targets, Some(0));
        assert_eq!(drained.len(), 2);
        assert!(drained.iter().all(|t| t.weight == 0));
    }

    #[test]
    fn test_local_policy_equal_nodes_equal_weight() {
        let targets = vec![target("i-1"), target("i-2"), target("i-1"), target("i-2")];
        let assigned = assign_weights(TrafficPolicy::Local, targets, Some(100));
        assert_eq!(assigned[0].weight, assigned[1].weight);
        assert_eq!(assigned[0].weight, 50);
    }
}
