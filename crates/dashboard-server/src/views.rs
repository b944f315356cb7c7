//! REST view builders
//!
//! Pure functions from typed OCM resources to the UI models. Handlers do the
//! listing; everything here is synchronous and side-effect free.

use crate::models::{AddonStatus, AddonView, ClusterSetView, ConditionRecord, ManifestWorkView, PlacementView};
use crds::{
    CLUSTER_SET_LABEL, Condition, ManagedCluster, ManagedClusterAddOn, ManagedClusterSet, ManifestWork,
    PLACEMENT_LABEL, Placement, PlacementDecision, SelectorType, find_condition,
};
use std::collections::{BTreeMap, HashSet};

pub const ADDON_AVAILABLE_CONDITION: &str = "Available";
pub const WORK_APPLIED_CONDITION: &str = "Applied";
pub const WORK_AVAILABLE_CONDITION: &str = "Available";

fn records(conditions: &[Condition]) -> Vec<ConditionRecord> {
    conditions.iter().map(ConditionRecord::from).collect()
}

fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(Condition::is_true)
}

fn labels_of(cluster: &ManagedCluster) -> Option<&BTreeMap<String, String>> {
    cluster.metadata.labels.as_ref()
}

/// Whether `cluster` belongs to `set`.
///
/// `ExclusiveClusterSetLabel` sets own the clusters labelled with their name;
/// `LabelSelector` sets own every cluster carrying all of `matchLabels` (an
/// empty selector matches everything).
pub fn is_member(set: &ManagedClusterSet, cluster: &ManagedCluster) -> bool {
    let selector = &set.spec.cluster_selector;
    match selector.selector_type {
        SelectorType::ExclusiveClusterSetLabel => {
            let Some(set_name) = set.metadata.name.as_deref() else {
                return false;
            };
            labels_of(cluster)
                .and_then(|labels| labels.get(CLUSTER_SET_LABEL))
                .is_some_and(|value| value == set_name)
        }
        SelectorType::LabelSelector => {
            let required = selector
                .label_selector
                .as_ref()
                .and_then(|s| s.match_labels.as_ref());
            match required {
                None => true,
                Some(required) => required.iter().all(|(key, value)| {
                    labels_of(cluster)
                        .and_then(|labels| labels.get(key))
                        .is_some_and(|actual| actual == value)
                }),
            }
        }
    }
}

pub fn cluster_set_view(set: &ManagedClusterSet, clusters: &[ManagedCluster]) -> ClusterSetView {
    ClusterSetView {
        name: set.metadata.name.clone().unwrap_or_default(),
        selector_type: set.spec.cluster_selector.selector_type.as_str().to_string(),
        cluster_count: clusters.iter().filter(|c| is_member(set, c)).count(),
        conditions: set
            .status
            .as_ref()
            .map(|s| records(&s.conditions))
            .unwrap_or_default(),
    }
}

/// Builds the placement view from the decisions of the placement's namespace.
///
/// Decisions are matched through the placement label; a cluster named by
/// several decisions is listed once, in first-seen order.
pub fn placement_view(placement: &Placement, decisions: &[PlacementDecision]) -> PlacementView {
    let name = placement.metadata.name.clone().unwrap_or_default();
    let namespace = placement.metadata.namespace.clone().unwrap_or_default();

    let mut seen = HashSet::new();
    let selected_clusters = decisions
        .iter()
        .filter(|d| d.metadata.namespace.as_deref().unwrap_or_default() == namespace)
        .filter(|d| {
            d.metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(PLACEMENT_LABEL))
                .is_some_and(|value| *value == name)
        })
        .flat_map(|d| d.cluster_names())
        .filter(|cluster| !cluster.is_empty() && seen.insert(*cluster))
        .map(str::to_string)
        .collect();

    PlacementView {
        cluster_sets: placement.spec.cluster_sets.clone(),
        number_of_clusters: placement.spec.number_of_clusters,
        selected_clusters,
        conditions: placement
            .status
            .as_ref()
            .map(|s| records(&s.conditions))
            .unwrap_or_default(),
        name,
        namespace,
    }
}

pub fn addon_view(addon: &ManagedClusterAddOn) -> AddonView {
    let conditions = addon
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();
    let status = match find_condition(conditions, ADDON_AVAILABLE_CONDITION) {
        Some(c) if c.is_true() => AddonStatus::Available,
        Some(_) => AddonStatus::Unavailable,
        None => AddonStatus::Unknown,
    };
    AddonView {
        name: addon.metadata.name.clone().unwrap_or_default(),
        namespace: addon.metadata.namespace.clone().unwrap_or_default(),
        install_namespace: addon.spec.install_namespace.clone().filter(|ns| !ns.is_empty()),
        status,
        conditions: records(conditions),
    }
}

pub fn manifest_work_view(work: &ManifestWork) -> ManifestWorkView {
    let conditions = work
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();
    ManifestWorkView {
        name: work.metadata.name.clone().unwrap_or_default(),
        namespace: work.metadata.namespace.clone().unwrap_or_default(),
        manifest_count: work.spec.workload.manifests.len(),
        applied: is_condition_true(conditions, WORK_APPLIED_CONDITION),
        available: is_condition_true(conditions, WORK_AVAILABLE_CONDITION),
        conditions: records(conditions),
    }
}
