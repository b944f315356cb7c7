//! ManagedClusterSet CRD
//!
//! Groups managed clusters. Cluster scoped.

use crate::condition::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[kube(
    group = "cluster.open-cluster-management.io",
    version = "v1beta2",
    kind = "ManagedClusterSet",
    status = "ManagedClusterSetStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSetSpec {
    /// How clusters are selected into the set
    #[serde(default)]
    pub cluster_selector: ClusterSelector,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSelector {
    #[serde(default)]
    pub selector_type: SelectorType,

    /// Only meaningful for `LabelSelector`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<LabelSelector>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum SelectorType {
    /// Membership via the `cluster.open-cluster-management.io/clusterset` label
    #[default]
    ExclusiveClusterSetLabel,

    /// Membership via an arbitrary label selector
    LabelSelector,
}

impl SelectorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectorType::ExclusiveClusterSetLabel => "ExclusiveClusterSetLabel",
            SelectorType::LabelSelector => "LabelSelector",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSetStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
