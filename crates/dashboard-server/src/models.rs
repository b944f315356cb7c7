//! UI-facing JSON models
//!
//! Flattened views of OCM resources, shaped for the dashboard front end.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Connectivity of a managed cluster as shown in the UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClusterStatus {
    Online,
    Offline,
    Unknown,
}

/// One status condition, every field flattened to a string.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionRecord {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    pub reason: String,
    pub message: String,
    pub last_transition_time: String,
}

impl From<&crds::Condition> for ConditionRecord {
    fn from(condition: &crds::Condition) -> Self {
        Self {
            type_: condition.type_.clone(),
            status: condition.status.clone(),
            reason: condition.reason.clone().unwrap_or_default(),
            message: condition.message.clone().unwrap_or_default(),
            last_transition_time: condition
                .last_transition_time
                .map(|t| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
                .unwrap_or_default(),
        }
    }
}

/// One managed cluster in a snapshot (and in the cluster REST views).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshotItem {
    pub id: String,
    pub name: String,
    pub status: ClusterStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub conditions: Vec<ConditionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSetView {
    pub name: String,
    pub selector_type: String,
    pub cluster_count: usize,
    pub conditions: Vec<ConditionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlacementView {
    pub name: String,
    pub namespace: String,
    pub cluster_sets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_clusters: Option<i32>,
    pub selected_clusters: Vec<String>,
    pub conditions: Vec<ConditionRecord>,
}

/// Health of an addon, from its `Available` condition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AddonStatus {
    Available,
    Unavailable,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddonView {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_namespace: Option<String>,
    pub status: AddonStatus,
    pub conditions: Vec<ConditionRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkView {
    pub name: String,
    pub namespace: String,
    pub manifest_count: usize,
    pub applied: bool,
    pub available: bool,
    pub conditions: Vec<ConditionRecord>,
}
