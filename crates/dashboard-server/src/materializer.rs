//! Snapshot materializer
//!
//! Lists a collection and converts every item into a `ResourceSnapshotItem`.
//! Conversion is best effort: malformed fields read as absent, and only an
//! item that is not a JSON object at all is dropped from the snapshot.

use crate::extract::{array_field, non_empty_str_field, object_field, str_field};
use crate::models::{ClusterStatus, ConditionRecord, ResourceSnapshotItem};
use ocm_client::{Collection, OcmClientTrait, OcmError};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

/// Converts raw managed cluster objects.
#[derive(Debug, Clone)]
pub struct ClusterConverter {
    available_condition_type: String,
}

impl ClusterConverter {
    pub fn new(available_condition_type: impl Into<String>) -> Self {
        Self {
            available_condition_type: available_condition_type.into(),
        }
    }

    /// Converts one item; `None` if it is not an object.
    pub fn convert(&self, item: &Value) -> Option<ResourceSnapshotItem> {
        if !item.is_object() {
            return None;
        }

        let conditions: Vec<ConditionRecord> = array_field(item, &["status", "conditions"])
            .map(|raw| raw.iter().filter_map(convert_condition).collect())
            .unwrap_or_default();

        let labels = object_field(item, &["metadata", "labels"])
            .map(|raw| {
                raw.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect::<BTreeMap<_, _>>()
            })
            .filter(|labels| !labels.is_empty());

        Some(ResourceSnapshotItem {
            id: str_field(item, &["metadata", "uid"]).unwrap_or_default().to_string(),
            name: str_field(item, &["metadata", "name"]).unwrap_or_default().to_string(),
            status: derive_status(&conditions, &self.available_condition_type),
            version: non_empty_str_field(item, &["status", "version", "kubernetes"]).map(str::to_string),
            labels,
            conditions,
        })
    }
}

/// Flattens one raw condition. Entries that are not objects are skipped.
fn convert_condition(raw: &Value) -> Option<ConditionRecord> {
    raw.as_object()?;
    let text = |key: &str| str_field(raw, &[key]).unwrap_or_default().to_string();
    Some(ConditionRecord {
        type_: text("type"),
        status: text("status"),
        reason: text("reason"),
        message: text("message"),
        last_transition_time: text("lastTransitionTime"),
    })
}

/// Derives cluster status from the availability condition.
///
/// One linear pass; when the condition type repeats, the last occurrence
/// decides.
pub fn derive_status(conditions: &[ConditionRecord], available_condition_type: &str) -> ClusterStatus {
    let mut status = ClusterStatus::Unknown;
    for condition in conditions {
        if condition.type_ == available_condition_type {
            status = if condition.status.eq_ignore_ascii_case("true") {
                ClusterStatus::Online
            } else {
                ClusterStatus::Offline
            };
        }
    }
    status
}

/// Produces full snapshots of a collection on demand.
#[derive(Debug, Clone)]
pub struct SnapshotMaterializer {
    converter: ClusterConverter,
}

impl SnapshotMaterializer {
    pub fn new(converter: ClusterConverter) -> Self {
        Self { converter }
    }

    pub fn converter(&self) -> &ClusterConverter {
        &self.converter
    }

    /// Lists `collection` once and converts every item, preserving list order.
    ///
    /// A failed list is returned as is; there is no retry here.
    pub async fn materialize(
        &self,
        client: &dyn OcmClientTrait,
        collection: &Collection,
    ) -> Result<Vec<ResourceSnapshotItem>, OcmError> {
        let raw = client.list(collection).await?;
        let total = raw.len();
        let items: Vec<_> = raw.iter().filter_map(|item| self.converter.convert(item)).collect();
        if items.len() != total {
            debug!(%collection, skipped = total - items.len(), "dropped items that are not objects");
        }
        Ok(items)
    }
}
