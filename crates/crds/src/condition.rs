//! Status condition shared by every OCM resource.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A `metav1.Condition` as it appears in OCM status blocks.
///
/// Every field is defaulted so that a partially populated condition still
/// decodes; the dashboard treats missing values as empty.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g. "ManagedClusterConditionAvailable", "Applied")
    #[serde(rename = "type", default)]
    pub type_: String,

    /// "True", "False" or "Unknown"
    #[serde(default)]
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl Condition {
    /// Whether the condition status reads as true.
    pub fn is_true(&self) -> bool {
        self.status.eq_ignore_ascii_case("true")
    }
}

/// Finds the last condition of the given type.
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().rev().find(|c| c.type_ == type_)
}
