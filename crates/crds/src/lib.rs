//! Open Cluster Management CRD Definitions
//!
//! Typed views of the OCM custom resources surfaced by the dashboard.
//! The dashboard never writes these objects; the types exist so that the
//! read-only handlers can decode listed items and so that collection
//! coordinates (group, version, plural) come from one place.

pub mod condition;
pub mod labels;
pub mod managed_cluster;
pub mod managed_cluster_set;
pub mod placement;
pub mod placement_decision;
pub mod addon;
pub mod manifest_work;

pub use condition::*;
pub use labels::*;
pub use managed_cluster::*;
pub use managed_cluster_set::*;
pub use placement::*;
pub use placement_decision::*;
pub use addon::*;
pub use manifest_work::*;
