//! Well-known OCM labels.

/// Set on a ManagedCluster to place it in a ManagedClusterSet.
pub const CLUSTER_SET_LABEL: &str = "cluster.open-cluster-management.io/clusterset";

/// Set on a PlacementDecision to name the Placement it belongs to.
pub const PLACEMENT_LABEL: &str = "cluster.open-cluster-management.io/placement";
