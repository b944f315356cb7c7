//! Collection coordinates
//!
//! A `Collection` names one listable/watchable set of objects on the API
//! server: a group, version and plural resource name, optionally narrowed to
//! one namespace.

use kube::Resource;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Collection {
    pub group: String,
    pub version: String,
    pub plural: String,
    pub namespace: Option<String>,
}

impl Collection {
    pub fn new(group: impl Into<String>, version: impl Into<String>, plural: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            plural: plural.into(),
            namespace: None,
        }
    }

    /// Coordinates of a statically typed resource, across all namespaces.
    pub fn of<K>() -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self::new(K::group(&()), K::version(&()), K::plural(&()))
    }

    /// Narrows the collection to a single namespace.
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// API server path of the collection.
    ///
    /// Core resources live under `/api/<version>`, everything else under
    /// `/apis/<group>/<version>`.
    pub fn url_path(&self) -> String {
        let mut path = if self.group.is_empty() {
            format!("/api/{}", self.version)
        } else {
            format!("/apis/{}/{}", self.group, self.version)
        };
        if let Some(ns) = &self.namespace {
            path.push_str("/namespaces/");
            path.push_str(ns);
        }
        path.push('/');
        path.push_str(&self.plural);
        path
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.plural)?;
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.plural)?;
        }
        if let Some(ns) = &self.namespace {
            write!(f, " (namespace {ns})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crds::{ManagedCluster, ManifestWork, PlacementDecision};

    #[test]
    fn test_cluster_scoped_path() {
        let collection = Collection::of::<ManagedCluster>();
        assert_eq!(
            collection.url_path(),
            "/apis/cluster.open-cluster-management.io/v1/managedclusters"
        );
    }

    #[test]
    fn test_namespaced_path() {
        let collection = Collection::of::<ManifestWork>().in_namespace("cluster1");
        assert_eq!(
            collection.url_path(),
            "/apis/work.open-cluster-management.io/v1/namespaces/cluster1/manifestworks"
        );
    }

    #[test]
    fn test_hand_written_resource_path() {
        let collection = Collection::of::<PlacementDecision>().in_namespace("apps");
        assert_eq!(
            collection.url_path(),
            "/apis/cluster.open-cluster-management.io/v1beta1/namespaces/apps/placementdecisions"
        );
    }

    #[test]
    fn test_core_group_path() {
        let collection = Collection::new("", "v1", "namespaces");
        assert_eq!(collection.url_path(), "/api/v1/namespaces");
        assert_eq!(collection.to_string(), "v1/namespaces");
    }
}
