//! Kubernetes-backed OCM client
//!
//! Uses raw list/watch/get requests against the API server so that every
//! item comes back as plain JSON. A malformed item therefore never fails a
//! whole listing; deciding what to do with it is the caller's business.

use crate::collection::Collection;
use crate::error::OcmError;
use crate::ocm_trait::OcmClientTrait;
use crate::watch::{WatchEvent, WatchHandle};
use futures::StreamExt;
use kube::api::{GetParams, ListParams, WatchParams};
use kube::core::{Request, WatchEvent as KubeWatchEvent};
use kube::Client;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Server-side watch timeout used when none is configured
pub const DEFAULT_WATCH_TIMEOUT_SECS: u32 = 290;

/// Events buffered between the watch pump and the consumer
const WATCH_CHANNEL_CAPACITY: usize = 64;

/// OCM API client over a shared `kube::Client`
#[derive(Clone)]
pub struct OcmClient {
    client: Client,
    watch_timeout_secs: u32,
}

impl std::fmt::Debug for OcmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcmClient")
            .field("watch_timeout_secs", &self.watch_timeout_secs)
            .finish()
    }
}

impl OcmClient {
    /// Wraps an existing kube client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            watch_timeout_secs: DEFAULT_WATCH_TIMEOUT_SECS,
        }
    }

    /// Builds a client from the ambient kubeconfig or in-cluster service account.
    pub async fn try_default() -> Result<Self, OcmError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }

    /// Sets the server-side timeout of watches opened by this client.
    ///
    /// The API server ends the watch once it elapses, which ends the
    /// consumer's event sequence.
    pub fn with_watch_timeout(mut self, secs: u32) -> Self {
        self.watch_timeout_secs = secs;
        self
    }

    /// Lists a collection and returns the raw response body.
    async fn list_raw(&self, collection: &Collection, params: &ListParams) -> Result<Value, OcmError> {
        let request = Request::new(collection.url_path())
            .list(params)
            .map_err(kube::Error::BuildRequest)?;
        debug!(%collection, "LIST");
        Ok(self.client.request::<Value>(request).await?)
    }

    /// Current resourceVersion of a collection, fetched with a one-item page.
    async fn current_resource_version(&self, collection: &Collection) -> Result<String, OcmError> {
        let body = self.list_raw(collection, &ListParams::default().limit(1)).await?;
        Ok(body
            .pointer("/metadata/resourceVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// Maps a raw kube watch event onto ours. Bookmarks carry no change and are dropped.
fn convert_event(event: KubeWatchEvent<Value>) -> Option<WatchEvent> {
    match event {
        KubeWatchEvent::Added(obj) => Some(WatchEvent::Added(obj)),
        KubeWatchEvent::Modified(obj) => Some(WatchEvent::Modified(obj)),
        KubeWatchEvent::Deleted(obj) => Some(WatchEvent::Deleted(obj)),
        KubeWatchEvent::Bookmark(_) => None,
        KubeWatchEvent::Error(status) => Some(WatchEvent::Error(status.message.clone())),
    }
}

/// Extracts `items` from a list response.
fn list_items(collection: &Collection, body: Value) -> Result<Vec<Value>, OcmError> {
    match body {
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => Ok(items),
            // An empty list may be serialized with `items: null`
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(OcmError::UnexpectedResponse(format!(
                "{collection}: items is {}",
                json_type(&other)
            ))),
        },
        other => Err(OcmError::UnexpectedResponse(format!(
            "{collection}: list body is {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait::async_trait]
impl OcmClientTrait for OcmClient {
    async fn list(&self, collection: &Collection) -> Result<Vec<Value>, OcmError> {
        let body = self.list_raw(collection, &ListParams::default()).await?;
        let items = list_items(collection, body)?;
        debug!(%collection, count = items.len(), "listed collection");
        Ok(items)
    }

    async fn watch(&self, collection: &Collection) -> Result<WatchHandle, OcmError> {
        // Start at the current version so the subscription does not replay
        // every existing object as a synthetic Added event.
        let resource_version = self.current_resource_version(collection).await?;
        let params = WatchParams::default().timeout(self.watch_timeout_secs);
        let request = Request::new(collection.url_path())
            .watch(&params, &resource_version)
            .map_err(kube::Error::BuildRequest)?;
        let stream = self.client.request_events::<Value>(request).await?;
        info!(%collection, %resource_version, "watch opened");

        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let label = collection.to_string();
        let pump = tokio::spawn(async move {
            let mut stream = Box::pin(stream);
            while let Some(item) = stream.next().await {
                let event = match item {
                    Ok(event) => match convert_event(event) {
                        Some(event) => event,
                        None => continue,
                    },
                    Err(e) => {
                        warn!(collection = %label, "watch stream error: {}", e);
                        WatchEvent::Error(e.to_string())
                    }
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
            debug!(collection = %label, "watch stream ended");
        });
        let abort = pump.abort_handle();

        Ok(WatchHandle::new(rx, move || abort.abort()))
    }

    async fn get(&self, collection: &Collection, name: &str) -> Result<Value, OcmError> {
        let request = Request::new(collection.url_path())
            .get(name, &GetParams::default())
            .map_err(kube::Error::BuildRequest)?;
        debug!(%collection, name, "GET");
        match self.client.request::<Value>(request).await {
            Ok(obj) => Ok(obj),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                Err(OcmError::NotFound(format!("{collection}/{name}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn clusters() -> Collection {
        Collection::new("cluster.open-cluster-management.io", "v1", "managedclusters")
    }

    #[test]
    fn test_list_items_extracts_array() {
        let body = json!({
            "apiVersion": "cluster.open-cluster-management.io/v1",
            "kind": "ManagedClusterList",
            "metadata": {"resourceVersion": "42"},
            "items": [{"metadata": {"name": "a"}}, "garbage"],
        });
        let items = list_items(&clusters(), body).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], json!("garbage"));
    }

    #[test]
    fn test_list_items_null_is_empty() {
        let items = list_items(&clusters(), json!({"items": null})).unwrap();
        assert!(items.is_empty());
        let items = list_items(&clusters(), json!({"metadata": {}})).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_list_items_rejects_non_list() {
        let err = list_items(&clusters(), json!("nope")).unwrap_err();
        assert!(matches!(err, OcmError::UnexpectedResponse(_)));
        let err = list_items(&clusters(), json!({"items": 3})).unwrap_err();
        assert!(err.to_string().contains("a number"));
    }

    #[test]
    fn test_convert_event_passes_objects_through() {
        let obj = json!({"metadata": {"name": "a"}});
        assert_eq!(
            convert_event(KubeWatchEvent::Modified(obj.clone())),
            Some(WatchEvent::Modified(obj))
        );
    }
}
