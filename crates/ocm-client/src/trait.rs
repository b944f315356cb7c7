//! OcmClient trait for mocking
//!
//! This trait abstracts the hub API so the dashboard can be exercised
//! against `MockOcmClient` in unit tests. The concrete `OcmClient` talks to a
//! real API server.

use crate::collection::Collection;
use crate::error::OcmError;
use crate::watch::WatchHandle;
use serde_json::Value;

/// Read-only operations against one hub cluster.
///
/// Implementations are shared across concurrent requests, so all methods
/// take `&self` and must be `Send`.
#[async_trait::async_trait]
pub trait OcmClientTrait: Send + Sync {
    /// Full listing of a collection; items are returned undecoded.
    async fn list(&self, collection: &Collection) -> Result<Vec<Value>, OcmError>;

    /// Opens a watch on a collection. Fails fast if the subscription cannot
    /// be established; once open, failures surface as `WatchEvent::Error`
    /// or as the end of the event sequence. Never reconnects on its own.
    async fn watch(&self, collection: &Collection) -> Result<WatchHandle, OcmError>;

    /// Fetches one named object of a collection.
    async fn get(&self, collection: &Collection, name: &str) -> Result<Value, OcmError>;
}
