//! HTTP handlers
//!
//! Read-only JSON views under `/api/v1`, the live cluster stream, and the
//! health, readiness and metrics endpoints.

use crate::error::DashboardError;
use crate::metrics;
use crate::models::{AddonView, ClusterSetView, ManifestWorkView, PlacementView, ResourceSnapshotItem};
use crate::server::AppState;
use crate::sse::{event_channel, sse_response};
use crate::stream::{ChangeStreamController, StreamTarget};
use crate::views;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use crds::{ManagedCluster, ManagedClusterAddOn, ManagedClusterSet, ManifestWork, Placement, PlacementDecision};
use ocm_client::{Collection, OcmClientTrait, OcmError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// SSE event name of cluster snapshots.
pub const CLUSTERS_EVENT: &str = "clusters";

fn require_client(state: &AppState) -> Result<Arc<dyn OcmClientTrait>, DashboardError> {
    state
        .client
        .clone()
        .ok_or_else(|| DashboardError::Unavailable("no OCM client configured".to_string()))
}

/// Decodes listed items as `K`, dropping (and logging) the ones that do not fit.
pub fn decode_items<K: DeserializeOwned>(collection: &Collection, items: Vec<Value>) -> Vec<K> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(%collection, error = %e, "skipping item that does not decode");
                None
            }
        })
        .collect()
}

async fn list_typed<K: DeserializeOwned>(
    client: &dyn OcmClientTrait,
    collection: &Collection,
) -> Result<Vec<K>, DashboardError> {
    let items = client.list(collection).await?;
    Ok(decode_items(collection, items))
}

pub async fn list_clusters(State(state): State<AppState>) -> Result<Json<Vec<ResourceSnapshotItem>>, DashboardError> {
    let client = require_client(&state)?;
    let items = state
        .materializer
        .materialize(client.as_ref(), &Collection::of::<ManagedCluster>())
        .await?;
    Ok(Json(items))
}

pub async fn get_cluster(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ResourceSnapshotItem>, DashboardError> {
    let client = require_client(&state)?;
    let raw = client.get(&Collection::of::<ManagedCluster>(), &name).await?;
    state
        .materializer
        .converter()
        .convert(&raw)
        .map(Json)
        .ok_or_else(|| OcmError::UnexpectedResponse(format!("managed cluster {name} is not an object")).into())
}

/// Opens a live cluster stream for this client.
///
/// The session runs on its own task and queues its events on a channel that
/// the response body drains. Dropping the body (client gone) or cancelling
/// the server's shutdown token ends the session.
pub async fn stream_clusters(State(state): State<AppState>) -> Response {
    let (mut sink, events) = event_channel(state.config.stream_buffer_frames);
    let cancel = state.shutdown.child_token();

    let controller = ChangeStreamController::new(
        state.client.clone(),
        state.materializer.clone(),
        StreamTarget::new(Collection::of::<ManagedCluster>(), CLUSTERS_EVENT),
        state.config.keepalive,
    )
    .with_metrics(state.metrics.clone());

    let session_cancel = cancel.clone();
    tokio::spawn(async move {
        controller.run(&mut sink, session_cancel).await;
    });

    debug!("cluster stream attached");
    sse_response(events, cancel.drop_guard())
}

pub async fn list_cluster_sets(State(state): State<AppState>) -> Result<Json<Vec<ClusterSetView>>, DashboardError> {
    let client = require_client(&state)?;
    let sets_collection = Collection::of::<ManagedClusterSet>();
    let clusters_collection = Collection::of::<ManagedCluster>();
    let (sets, clusters) = tokio::try_join!(
        list_typed::<ManagedClusterSet>(client.as_ref(), &sets_collection),
        list_typed::<ManagedCluster>(client.as_ref(), &clusters_collection),
    )?;
    Ok(Json(
        sets.iter()
            .map(|set| views::cluster_set_view(set, &clusters))
            .collect(),
    ))
}

pub async fn list_placements(State(state): State<AppState>) -> Result<Json<Vec<PlacementView>>, DashboardError> {
    let client = require_client(&state)?;
    let placements_collection = Collection::of::<Placement>();
    let decisions_collection = Collection::of::<PlacementDecision>();
    let (placements, decisions) = tokio::try_join!(
        list_typed::<Placement>(client.as_ref(), &placements_collection),
        list_typed::<PlacementDecision>(client.as_ref(), &decisions_collection),
    )?;
    Ok(Json(
        placements
            .iter()
            .map(|placement| views::placement_view(placement, &decisions))
            .collect(),
    ))
}

/// Addons of one cluster, from the cluster's namespace on the hub.
pub async fn list_cluster_addons(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<AddonView>>, DashboardError> {
    let client = require_client(&state)?;
    let collection = Collection::of::<ManagedClusterAddOn>().in_namespace(name);
    let addons: Vec<ManagedClusterAddOn> = list_typed(client.as_ref(), &collection).await?;
    Ok(Json(addons.iter().map(views::addon_view).collect()))
}

pub async fn list_cluster_manifest_works(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ManifestWorkView>>, DashboardError> {
    let client = require_client(&state)?;
    let collection = Collection::of::<ManifestWork>().in_namespace(name);
    let works: Vec<ManifestWork> = list_typed(client.as_ref(), &collection).await?;
    Ok(Json(works.iter().map(views::manifest_work_view).collect()))
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn readyz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.client.is_some() {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "no OCM client")
    }
}

pub async fn render_metrics(State(state): State<AppState>) -> Result<Response, DashboardError> {
    let body = metrics::render(&state.registry)?;
    Ok((
        [(header::CONTENT_TYPE, HeaderValue::from_static(prometheus::TEXT_FORMAT))],
        body,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_items_skips_bad_items() {
        let collection = Collection::of::<ManifestWork>();
        let items = vec![
            json!({
                "apiVersion": "work.open-cluster-management.io/v1",
                "kind": "ManifestWork",
                "metadata": {"name": "good", "namespace": "east"},
                "spec": {"workload": {"manifests": []}},
            }),
            json!({"metadata": "not-an-object", "spec": {"workload": {"manifests": []}}}),
            json!("garbage"),
        ];

        let works: Vec<ManifestWork> = decode_items(&collection, items);
        assert_eq!(works.len(), 1);
        assert_eq!(works[0].metadata.name.as_deref(), Some("good"));
    }
}
