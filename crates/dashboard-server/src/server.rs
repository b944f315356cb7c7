//! Dashboard HTTP server.
//!
//! Owns the shared state of all handlers: the OCM client (shared read-only
//! by every request), the materializer, the metrics registry and the root
//! shutdown token that every stream session derives its own token from.

use crate::api;
use crate::config::DashboardConfig;
use crate::error::DashboardError;
use crate::materializer::{ClusterConverter, SnapshotMaterializer};
use crate::metrics::StreamMetrics;
use axum::Router;
use axum::routing::get;
use ocm_client::OcmClientTrait;
use prometheus::Registry;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    /// `None` when the hub could not be reached at startup
    pub client: Option<Arc<dyn OcmClientTrait>>,
    pub config: Arc<DashboardConfig>,
    pub materializer: SnapshotMaterializer,
    pub registry: Registry,
    pub metrics: StreamMetrics,
    /// Cancelled on shutdown; parent of every stream session token
    pub shutdown: CancellationToken,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("client", &self.client.is_some())
            .field("config", &self.config)
            .field("metrics", &self.metrics)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl AppState {
    pub fn new(config: DashboardConfig, client: Option<Arc<dyn OcmClientTrait>>) -> Result<Self, DashboardError> {
        let registry = Registry::new();
        let metrics = StreamMetrics::register(&registry)?;
        let materializer =
            SnapshotMaterializer::new(ClusterConverter::new(config.available_condition_type.clone()));
        Ok(Self {
            client,
            config: Arc::new(config),
            materializer,
            registry,
            metrics,
            shutdown: CancellationToken::new(),
        })
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/clusters", get(api::list_clusters))
        .route("/clusters/stream", get(api::stream_clusters))
        .route("/clusters/{name}", get(api::get_cluster))
        .route("/clusters/{name}/addons", get(api::list_cluster_addons))
        .route("/clusters/{name}/manifestworks", get(api::list_cluster_manifest_works))
        .route("/clustersets", get(api::list_cluster_sets))
        .route("/placements", get(api::list_placements));

    let mut app = Router::new()
        .nest("/api/v1", api)
        .route("/healthz", get(api::healthz))
        .route("/readyz", get(api::readyz))
        .route("/metrics", get(api::render_metrics))
        .layer(TraceLayer::new_for_http());

    if state.config.cors_allow_any {
        app = app.layer(CorsLayer::permissive());
    }

    app.with_state(state)
}

#[derive(Debug)]
pub struct DashboardServer {
    state: AppState,
}

impl DashboardServer {
    pub fn new(config: DashboardConfig, client: Option<Arc<dyn OcmClientTrait>>) -> Result<Self, DashboardError> {
        Ok(Self {
            state: AppState::new(config, client)?,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Serves until `shutdown` resolves.
    ///
    /// On shutdown every open stream is cancelled (each closing its watch)
    /// before in-flight requests are drained.
    pub async fn run<F>(self, shutdown: F) -> Result<(), DashboardError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.state.config.bind_address).await?;
        info!(address = %listener.local_addr()?, "OCM dashboard listening");

        let token = self.state.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                shutdown.await;
                info!("Shutdown requested, closing open streams");
                token.cancel();
            })
            .await?;

        info!("OCM dashboard stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use crds::ManagedCluster;
    use futures::StreamExt;
    use ocm_client::{Collection, MockOcmClient, WatchEvent};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn clusters() -> Collection {
        Collection::of::<ManagedCluster>()
    }

    fn cluster(name: &str, set: &str, available: &str) -> Value {
        json!({
            "apiVersion": "cluster.open-cluster-management.io/v1",
            "kind": "ManagedCluster",
            "metadata": {
                "name": name,
                "uid": format!("uid-{name}"),
                "labels": {"cluster.open-cluster-management.io/clusterset": set},
            },
            "spec": {"hubAcceptsClient": true},
            "status": {"conditions": [{"type": "ClusterAvailable", "status": available}]},
        })
    }

    fn mock() -> MockOcmClient {
        let mock = MockOcmClient::new();
        mock.set_items(
            &clusters(),
            vec![cluster("east", "prod", "True"), cluster("west", "prod", "False")],
        );
        mock
    }

    fn state_with(mock: Option<&MockOcmClient>) -> AppState {
        let client = mock.map(|m| Arc::new(m.clone()) as Arc<dyn OcmClientTrait>);
        AppState::new(DashboardConfig::default(), client).unwrap()
    }

    async fn get_path(state: &AppState, path: &str) -> axum::response::Response {
        router(state.clone())
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    /// Reads body chunks until one full SSE frame has arrived.
    async fn next_frame<S>(body: &mut S, buffer: &mut String) -> Option<String>
    where
        S: futures::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin,
    {
        loop {
            if let Some(end) = buffer.find("\n\n") {
                let frame = buffer[..end + 2].to_string();
                buffer.drain(..end + 2);
                return Some(frame);
            }
            let chunk = body.next().await?.ok()?;
            buffer.push_str(std::str::from_utf8(&chunk).ok()?);
        }
    }

    #[tokio::test]
    async fn test_health_and_readiness() {
        let ready = state_with(Some(&mock()));
        assert_eq!(get_path(&ready, "/healthz").await.status(), StatusCode::OK);
        assert_eq!(get_path(&ready, "/readyz").await.status(), StatusCode::OK);

        let unready = state_with(None);
        assert_eq!(get_path(&unready, "/healthz").await.status(), StatusCode::OK);
        assert_eq!(get_path(&unready, "/readyz").await.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_list_and_get_clusters() {
        let state = state_with(Some(&mock()));

        let response = get_path(&state, "/api/v1/clusters").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["name"], "east");
        assert_eq!(body[0]["status"], "Online");
        assert_eq!(body[1]["status"], "Offline");

        let response = get_path(&state, "/api/v1/clusters/west").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["id"], "uid-west");

        let response = get_path(&state, "/api/v1/clusters/nowhere").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_rest_without_client_is_unavailable() {
        let state = state_with(None);
        for path in ["/api/v1/clusters", "/api/v1/clustersets", "/api/v1/clusters/east/addons"] {
            assert_eq!(get_path(&state, path).await.status(), StatusCode::SERVICE_UNAVAILABLE);
        }
    }

    #[tokio::test]
    async fn test_list_failure_is_bad_gateway() {
        let mock = mock();
        mock.set_list_failure(Some("apiserver unreachable"));
        let state = state_with(Some(&mock));
        assert_eq!(get_path(&state, "/api/v1/clusters").await.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_cluster_sets_and_placements() {
        let mock = mock();
        mock.set_items(
            &Collection::of::<crds::ManagedClusterSet>(),
            vec![json!({
                "apiVersion": "cluster.open-cluster-management.io/v1beta2",
                "kind": "ManagedClusterSet",
                "metadata": {"name": "prod"},
                "spec": {"clusterSelector": {"selectorType": "ExclusiveClusterSetLabel"}},
            })],
        );
        mock.set_items(
            &Collection::of::<crds::Placement>(),
            vec![json!({
                "apiVersion": "cluster.open-cluster-management.io/v1beta1",
                "kind": "Placement",
                "metadata": {"name": "web", "namespace": "apps"},
                "spec": {"clusterSets": ["prod"]},
            })],
        );
        mock.set_items(
            &Collection::of::<crds::PlacementDecision>(),
            vec![json!({
                "metadata": {
                    "name": "web-decision-1",
                    "namespace": "apps",
                    "labels": {"cluster.open-cluster-management.io/placement": "web"},
                },
                "status": {"decisions": [{"clusterName": "east", "reason": ""}]},
            })],
        );
        let state = state_with(Some(&mock));

        let sets = json_body(get_path(&state, "/api/v1/clustersets").await).await;
        assert_eq!(sets[0]["name"], "prod");
        assert_eq!(sets[0]["clusterCount"], 2);

        let placements = json_body(get_path(&state, "/api/v1/placements").await).await;
        assert_eq!(placements[0]["selectedClusters"], json!(["east"]));
        assert!(placements[0].get("numberOfClusters").is_none());
    }

    #[tokio::test]
    async fn test_cluster_addons_and_manifest_works() {
        let mock = mock();
        mock.set_items(
            &Collection::of::<crds::ManagedClusterAddOn>().in_namespace("east"),
            vec![json!({
                "apiVersion": "addon.open-cluster-management.io/v1alpha1",
                "kind": "ManagedClusterAddOn",
                "metadata": {"name": "work-manager", "namespace": "east"},
                "spec": {},
                "status": {"conditions": [{"type": "Available", "status": "True"}]},
            })],
        );
        let state = state_with(Some(&mock));

        let addons = json_body(get_path(&state, "/api/v1/clusters/east/addons").await).await;
        assert_eq!(addons[0]["name"], "work-manager");
        assert_eq!(addons[0]["status"], "Available");

        let works = json_body(get_path(&state, "/api/v1/clusters/east/manifestworks").await).await;
        assert_eq!(works, json!([]));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let state = state_with(Some(&mock()));
        let response = get_path(&state, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("ocm_dashboard_active_streams"));
    }

    #[tokio::test]
    async fn test_stream_sends_snapshot_then_changes() {
        let mock = mock();
        let state = state_with(Some(&mock));

        let response = get_path(&state, "/api/v1/clusters/stream").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

        let mut body = response.into_body().into_data_stream();
        let mut buffer = String::new();
        let first = next_frame(&mut body, &mut buffer).await.unwrap();
        assert!(first.starts_with("event: clusters\ndata: ["));
        assert!(first.contains("\"status\":\"Online\""));
        assert!(first.contains("\"status\":\"Offline\""));

        mock.emit(WatchEvent::Modified(cluster("west", "prod", "True"))).await;
        let second = next_frame(&mut body, &mut buffer).await.unwrap();
        assert!(second.starts_with("event: clusters\n"));

        // Client goes away
        drop(body);
        while mock.watch_closes() < 1 {
            tokio::task::yield_now().await;
        }
        assert_eq!(mock.watch_opens(), 1);
    }

    #[tokio::test]
    async fn test_stream_without_client_sends_error_and_ends() {
        let state = state_with(None);
        let response = get_path(&state, "/api/v1/clusters/stream").await;
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("event: error\ndata: "));
        assert_eq!(text.matches("\n\n").count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_ends_open_streams() {
        let mock = mock();
        let state = state_with(Some(&mock));

        let response = get_path(&state, "/api/v1/clusters/stream").await;
        let mut body = response.into_body().into_data_stream();
        let mut buffer = String::new();
        next_frame(&mut body, &mut buffer).await.unwrap();
        assert_eq!(state.metrics.active_streams(), 1);

        state.shutdown.cancel();
        assert!(next_frame(&mut body, &mut buffer).await.is_none());
        assert_eq!(mock.watch_closes(), 1);
        assert_eq!(state.metrics.active_streams(), 0);
    }
}
