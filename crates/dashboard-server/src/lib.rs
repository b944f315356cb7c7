//! OCM Dashboard Server
//!
//! Read-only backend of the Open Cluster Management dashboard, built on `axum`.
//!
//! This server provides:
//! - A live managed-cluster stream over Server-Sent Events: every watch
//!   notification triggers a full re-list, and the complete snapshot is pushed
//!   to the browser
//! - JSON views of clusters, cluster sets, placements, addons and manifest works
//! - Health, readiness and Prometheus metrics endpoints
//!
//! # Stream sessions
//!
//! Each stream client gets its own `ChangeStreamController` with its own
//! watch. A session ends when the client disconnects, the server shuts down,
//! or the watch ends; the watch is released on every path.

pub mod api;
pub mod config;
pub mod error;
pub mod extract;
pub mod materializer;
pub mod metrics;
pub mod models;
pub mod server;
pub mod sse;
pub mod stream;
pub mod views;

pub use config::DashboardConfig;
pub use error::{DashboardError, SinkError};
pub use materializer::{ClusterConverter, SnapshotMaterializer, derive_status};
pub use models::*;
pub use server::{AppState, DashboardServer, router};
pub use sse::{EventSink, SseSink, event_channel, sse_response};
pub use stream::{ChangeStreamController, SessionEnd, StreamState, StreamTarget};
