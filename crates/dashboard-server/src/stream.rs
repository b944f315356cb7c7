//! Change stream controller
//!
//! One controller serves one client connection. It opens its own watch on the
//! target collection, pushes a full snapshot right away, and then multiplexes
//! three sources until the session ends:
//!
//! - the session's cancellation token (client disconnect or server shutdown)
//! - the watch: every Added/Modified/Deleted triggers a full re-list and a new
//!   snapshot frame; an Error event becomes a non-terminal error frame
//! - an idle timer that writes a keepalive after `keepalive` without any write
//!
//! Cancellation also interrupts a re-list or a write in progress, so nothing
//! reaches the sink once the token fires. The watch handle is owned by the
//! controller and closed exactly once on every exit path.

use crate::error::SinkError;
use crate::materializer::SnapshotMaterializer;
use crate::metrics::StreamMetrics;
use crate::models::ResourceSnapshotItem;
use crate::sse::EventSink;
use ocm_client::{Collection, OcmClientTrait, WatchEvent, WatchHandle};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

/// What a session streams and under which SSE event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub collection: Collection,
    pub event_name: String,
}

impl StreamTarget {
    pub fn new(collection: Collection, event_name: impl Into<String>) -> Self {
        Self {
            collection,
            event_name: event_name.into(),
        }
    }
}

/// Lifecycle of a session: `Initializing` until the watch is open,
/// `Streaming` while events flow, `Closed` once `run` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Initializing,
    Streaming,
    Closed,
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// No client configured; no watch was opened
    Unavailable,
    WatchOpenFailed,
    InitialSnapshotFailed,
    Cancelled,
    /// The watch event sequence was exhausted
    WatchClosed,
    /// A write to the sink failed
    ClientGone,
}

/// Runs `fut` unless `cancel` fires first. An already cancelled token wins
/// without polling `fut`.
async fn unless_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

/// Performs one sink write, mapping cancellation and write failure to the
/// session end they cause.
async fn deliver<F>(cancel: &CancellationToken, write: F) -> Result<(), SessionEnd>
where
    F: Future<Output = Result<(), SinkError>>,
{
    match unless_cancelled(cancel, write).await {
        None => Err(SessionEnd::Cancelled),
        Some(Err(e)) => {
            debug!(error = %e, "sink write failed");
            Err(SessionEnd::ClientGone)
        }
        Some(Ok(())) => Ok(()),
    }
}

fn object_name(event: &WatchEvent) -> Option<&str> {
    event
        .object()
        .and_then(|object| object.pointer("/metadata/name"))
        .and_then(Value::as_str)
}

pub struct ChangeStreamController {
    client: Option<Arc<dyn OcmClientTrait>>,
    materializer: SnapshotMaterializer,
    target: StreamTarget,
    keepalive: Duration,
    metrics: Option<StreamMetrics>,
    state: tokio::sync::watch::Sender<StreamState>,
}

impl fmt::Debug for ChangeStreamController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeStreamController")
            .field("client", &self.client.is_some())
            .field("target", &self.target)
            .field("keepalive", &self.keepalive)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl ChangeStreamController {
    pub fn new(
        client: Option<Arc<dyn OcmClientTrait>>,
        materializer: SnapshotMaterializer,
        target: StreamTarget,
        keepalive: Duration,
    ) -> Self {
        let (state, _) = tokio::sync::watch::channel(StreamState::Initializing);
        Self {
            client,
            materializer,
            target,
            keepalive,
            metrics: None,
            state,
        }
    }

    pub fn with_metrics(mut self, metrics: StreamMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Subscribes to the session's state. Take it before `run`, which
    /// consumes the controller; the receiver keeps reporting afterwards.
    pub fn state(&self) -> tokio::sync::watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    fn transition(&self, to: StreamState) {
        let from = self.state.send_replace(to);
        debug!(?from, ?to, "stream state changed");
    }

    /// Runs the session to completion and reports why it ended.
    ///
    /// Never fails: every problem is reported to the client as an error frame
    /// or ends the session.
    pub async fn run<S>(self, sink: &mut S, cancel: CancellationToken) -> SessionEnd
    where
        S: EventSink + ?Sized,
    {
        let span = info_span!(
            "stream_session",
            session_id = %Uuid::new_v4(),
            collection = %self.target.collection,
        );
        async move {
            let _active = self.metrics.as_ref().map(StreamMetrics::session_started);
            info!("stream session started");
            let end = self.drive(sink, &cancel).await;
            self.transition(StreamState::Closed);
            info!(reason = ?end, "stream session ended");
            end
        }
        .instrument(span)
        .await
    }

    async fn drive<S>(&self, sink: &mut S, cancel: &CancellationToken) -> SessionEnd
    where
        S: EventSink + ?Sized,
    {
        let Some(client) = self.client.clone() else {
            warn!("no OCM client configured, refusing stream");
            let _ = deliver(cancel, self.emit_error(sink, "resource client unavailable")).await;
            return SessionEnd::Unavailable;
        };

        let mut watch = match unless_cancelled(cancel, client.watch(&self.target.collection)).await {
            None => return SessionEnd::Cancelled,
            Some(Ok(watch)) => watch,
            Some(Err(e)) => {
                warn!(error = %e, "failed to open watch");
                let _ = deliver(cancel, self.emit_error(sink, &format!("failed to open watch: {e}"))).await;
                return SessionEnd::WatchOpenFailed;
            }
        };

        self.transition(StreamState::Streaming);
        let end = self.stream(client.as_ref(), &mut watch, sink, cancel).await;
        watch.close();
        end
    }

    /// Initial snapshot, then the event loop. Returns with the watch still
    /// open; the caller closes it.
    async fn stream<S>(
        &self,
        client: &dyn OcmClientTrait,
        watch: &mut WatchHandle,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> SessionEnd
    where
        S: EventSink + ?Sized,
    {
        let collection = &self.target.collection;

        let relist = move || self.materializer.materialize(client, collection);

        let Some(initial) = unless_cancelled(cancel, relist()).await else {
            return SessionEnd::Cancelled;
        };
        match initial {
            Ok(items) => {
                if let Err(end) = deliver(cancel, self.emit_snapshot(sink, &items)).await {
                    return end;
                }
            }
            Err(e) => {
                warn!(error = %e, "initial snapshot failed");
                let _ = deliver(cancel, self.emit_error(sink, &format!("failed to list resources: {e}"))).await;
                return SessionEnd::InitialSnapshotFailed;
            }
        }

        let keepalive = tokio::time::sleep(self.keepalive);
        tokio::pin!(keepalive);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => return SessionEnd::Cancelled,

                event = watch.next() => match event {
                    None => return SessionEnd::WatchClosed,
                    Some(WatchEvent::Error(message)) => {
                        debug!(%message, "watch reported an error");
                        if let Err(end) = deliver(cancel, self.emit_error(sink, &message)).await {
                            return end;
                        }
                        keepalive.as_mut().reset(Instant::now() + self.keepalive);
                    }
                    Some(event) => {
                        debug!(kind = event.kind(), name = object_name(&event), "change notification");
                        let Some(listed) = unless_cancelled(cancel, relist()).await else {
                            return SessionEnd::Cancelled;
                        };
                        match listed {
                            Ok(items) => {
                                if let Err(end) = deliver(cancel, self.emit_snapshot(sink, &items)).await {
                                    return end;
                                }
                                keepalive.as_mut().reset(Instant::now() + self.keepalive);
                            }
                            // Skipped; the next change or keepalive carries on
                            Err(e) => warn!(error = %e, "re-list failed, snapshot skipped"),
                        }
                    }
                },

                () = &mut keepalive => {
                    if let Err(end) = deliver(cancel, self.emit_keepalive(sink)).await {
                        return end;
                    }
                    keepalive.as_mut().reset(Instant::now() + self.keepalive);
                }
            }
        }
    }

    async fn emit_snapshot<S>(&self, sink: &mut S, items: &[ResourceSnapshotItem]) -> Result<(), SinkError>
    where
        S: EventSink + ?Sized,
    {
        sink.write_snapshot(&self.target.event_name, items).await?;
        debug!(items = items.len(), "snapshot sent");
        if let Some(metrics) = &self.metrics {
            metrics.snapshot_sent();
        }
        Ok(())
    }

    async fn emit_error<S>(&self, sink: &mut S, message: &str) -> Result<(), SinkError>
    where
        S: EventSink + ?Sized,
    {
        sink.write_error(message).await?;
        if let Some(metrics) = &self.metrics {
            metrics.error_sent();
        }
        Ok(())
    }

    async fn emit_keepalive<S>(&self, sink: &mut S) -> Result<(), SinkError>
    where
        S: EventSink + ?Sized,
    {
        sink.write_keepalive().await?;
        if let Some(metrics) = &self.metrics {
            metrics.keepalive_sent();
        }
        Ok(())
    }
}
