//! Server-Sent Events output
//!
//! Frames written by a stream session:
//!
//! ```text
//! event: clusters
//! data: [{"id":"...","name":"east","status":"Online","conditions":[]}]
//!
//! event: error
//! data: watch failed
//!
//! : ping
//!
//! ```
//!
//! A session builds each frame as an `axum` SSE [`Event`] and hands it to
//! the response body through a bounded channel. Nothing is coalesced: every
//! event becomes its own body chunk.

use crate::error::SinkError;
use crate::models::ResourceSnapshotItem;
use async_trait::async_trait;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

pub const ERROR_EVENT: &str = "error";
pub const KEEPALIVE_COMMENT: &str = "ping";

/// Destination of one session's frames.
#[async_trait]
pub trait EventSink: Send {
    async fn write_snapshot(&mut self, event_name: &str, items: &[ResourceSnapshotItem]) -> Result<(), SinkError>;

    async fn write_error(&mut self, message: &str) -> Result<(), SinkError>;

    async fn write_keepalive(&mut self) -> Result<(), SinkError>;
}

/// `event: <name>` followed by the items as one JSON array.
pub fn snapshot_event(event_name: &str, items: &[ResourceSnapshotItem]) -> Result<Event, SinkError> {
    Ok(Event::default().event(event_name).json_data(items)?)
}

/// `event: error` with the message as data, one `data:` line per line.
pub fn error_event(message: &str) -> Event {
    // Carriage returns cannot travel in a data field
    let message = message.replace("\r\n", "\n").replace('\r', "\n");
    Event::default().event(ERROR_EVENT).data(message)
}

pub fn keepalive_event() -> Event {
    Event::default().comment(KEEPALIVE_COMMENT)
}

/// Sending half of a session's event channel.
#[derive(Debug, Clone)]
pub struct SseSink {
    events: mpsc::Sender<Event>,
}

/// Creates a sink and the receiver its events are served from.
///
/// `capacity` bounds the frames queued for a slow client; a full queue makes
/// the session wait.
pub fn event_channel(capacity: usize) -> (SseSink, mpsc::Receiver<Event>) {
    let (events, receiver) = mpsc::channel(capacity.max(1));
    (SseSink { events }, receiver)
}

impl SseSink {
    async fn send(&mut self, event: Event) -> Result<(), SinkError> {
        self.events.send(event).await.map_err(|_closed| SinkError::Closed)
    }
}

#[async_trait]
impl EventSink for SseSink {
    async fn write_snapshot(&mut self, event_name: &str, items: &[ResourceSnapshotItem]) -> Result<(), SinkError> {
        let event = snapshot_event(event_name, items)?;
        self.send(event).await
    }

    async fn write_error(&mut self, message: &str) -> Result<(), SinkError> {
        self.send(error_event(message)).await
    }

    async fn write_keepalive(&mut self) -> Result<(), SinkError> {
        self.send(keepalive_event()).await
    }
}

/// Serves `events` as a `text/event-stream` response.
///
/// `guard` lives as long as the body, so dropping the body (client gone)
/// cancels the session it guards.
pub fn sse_response(events: mpsc::Receiver<Event>, guard: DropGuard) -> Response {
    let stream = futures::stream::unfold((events, guard), |(mut events, guard)| async move {
        let event = events.recv().await?;
        Some((Ok::<_, Infallible>(event), (events, guard)))
    });
    Sse::new(stream).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClusterStatus;
    use axum::body::to_bytes;
    use axum::http::header;
    use tokio_util::sync::CancellationToken;

    fn item(name: &str) -> ResourceSnapshotItem {
        ResourceSnapshotItem {
            id: format!("uid-{name}"),
            name: name.to_string(),
            status: ClusterStatus::Unknown,
            version: None,
            labels: None,
            conditions: vec![],
        }
    }

    /// Everything the sink wrote, as the client receives it.
    async fn wire_text(events: mpsc::Receiver<Event>) -> String {
        let response = sse_response(events, CancellationToken::new().drop_guard());
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_sink_writes_frames_in_order() {
        let (mut sink, events) = event_channel(8);
        sink.write_snapshot("clusters", &[item("east")]).await.unwrap();
        sink.write_keepalive().await.unwrap();
        sink.write_error("boom").await.unwrap();
        sink.write_snapshot("clusters", &[]).await.unwrap();
        drop(sink);

        assert_eq!(
            wire_text(events).await,
            "event: clusters\ndata: [{\"id\":\"uid-east\",\"name\":\"east\",\"status\":\"Unknown\",\"conditions\":[]}]\n\n\
             : ping\n\n\
             event: error\ndata: boom\n\n\
             event: clusters\ndata: []\n\n"
        );
    }

    #[tokio::test]
    async fn test_multiline_error_message() {
        let (mut sink, events) = event_channel(8);
        sink.write_error("first\nsecond").await.unwrap();
        sink.write_error("dos\r\nline").await.unwrap();
        drop(sink);

        assert_eq!(
            wire_text(events).await,
            "event: error\ndata: first\ndata: second\n\nevent: error\ndata: dos\ndata: line\n\n"
        );
    }

    #[tokio::test]
    async fn test_zero_capacity_still_delivers() {
        let (mut sink, events) = event_channel(0);
        let written = tokio::time::timeout(std::time::Duration::from_secs(1), sink.write_keepalive()).await;
        assert!(matches!(written, Ok(Ok(()))));
        drop(sink);
        assert_eq!(wire_text(events).await, ": ping\n\n");
    }

    #[tokio::test]
    async fn test_sink_reports_closed_receiver() {
        let (mut sink, events) = event_channel(4);
        drop(events);
        assert!(matches!(sink.write_keepalive().await, Err(SinkError::Closed)));
        assert!(matches!(sink.write_error("late").await, Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn test_dropping_body_cancels_guarded_session() {
        let session = CancellationToken::new();
        let (_sink, events) = event_channel(4);
        let response = sse_response(events, session.clone().drop_guard());
        assert!(!session.is_cancelled());

        drop(response);
        assert!(session.is_cancelled());
    }
}
