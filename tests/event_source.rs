use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::stream;
use http::{HeaderMap, StatusCode, Uri};
use tokio_util::sync::CancellationToken;

use evsource::{
    BoxError, EventSourceBuilder, LastEventIdFile, SseConnection, SseConnector, SseRequest,
};

type ScriptedBody = stream::Iter<std::vec::IntoIter<Result<Bytes, BoxError>>>;
type Script = Vec<(StatusCode, Vec<Result<Bytes, BoxError>>)>;

/// Connector yielding a fixed sequence of scripted connections, recording
/// the headers of every request it receives.
struct MockConnector {
    script: VecDeque<(StatusCode, Vec<Result<Bytes, BoxError>>)>,
    seen_headers: Arc<Mutex<Vec<HeaderMap>>>,
}

impl MockConnector {
    fn new(script: Script) -> (Self, Arc<Mutex<Vec<HeaderMap>>>) {
        let seen_headers = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                script: script.into(),
                seen_headers: seen_headers.clone(),
            },
            seen_headers,
        )
    }
}

impl SseConnector for MockConnector {
    type Body = ScriptedBody;

    async fn connect(&mut self, req: &SseRequest) -> Result<SseConnection<Self::Body>, BoxError> {
        self.seen_headers.lock().unwrap().push(req.headers.clone());
        let (status, body) = self.script.pop_front().ok_or("connection refused")?;
        Ok(SseConnection {
            status,
            body: stream::iter(body),
        })
    }
}

fn chunks(parts: &[&str]) -> Vec<Result<Bytes, BoxError>> {
    parts
        .iter()
        .map(|part| Ok(Bytes::copy_from_slice(part.as_bytes())))
        .collect()
}

fn url() -> Uri {
    Uri::from_static("http://stream.test/events")
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).map(|value| value.to_str().unwrap())
}

#[tokio::test(start_paused = true)]
async fn reconnects_with_last_event_id_and_a_fresh_buffer() {
    let (connector, seen) = MockConnector::new(vec![
        (
            StatusCode::OK,
            chunks(&["id: 41\ndata: first\n\n", "data: partial"]),
        ),
        (StatusCode::OK, chunks(&["data: second\n\n"])),
    ]);
    let mut client = EventSourceBuilder::new(url()).connect(connector).await.unwrap();

    let first = client.next_event().await.unwrap();
    assert_eq!(first.data(), "first");
    assert_eq!(client.last_event_id(), Some("41"));

    // the partial message is discarded on disconnect, never merged into the
    // next connection's stream
    let started = tokio::time::Instant::now();
    let second = client.next_event().await.unwrap();
    assert_eq!(second.data(), "second");
    assert_eq!(started.elapsed(), Duration::from_millis(3000));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(header(&seen[0], "accept"), Some("text/event-stream"));
    assert_eq!(header(&seen[0], "cache-control"), Some("no-cache"));
    assert_eq!(header(&seen[0], "last-event-id"), None);
    assert_eq!(header(&seen[1], "last-event-id"), Some("41"));
}

#[tokio::test(start_paused = true)]
async fn retry_override_applies_to_all_later_reconnects() {
    let (connector, _) = MockConnector::new(vec![
        (StatusCode::OK, chunks(&["retry: 5000\ndata: a\n\n"])),
        (StatusCode::OK, chunks(&["data: b\n\n"])),
        (StatusCode::OK, chunks(&["data: c\n\n"])),
    ]);
    let mut client = EventSourceBuilder::new(url()).connect(connector).await.unwrap();

    assert_eq!(client.next_event().await.unwrap().data(), "a");
    assert_eq!(client.retry(), Duration::from_millis(5000));

    for expected in ["b", "c"] {
        let started = tokio::time::Instant::now();
        assert_eq!(client.next_event().await.unwrap().data(), expected);
        assert_eq!(started.elapsed(), Duration::from_millis(5000));
    }
}

#[tokio::test]
async fn http_204_at_construction_is_fatal() {
    let (connector, _) = MockConnector::new(vec![(StatusCode::NO_CONTENT, chunks(&[]))]);
    let err = EventSourceBuilder::new(url())
        .connect(connector)
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test(start_paused = true)]
async fn http_204_on_reconnect_ends_the_sequence() {
    let (connector, _) = MockConnector::new(vec![
        (StatusCode::OK, chunks(&["data: a\n\n"])),
        (StatusCode::NO_CONTENT, chunks(&[])),
    ]);
    let mut client = EventSourceBuilder::new(url()).connect(connector).await.unwrap();

    assert_eq!(client.next_event().await.unwrap().data(), "a");
    let err = client.next_event().await.unwrap_err();
    assert!(err.is_fatal());
    assert!(client.next_event().await.unwrap_err().is_closed());
}

#[tokio::test(start_paused = true)]
async fn connect_failure_propagates() {
    // one scripted connection; the reconnect attempt is refused
    let (connector, _) = MockConnector::new(vec![(StatusCode::OK, chunks(&["data: a\n\n"]))]);
    let mut client = EventSourceBuilder::new(url()).connect(connector).await.unwrap();

    assert_eq!(client.next_event().await.unwrap().data(), "a");
    let err = client.next_event().await.unwrap_err();
    assert!(!err.is_fatal());
    assert!(!err.is_parse());
    assert!(client.next_event().await.unwrap_err().is_closed());
}

#[tokio::test(start_paused = true)]
async fn error_statuses_are_still_streamed() {
    let (connector, _) = MockConnector::new(vec![(
        StatusCode::INTERNAL_SERVER_ERROR,
        chunks(&["event: oops\ndata: half a stack trace\n\n"]),
    )]);
    let mut client = EventSourceBuilder::new(url()).connect(connector).await.unwrap();

    let event = client.next_event().await.unwrap();
    assert_eq!(event.event_type(), "oops");
    assert_eq!(event.data(), "half a stack trace");
}

#[tokio::test(start_paused = true)]
async fn mid_read_transport_error_reconnects_silently() {
    let (connector, _) = MockConnector::new(vec![
        (
            StatusCode::OK,
            vec![
                Ok(Bytes::from_static(b"data: a\n\n")),
                Err(BoxError::from("connection reset")),
            ],
        ),
        (StatusCode::OK, chunks(&["data: b\n\n"])),
    ]);
    let mut client = EventSourceBuilder::new(url()).connect(connector).await.unwrap();

    assert_eq!(client.next_event().await.unwrap().data(), "a");
    assert_eq!(client.next_event().await.unwrap().data(), "b");
}

#[tokio::test(start_paused = true)]
async fn unparseable_message_terminates_the_sequence() {
    let (connector, _) = MockConnector::new(vec![(
        StatusCode::OK,
        vec![Ok(Bytes::from_static(b"\xff\xfe\n\n"))],
    )]);
    let mut client = EventSourceBuilder::new(url()).connect(connector).await.unwrap();

    let err = client.next_event().await.unwrap_err();
    assert!(err.is_parse());
    assert!(client.next_event().await.unwrap_err().is_closed());
}

#[tokio::test(start_paused = true)]
async fn cancellation_ends_the_sequence_cleanly() {
    let (connector, _) = MockConnector::new(vec![(StatusCode::OK, chunks(&["data: a\n\n"]))]);
    let token = CancellationToken::new();
    let mut client = EventSourceBuilder::new(url())
        .with_cancellation_token(token.clone())
        .connect(connector)
        .await
        .unwrap();

    assert_eq!(client.next_event().await.unwrap().data(), "a");

    // cancelled while the client would otherwise sleep out the backoff
    token.cancel();
    let err = client.next_event().await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(client.next_event().await.unwrap_err().is_closed());
}

#[tokio::test]
async fn persisted_id_round_trips_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last-id");
    std::fs::write(&path, "42").unwrap();

    let (connector, seen) = MockConnector::new(vec![(StatusCode::OK, chunks(&[]))]);
    let client = EventSourceBuilder::new(url())
        .with_id_store(LastEventIdFile::new(&path))
        .connect(connector)
        .await
        .unwrap();

    assert_eq!(client.last_event_id(), Some("42"));
    assert_eq!(header(&seen.lock().unwrap()[0], "last-event-id"), Some("42"));

    client.close().unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "42");
}

#[tokio::test]
async fn newly_observed_id_is_persisted_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("last-id");
    std::fs::write(&path, "42").unwrap();

    let (connector, _) = MockConnector::new(vec![(
        StatusCode::OK,
        chunks(&["id: 99\ndata: x\n\n"]),
    )]);
    {
        let mut client = EventSourceBuilder::new(url())
            .with_id_store(LastEventIdFile::new(&path))
            .connect(connector)
            .await
            .unwrap();
        assert_eq!(client.next_event().await.unwrap().data(), "x");
    }

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "99");
}
