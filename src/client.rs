use std::fmt;
use std::time::Duration;

use futures_core::stream::Stream;
use futures_util::StreamExt;
use http::header::{ACCEPT, CACHE_CONTROL};
use http::{HeaderName, HeaderValue, StatusCode, Uri};
use smol_str::SmolStr;
use tokio_util::sync::CancellationToken;

use crate::connect::{SseConnection, SseConnector, SseRequest};
use crate::error::Error;
use crate::event::Event;
use crate::store::LastEventIdFile;
use crate::stream::{EventStream, StreamError};

/// Reconnection delay used until a server `retry` field overrides it.
const DEFAULT_RETRY: Duration = Duration::from_millis(3000);

const LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");

/// Builder for [`EventSource`].
///
/// The builder is connector-agnostic; the collaborator is supplied to
/// [`Self::connect`], which also performs the first connection attempt.
#[derive(Debug)]
pub struct EventSourceBuilder {
    url: Uri,
    headers: http::HeaderMap,
    retry: Duration,
    last_event_id: Option<SmolStr>,
    store: Option<LastEventIdFile>,
    shutdown: CancellationToken,
}

impl EventSourceBuilder {
    /// Start building a client for the given stream url.
    pub fn new(url: Uri) -> Self {
        Self {
            url,
            headers: http::HeaderMap::new(),
            retry: DEFAULT_RETRY,
            last_event_id: None,
            store: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Add a request header sent on every (re)connect.
    ///
    /// `Accept` and `Cache-Control` are forced to the protocol's required
    /// values at connect time; caller-supplied values for those two headers
    /// are overridden.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.insert(name, value);
        self
    }

    /// Same as [`Self::set_header`], consuming `self`.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Override the initial reconnection delay (default: 3000 ms).
    pub fn set_initial_retry(&mut self, retry: Duration) -> &mut Self {
        self.retry = retry;
        self
    }

    /// Same as [`Self::set_initial_retry`], consuming `self`.
    #[must_use]
    pub fn with_initial_retry(mut self, retry: Duration) -> Self {
        self.retry = retry;
        self
    }

    /// Resume from a known event id, sent as `Last-Event-ID` on the first
    /// connect. Takes precedence over an id loaded from the store.
    pub fn set_last_event_id(&mut self, id: impl AsRef<str>) -> &mut Self {
        self.last_event_id = Some(SmolStr::new(id.as_ref()));
        self
    }

    /// Same as [`Self::set_last_event_id`], consuming `self`.
    #[must_use]
    pub fn with_last_event_id(mut self, id: impl AsRef<str>) -> Self {
        self.set_last_event_id(id);
        self
    }

    /// Persist the last seen event id to the given store: loaded before the
    /// first connection attempt, written back at teardown.
    pub fn set_id_store(&mut self, store: LastEventIdFile) -> &mut Self {
        self.store = Some(store);
        self
    }

    /// Same as [`Self::set_id_store`], consuming `self`.
    #[must_use]
    pub fn with_id_store(mut self, store: LastEventIdFile) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach a cancellation token, checked alongside every blocking read
    /// and every backoff sleep. Cancelling it terminates the sequence
    /// cleanly.
    pub fn set_cancellation_token(&mut self, token: CancellationToken) -> &mut Self {
        self.shutdown = token;
        self
    }

    /// Same as [`Self::set_cancellation_token`], consuming `self`.
    #[must_use]
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Perform the first connection attempt and return the live client.
    ///
    /// Construction fails when that attempt fails; an http 204 response is
    /// fatal ([`Error::is_fatal`]) and means the server forbids retrying.
    pub async fn connect<C: SseConnector>(self, connector: C) -> Result<EventSource<C>, Error> {
        let Self {
            url,
            mut headers,
            retry,
            mut last_event_id,
            store,
            shutdown,
        } = self;

        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        if last_event_id.is_none()
            && let Some(store) = store.as_ref()
        {
            last_event_id = store.load().map_err(Error::store)?.map(SmolStr::from);
        }

        let mut client = EventSource {
            connector,
            request: SseRequest { url, headers },
            conn: None,
            last_event_id,
            retry,
            shutdown,
            store,
            terminated: false,
        };
        let stream = client.connect_once().await?;
        client.conn = Some(stream);
        Ok(client)
    }
}

/// SSE / EventSource client: a pull-based, infinite sequence of [`Event`]s.
///
/// The client owns its HTTP collaborator exclusively and reconnects
/// transparently when the stream drops: it sleeps the current retry
/// interval, reissues the request with `Last-Event-ID` set to the last
/// observed id, and resumes from a fresh parse buffer (a message truncated
/// by a disconnect is lost, never resumed mid-message). Reconnects are
/// silent; only the fatal http 204, connect failures and parse failures
/// surface from [`Self::next_event`].
///
/// The client is driven entirely by the caller: nothing happens between
/// pulls, and it must not be shared across concurrent callers.
///
/// When a [`LastEventIdFile`] is configured the current id is persisted on
/// drop, whatever the exit path; [`Self::close`] is the explicit, fallible
/// variant.
pub struct EventSource<C: SseConnector> {
    connector: C,
    request: SseRequest,
    conn: Option<EventStream<C::Body>>,
    last_event_id: Option<SmolStr>,
    retry: Duration,
    shutdown: CancellationToken,
    store: Option<LastEventIdFile>,
    terminated: bool,
}

impl<C: SseConnector> EventSource<C> {
    /// Last event id observed across the whole session, if any.
    ///
    /// Persists across reconnects and is never cleared automatically.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Current reconnection delay.
    pub fn retry(&self) -> Duration {
        self.retry
    }

    /// Pull the next event, reconnecting as needed.
    ///
    /// Suspends while waiting for bytes and during the backoff sleep between
    /// a disconnect and the next attempt. Any returned error terminates the
    /// sequence: subsequent calls report a closed error.
    pub async fn next_event(&mut self) -> Result<Event, Error> {
        if self.terminated {
            return Err(Error::closed());
        }
        let shutdown = self.shutdown.clone();
        loop {
            let Some(stream) = self.conn.as_mut() else {
                let cancelled = tokio::select! {
                    _ = shutdown.cancelled() => true,
                    _ = tokio::time::sleep(self.retry) => false,
                };
                if cancelled {
                    return Err(self.terminate(Error::cancelled()));
                }
                match self.connect_once().await {
                    Ok(stream) => self.conn = Some(stream),
                    Err(err) => return Err(self.terminate(err)),
                }
                continue;
            };

            let pulled = tokio::select! {
                _ = shutdown.cancelled() => None,
                next = stream.next() => Some(next),
            };
            let Some(next) = pulled else {
                return Err(self.terminate(Error::cancelled()));
            };

            match next {
                Some(Ok(event)) => {
                    if let Some(id) = event.id() {
                        self.last_event_id = Some(SmolStr::new(id));
                    }
                    if let Some(retry) = event.retry()
                        && !retry.is_zero()
                    {
                        tracing::trace!("server overrode retry interval: {retry:?}");
                        self.retry = retry;
                    }
                    return Ok(event);
                }
                Some(Err(StreamError::Transport(err))) => {
                    tracing::debug!("sse read failed, treating as disconnect: {err}");
                    self.conn = None;
                }
                Some(Err(StreamError::Parse(err))) => {
                    return Err(self.terminate(Error::parse(err)));
                }
                None => {
                    tracing::debug!("sse stream ended, reconnecting in {:?}", self.retry);
                    self.conn = None;
                }
            }
        }
    }

    /// Adapt the client into a stream of events, ending after the first
    /// error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Event, Error>> {
        futures_util::stream::unfold(Some(self), |state| async move {
            let mut client = state?;
            match client.next_event().await {
                Ok(event) => Some((Ok(event), Some(client))),
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    /// Persist the last seen id (when a store is configured) and drop the
    /// connection. Disarms the store: dropping the client afterwards will
    /// not write again.
    pub fn close(mut self) -> Result<(), Error> {
        if let Some(store) = self.store.take()
            && let Some(id) = self.last_event_id.as_deref()
        {
            store.store(id).map_err(Error::store)?;
        }
        Ok(())
    }

    /// Issue one connection attempt, with `Last-Event-ID` set when a
    /// non-empty id is known.
    async fn connect_once(&mut self) -> Result<EventStream<C::Body>, Error> {
        let mut req = self.request.clone();
        if let Some(id) = self.last_event_id.as_deref() {
            match HeaderValue::from_str(id) {
                Ok(value) => {
                    req.headers.insert(LAST_EVENT_ID, value);
                }
                Err(_) => {
                    tracing::debug!("last event id is not a valid header value, omitting");
                }
            }
        }
        let SseConnection { status, body } =
            self.connector.connect(&req).await.map_err(Error::connect)?;
        if status == StatusCode::NO_CONTENT {
            tracing::debug!("server answered http 204: retries refused");
            return Err(Error::server_refused_retry());
        }
        tracing::debug!(status = status.as_u16(), "sse stream connected");
        Ok(EventStream::new(body))
    }

    fn terminate(&mut self, err: Error) -> Error {
        self.terminated = true;
        err
    }
}

impl<C: SseConnector> fmt::Debug for EventSource<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSource")
            .field("url", &self.request.url)
            .field("last_event_id", &self.last_event_id)
            .field("retry", &self.retry)
            .field("connected", &self.conn.is_some())
            .field("terminated", &self.terminated)
            .finish_non_exhaustive()
    }
}

impl<C: SseConnector> Drop for EventSource<C> {
    fn drop(&mut self) {
        if let Some(store) = self.store.take()
            && let Some(id) = self.last_event_id.as_deref()
            && let Err(err) = store.store(id)
        {
            tracing::debug!("failed to persist last event id on drop: {err}");
        }
    }
}
