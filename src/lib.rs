//! SSE / EventSource client: streaming parser with transparent reconnect.
//!
//! `evsource` consumes a `text/event-stream` response body and turns it into
//! a pull-based, infinite sequence of [`Event`]s:
//!
//! - [`Event`] is the immutable-after-parse value type for one message,
//!   with [`Event::parse`] as the pure text-to-fields function;
//! - [`EventStream`] frames one connection's byte-chunk stream into events,
//!   for callers that already hold a response body;
//! - [`EventSource`] owns the whole session: it connects through an
//!   [`SseConnector`] collaborator, reconnects transparently when the stream
//!   drops (sleeping the current retry interval, resuming via
//!   `Last-Event-ID`), and optionally persists the last seen id through a
//!   [`LastEventIdFile`].
//!
//! The underlying HTTP machinery is delegated entirely to the
//! [`SseConnector`]; a `reqwest`-backed implementation ships behind the
//! `reqwest` cargo feature.
//!
//! One server instruction is treated as fatal: an http 204 response, which
//! per the eventsource protocol forbids the client from retrying. Every
//! other status is consumed as a stream, and stream drops are recovered
//! silently, without bound.

#![cfg_attr(docsrs, feature(doc_auto_cfg, doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

mod client;
mod connect;
mod error;
mod event;
mod parser;
mod store;
mod stream;

pub use client::{EventSource, EventSourceBuilder};
#[cfg(feature = "reqwest")]
pub use connect::ReqwestConnector;
pub use connect::{SseConnection, SseConnector, SseRequest};
pub use error::{BoxError, Error};
pub use event::{Event, ParseError};
pub use store::LastEventIdFile;
pub use stream::{EventStream, StreamError};
