use std::fmt;

use crate::event::ParseError;

/// Type-erased error, used at the transport seam.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error returned by [`EventSource`](crate::EventSource) operations.
///
/// Three failure families hide behind this type, distinguished through the
/// classification helpers rather than public variants:
///
/// - [`Self::is_fatal`]: the server answered http 204, forbidding further
///   retries — the one non-recoverable protocol condition;
/// - [`Self::is_parse`]: the stream produced a message block that could not
///   be parsed, terminating the sequence;
/// - everything else: connect failures, store i/o, cancellation, or pulling
///   after the sequence already terminated.
///
/// Transient conditions (end-of-stream, mid-read connection resets) never
/// surface here; they are recovered internally by reconnecting.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

#[derive(Debug)]
enum ErrorKind {
    ServerRefusedRetry,
    Connect(BoxError),
    Parse(ParseError),
    Store(std::io::Error),
    Cancelled,
    Closed,
}

impl Error {
    pub(crate) fn server_refused_retry() -> Self {
        Self {
            kind: ErrorKind::ServerRefusedRetry,
        }
    }

    pub(crate) fn connect(err: impl Into<BoxError>) -> Self {
        Self {
            kind: ErrorKind::Connect(err.into()),
        }
    }

    pub(crate) fn parse(err: ParseError) -> Self {
        Self {
            kind: ErrorKind::Parse(err),
        }
    }

    pub(crate) fn store(err: std::io::Error) -> Self {
        Self {
            kind: ErrorKind::Store(err),
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
        }
    }

    pub(crate) fn closed() -> Self {
        Self {
            kind: ErrorKind::Closed,
        }
    }

    /// `true` when the server answered http 204, instructing the client to
    /// stop retrying entirely.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::ServerRefusedRetry)
    }

    /// `true` when a message block failed to parse.
    #[must_use]
    pub fn is_parse(&self) -> bool {
        matches!(self.kind, ErrorKind::Parse(_))
    }

    /// `true` when the cancellation token ended the sequence.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// `true` when pulled again after the sequence already terminated.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, ErrorKind::Closed)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::ServerRefusedRetry => {
                write!(f, "server refused further retries (http 204)")
            }
            ErrorKind::Connect(err) => write!(f, "sse connection attempt failed: {err}"),
            ErrorKind::Parse(err) => write!(f, "sse stream produced an unparseable message: {err}"),
            ErrorKind::Store(err) => write!(f, "last event id store failure: {err}"),
            ErrorKind::Cancelled => write!(f, "sse client cancelled"),
            ErrorKind::Closed => write!(f, "sse event sequence already terminated"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Connect(err) => Some(err.as_ref()),
            ErrorKind::Parse(err) => Some(err),
            ErrorKind::Store(err) => Some(err),
            ErrorKind::ServerRefusedRetry | ErrorKind::Cancelled | ErrorKind::Closed => None,
        }
    }
}
