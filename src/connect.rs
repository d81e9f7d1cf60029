//! The HTTP collaborator seam.
//!
//! Establishing the connection — tls, redirects, pooling, header transport —
//! is the collaborator's business; the client only needs a streaming `GET`
//! with custom headers, the response status code, and a byte-readable body
//! with end-of-stream detection. [`SseConnector`] captures exactly that
//! contract, and `ReqwestConnector` (cargo feature `reqwest`) provides a
//! ready-made implementation.

use bytes::Bytes;
use futures_core::stream::Stream;
use http::{HeaderMap, StatusCode, Uri};

use crate::error::BoxError;

/// A streaming `GET` request, as handed to an [`SseConnector`].
#[derive(Debug, Clone)]
pub struct SseRequest {
    /// Target url of the event stream.
    pub url: Uri,
    /// Request headers, protocol headers already applied.
    pub headers: HeaderMap,
}

/// A live connection produced by an [`SseConnector`].
#[derive(Debug)]
pub struct SseConnection<B> {
    /// Response status code; anything but 204 is streamed.
    pub status: StatusCode,
    /// Response body as an unbounded byte-chunk stream.
    pub body: B,
}

/// Contract for the HTTP client collaborator.
pub trait SseConnector: Send {
    /// Body stream type produced by this connector.
    type Body: Stream<Item = Result<Bytes, BoxError>> + Send + Unpin;

    /// Issue the streaming request and return the live connection.
    ///
    /// Implementations must not buffer the whole response: the body is
    /// unbounded and must be readable chunk by chunk as it arrives.
    fn connect(
        &mut self,
        req: &SseRequest,
    ) -> impl Future<Output = Result<SseConnection<Self::Body>, BoxError>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_connector {
    use bytes::Bytes;
    use futures_util::{StreamExt, TryStreamExt, stream::BoxStream};

    use super::{SseConnection, SseConnector, SseRequest};
    use crate::error::BoxError;

    /// [`SseConnector`] backed by a [`reqwest::Client`].
    #[derive(Debug, Default)]
    pub struct ReqwestConnector {
        client: reqwest::Client,
    }

    impl ReqwestConnector {
        /// Create a connector with a default client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a connector reusing an existing client, connection pool
        /// included.
        #[must_use]
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    impl SseConnector for ReqwestConnector {
        type Body = BoxStream<'static, Result<Bytes, BoxError>>;

        async fn connect(
            &mut self,
            req: &SseRequest,
        ) -> Result<SseConnection<Self::Body>, BoxError> {
            let response = self
                .client
                .get(req.url.to_string())
                .headers(req.headers.clone())
                .send()
                .await?;
            let status = response.status();
            let body = response.bytes_stream().map_err(Into::into).boxed();
            Ok(SseConnection { status, body })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_connector::ReqwestConnector;
