//! Error types for the HTTP client, the JSON-RPC client and the escaping
//! helpers.
//!
//! # Design
//! Three failure families stay distinct so a JSON-RPC caller can branch on
//! them: the call reached the server and it answered with an `error`
//! envelope (`RpcError::Remote`), the server refused the call at the HTTP
//! level (`RpcError::Http`), or the request never completed
//! (`RpcError::Fetch`). Transport failures are wrapped, never reinterpreted.

use thiserror::Error;

/// Boxed error produced by a transport agent.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by `HttpClient::fetch` and the transport agents.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request URL (or a redirect target) could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Connection, DNS, proxy or protocol failure reported by the agent.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// Writing the request body to the transport failed.
    #[error("request body write failed: {0}")]
    Io(#[from] std::io::Error),

    /// The agent dropped the body receiver without signalling end of stream.
    #[error("response body was abandoned before completion")]
    BodyAbandoned,

    /// More redirect hops were needed than the client allows.
    #[error("too many redirects (max {max}) while fetching {url}")]
    TooManyRedirects { max: usize, url: String },
}

impl FetchError {
    pub fn transport<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        FetchError::Transport(err.into())
    }
}

/// Errors returned by `JsonRpc` calls.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The server executed the call and answered with an `error` envelope.
    #[error("{message}")]
    Remote { message: String },

    /// The server answered with a status other than 200. `message` is the
    /// response's status phrase.
    #[error("HTTP {code}: {message}")]
    Http { code: u16, message: String },

    /// The HTTP round-trip itself failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The request envelope could not be serialized.
    #[error("failed to encode rpc request: {0}")]
    Encode(#[source] serde_json::Error),

    /// The response body was not a JSON-RPC envelope.
    #[error("failed to decode rpc response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl RpcError {
    pub fn is_remote(&self) -> bool {
        matches!(self, RpcError::Remote { .. })
    }

    pub fn is_http(&self) -> bool {
        matches!(self, RpcError::Http { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, RpcError::Fetch(_))
    }
}

/// Errors returned by the strict decoding helpers in `escape`.
#[derive(Debug, Error)]
pub enum EscapeError {
    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}
