//! Error types for the admission webhook.
//!
//! Core errors surface to the HTTP boundary as a 500 with the `Display` text
//! in the body. Server lifecycle errors surface to `main`.

use thiserror::Error;

/// Error type for decoding and encoding admission reviews
#[derive(Error, Debug)]
pub enum Error {
    /// Body is not JSON or does not have the admission review shape
    #[error("unmarshaling admission review failed: {0}")]
    EnvelopeDecode(#[source] serde_json::Error),

    /// Embedded object is missing or is not a Pod
    #[error("unable to unmarshal pod object: {0}")]
    PodDecode(String),

    /// Response envelope could not be serialized
    #[error("marshaling admission response failed: {0}")]
    EnvelopeEncode(#[source] serde_json::Error),
}

impl Error {
    /// Short, stable label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::EnvelopeDecode(_) => "envelope_decode",
            Error::PodDecode(_) => "pod_decode",
            Error::EnvelopeEncode(_) => "envelope_encode",
        }
    }
}

/// Result type alias for admission review processing
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    /// TLS certificate or key could not be loaded
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// Listener failed to bind or stopped with an error
    #[error("webhook server on {addr} failed: {source}")]
    Serve {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}
