//! Admission review mutation pipeline.
//!
//! `mutate` turns a request body into a ready-to-send response body, so the
//! HTTP handler does no JSON work of its own and tests need no server.

use tracing::{debug, info};

use super::envelope::{self, Decoded};
use super::error::Result;
use super::patch::build_patch;

/// Hooks fired around each mutation
pub trait MutationObserver: Send + Sync {
    /// Called with the raw request body before decoding
    fn received(&self, body: &[u8]);

    /// Called with the response body after a successful mutation
    fn returned(&self, response: &[u8]);
}

/// Observer that discards every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl MutationObserver for NoopObserver {
    fn received(&self, _body: &[u8]) {}

    fn returned(&self, _response: &[u8]) {}
}

/// Observer that logs through `tracing`.
///
/// Payloads are only logged when `verbose` is set; they contain the whole Pod.
#[derive(Clone, Copy, Debug)]
pub struct TracingObserver {
    verbose: bool,
}

impl TracingObserver {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl MutationObserver for TracingObserver {
    fn received(&self, body: &[u8]) {
        if self.verbose {
            info!(body = %String::from_utf8_lossy(body), "recv");
        } else {
            debug!(bytes = body.len(), "Admission review received");
        }
    }

    fn returned(&self, response: &[u8]) {
        if self.verbose {
            info!(body = %String::from_utf8_lossy(response), "resp");
        } else {
            debug!(bytes = response.len(), "Admission review returned");
        }
    }
}

/// Mutate an admission review request body.
///
/// Returns the encoded response, or an empty body when the envelope carries
/// no request. Any decode or encode failure aborts without a response.
pub fn mutate(body: &[u8], observer: &dyn MutationObserver) -> Result<Vec<u8>> {
    observer.received(body);

    let response = match envelope::decode(body)? {
        Decoded::NoRequestPresent => Vec::new(),
        Decoded::Request(request) => {
            let operation = build_patch(&request.pod);
            envelope::encode(&request.uid, true, &[operation])?
        }
    };

    observer.returned(&response);
    Ok(response)
}
