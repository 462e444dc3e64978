//! Mutating admission webhook.
//!
//! - `envelope`: AdmissionReview request decoding and response encoding
//! - `patch`: JSON Patch construction for the derived annotations
//! - `mutate`: the request-to-response pipeline with injected logging
//! - `server`: axum routes and the TLS listener

pub mod envelope;
pub mod error;
pub mod mutate;
pub mod patch;
mod server;

pub use envelope::{AdmissionRequestEnvelope, AdmissionReviewResponse, Decoded, PodSpecView};
pub use error::{Error, Result, WebhookError};
pub use mutate::{MutationObserver, NoopObserver, TracingObserver, mutate};
pub use patch::{JsonPatchOperation, PatchOp, PatchValue, build_patch, build_patch_at};
pub use server::{MAX_BODY_BYTES, WebhookState, create_webhook_router, run_webhook_server};
