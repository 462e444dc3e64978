//! Admission webhook server.
//!
//! Provides HTTP endpoints for the Kubernetes mutating admission webhook.
//!
//! To enable the webhook:
//! 1. Issue a serving certificate for the webhook Service (e.g. cert-manager)
//! 2. Mount the TLS secret at /etc/webhook-secret/
//! 3. Create a MutatingWebhookConfiguration pointing at `/mutate`

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use tracing::{error, info, warn};

use crate::config::WebhookConfig;
use crate::health::{AdmissionOutcome, HealthState};
use crate::webhooks::error::WebhookError;
use crate::webhooks::mutate::{MutationObserver, TracingObserver, mutate};

/// Largest admission review body accepted.
///
/// An UPDATE review carries both `object` and `oldObject`, each of which can
/// approach the 1.5 MiB etcd object limit before JSON expansion.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Shared state for webhook handlers
pub struct WebhookState {
    pub health: Arc<HealthState>,
    observer: Box<dyn MutationObserver>,
    /// Budget for receiving the request body
    request_timeout: Duration,
}

impl WebhookState {
    pub fn new(health: Arc<HealthState>, config: &WebhookConfig) -> Self {
        Self::with_observer(
            health,
            Box::new(TracingObserver::new(config.verbose)),
            config.request_timeout,
        )
    }

    /// Build state around a caller-supplied observer
    pub fn with_observer(
        health: Arc<HealthState>,
        observer: Box<dyn MutationObserver>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            health,
            observer,
            request_timeout,
        }
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/mutate", post(handle_mutate))
        .fallback(handle_root)
        .with_state(state)
}

/// Diagnostic echo of the decoded request path
async fn handle_root(uri: Uri) -> impl IntoResponse {
    let raw = uri.path();
    // Paths that do not decode to UTF-8 are echoed as received
    let path = urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw));
    format!("hello \"{}\"", escape_html(&path))
}

/// Mutate an AdmissionReview and return the patched review
async fn handle_mutate(State(state): State<Arc<WebhookState>>, body: Body) -> Response {
    let started = Instant::now();

    let bytes = match tokio::time::timeout(
        state.request_timeout,
        axum::body::to_bytes(body, MAX_BODY_BYTES),
    )
    .await
    {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            error!(error = %e, "Failed to read admission request body");
            record(&state, AdmissionOutcome::Error, started);
            return send_error(e.to_string());
        }
        Err(_) => {
            warn!(
                timeout_secs = state.request_timeout.as_secs(),
                "Timed out reading admission request body"
            );
            record(&state, AdmissionOutcome::Timeout, started);
            return send_error("timed out reading request body".to_string());
        }
    };

    match mutate(&bytes, state.observer.as_ref()) {
        Ok(mutated) => {
            let outcome = if mutated.is_empty() {
                AdmissionOutcome::NoRequest
            } else {
                AdmissionOutcome::Patched
            };
            info!(outcome = outcome.as_str(), "Returned");
            record(&state, outcome, started);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/json")],
                mutated,
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Admission review failed");
            record(&state, AdmissionOutcome::Error, started);
            send_error(e.to_string())
        }
    }
}

fn send_error(message: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

fn record(state: &WebhookState, outcome: AdmissionOutcome, started: Instant) {
    state
        .health
        .metrics
        .record_admission(outcome, started.elapsed().as_secs_f64());
}

/// Escape the characters HTML treats specially
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Run the webhook server with TLS
///
/// Binds to `config.webhook_addr()` and serves until `handle` is shut down.
/// TLS certificates are loaded from `config.cert_path` and `config.key_path`.
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    config: &WebhookConfig,
    handle: Handle,
) -> Result<(), WebhookError> {
    // A second install attempt only means one is already in place.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let tls = RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
        .await
        .map_err(|e| {
            WebhookError::TlsConfig(format!(
                "{} / {}: {}",
                config.cert_path.display(),
                config.key_path.display(),
                e
            ))
        })?;

    let app = create_webhook_router(state);
    let addr = config.webhook_addr();
    info!(port = addr.port(), "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|source| WebhookError::Serve { addr, source })
}
