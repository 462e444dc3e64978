//! mutation-hook-service library crate
//!
//! A Kubernetes mutating admission webhook that rewrites a Pod's
//! `dd.replace/*` annotation templates into per-Pod Datadog autodiscovery
//! annotations.

pub mod config;
pub mod health;
pub mod webhooks;

pub use config::{ConfigError, WebhookConfig};
pub use health::{HealthState, run_health_server};
pub use webhooks::{WebhookError, WebhookState, create_webhook_router, mutate, run_webhook_server};
