//! Members Server
//!
//! Background work for the members site: the mail queue, the error sink and
//! the tracked jobs started by subscriptions and account flows.
//!
//! ## Architecture
//!
//! ```text
//! request handler
//!   ↓ launch_subscription_jobs / send_email (tracked by TaskSupervisor)
//! invoice job ── manual job (spawn_blocking render)
//!   ↓ enqueue (bounded, waits when full)
//! Dispatcher<Message> → MailProcessor → MailTransport (SMTP)
//!   ↓ failures
//! ErrorSink → log / metrics observers
//! ```
//!
//! On SIGINT/SIGTERM the shutdown sequence waits for every tracked job, then
//! stops the mail worker, then the error sink.

pub mod accounts;
pub mod config;
pub mod context;
pub mod jobs;
pub mod subscription;
pub mod telemetry;

pub use accounts::{activate_account, notify_failed_login, register_user};
pub use config::{AppConfig, ConfigError, Environment, FromEnv};
pub use context::{AppContext, AppContextBuilder, MAIL_QUEUE};
pub use jobs::{MANUAL_ATTACHMENT, launch_subscription_jobs, send_email};
pub use subscription::subscribe_to_plan;

use std::sync::Arc;

use background_worker::metrics;
use email::{MailTransport, SmtpTransport};
use eyre::{Result, WrapErr};
use tracing::{info, warn};

/// Run the members server until a termination signal arrives.
///
/// 1. Sets up structured logging (JSON for prod, pretty for dev)
/// 2. Installs the Prometheus recorder
/// 3. Loads configuration and connects the SMTP transport
/// 4. Starts the background workers and waits for SIGINT/SIGTERM
/// 5. Drains tracked jobs and stops the workers in order
pub async fn run() -> Result<()> {
    let environment = Environment::from_env();
    telemetry::init_tracing(&environment);

    metrics::init_metrics();

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting members server"
    );

    let config = AppConfig::from_env().wrap_err("Failed to load configuration")?;
    info!(?config, "Configuration loaded");

    let transport = SmtpTransport::new(&config.mail.smtp).wrap_err("Failed to create SMTP transport")?;
    if let Err(e) = transport.health_check().await {
        warn!(error = %e, host = %config.mail.smtp.host, "SMTP relay not reachable");
    }

    let ctx = AppContext::builder(config)
        .build(Arc::new(transport))
        .wrap_err("Failed to start background workers")?;

    info!("Members server ready, waiting for shutdown signal");

    let summary = ctx
        .shutdown_on_signal()
        .await
        .wrap_err("Shutdown did not complete cleanly")?;

    if let Some(summary) = summary {
        info!(
            delivered = summary.dispatch.delivered,
            failed = summary.dispatch.failed,
            errors_handled = summary.errors_handled,
            "Members server stopped"
        );
    }

    let snapshot = metrics::render_metrics();
    if !snapshot.is_empty() {
        info!(metrics = %snapshot, "Final metrics snapshot");
    }

    Ok(())
}
