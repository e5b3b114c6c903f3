//! Process-wide handle to the background machinery.
//!
//! Built once at startup and cloned into every request handler.

use std::sync::Arc;

use background_worker::{
    BackgroundError, Dispatcher, ErrorObserver, ErrorSink, LogObserver, MetricsObserver,
    ShutdownSequence, ShutdownState, ShutdownSummary, TaskSupervisor,
};
use domain_membership::{
    ActivationSigner, InMemorySubscriptionStore, ManualRenderer, SubscriptionStore,
    TemplateManualRenderer,
};
use email::{MailProcessor, MailTemplates, MailTransport, Message};
use eyre::{Result, WrapErr};
use tracing::info;

use crate::config::AppConfig;

/// Name of the outgoing mail queue in logs and metrics
pub const MAIL_QUEUE: &str = "mail";

struct Inner {
    config: AppConfig,
    supervisor: TaskSupervisor,
    mailer: Dispatcher<Message>,
    errors: ErrorSink,
    store: Arc<dyn SubscriptionStore>,
    renderer: Arc<dyn ManualRenderer>,
    signer: ActivationSigner,
    shutdown: ShutdownSequence,
}

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<Inner>,
}

impl AppContext {
    pub fn builder(config: AppConfig) -> AppContextBuilder {
        AppContextBuilder::new(config)
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.inner.supervisor
    }

    pub fn mailer(&self) -> &Dispatcher<Message> {
        &self.inner.mailer
    }

    pub fn errors(&self) -> &ErrorSink {
        &self.inner.errors
    }

    pub fn store(&self) -> &Arc<dyn SubscriptionStore> {
        &self.inner.store
    }

    pub fn renderer(&self) -> &Arc<dyn ManualRenderer> {
        &self.inner.renderer
    }

    pub fn signer(&self) -> &ActivationSigner {
        &self.inner.signer
    }

    pub fn shutdown_state(&self) -> ShutdownState {
        self.inner.shutdown.state()
    }

    /// Drain tracked tasks, then stop the mailer and the error sink.
    ///
    /// Only the first caller gets the summary.
    pub async fn shutdown(&self) -> Result<Option<ShutdownSummary>, BackgroundError> {
        self.inner.shutdown.shutdown().await
    }

    /// Block until SIGINT/SIGTERM, then shut down.
    pub async fn shutdown_on_signal(&self) -> Result<Option<ShutdownSummary>, BackgroundError> {
        self.inner.shutdown.shutdown_on_signal().await
    }
}

/// Assembles an [`AppContext`], with overridable collaborators for tests.
pub struct AppContextBuilder {
    config: AppConfig,
    store: Option<Arc<dyn SubscriptionStore>>,
    renderer: Option<Arc<dyn ManualRenderer>>,
    observers: Vec<Arc<dyn ErrorObserver>>,
}

impl AppContextBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            store: None,
            renderer: None,
            observers: Vec::new(),
        }
    }

    pub fn store(mut self, store: Arc<dyn SubscriptionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn ManualRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Extra error observer, in addition to the log and metrics ones.
    pub fn observer(mut self, observer: Arc<dyn ErrorObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Start the mail and error workers and return the context.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build<T: MailTransport>(self, transport: Arc<T>) -> Result<AppContext> {
        let Self {
            config,
            store,
            renderer,
            observers,
        } = self;

        let mut templates = MailTemplates::new().wrap_err("Failed to load built-in mail templates")?;
        if let Some(dir) = &config.mail.template_dir {
            let loaded = templates
                .load_dir(dir)
                .wrap_err_with(|| format!("Failed to load mail templates from {}", dir.display()))?;
            info!(dir = %dir.display(), templates = ?loaded, "Loaded mail template overrides");
        }

        let store = store.unwrap_or_else(|| Arc::new(InMemorySubscriptionStore::with_default_plans()));
        let renderer = renderer.unwrap_or_else(|| {
            Arc::new(
                TemplateManualRenderer::new(config.manual.template.clone())
                    .with_delay(config.manual.render_delay),
            )
        });
        let signer = ActivationSigner::new(config.activation.secret.as_str(), config.activation.base_url.as_str())
            .with_ttl_secs(config.activation.ttl_secs);

        let supervisor = TaskSupervisor::new(config.background.concurrency_limit());

        let mut all_observers: Vec<Arc<dyn ErrorObserver>> =
            vec![Arc::new(LogObserver), Arc::new(MetricsObserver)];
        all_observers.extend(observers);
        let (errors, error_queue) = ErrorSink::new();
        let error_handle = error_queue.spawn(all_observers);

        let processor = MailProcessor::new(transport, Arc::new(templates))
            .with_sender(config.mail.sender.clone());
        let (mailer, mail_queue) = Dispatcher::new(MAIL_QUEUE, config.background.queue_capacity);
        let mail_handle = mail_queue.spawn(Arc::new(processor), errors.clone());

        let shutdown = ShutdownSequence::new(supervisor.clone(), mail_handle, error_handle);

        info!(
            queue_capacity = config.background.queue_capacity,
            max_concurrent_tasks = config.background.max_concurrent_tasks,
            manual_paths = %config.manual.path_strategy,
            "Background workers started"
        );

        Ok(AppContext {
            inner: Arc::new(Inner {
                config,
                supervisor,
                mailer,
                errors,
                store,
                renderer,
                signer,
                shutdown,
            }),
        })
    }
}
