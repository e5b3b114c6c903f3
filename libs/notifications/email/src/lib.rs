//! Outgoing mail for the members site
//!
//! This library turns queued `Message`s into delivered mail. It plugs into
//! `background_worker::Dispatcher` as the job processor of the mail queue.
//!
//! ## Components
//!
//! - **Models**: `Message` (the queued job) and `RenderedMail`
//! - **Templates**: Handlebars-based `MailTemplates` with built-in templates
//! - **Transports**: SMTP via lettre, and a `MockTransport` for tests
//! - **Processing**: `MailProcessor` renders and sends one message per job
//!
//! ## Usage
//!
//! ```ignore
//! use background_worker::{Dispatcher, ErrorSink};
//! use email::{MailProcessor, MailTemplates, Message, SmtpConfig, SmtpTransport};
//!
//! let transport = Arc::new(SmtpTransport::new(&SmtpConfig::default())?);
//! let processor = MailProcessor::new(transport, Arc::new(MailTemplates::new()?));
//! let (mailer, queue) = Dispatcher::new("mail", 100);
//! let handle = queue.spawn(Arc::new(processor), errors);
//!
//! mailer.enqueue(Message::new("ann@example.com", "Hello").with_data("Hi!")).await?;
//! ```

pub mod error;
pub mod models;
pub mod processor;
pub mod provider;
pub mod templates;

// Re-export main types
pub use error::{MailError, TemplateError, TransportError};
pub use models::{DEFAULT_TEMPLATE, Message, RenderedMail};
pub use processor::{MailProcessor, Sender};
pub use provider::{
    Encryption, MailTransport, MockTransport, SendReceipt, SentMail, SmtpConfig, SmtpTransport,
};
pub use templates::{MailTemplates, RenderedBodies};
