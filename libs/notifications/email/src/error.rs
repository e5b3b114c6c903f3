//! Error types for mail rendering and delivery.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while registering or rendering mail templates.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("mail template '{name}' is not registered")]
    NotFound { name: String },

    #[error("failed to register mail template '{name}': {source}")]
    Register {
        name: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("failed to render mail template '{name}': {source}")]
    Render {
        name: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },

    #[error("failed to read template directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures while handing a rendered message to a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid transport configuration: {0}")]
    Config(String),

    #[error("invalid address '{address}': {details}")]
    Address { address: String, details: String },

    #[error("failed to read attachment '{name}' at {path}: {source}")]
    Attachment {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),

    #[error("transport rejected message: {0}")]
    Rejected(String),
}

/// Why the mail processor could not deliver a message.
#[derive(Error, Debug)]
pub enum MailError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
