//! Mail transport implementations

pub mod mock;
pub mod smtp;

pub use mock::{MockTransport, SentMail};
pub use smtp::{Encryption, SmtpConfig, SmtpTransport};

use crate::error::TransportError;
use crate::models::{Message, RenderedMail};
use async_trait::async_trait;

/// Result of handing a message to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Transport-specific message ID
    pub message_id: String,
}

/// Capability that actually delivers a rendered message
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    /// Deliver one message. Called once per message; never retried.
    async fn send(&self, message: &Message, mail: &RenderedMail)
    -> Result<SendReceipt, TransportError>;

    /// Check if the transport can reach its backend
    async fn health_check(&self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Get transport name
    fn name(&self) -> &'static str;
}
