//! MailProcessor - delivers queued messages for the dispatch worker
//!
//! Renders each `Message` through its template, resolves the sender, and
//! hands the result to a `MailTransport`. Implements
//! `background_worker::JobProcessor` so it can be plugged into a `Dispatcher`.

use crate::error::MailError;
use crate::models::{Message, RenderedMail};
use crate::provider::{MailTransport, SendReceipt};
use crate::templates::MailTemplates;
use async_trait::async_trait;
use background_worker::JobProcessor;
use std::sync::Arc;
use tracing::{debug, info};

/// Default sender, used when a message does not set its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub address: String,
    pub name: String,
}

impl Default for Sender {
    fn default() -> Self {
        Self {
            address: "info@mycompany.com".to_string(),
            name: "Info".to_string(),
        }
    }
}

/// Mail processor that renders and sends messages through a transport
pub struct MailProcessor<T: MailTransport> {
    transport: Arc<T>,
    templates: Arc<MailTemplates>,
    sender: Sender,
}

impl<T: MailTransport> MailProcessor<T> {
    /// Create a new MailProcessor
    pub fn new(transport: Arc<T>, templates: Arc<MailTemplates>) -> Self {
        Self {
            transport,
            templates,
            sender: Sender::default(),
        }
    }

    /// Create with explicit from address
    pub fn with_sender(mut self, sender: Sender) -> Self {
        self.sender = sender;
        self
    }

    /// Render a message into a sendable mail
    pub fn render(&self, message: &Message) -> Result<RenderedMail, MailError> {
        let bodies = self
            .templates
            .render(message.template_name(), message.data())?;

        let from_address = message
            .from_address()
            .filter(|a| !a.is_empty())
            .unwrap_or(&self.sender.address);
        let from_name = message
            .from_name()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.sender.name);

        Ok(RenderedMail {
            from_address: from_address.to_string(),
            from_name: from_name.to_string(),
            subject: message.subject().to_string(),
            html: bodies.html,
            plain: bodies.plain,
        })
    }

    /// Render and send one message
    pub async fn deliver(&self, message: &Message) -> Result<SendReceipt, MailError> {
        let mail = self.render(message)?;
        debug!(
            message_id = %message.id(),
            template = %message.template_name(),
            attachments = message.attachments().count(),
            "Rendered message"
        );

        let receipt = self.transport.send(message, &mail).await?;
        info!(
            message_id = %message.id(),
            to = %message.to(),
            transport = self.transport.name(),
            receipt = %receipt.message_id,
            "Message delivered"
        );
        Ok(receipt)
    }
}

#[async_trait]
impl<T: MailTransport> JobProcessor<Message> for MailProcessor<T> {
    type Error = MailError;

    async fn process(&self, job: &Message) -> Result<(), MailError> {
        self.deliver(job).await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "mailer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;
    use crate::provider::MockTransport;

    fn processor(transport: MockTransport) -> (MailProcessor<MockTransport>, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let templates = Arc::new(MailTemplates::new().unwrap());
        (MailProcessor::new(Arc::clone(&transport), templates), transport)
    }

    #[test]
    fn test_render_uses_default_sender() {
        let (processor, _) = processor(MockTransport::new());
        let message = Message::new("ann@example.com", "Failed login attempt.")
            .with_data("Invalid login attempt.");

        let mail = processor.render(&message).unwrap();
        assert_eq!(mail.from_address, "info@mycompany.com");
        assert_eq!(mail.from_name, "Info");
        assert_eq!(mail.subject, "Failed login attempt.");
        assert!(mail.plain.contains("Invalid login attempt."));
    }

    #[test]
    fn test_render_honours_message_sender() {
        let (processor, _) = processor(MockTransport::new());
        let processor = processor.with_sender(Sender {
            address: "noreply@members.test".to_string(),
            name: "Members".to_string(),
        });

        let own = Message::new("ann@example.com", "Hi").with_from("billing@members.test", "Billing");
        let mail = processor.render(&own).unwrap();
        assert_eq!(mail.from_address, "billing@members.test");
        assert_eq!(mail.from_name, "Billing");

        let default = processor
            .render(&Message::new("ann@example.com", "Hi"))
            .unwrap();
        assert_eq!(default.from_address, "noreply@members.test");
    }

    #[tokio::test]
    async fn test_process_sends_through_transport() {
        let (processor, transport) = processor(MockTransport::new());
        let message = Message::new("ann@example.com", "Your Invoice")
            .with_template("invoice")
            .with_data("$10.00");

        processor.process(&message).await.unwrap();

        let sent = transport.sent().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].mail.html.contains("$10.00"));
    }

    #[tokio::test]
    async fn test_unknown_template_never_reaches_transport() {
        let (processor, transport) = processor(MockTransport::new());
        let message = Message::new("ann@example.com", "Hello").with_template("missing");

        let err = processor.process(&message).await.unwrap_err();
        assert!(matches!(err, MailError::Template(TemplateError::NotFound { .. })));
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_is_returned_once() {
        let (processor, transport) = processor(MockTransport::failing("connection refused"));
        let message = Message::new("ann@example.com", "Your Manual").with_template("manual");

        let err = processor.process(&message).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(transport.attempts(), 1);
    }
}
