//! Mock mail transport for testing

use super::{MailTransport, SendReceipt};
use crate::error::TransportError;
use crate::models::{Message, RenderedMail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

type FailPredicate = Box<dyn Fn(&Message) -> bool + Send + Sync>;

/// A message the mock accepted, with what it was rendered to
#[derive(Debug, Clone)]
pub struct SentMail {
    pub message: Message,
    pub mail: RenderedMail,
}

/// Mock transport that captures sent mail
pub struct MockTransport {
    sent: Mutex<Vec<SentMail>>,
    attempts: AtomicUsize,
    fail_when: Option<FailPredicate>,
    failure_message: String,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_when: None,
            failure_message: "mock failure".to_string(),
        }
    }

    /// Create a mock transport that always fails
    pub fn failing(message: impl Into<String>) -> Self {
        Self::new().fail_when(|_| true, message)
    }

    /// Fail only the messages matching `predicate`
    pub fn fail_when<F>(mut self, predicate: F, message: impl Into<String>) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Box::new(predicate));
        self.failure_message = message.into();
        self
    }

    /// Get all delivered mail
    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().await.clone()
    }

    /// Get the count of delivered mail
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Every call to `send`, including failed ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Check if a message was delivered to a specific address
    pub async fn was_sent_to(&self, address: &str) -> bool {
        self.sent
            .lock()
            .await
            .iter()
            .any(|s| s.message.to() == address)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(
        &self,
        message: &Message,
        mail: &RenderedMail,
    ) -> Result<SendReceipt, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail_when.as_ref().is_some_and(|fail| fail(message)) {
            return Err(TransportError::Rejected(self.failure_message.clone()));
        }

        self.sent.lock().await.push(SentMail {
            message: message.clone(),
            mail: mail.clone(),
        });

        Ok(SendReceipt {
            message_id: format!("mock-{}", message.id()),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered() -> RenderedMail {
        RenderedMail {
            from_address: "info@mycompany.com".to_string(),
            from_name: "Info".to_string(),
            subject: "Test Subject".to_string(),
            html: "<p>Test body</p>".to_string(),
            plain: "Test body".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_transport_records_mail() {
        let transport = MockTransport::new();
        let message = Message::new("test@example.com", "Test Subject");

        let receipt = transport.send(&message, &rendered()).await.unwrap();
        assert_eq!(receipt.message_id, format!("mock-{}", message.id()));

        let sent = transport.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message.to(), "test@example.com");
        assert!(transport.was_sent_to("test@example.com").await);
        assert!(!transport.was_sent_to("other@example.com").await);
    }

    #[tokio::test]
    async fn test_mock_transport_fails_selectively() {
        let transport =
            MockTransport::new().fail_when(|m| m.subject() == "Your Manual", "mailbox full");

        let manual = Message::new("ann@example.com", "Your Manual");
        let invoice = Message::new("ann@example.com", "Your Invoice");

        let err = transport.send(&manual, &rendered()).await.unwrap_err();
        assert!(err.to_string().contains("mailbox full"));
        transport.send(&invoice, &rendered()).await.unwrap();

        assert_eq!(transport.attempts(), 2);
        assert_eq!(transport.sent_count().await, 1);
    }
}
