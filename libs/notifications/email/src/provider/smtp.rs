//! SMTP mail transport using lettre

use super::{MailTransport, SendReceipt};
use crate::error::TransportError;
use crate::models::{Message, RenderedMail};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Attachment, Mailbox, MultiPart, header::ContentType},
    transport::smtp::{authentication::Credentials, extension::ClientId},
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Connection security for the SMTP session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encryption {
    /// Plain connection (Mailpit/Mailhog)
    #[default]
    None,
    /// STARTTLS upgrade
    Tls,
    /// Implicit TLS from the first byte
    Ssl,
}

impl FromStr for Encryption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "tls" | "starttls" => Ok(Self::Tls),
            "ssl" => Ok(Self::Ssl),
            other => Err(format!("unknown SMTP encryption '{other}', expected none|tls|ssl")),
        }
    }
}

/// SMTP transport configuration
#[derive(Clone)]
pub struct SmtpConfig {
    /// Name announced in EHLO
    pub domain: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub encryption: Encryption,
    pub timeout: Duration,
}

impl Default for SmtpConfig {
    /// Local development relay on localhost:1025 without authentication
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            host: "localhost".to_string(),
            port: 1025,
            username: String::new(),
            password: String::new(),
            encryption: Encryption::None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("domain", &self.domain)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("encryption", &self.encryption)
            .finish()
    }
}

/// SMTP mail transport
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    /// Create a new SMTP transport. No connection is made until the first send.
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let builder = match config.encryption {
            Encryption::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
            }
            Encryption::Tls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| TransportError::Config(e.to_string()))?,
            Encryption::Ssl => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| TransportError::Config(e.to_string()))?,
        };

        let mut builder = builder
            .port(config.port)
            .hello_name(ClientId::Domain(config.domain.clone()))
            .timeout(Some(config.timeout));

        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
        })
    }

    async fn build_message(
        &self,
        message: &Message,
        mail: &RenderedMail,
    ) -> Result<lettre::Message, TransportError> {
        let from = mailbox(Some(&mail.from_name), &mail.from_address)?;
        let to = mailbox(None, message.to())?;

        let mut body = MultiPart::mixed().multipart(MultiPart::alternative_plain_html(
            mail.plain.clone(),
            mail.html.clone(),
        ));

        for (name, path) in message.attachments() {
            let content = tokio::fs::read(path)
                .await
                .map_err(|source| TransportError::Attachment {
                    name: name.to_string(),
                    path: path.to_path_buf(),
                    source,
                })?;
            let content_type = ContentType::parse(content_type_for(path))
                .map_err(|e| TransportError::Build(e.to_string()))?;
            body = body.singlepart(Attachment::new(name.to_string()).body(content, content_type));
        }

        lettre::Message::builder()
            .from(from)
            .to(to)
            .subject(&mail.subject)
            .multipart(body)
            .map_err(|e| TransportError::Build(e.to_string()))
    }
}

fn mailbox(name: Option<&str>, address: &str) -> Result<Mailbox, TransportError> {
    let parsed = address.parse().map_err(|e: lettre::address::AddressError| {
        TransportError::Address {
            address: address.to_string(),
            details: e.to_string(),
        }
    })?;
    let name = name.filter(|n| !n.is_empty()).map(str::to_string);
    Ok(Mailbox::new(name, parsed))
}

/// Content type for an attachment, from its file extension
fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("html" | "htm") => "text/html",
        Some("csv") => "text/csv",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(
        &self,
        message: &Message,
        mail: &RenderedMail,
    ) -> Result<SendReceipt, TransportError> {
        let email = self.build_message(message, mail).await?;

        let response = self
            .transport
            .send(email)
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        // Extract message ID from response
        let message_id = response
            .message()
            .next()
            .map(|s| s.to_string())
            .unwrap_or_else(|| message.id().to_string());

        tracing::info!(
            message_id = %message.id(),
            to = %message.to(),
            subject = %mail.subject,
            "Email sent successfully"
        );

        Ok(SendReceipt { message_id })
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        let reachable = self
            .transport
            .test_connection()
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;
        if reachable {
            Ok(())
        } else {
            Err(TransportError::Smtp("SMTP server did not accept the connection".to_string()))
        }
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
