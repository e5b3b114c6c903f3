use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use background_worker::DispatchJob;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Template used when a message does not name one.
pub const DEFAULT_TEMPLATE: &str = "mail";

/// One outgoing notification.
///
/// Built with the `with_*` methods and immutable afterwards; the dispatch
/// queue takes ownership on enqueue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    id: String,
    to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from_name: Option<String>,
    subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    template: Option<String>,
    /// Opaque payload, exposed to templates as `message`
    #[serde(default)]
    data: Value,
    /// Display name → file on disk
    #[serde(default)]
    attachments: BTreeMap<String, PathBuf>,
}

impl Message {
    /// Create a message with the required fields
    pub fn new(to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            to: to.into(),
            from: None,
            from_name: None,
            subject: subject.into(),
            template: None,
            data: Value::Null,
            attachments: BTreeMap::new(),
        }
    }

    /// Override the configured sender
    pub fn with_from(mut self, address: impl Into<String>, name: impl Into<String>) -> Self {
        self.from = Some(address.into());
        self.from_name = Some(name.into());
        self
    }

    /// Set template
    pub fn with_template(mut self, name: impl Into<String>) -> Self {
        self.template = Some(name.into());
        self
    }

    /// Set the payload handed to the template
    pub fn with_data(mut self, data: impl Into<Value>) -> Self {
        self.data = data.into();
        self
    }

    /// Attach a file under the given display name
    pub fn with_attachment(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.attachments.insert(name.into(), path.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn from_address(&self) -> Option<&str> {
        self.from.as_deref()
    }

    pub fn from_name(&self) -> Option<&str> {
        self.from_name.as_deref()
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }

    /// Template to render, falling back to [`DEFAULT_TEMPLATE`]
    pub fn template_name(&self) -> &str {
        self.template.as_deref().unwrap_or(DEFAULT_TEMPLATE)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn attachments(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.attachments
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    pub fn attachment(&self, name: &str) -> Option<&Path> {
        self.attachments.get(name).map(PathBuf::as_path)
    }
}

impl DispatchJob for Message {
    fn job_id(&self) -> String {
        self.id.clone()
    }
}

/// A message after its template has been rendered and its sender resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMail {
    pub from_address: String,
    pub from_name: String,
    pub subject: String,
    pub html: String,
    pub plain: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_defaults() {
        let message = Message::new("ann@example.com", "Your Invoice")
            .with_template("invoice")
            .with_data("$10.00");

        assert_eq!(message.to(), "ann@example.com");
        assert_eq!(message.template_name(), "invoice");
        assert_eq!(message.data(), &Value::String("$10.00".to_string()));
        assert!(message.from_address().is_none());
        assert_eq!(message.attachments().count(), 0);
        assert_eq!(message.job_id(), message.id());
    }

    #[test]
    fn test_untemplated_message_uses_mail_template() {
        let message = Message::new("ann@example.com", "Failed login attempt.");
        assert_eq!(message.template(), None);
        assert_eq!(message.template_name(), DEFAULT_TEMPLATE);
    }

    #[test]
    fn test_attachments_keyed_by_display_name() {
        let message = Message::new("ann@example.com", "Your Manual")
            .with_attachment("Manual.pdf", "./tmp/7_manual.pdf");

        assert_eq!(
            message.attachment("Manual.pdf"),
            Some(Path::new("./tmp/7_manual.pdf"))
        );
        assert_eq!(message.attachment("Other.pdf"), None);
    }
}
