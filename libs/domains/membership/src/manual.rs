//! Plan manuals attached to the welcome mail of a subscription.
//!
//! Rendering is blocking work. Callers run it on the blocking pool.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::error::RenderError;
use crate::models::{Plan, User};

/// A rendered manual, ready to be written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualDocument {
    bytes: Vec<u8>,
    recipient: String,
    title: String,
}

impl ManualDocument {
    pub fn new(bytes: Vec<u8>, recipient: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            bytes,
            recipient: recipient.into(),
            title: title.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Name printed on the cover
    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    /// `<plan> User Guide`
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Write the document, creating the parent directory if needed.
    pub fn write_to(&self, path: &Path) -> Result<(), RenderError> {
        let write_err = |source| RenderError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, &self.bytes).map_err(write_err)?;

        debug!(path = %path.display(), bytes = self.bytes.len(), "Wrote manual");
        Ok(())
    }
}

/// Produces the manual for a user's plan. Blocking.
pub trait ManualRenderer: Send + Sync + 'static {
    fn render(&self, user: &User, plan: &Plan) -> Result<ManualDocument, RenderError>;
}

/// Stamps the user's name and plan onto a template document.
#[derive(Debug, Clone)]
pub struct TemplateManualRenderer {
    template: PathBuf,
    delay: Duration,
}

impl TemplateManualRenderer {
    pub fn new(template: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            delay: Duration::ZERO,
        }
    }

    /// Simulated render time, for exercising slow-task shutdown
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl ManualRenderer for TemplateManualRenderer {
    fn render(&self, user: &User, plan: &Plan) -> Result<ManualDocument, RenderError> {
        let mut bytes = std::fs::read(&self.template).map_err(|source| RenderError::Template {
            path: self.template.clone(),
            source,
        })?;

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let recipient = user.full_name();
        let title = format!("{} User Guide", plan.name);
        // Cover text goes after the template body as comment lines.
        bytes.extend_from_slice(format!("\n% {recipient}\n% {title}\n").as_bytes());

        Ok(ManualDocument::new(bytes, recipient, title))
    }
}

/// Where a user's manual is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManualPathStrategy {
    /// `<dir>/<user_id>_manual.pdf`; concurrent subscriptions by the same
    /// user overwrite each other's file
    #[default]
    PerUser,
    /// `<dir>/<user_id>_<uuid>_manual.pdf`
    PerAttempt,
}

impl ManualPathStrategy {
    pub fn path_for(&self, dir: &Path, user_id: i64) -> PathBuf {
        match self {
            ManualPathStrategy::PerUser => dir.join(format!("{user_id}_manual.pdf")),
            ManualPathStrategy::PerAttempt => {
                dir.join(format!("{user_id}_{}_manual.pdf", Uuid::new_v4()))
            }
        }
    }
}

impl FromStr for ManualPathStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "per-user" | "per_user" => Ok(Self::PerUser),
            "per-attempt" | "per_attempt" => Ok(Self::PerAttempt),
            other => Err(format!(
                "unknown manual path strategy '{other}', expected per-user|per-attempt"
            )),
        }
    }
}

impl fmt::Display for ManualPathStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManualPathStrategy::PerUser => write!(f, "per-user"),
            ManualPathStrategy::PerAttempt => write!(f, "per-attempt"),
        }
    }
}
