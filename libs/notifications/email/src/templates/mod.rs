//! Mail template management with Handlebars
//!
//! Every template comes as a pair, `<name>.html` and `<name>.plain`, rendered
//! with the message payload bound to `message`:
//!
//! ```text
//! {{message}}        HTML-escaped payload
//! {{{message}}}      raw payload (plain-text templates)
//! {{message.field}}  when the payload is an object
//! ```
//!
//! Built-in templates cover `mail`, `invoice`, `manual` and
//! `confirmation-email`. [`MailTemplates::load_dir`] overrides or adds
//! templates from `<name>.html.hbs` / `<name>.plain.hbs` files.

use std::collections::BTreeSet;
use std::path::Path;

use handlebars::Handlebars;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::TemplateError;

const HTML_SUFFIX: &str = ".html.hbs";
const PLAIN_SUFFIX: &str = ".plain.hbs";

/// Rendered bodies for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedBodies {
    pub html: String,
    pub plain: String,
}

/// Registry of HTML/plain template pairs
pub struct MailTemplates {
    handlebars: Handlebars<'static>,
    names: BTreeSet<String>,
}

impl MailTemplates {
    /// Create a registry holding the built-in templates
    pub fn new() -> Result<Self, TemplateError> {
        let mut templates = Self::empty();
        for (name, html, plain) in BUILT_IN {
            templates.register(name, html, plain)?;
        }
        Ok(templates)
    }

    /// Create a registry with no templates at all
    pub fn empty() -> Self {
        Self {
            handlebars: Handlebars::new(),
            names: BTreeSet::new(),
        }
    }

    /// Register (or replace) a template pair
    pub fn register(&mut self, name: &str, html: &str, plain: &str) -> Result<(), TemplateError> {
        self.register_part(name, "html", html)?;
        self.register_part(name, "plain", plain)?;
        self.names.insert(name.to_string());
        Ok(())
    }

    fn register_part(&mut self, name: &str, part: &str, source: &str) -> Result<(), TemplateError> {
        self.handlebars
            .register_template_string(&format!("{name}.{part}"), source)
            .map_err(|e| TemplateError::Register {
                name: name.to_string(),
                source: Box::new(e),
            })
    }

    /// Load `<name>.html.hbs` / `<name>.plain.hbs` pairs from a directory.
    ///
    /// A name only counts when both files exist; a lone half is skipped.
    /// Returns the names that were loaded.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<Vec<String>, TemplateError> {
        let dir = dir.as_ref();
        let io_err = |source| TemplateError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut loaded = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let Some(name) = path
                .file_name()
                .and_then(|f| f.to_str())
                .and_then(|f| f.strip_suffix(HTML_SUFFIX))
            else {
                continue;
            };

            let plain_path = dir.join(format!("{name}{PLAIN_SUFFIX}"));
            if !plain_path.is_file() {
                debug!(template = %name, "Skipping template without a plain-text half");
                continue;
            }

            let html = std::fs::read_to_string(&path).map_err(io_err)?;
            let plain = std::fs::read_to_string(&plain_path).map_err(io_err)?;
            self.register(name, &html, &plain)?;
            loaded.push(name.to_string());
        }

        loaded.sort();
        info!(dir = %dir.display(), templates = ?loaded, "Loaded mail templates");
        Ok(loaded)
    }

    /// Check if a template exists
    pub fn has_template(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// List all registered templates
    pub fn list_templates(&self) -> Vec<&str> {
        self.names.iter().map(String::as_str).collect()
    }

    /// Render a template pair with `data` bound to `message`
    pub fn render(&self, name: &str, data: &Value) -> Result<RenderedBodies, TemplateError> {
        if !self.has_template(name) {
            return Err(TemplateError::NotFound {
                name: name.to_string(),
            });
        }

        let context = json!({ "message": data });
        let render = |part: &str| {
            self.handlebars
                .render(&format!("{name}.{part}"), &context)
                .map_err(|e| TemplateError::Render {
                    name: name.to_string(),
                    source: Box::new(e),
                })
        };

        Ok(RenderedBodies {
            html: render("html")?,
            plain: render("plain")?,
        })
    }
}

const BUILT_IN: [(&str, &str, &str); 4] = [
    (
        "mail",
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <p>{{message}}</p>
</body>
</html>"#,
        "{{{message}}}\n",
    ),
    (
        "invoice",
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <h1 style="color: #2563eb;">Your Invoice</h1>
    <p>Thank you for your subscription.</p>
    <p>Amount charged: <strong>{{message}}</strong></p>
</body>
</html>"#,
        r#"Your Invoice

Thank you for your subscription.

Amount charged: {{{message}}}
"#,
    ),
    (
        "manual",
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <h1 style="color: #2563eb;">Your Manual</h1>
    <p>{{message}}</p>
</body>
</html>"#,
        r#"Your Manual

{{{message}}}
"#,
    ),
    (
        "confirmation-email",
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
</head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
    <h1 style="color: #2563eb;">Activate your account</h1>
    <p>Please confirm your email address by clicking the link below:</p>
    <p><a href="{{message}}" style="color: #2563eb;">Activate account</a></p>
    <p>If you didn't create an account, you can safely ignore this email.</p>
</body>
</html>"#,
        r#"Activate your account

Please confirm your email address by visiting the link below:

{{{message}}}

If you didn't create an account, you can safely ignore this email.
"#,
    ),
];
