//! Environment-driven configuration for the members server.

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use background_worker::{BackgroundConfig, DEFAULT_QUEUE_CAPACITY};
use domain_membership::ManualPathStrategy;
use domain_membership::activation::ACTIVATION_TTL_SECS;
use email::{Encryption, Sender, SmtpConfig};
use thiserror::Error;

/// Secret used outside production when `ACTIVATION_SECRET` is unset
const DEV_ACTIVATION_SECRET: &str = "dev-activation-secret";

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable '{0}' is required but not set")]
    MissingEnvVar(String),

    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Application environment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env_or_default("APP_ENV", "development");

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Trait for configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Helper to load an environment variable with a default value
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Helper to load an environment variable or return error
pub fn env_required(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Helper to parse an environment variable, using `default` when unset
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
            key: key.to_string(),
            details: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn env_flag(key: &str) -> Result<bool, ConfigError> {
    let raw = env_or_default(key, "false");
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::ParseError {
            key: key.to_string(),
            details: format!("expected a boolean, got '{other}'"),
        }),
    }
}

impl FromEnv for BackgroundConfig {
    /// - MAIL_QUEUE_CAPACITY: defaults to 100
    /// - MAX_CONCURRENT_TASKS: defaults to 0 (unlimited)
    fn from_env() -> Result<Self, ConfigError> {
        Ok(BackgroundConfig::new()
            .with_queue_capacity(env_parse("MAIL_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?)
            .with_max_concurrent_tasks(env_parse("MAX_CONCURRENT_TASKS", 0)?))
    }
}

/// Outgoing mail settings
#[derive(Clone, Debug, Default)]
pub struct MailConfig {
    pub smtp: SmtpConfig,
    pub sender: Sender,
    /// Directory with `<name>.html.hbs` / `<name>.plain.hbs` overrides
    pub template_dir: Option<PathBuf>,
}

impl FromEnv for MailConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = SmtpConfig::default();
        let smtp = SmtpConfig {
            domain: env_or_default("MAIL_DOMAIN", &defaults.domain),
            host: env_or_default("SMTP_HOST", &defaults.host),
            port: env_parse("SMTP_PORT", defaults.port)?,
            username: env_or_default("SMTP_USERNAME", ""),
            password: env_or_default("SMTP_PASSWORD", ""),
            encryption: env_parse("SMTP_ENCRYPTION", Encryption::None)?,
            timeout: defaults.timeout,
        };

        let sender_defaults = Sender::default();
        let sender = Sender {
            address: env_or_default("EMAIL_FROM_ADDRESS", &sender_defaults.address),
            name: env_or_default("EMAIL_FROM_NAME", &sender_defaults.name),
        };

        let template_dir = env::var("MAIL_TEMPLATE_DIR")
            .ok()
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            smtp,
            sender,
            template_dir,
        })
    }
}

/// Plan manual generation settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManualConfig {
    pub template: PathBuf,
    pub output_dir: PathBuf,
    pub path_strategy: ManualPathStrategy,
    pub render_delay: Duration,
    /// Report a synthetic error after every successful manual job
    pub inject_fault: bool,
}

impl Default for ManualConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from("./pdf/manual.pdf"),
            output_dir: PathBuf::from("./tmp"),
            path_strategy: ManualPathStrategy::PerUser,
            render_delay: Duration::ZERO,
            inject_fault: false,
        }
    }
}

impl FromEnv for ManualConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            template: PathBuf::from(env_or_default("MANUAL_TEMPLATE", "./pdf/manual.pdf")),
            output_dir: PathBuf::from(env_or_default("MANUAL_OUTPUT_DIR", "./tmp")),
            path_strategy: env_parse("MANUAL_PATH_STRATEGY", ManualPathStrategy::PerUser)?,
            render_delay: Duration::from_millis(env_parse("MANUAL_RENDER_DELAY_MS", 0u64)?),
            inject_fault: env_flag("INJECT_TASK_FAULT")?,
        })
    }
}

/// Account activation link settings
#[derive(Clone, PartialEq, Eq)]
pub struct ActivationConfig {
    pub base_url: String,
    pub secret: String,
    pub ttl_secs: i64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            secret: DEV_ACTIVATION_SECRET.to_string(),
            ttl_secs: ACTIVATION_TTL_SECS,
        }
    }
}

impl std::fmt::Debug for ActivationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationConfig")
            .field("base_url", &self.base_url)
            .field("secret", &"***")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

impl FromEnv for ActivationConfig {
    /// ACTIVATION_SECRET is required in production
    fn from_env() -> Result<Self, ConfigError> {
        let secret = if Environment::from_env().is_production() {
            env_required("ACTIVATION_SECRET")?
        } else {
            env_or_default("ACTIVATION_SECRET", DEV_ACTIVATION_SECRET)
        };

        Ok(Self {
            base_url: env_or_default("APP_BASE_URL", "http://localhost:8080"),
            secret,
            ttl_secs: env_parse("ACTIVATION_TTL_SECS", ACTIVATION_TTL_SECS)?,
        })
    }
}

/// Everything the server needs at startup
#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub environment: Environment,
    pub background: BackgroundConfig,
    pub mail: MailConfig,
    pub manual: ManualConfig,
    pub activation: ActivationConfig,
}

impl FromEnv for AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            environment: Environment::from_env(),
            background: BackgroundConfig::from_env()?,
            mail: MailConfig::from_env()?,
            manual: ManualConfig::from_env()?,
            activation: ActivationConfig::from_env()?,
        })
    }
}
