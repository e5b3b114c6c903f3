use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("Plan not found: {0}")]
    PlanNotFound(i64),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("No user registered with email '{0}'")]
    UnknownEmail(String),

    #[error("User with email '{0}' already exists")]
    DuplicateEmail(String),

    #[error("Plan {plan_id} has a negative amount ({amount_cents} cents)")]
    InvalidAmount { plan_id: i64, amount_cents: i64 },

    #[error("Invalid or expired activation link: {0}")]
    InvalidActivation(String),

    #[error("Activation signing error: {0}")]
    Signing(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type MembershipResult<T> = Result<T, MembershipError>;

/// Failures while producing or saving a plan manual.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to read manual template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write manual to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("manual renderer failed: {0}")]
    Renderer(String),
}
