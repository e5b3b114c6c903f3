//! Membership Domain
//!
//! Users, plans and subscriptions for the members site, plus the pieces the
//! background jobs need from the domain: invoice text, plan manuals and
//! account activation links.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ invoice / manual /   │  ← Work done for a subscription or registration
//! │ activation           │
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐
//! │ SubscriptionStore    │  ← Data access (trait + in-memory implementation)
//! └──────────┬───────────┘
//!            │
//! ┌──────────▼───────────┐
//! │ Models               │  ← User, Plan, NewUser
//! └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_membership::InMemorySubscriptionStore;
//!
//! let store = InMemorySubscriptionStore::with_default_plans();
//! ```

pub mod activation;
pub mod error;
pub mod invoice;
pub mod manual;
pub mod models;
pub mod repository;

// Re-export commonly used types
pub use activation::{ActivationClaims, ActivationSigner};
pub use error::{MembershipError, MembershipResult, RenderError};
pub use invoice::invoice_description;
pub use manual::{ManualDocument, ManualPathStrategy, ManualRenderer, TemplateManualRenderer};
pub use models::{NewUser, Plan, User};
pub use repository::{InMemorySubscriptionStore, SubscriptionStore};
