use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MembershipError, MembershipResult};

/// Subscription plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: i64,
    pub name: String,
    /// Price in cents
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(id: i64, name: impl Into<String>, amount_cents: i64) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            amount_cents,
            created_at: now,
            updated_at: now,
        }
    }

    /// Price as `$X.YY`. Negative amounts are rejected.
    pub fn amount_formatted(&self) -> MembershipResult<String> {
        if self.amount_cents < 0 {
            return Err(MembershipError::InvalidAmount {
                plan_id: self.id,
                amount_cents: self.amount_cents,
            });
        }
        Ok(format!(
            "${}.{:02}",
            self.amount_cents / 100,
            self.amount_cents % 100
        ))
    }
}

/// Site member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Set once the activation link has been followed
    pub active: bool,
    pub is_admin: bool,
    /// Current subscription, if any
    pub plan: Option<Plan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Registration input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_formatted() {
        assert_eq!(Plan::new(1, "Bronze", 1000).amount_formatted().unwrap(), "$10.00");
        assert_eq!(Plan::new(2, "Odd", 1999).amount_formatted().unwrap(), "$19.99");
        assert_eq!(Plan::new(3, "Cheap", 5).amount_formatted().unwrap(), "$0.05");
        assert_eq!(Plan::new(4, "Free", 0).amount_formatted().unwrap(), "$0.00");
    }

    #[test]
    fn test_negative_amount_rejected() {
        let err = Plan::new(9, "Broken", -100).amount_formatted().unwrap_err();
        assert!(matches!(
            err,
            MembershipError::InvalidAmount {
                plan_id: 9,
                amount_cents: -100
            }
        ));
    }
}
