//! Signed, expiring account activation links.
//!
//! A link looks like `<base>/activate?email=<email>&token=<jwt>`. The token
//! is an HS256 JWT whose subject is the email, so a link cannot be replayed
//! for another address or after it expires.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::{MembershipError, MembershipResult};

/// Default link lifetime (24 hours)
pub const ACTIVATION_TTL_SECS: i64 = 86_400;

/// Activation token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationClaims {
    pub sub: String, // Email being activated
    pub exp: i64,
    pub iat: i64,
}

/// Creates and verifies activation links
#[derive(Clone)]
pub struct ActivationSigner {
    secret: String,
    base_url: String,
    ttl_secs: i64,
}

impl ActivationSigner {
    pub fn new(secret: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttl_secs: ACTIVATION_TTL_SECS,
        }
    }

    pub fn with_ttl_secs(mut self, ttl_secs: i64) -> Self {
        self.ttl_secs = ttl_secs;
        self
    }

    /// Build the link mailed to a newly registered user
    pub fn activation_url(&self, email: &str) -> MembershipResult<String> {
        let token = self.sign(email, self.ttl_secs)?;
        Ok(format!(
            "{}/activate?email={}&token={}",
            self.base_url,
            urlencoding::encode(email),
            token
        ))
    }

    fn sign(&self, email: &str, ttl_secs: i64) -> MembershipResult<String> {
        let now = Utc::now();
        let claims = ActivationClaims {
            sub: email.to_string(),
            exp: (now + Duration::seconds(ttl_secs)).timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| MembershipError::Signing(e.to_string()))
    }

    /// Verify a token for `email`. Returns the activated email.
    pub fn verify(&self, email: &str, token: &str) -> MembershipResult<String> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<ActivationClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| MembershipError::InvalidActivation(e.to_string()))?;

        if !data.claims.sub.eq_ignore_ascii_case(email) {
            return Err(MembershipError::InvalidActivation(
                "token was issued for a different email".to_string(),
            ));
        }
        Ok(data.claims.sub)
    }

    /// Verify the query string (or full URL) of an activation request.
    pub fn verify_query(&self, query: &str) -> MembershipResult<String> {
        let query = query.split_once('?').map_or(query, |(_, q)| q);

        let mut email = None;
        let mut token = None;
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = urlencoding::decode(value)
                .map_err(|e| MembershipError::InvalidActivation(e.to_string()))?;
            match key {
                "email" => email = Some(value.into_owned()),
                "token" => token = Some(value.into_owned()),
                _ => {}
            }
        }

        match (email, token) {
            (Some(email), Some(token)) => self.verify(&email, &token),
            _ => Err(MembershipError::InvalidActivation(
                "missing email or token".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for ActivationSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationSigner")
            .field("base_url", &self.base_url)
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> ActivationSigner {
        ActivationSigner::new("test-secret", "http://localhost:8080/")
    }

    #[test]
    fn test_url_round_trips() {
        let signer = signer();
        let url = signer.activation_url("ann+news@example.com").unwrap();

        assert!(url.starts_with("http://localhost:8080/activate?email=ann%2Bnews%40example.com&token="));
        assert_eq!(signer.verify_query(&url).unwrap(), "ann+news@example.com");
    }

    #[test]
    fn test_tampered_email_rejected() {
        let signer = signer();
        let url = signer.activation_url("ann@example.com").unwrap();
        let forged = url.replace("ann%40example.com", "eve%40example.com");

        assert!(matches!(
            signer.verify_query(&forged),
            Err(MembershipError::InvalidActivation(_))
        ));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let url = signer().activation_url("ann@example.com").unwrap();
        let other = ActivationSigner::new("other-secret", "http://localhost:8080");
        assert!(other.verify_query(&url).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let signer = signer();
        let token = signer.sign("ann@example.com", -60).unwrap();
        assert!(signer.verify("ann@example.com", &token).is_err());
    }

    #[test]
    fn test_missing_token_rejected() {
        assert!(signer().verify_query("email=ann%40example.com").is_err());
    }
}
