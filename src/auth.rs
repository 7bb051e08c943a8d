use std::collections::HashSet;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

/// AccessClaims
///
/// The claims the backend embeds in its access tokens. The gate does not make
/// authorization decisions from these (the identity endpoint is authoritative); it
/// reads them to size the `access` cookie and to annotate log lines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the backend user's primary key. Numeric or string depending on the
    /// backend's user model, so it is kept as raw JSON.
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    /// Expiration Time (exp): seconds since the Unix epoch.
    #[serde(default)]
    pub exp: Option<i64>,
}

impl AccessClaims {
    /// The subject rendered for logging.
    pub fn subject(&self) -> Option<String> {
        self.user_id.as_ref().map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Seconds until the token expires, or `None` if it carries no expiry or is
    /// already expired.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        let remaining = self.exp? - now.timestamp();
        (remaining > 0).then_some(remaining)
    }
}

/// ClaimsError
///
/// Reasons the claims of an access token could not be read.
#[derive(Debug, PartialEq, Eq)]
pub enum ClaimsError {
    Expired,
    BadSignature,
    Malformed,
}

/// read_claims
///
/// Decodes the claims of an access token.
///
/// *Mechanism*: with a signing secret the HS256 signature and the expiry are both
/// verified. Without one the claims are read as-is (no signature or expiry check);
/// this is only used for cookie sizing and logging, never for access decisions.
pub fn read_claims(token: &str, secret: Option<&str>) -> Result<AccessClaims, ClaimsError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;

    let key = match secret {
        Some(secret) => {
            validation.validate_exp = true;
            DecodingKey::from_secret(secret.as_bytes())
        }
        None => {
            validation.insecure_disable_signature_validation();
            validation.validate_exp = false;
            validation.required_spec_claims = HashSet::new();
            DecodingKey::from_secret(&[])
        }
    };

    match decode::<AccessClaims>(token, &key, &validation) {
        Ok(data) => Ok(data.claims),
        Err(e) => match e.kind() {
            ErrorKind::ExpiredSignature => Err(ClaimsError::Expired),
            ErrorKind::InvalidSignature => Err(ClaimsError::BadSignature),
            _ => Err(ClaimsError::Malformed),
        },
    }
}
