//! Signed session cookies.
//!
//! Tokens are compact HS256 JWTs (`header.payload.signature`, base64url
//! without padding) carrying the username and an expiry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::errors::{TierError, TierResult};

type HmacSha256 = Hmac<Sha256>;

/// Compact `header.payload.signature` string stored in the cookie.
pub type SessionToken = String;

/// Longest accepted session lifetime, in days.
pub const MAX_SESSION_DAYS: u32 = 3650;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct SessionSigner {
    key: Vec<u8>,
    lifetime: Duration,
}

impl std::fmt::Debug for SessionSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSigner")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl SessionSigner {
    pub fn new(key: &str, lifetime_days: u32) -> TierResult<Self> {
        if key.is_empty() {
            return Err(TierError::config("session key must not be empty"));
        }
        if lifetime_days == 0 || lifetime_days > MAX_SESSION_DAYS {
            return Err(TierError::config(format!(
                "session lifetime must be 1..={MAX_SESSION_DAYS} days, got {lifetime_days}"
            )));
        }
        Ok(Self {
            key: key.as_bytes().to_vec(),
            lifetime: Duration::days(i64::from(lifetime_days)),
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    fn mac(&self) -> TierResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| TierError::auth(e.to_string()))
    }

    pub fn issue(&self, username: &str, now: DateTime<Utc>) -> TierResult<SessionToken> {
        let expires = now
            .checked_add_signed(self.lifetime)
            .ok_or_else(|| TierError::config("session expiry is out of range"))?;
        let claims = SessionClaims {
            username: username.to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };
        let header = serde_json::json!({ "alg": "HS256", "typ": "JWT" });

        let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{header_b64}.{payload_b64}");

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{signing_input}.{sig_b64}"))
    }

    /// Claims of a well-formed, correctly signed, unexpired token.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Option<SessionClaims> {
        let mut parts = token.split('.');
        let header_b64 = parts.next()?;
        let payload_b64 = parts.next()?;
        let sig_b64 = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        let header: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(header_b64).ok()?).ok()?;
        if header.get("alg").and_then(|v| v.as_str()) != Some("HS256") {
            return None;
        }

        let sig = URL_SAFE_NO_PAD.decode(sig_b64).ok()?;
        let mut mac = self.mac().ok()?;
        mac.update(format!("{header_b64}.{payload_b64}").as_bytes());
        mac.verify_slice(&sig).ok()?;

        let claims: SessionClaims =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload_b64).ok()?).ok()?;
        if now.timestamp() >= claims.exp {
            return None;
        }
        Some(claims)
    }
}
