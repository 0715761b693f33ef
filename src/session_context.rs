//! Per-request authentication state.
//!
//! Built from the session cookie for every request and handed to handlers
//! as an extractor; nothing about the session lives in process globals.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderValue};
use chrono::Utc;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

use crate::app_state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    Authenticated { username: String, display_name: String },
    /// Credentials were submitted and did not match.
    Rejected,
    NotSubmitted,
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub status: AuthStatus,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self { status: AuthStatus::NotSubmitted }
    }

    pub fn rejected() -> Self {
        Self { status: AuthStatus::Rejected }
    }

    pub fn authenticated(username: &str, display_name: &str) -> Self {
        Self {
            status: AuthStatus::Authenticated {
                username: username.to_string(),
                display_name: display_name.to_string(),
            },
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.status, AuthStatus::Authenticated { .. })
    }

    pub fn username(&self) -> Option<&str> {
        match &self.status {
            AuthStatus::Authenticated { username, .. } => Some(username),
            _ => None,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match &self.status {
            AuthStatus::Authenticated { display_name, .. } => Some(display_name),
            _ => None,
        }
    }

    /// Resolve the context from a cookie value. Invalid, expired, or
    /// revoked sessions are treated as no session at all.
    pub fn from_token(state: &AppState, token: Option<&str>) -> Self {
        let Some(token) = token else {
            return Self::anonymous();
        };
        let Some(claims) = state.signer.verify(token, Utc::now()) else {
            debug!("ignoring invalid or expired session cookie");
            return Self::anonymous();
        };
        match state.credentials.get(&claims.username) {
            Some(user) => Self::authenticated(&user.username, &user.display_name),
            None => {
                debug!(user = %claims.username, "session for a user no longer on the allow-list");
                Self::anonymous()
            }
        }
    }
}

impl FromRequestParts<Arc<AppState>> for SessionContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = get_cookie(&parts.headers, &state.config.auth.cookie_name);
        Ok(Self::from_token(state, token.as_deref()))
    }
}

pub fn get_cookie(headers: &axum::http::HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(name: &str, token: &str, max_age_secs: i64) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{name}={token}; Path=/; Max-Age={max_age_secs}; HttpOnly; SameSite=Lax"
    ))
    .ok()
}

pub fn clear_cookie(name: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!("{name}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")).ok()
}
