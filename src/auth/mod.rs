use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::database::StoreError;

/// Claims carried by the session token the hosted auth service issues
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(sub: Uuid, email: Option<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub,
            email,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No active session")]
    MissingToken,

    #[error("Invalid session token: {0}")]
    InvalidToken(String),

    #[error("Session secret is not configured")]
    SecretMissing,

    #[error("No profile for user {0}")]
    ProfileNotFound(Uuid),

    #[error("Invalid profile for user {0}: {1}")]
    InvalidProfile(Uuid, String),

    #[error("Could not load profile: {0}")]
    ProfileLookup(#[from] StoreError),
}

/// Sign a session token. Used by local tooling and tests; production tokens
/// come from the hosted auth service with the same shared secret.
pub fn issue_session_token(claims: &Claims, secret: &str) -> Result<String, SessionError> {
    if secret.is_empty() {
        return Err(SessionError::SecretMissing);
    }
    encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| SessionError::InvalidToken(e.to_string()))
}

/// Verify signature and expiry of a session token
pub fn verify_session_token(token: &str, session: &SessionConfig) -> Result<Claims, SessionError> {
    if session.jwt_secret.is_empty() {
        return Err(SessionError::SecretMissing);
    }
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = session.leeway_secs;
    // Hosted auth tokens carry an audience we do not pin
    validation.validate_aud = false;

    decode::<Claims>(token, &DecodingKey::from_secret(session.jwt_secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| SessionError::InvalidToken(e.to_string()))
}

/// Pick the named cookie out of a `Cookie` header value
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::config::AppConfig;

    fn session_config() -> SessionConfig {
        let mut config = AppConfig::development().session;
        config.jwt_secret = "test-secret".into();
        config.leeway_secs = 0;
        config
    }

    #[test]
    fn issued_token_verifies() {
        let config = session_config();
        let user = Uuid::new_v4();
        let token = issue_session_token(&Claims::new(user, Some("a@b.c".into()), Duration::hours(1)), &config.jwt_secret).unwrap();
        let claims = verify_session_token(&token, &config).unwrap();
        assert_eq!(claims.sub, user);
        assert_eq!(claims.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = session_config();
        let token = issue_session_token(&Claims::new(Uuid::new_v4(), None, Duration::hours(-2)), &config.jwt_secret).unwrap();
        assert_matches!(verify_session_token(&token, &config), Err(SessionError::InvalidToken(_)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let config = session_config();
        let token = issue_session_token(&Claims::new(Uuid::new_v4(), None, Duration::hours(1)), "other").unwrap();
        assert_matches!(verify_session_token(&token, &config), Err(SessionError::InvalidToken(_)));
    }

    #[test]
    fn empty_secret_never_verifies() {
        let mut config = session_config();
        config.jwt_secret.clear();
        assert_matches!(verify_session_token("x.y.z", &config), Err(SessionError::SecretMissing));
    }

    #[test]
    fn reads_named_cookie() {
        let header = "theme=dark; inami-session=abc.def.ghi; other=1";
        assert_eq!(cookie_value(header, "inami-session"), Some("abc.def.ghi"));
        assert_eq!(cookie_value(header, "missing"), None);
        assert_eq!(cookie_value("inami-session=", "inami-session"), None);
    }
}
