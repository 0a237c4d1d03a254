//! Bearer-token authentication.
//!
//! Maps an `Authorization: Bearer <token>` header to an owner [`Identity`].
//! Two token shapes are recognized:
//!
//! | Shape | Identity |
//! |-------|----------|
//! | `tk1.<base64url user id>.<expiry unix secs>.<hex hmac-sha256>` | the signed user id |
//! | `anon_<uuid>` | the token itself (anonymous extension install) |
//!
//! Session tokens are signed with `auth.secret`. Password handling lives
//! outside this service; tokens are minted by whatever authenticated the
//! user (or by `threadkeep token issue`).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::Identity;

type HmacSha256 = Hmac<Sha256>;

const SESSION_PREFIX: &str = "tk1";
const ANON_PREFIX: &str = "anon_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing bearer token")]
    Missing,
    #[error("malformed token")]
    Malformed,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("anonymous tokens are disabled")]
    AnonymousDisabled,
    #[error("user id must be non-empty and must not start with \"anon_\"")]
    InvalidUserId,
}

fn signature(secret: &str, payload: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    mac
}

/// Mints a session token for `user_id` valid until `now + ttl_secs`.
pub fn issue_session_token(
    secret: &str,
    user_id: &str,
    ttl_secs: u64,
    now: i64,
) -> Result<String, AuthError> {
    if user_id.trim().is_empty() || user_id.starts_with(ANON_PREFIX) {
        return Err(AuthError::InvalidUserId);
    }
    let expires = now.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX));
    let payload = format!(
        "{}.{}.{}",
        SESSION_PREFIX,
        URL_SAFE_NO_PAD.encode(user_id),
        expires
    );
    let sig = hex::encode(signature(secret, &payload).finalize().into_bytes());
    Ok(format!("{}.{}", payload, sig))
}

fn verify_session_token(secret: &str, token: &str, now: i64) -> Result<Identity, AuthError> {
    let (payload, sig_hex) = token.rsplit_once('.').ok_or(AuthError::Malformed)?;
    let mut parts = payload.split('.');
    let (Some(SESSION_PREFIX), Some(user_b64), Some(expires), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::Malformed);
    };

    let sig = hex::decode(sig_hex).map_err(|_| AuthError::Malformed)?;
    signature(secret, payload)
        .verify_slice(&sig)
        .map_err(|_| AuthError::BadSignature)?;

    let expires: i64 = expires.parse().map_err(|_| AuthError::Malformed)?;
    if expires <= now {
        return Err(AuthError::Expired);
    }

    let user_id = URL_SAFE_NO_PAD
        .decode(user_b64)
        .ok()
        .and_then(|b| String::from_utf8(b).ok())
        .filter(|u| !u.is_empty())
        .ok_or(AuthError::Malformed)?;

    Ok(Identity::new(user_id))
}

fn verify_anonymous_token(config: &AuthConfig, token: &str) -> Result<Identity, AuthError> {
    if !config.allow_anonymous {
        return Err(AuthError::AnonymousDisabled);
    }
    let device = &token[ANON_PREFIX.len()..];
    let device = Uuid::parse_str(device).map_err(|_| AuthError::Malformed)?;
    Ok(Identity::new(format!(
        "{}{}",
        ANON_PREFIX,
        device.hyphenated()
    )))
}

/// Resolves a raw token to its owner identity.
pub fn verify_token(config: &AuthConfig, token: &str, now: i64) -> Result<Identity, AuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::Missing);
    }
    if token.starts_with(ANON_PREFIX) {
        verify_anonymous_token(config, token)
    } else {
        verify_session_token(&config.secret, token, now)
    }
}

/// Resolves the value of an `Authorization` header.
pub fn authenticate_header(
    config: &AuthConfig,
    header: Option<&str>,
    now: i64,
) -> Result<Identity, AuthError> {
    let header = header.ok_or(AuthError::Missing)?;
    let (scheme, token) = header.trim().split_once(' ').ok_or(AuthError::Missing)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::Missing);
    }
    verify_token(config, token, now)
}

/// CLI entry point for `threadkeep token issue`.
pub fn run_issue_token(config: &AuthConfig, user_id: &str, ttl: Option<u64>) -> anyhow::Result<()> {
    let ttl = ttl.unwrap_or(config.token_ttl_secs);
    let token = issue_session_token(&config.secret, user_id, ttl, chrono::Utc::now().timestamp())?;
    println!("{}", token);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AuthConfig {
        AuthConfig {
            secret: "unit-test-secret".to_string(),
            token_ttl_secs: 3600,
            allow_anonymous: true,
        }
    }

    const NOW: i64 = 1_800_000_000;

    #[test]
    fn test_session_token_verifies() {
        let token = issue_session_token("unit-test-secret", "alice@example.com", 60, NOW).unwrap();
        let id = verify_token(&cfg(), &token, NOW + 30).unwrap();
        assert_eq!(id.as_str(), "alice@example.com");
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_session_token("unit-test-secret", "alice", 60, NOW).unwrap();
        assert_eq!(verify_token(&cfg(), &token, NOW + 60), Err(AuthError::Expired));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_session_token("other-secret", "alice", 60, NOW).unwrap();
        assert_eq!(verify_token(&cfg(), &token, NOW), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_tampered_user_rejected() {
        let token = issue_session_token("unit-test-secret", "alice", 60, NOW).unwrap();
        let forged = token.replacen(
            &URL_SAFE_NO_PAD.encode("alice"),
            &URL_SAFE_NO_PAD.encode("mallory"),
            1,
        );
        assert_eq!(verify_token(&cfg(), &forged, NOW), Err(AuthError::BadSignature));
    }

    #[test]
    fn test_anonymous_token() {
        let id = verify_token(&cfg(), "anon_6F9619FF-8B86-D011-B42D-00C04FC964FF", NOW).unwrap();
        assert_eq!(id.as_str(), "anon_6f9619ff-8b86-d011-b42d-00c04fc964ff");
    }

    #[test]
    fn test_anonymous_disabled() {
        let mut config = cfg();
        config.allow_anonymous = false;
        let token = format!("anon_{}", Uuid::new_v4());
        assert_eq!(
            verify_token(&config, &token, NOW),
            Err(AuthError::AnonymousDisabled)
        );
    }

    #[test]
    fn test_anonymous_requires_uuid() {
        assert_eq!(
            verify_token(&cfg(), "anon_device-42", NOW),
            Err(AuthError::Malformed)
        );
    }

    #[test]
    fn test_header_parsing() {
        let token = issue_session_token("unit-test-secret", "bob", 60, NOW).unwrap();
        let header = format!("Bearer {}", token);
        assert_eq!(
            authenticate_header(&cfg(), Some(&header), NOW).unwrap().as_str(),
            "bob"
        );
        assert_eq!(authenticate_header(&cfg(), None, NOW), Err(AuthError::Missing));
        assert_eq!(
            authenticate_header(&cfg(), Some("Basic abc"), NOW),
            Err(AuthError::Missing)
        );
        assert_eq!(
            authenticate_header(&cfg(), Some("Bearer garbage"), NOW),
            Err(AuthError::Malformed)
        );
    }

    #[test]
    fn test_cannot_issue_anonymous_lookalike() {
        assert_eq!(
            issue_session_token("s", "anon_123", 60, NOW),
            Err(AuthError::InvalidUserId)
        );
        assert_eq!(
            issue_session_token("s", " ", 60, NOW),
            Err(AuthError::InvalidUserId)
        );
    }
}
