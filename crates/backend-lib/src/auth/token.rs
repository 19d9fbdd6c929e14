// ============================
// crates/backend-lib/src/auth/token.rs
// ============================
//! Signed, time-bounded session tokens.
//!
//! A token is two base64url segments joined by a dot:
//! `payload.signature`, where `payload` is the JSON claim set and
//! `signature` is HMAC-SHA256 over the payload segment's bytes. The
//! signature is checked before the payload is parsed.

use crate::config::ConfigError;
use crate::error::{AppError, TokenError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use dashkit_common::{Role, SessionView, Timestamp};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroize;

type HmacSha256 = Hmac<Sha256>;

/// Shortest signing secret accepted at startup
pub const MIN_SECRET_BYTES: usize = 32;

/// Standard session lifetime (1 day)
pub const DEFAULT_LIFETIME_SECS: u64 = 24 * 60 * 60;

/// "Remember me" session lifetime (30 days)
pub const DEFAULT_REMEMBER_ME_LIFETIME_SECS: u64 = 30 * 24 * 60 * 60;

/// Current time as whole seconds since the Unix epoch
pub fn now_timestamp() -> Timestamp {
    Utc::now().timestamp()
}

/// Process-wide HMAC key. Zeroized on drop and never printed.
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(secret: &str) -> Result<Self, ConfigError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::MisconfiguredSigningSecret);
        }
        Ok(Self(secret.as_bytes().to_vec()))
    }

    /// Resolve an optional configured secret; absence is fatal.
    pub fn from_setting(secret: Option<&str>) -> Result<Self, ConfigError> {
        secret
            .ok_or(ConfigError::MisconfiguredSigningSecret)
            .and_then(Self::new)
    }
}

impl Drop for SigningSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Facts asserted by a session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// `UserRecord::id` of the signed-in account
    #[serde(rename = "sub")]
    pub subject_id: String,
    pub role: Role,
    #[serde(rename = "iat")]
    pub issued_at: Timestamp,
    #[serde(rename = "exp")]
    pub expires_at: Timestamp,
}

impl SessionClaims {
    /// Claims valid for `lifetime_secs` starting at `issued_at`
    pub fn new(subject_id: impl Into<String>, role: Role, issued_at: Timestamp, lifetime_secs: u64) -> Self {
        let lifetime = i64::try_from(lifetime_secs).unwrap_or(i64::MAX).max(1);
        Self {
            subject_id: subject_id.into(),
            role,
            issued_at,
            expires_at: issued_at.saturating_add(lifetime),
        }
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }

    /// Seconds left before expiry, floored at zero
    pub fn remaining_secs(&self, now: Timestamp) -> u64 {
        u64::try_from(self.expires_at.saturating_sub(now)).unwrap_or(0)
    }

    /// Client-facing copy for the display cache
    pub fn to_view(&self) -> SessionView {
        SessionView {
            user_id: self.subject_id.clone(),
            role: self.role,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }
}

/// Lifetimes to choose from when a session is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLifetimes {
    pub lifetime_seconds: u64,
    pub remember_me_lifetime_seconds: u64,
}

impl Default for SessionLifetimes {
    fn default() -> Self {
        Self {
            lifetime_seconds: DEFAULT_LIFETIME_SECS,
            remember_me_lifetime_seconds: DEFAULT_REMEMBER_ME_LIFETIME_SECS,
        }
    }
}

impl SessionLifetimes {
    pub fn select(&self, remember_me: bool) -> u64 {
        if remember_me {
            self.remember_me_lifetime_seconds
        } else {
            self.lifetime_seconds
        }
    }
}

/// Opaque encoded session, as carried by the cookie or bearer header
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Encodes and verifies session tokens with one process-wide key.
///
/// The keyed MAC state is built once and cloned per operation, so the codec
/// is shared across requests without locking.
#[derive(Clone)]
pub struct SessionCodec {
    mac: HmacSha256,
}

impl SessionCodec {
    pub fn new(secret: &SigningSecret) -> Result<Self, ConfigError> {
        let mac = HmacSha256::new_from_slice(&secret.0)
            .map_err(|_| ConfigError::MisconfiguredSigningSecret)?;
        Ok(Self { mac })
    }

    fn sign(&self, payload_b64: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(payload_b64.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Serialize and sign a claim set
    pub fn encode(&self, claims: &SessionClaims) -> Result<SessionToken, AppError> {
        let payload_json = serde_json::to_vec(claims)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json);
        let signature_b64 = URL_SAFE_NO_PAD.encode(self.sign(&payload_b64));
        Ok(SessionToken(format!("{payload_b64}.{signature_b64}")))
    }

    /// Verify and decode a token against the current time
    pub fn decode(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.decode_at(token, now_timestamp())
    }

    /// Verify and decode a token as of `now`
    pub fn decode_at(&self, token: &str, now: Timestamp) -> Result<SessionClaims, TokenError> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or(TokenError::TamperedOrInvalid)?;
        if signature_b64.contains('.') {
            return Err(TokenError::TamperedOrInvalid);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::TamperedOrInvalid)?;

        // constant-time comparison; nothing in the payload is read before this
        let mut mac = self.mac.clone();
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::TamperedOrInvalid)?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::TamperedOrInvalid)?;
        let claims: SessionClaims =
            serde_json::from_slice(&payload).map_err(|_| TokenError::TamperedOrInvalid)?;

        if claims.expires_at <= claims.issued_at {
            return Err(TokenError::TamperedOrInvalid);
        }
        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

impl fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCodec").finish_non_exhaustive()
    }
}
