// ============================
// crates/backend-lib/src/auth/password.rs
// ============================
//! Password hashing and verification.
use crate::config::ConfigError;
use crate::error::AppError;
use scrypt::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Params, Scrypt,
};
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use tracing::error;
use zeroize::Zeroize;

/// Minimum password length
pub const MIN_PASSWORD_LENGTH: usize = 10;

/// Default scrypt work factor, as log2(N)
pub const DEFAULT_HASH_COST: u8 = 12;
/// Lowest accepted work factor
pub const MIN_HASH_COST: u8 = 4;
/// Highest accepted work factor (memory use doubles per step)
pub const MAX_HASH_COST: u8 = 20;

/// Password complexity requirements
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PasswordRequirements {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_digit: bool,
    pub require_special: bool,
}

impl Default for PasswordRequirements {
    fn default() -> Self {
        Self {
            min_length: MIN_PASSWORD_LENGTH,
            require_uppercase: true,
            require_lowercase: true,
            require_digit: true,
            require_special: true,
        }
    }
}

/// scrypt hasher with a work factor fixed at startup
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
    // burned on lookups with no stored hash, so a miss costs as much as a mismatch
    dummy: Arc<OnceLock<Option<String>>>,
}

impl PasswordHasher {
    /// Build a hasher for `cost` = log2(N). Fails on an out-of-range cost so
    /// a misconfiguration stops the process before the first request.
    pub fn new(cost: u8) -> Result<Self, ConfigError> {
        if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&cost) {
            return Err(ConfigError::InvalidHashCost(cost));
        }
        let params = Params::new(
            cost,
            Params::RECOMMENDED_R,
            Params::RECOMMENDED_P,
            Params::RECOMMENDED_LEN,
        )
        .map_err(|_| ConfigError::InvalidHashCost(cost))?;
        Ok(Self {
            params,
            dummy: Arc::new(OnceLock::new()),
        })
    }

    /// Work factor this hasher was built with
    pub fn cost(&self) -> u8 {
        self.params.log_n()
    }

    /// Hash a password into a PHC string. The salt is fresh on every call.
    pub fn hash(&self, plain: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Scrypt
            .hash_password_customized(plain.as_bytes(), None, None, self.params, &salt)
            .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?
            .to_string();
        Ok(hash)
    }

    /// Verify a password against a stored PHC string.
    ///
    /// Parameters are read from the hash itself, so hashes made under an
    /// older work factor keep verifying. Anything unparseable is a plain
    /// `false`.
    pub fn verify(&self, plain: &str, hash: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(h) => h,
            Err(_) => return false,
        };
        Scrypt.verify_password(plain.as_bytes(), &parsed_hash).is_ok()
    }

    /// Spend a verification's worth of time without a real hash to check.
    pub fn verify_dummy(&self, plain: &str) {
        let dummy = self
            .dummy
            .get_or_init(|| self.hash("dashkit-timing-equalizer").ok());
        if let Some(hash) = dummy.as_deref() {
            let _ = self.verify(plain, hash);
        }
    }

    /// [`Self::hash`] on the blocking pool
    pub async fn hash_blocking(&self, plain: String) -> Result<String, AppError> {
        let hasher = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut plain = plain;
            let hash = hasher.hash(&plain);
            plain.zeroize();
            hash
        })
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
    }

    /// [`Self::verify`] on the blocking pool; a crashed task counts as a mismatch
    pub async fn verify_blocking(&self, plain: String, hash: Option<String>) -> bool {
        let hasher = self.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut plain = plain;
            let ok = match hash.as_deref() {
                Some(hash) => hasher.verify(&plain, hash),
                None => {
                    hasher.verify_dummy(&plain);
                    false
                },
            };
            plain.zeroize();
            ok
        })
        .await;

        match outcome {
            Ok(ok) => ok,
            Err(e) => {
                error!(error = %e, "password verification task failed");
                false
            },
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            params: Params::new(
                DEFAULT_HASH_COST,
                Params::RECOMMENDED_R,
                Params::RECOMMENDED_P,
                Params::RECOMMENDED_LEN,
            )
            .unwrap_or_default(),
            dummy: Arc::new(OnceLock::new()),
        }
    }
}

/// Check if a password meets the complexity requirements
pub fn validate_password_strength(password: &str, requirements: &PasswordRequirements) -> bool {
    if password.chars().count() < requirements.min_length {
        return false;
    }

    if requirements.require_uppercase && !password.chars().any(char::is_uppercase) {
        return false;
    }

    if requirements.require_lowercase && !password.chars().any(char::is_lowercase) {
        return false;
    }

    if requirements.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }

    if requirements.require_special && !password.chars().any(|c| !c.is_alphanumeric()) {
        return false;
    }

    true
}
