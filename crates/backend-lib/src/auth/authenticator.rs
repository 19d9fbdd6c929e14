// ============================
// crates/backend-lib/src/auth/authenticator.rs
// ============================
//! Credential verification producing session claims.
use super::password::{PasswordHasher, PasswordRequirements};
use super::token::{SessionClaims, SessionLifetimes};
use crate::error::{AppError, AuthError};
use crate::metrics::{RECORD_SIGN_IN_FAILED, SIGN_IN};
use crate::storage::{normalize_identifier, CredentialStore, UserRecord};
use crate::validation;
use chrono::Utc;
use dashkit_common::Role;
use metrics::counter;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use zeroize::Zeroize;

/// One password sign-in attempt. The secret is wiped when this is dropped.
pub struct Credentials {
    pub identifier: String,
    secret: String,
    pub remember_me: bool,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
            remember_me: false,
        }
    }

    pub fn remember_me(mut self, remember_me: bool) -> Self {
        self.remember_me = remember_me;
        self
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .field("remember_me", &self.remember_me)
            .finish()
    }
}

/// Identity vouched for by an external provider (OAuth and friends)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderClaims {
    /// Provider name, e.g. `github`
    pub provider: String,
    /// Email the provider asserts for the account
    pub identifier: String,
    pub email_verified: bool,
}

/// Anything that can produce a session
#[derive(Debug)]
pub enum IdentityAssertion {
    Password(Credentials),
    External(ProviderClaims),
}

/// Orchestrates credential checks against the store and the hasher
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    lifetimes: SessionLifetimes,
    requirements: PasswordRequirements,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        lifetimes: SessionLifetimes,
    ) -> Self {
        Self {
            store,
            hasher,
            lifetimes,
            requirements: PasswordRequirements::default(),
        }
    }

    /// Rules applied by [`Self::register_user`]
    pub fn with_password_requirements(mut self, requirements: PasswordRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn hasher(&self) -> &PasswordHasher {
        &self.hasher
    }

    pub fn lifetimes(&self) -> SessionLifetimes {
        self.lifetimes
    }

    /// Verify a password sign-in.
    ///
    /// Unknown identifiers, password-less accounts and wrong secrets all
    /// fail with `InvalidCredentials` after the same amount of hashing work.
    /// Inactive accounts fail with `AccountNotActive` whatever the password,
    /// but only after verifying it, so they cost as much as any rejection.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<SessionClaims, AuthError> {
        let Some(record) = self.lookup(&credentials.identifier).await? else {
            self.hasher
                .verify_blocking(credentials.secret().to_string(), None)
                .await;
            return Err(reject(&credentials.identifier, AuthError::InvalidCredentials, "unknown_identifier"));
        };

        let Some(hash) = record.password_hash.clone() else {
            self.hasher
                .verify_blocking(credentials.secret().to_string(), None)
                .await;
            return Err(reject(&record.identifier, AuthError::InvalidCredentials, "no_password_credential"));
        };

        let verified = self
            .hasher
            .verify_blocking(credentials.secret().to_string(), Some(hash))
            .await;

        if !record.status.is_active() {
            return Err(reject(&record.identifier, AuthError::AccountNotActive, record.status.as_str()));
        }

        if !verified {
            return Err(reject(&record.identifier, AuthError::InvalidCredentials, "wrong_secret"));
        }

        Ok(self.issue(&record, credentials.remember_me, "password").await)
    }

    /// Produce claims from any identity assertion.
    ///
    /// External assertions skip the password step but still need an existing,
    /// active account; accounts are not provisioned from provider claims.
    pub async fn sign_in(&self, assertion: IdentityAssertion) -> Result<SessionClaims, AuthError> {
        match assertion {
            IdentityAssertion::Password(credentials) => self.authenticate(&credentials).await,
            IdentityAssertion::External(claims) => {
                if !claims.email_verified {
                    return Err(reject(&claims.identifier, AuthError::InvalidCredentials, "unverified_provider_email"));
                }

                let Some(record) = self.lookup(&claims.identifier).await? else {
                    return Err(reject(&claims.identifier, AuthError::InvalidCredentials, "unknown_identifier"));
                };

                if !record.status.is_active() {
                    return Err(reject(&record.identifier, AuthError::AccountNotActive, record.status.as_str()));
                }

                debug!(provider = %claims.provider, user_id = %record.id, "external identity accepted");
                Ok(self.issue(&record, false, "external").await)
            },
        }
    }

    /// Create an active account with a password credential
    pub async fn register_user(
        &self,
        identifier: &str,
        password: &str,
        role: Role,
    ) -> Result<UserRecord, AppError> {
        validation::validate_registration(identifier, password, &self.requirements)?;

        let hash = self.hasher.hash_blocking(password.to_string()).await?;
        let record = UserRecord::new(identifier, Some(hash), role);
        self.store.insert(record.clone()).await?;

        info!(user_id = %record.id, role = %record.role, "user registered");
        Ok(record)
    }

    /// Create an active account that can only sign in through a provider
    pub async fn register_external_user(
        &self,
        identifier: &str,
        role: Role,
    ) -> Result<UserRecord, AppError> {
        validation::validate_email(identifier)?;

        let record = UserRecord::new(identifier, None, role);
        self.store.insert(record.clone()).await?;

        info!(user_id = %record.id, role = %record.role, "external user registered");
        Ok(record)
    }

    async fn lookup(&self, identifier: &str) -> Result<Option<UserRecord>, AuthError> {
        let key = normalize_identifier(identifier);
        self.store.find_by_identifier(&key).await.map_err(|e| {
            error!(error = %e, "credential store lookup failed");
            counter!(SIGN_IN, "outcome" => "backend_error").increment(1);
            AuthError::Backend(e.to_string())
        })
    }

    async fn issue(&self, record: &UserRecord, remember_me: bool, method: &'static str) -> SessionClaims {
        let now = Utc::now();
        let claims = SessionClaims::new(
            record.id.clone(),
            record.role,
            now.timestamp(),
            self.lifetimes.select(remember_me),
        );

        // bookkeeping only; a failed write never blocks the sign-in
        if let Err(e) = self.store.record_sign_in(&record.identifier, now).await {
            warn!(user_id = %record.id, error = %e, "failed to record sign-in time");
            counter!(RECORD_SIGN_IN_FAILED).increment(1);
        }

        counter!(SIGN_IN, "outcome" => "success", "method" => method).increment(1);
        info!(
            user_id = %record.id,
            role = %record.role,
            method,
            expires_at = claims.expires_at,
            "sign-in succeeded"
        );
        claims
    }
}

/// Log a rejection with its real reason; the caller only ever sees `err`.
fn reject(identifier: &str, err: AuthError, reason: &'static str) -> AuthError {
    let outcome = match err {
        AuthError::AccountNotActive => "account_not_active",
        _ => "invalid_credentials",
    };
    counter!(SIGN_IN, "outcome" => outcome).increment(1);
    warn!(identifier = %normalize_identifier(identifier), outcome, reason, "sign-in rejected");
    err
}
