// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Credential authentication and session authorization core for `dashkit`.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod session;
pub mod storage;
pub mod validation;

use crate::auth::{AuthRateLimiter, Authenticator, Gate, SessionCodec};
use crate::config::{ConfigError, Settings};
use crate::storage::{CredentialStore, FlatFileStorage};
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Credential verification
    pub authenticator: Authenticator,
    /// Token signing and verification
    pub codec: SessionCodec,
    /// Route authorization
    pub gate: Gate,
    /// Validated settings
    pub settings: Arc<Settings>,
    /// Failed sign-in throttling
    pub rate_limiter: AuthRateLimiter,
}

impl AppState {
    /// Build the state over any credential store. Fails on invalid settings.
    pub fn new(store: Arc<dyn CredentialStore>, settings: Settings) -> Result<Self, ConfigError> {
        settings.validate()?;

        let codec = SessionCodec::new(&settings.signing_secret()?)?;
        let authenticator = Authenticator::new(
            store,
            settings.password_hasher()?,
            settings.session_lifetimes(),
        )
        .with_password_requirements(settings.password_requirements.clone());
        let gate = Gate::new(codec.clone(), settings.route_table()?);
        let rate_limiter = settings.rate_limiter();

        Ok(Self {
            authenticator,
            codec,
            gate,
            settings: Arc::new(settings),
            rate_limiter,
        })
    }

    /// Create the state over flat-file storage in `settings.data_dir`
    pub fn with_flat_file_storage(settings: Settings) -> anyhow::Result<Self> {
        let storage = FlatFileStorage::new(&settings.data_dir)?;
        Ok(Self::new(Arc::new(storage), settings)?)
    }
}
