// ============================
// crates/backend-lib/src/config.rs
// ============================
//! Configuration management.
use crate::auth::gate::{AccessKind, RoleSet, RouteAccess, RouteRule, RouteTable};
use crate::auth::password::{PasswordHasher, PasswordRequirements, DEFAULT_HASH_COST};
use crate::auth::token::{
    SessionLifetimes, SigningSecret, DEFAULT_LIFETIME_SECS, DEFAULT_REMEMBER_ME_LIFETIME_SECS,
};
use crate::auth::rate_limit::{AuthRateLimiter, DEFAULT_LOCKOUT_DURATION, DEFAULT_MAX_ATTEMPTS};
use dashkit_common::Role;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
mod config_tests;

/// Prefix of environment overrides, e.g. `DASHKIT_SIGNING_SECRET`
pub const ENV_PREFIX: &str = "DASHKIT_";

/// Config file read when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const MIN_PASSWORD_RULE_LENGTH: usize = 8;

/// Startup configuration failures. All of them stop the process.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("signing secret is missing or shorter than 32 bytes")]
    MisconfiguredSigningSecret,

    #[error("hash cost factor {0} is outside the accepted range")]
    InvalidHashCost(u8),

    #[error("invalid route `{pattern}`: {reason}")]
    InvalidRoute { pattern: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
}

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Failed sign-in throttling
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Failed attempts allowed before the identifier is locked out
    pub max_failed_attempts: u32,
    /// Lockout length in seconds
    pub lockout_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_failed_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout_secs: DEFAULT_LOCKOUT_DURATION.as_secs(),
        }
    }
}

/// Application settings
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// HMAC key for session tokens; required
    pub signing_secret: Option<String>,
    /// scrypt log2(N)
    pub hash_cost_factor: u8,
    pub lifetime_seconds: u64,
    pub remember_me_lifetime_seconds: u64,
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Data directory path
    pub data_dir: PathBuf,
    /// Log level
    pub log_level: String,
    pub log_format: LogFormat,
    /// Mark the session cookie `Secure`
    pub secure_cookies: bool,
    /// Where unauthenticated page requests are redirected
    pub sign_in_path: String,
    /// Password requirements for new accounts
    pub password_requirements: PasswordRequirements,
    pub rate_limit: RateLimitSettings,
    pub routes: Vec<RouteRule>,
    /// Requirement for paths no route matches
    pub default_access: AccessKind,
    /// Roles for a `restricted` default
    pub default_roles: Vec<Role>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            signing_secret: None,
            hash_cost_factor: DEFAULT_HASH_COST,
            lifetime_seconds: DEFAULT_LIFETIME_SECS,
            remember_me_lifetime_seconds: DEFAULT_REMEMBER_ME_LIFETIME_SECS,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            secure_cookies: false,
            sign_in_path: "/sign-in".to_string(),
            password_requirements: PasswordRequirements::default(),
            rate_limit: RateLimitSettings::default(),
            routes: Vec::new(),
            default_access: AccessKind::Authenticated,
            default_roles: Vec::new(),
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "<redacted>"))
            .field("hash_cost_factor", &self.hash_cost_factor)
            .field("lifetime_seconds", &self.lifetime_seconds)
            .field("remember_me_lifetime_seconds", &self.remember_me_lifetime_seconds)
            .field("bind_addr", &self.bind_addr)
            .field("data_dir", &self.data_dir)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("secure_cookies", &self.secure_cookies)
            .field("sign_in_path", &self.sign_in_path)
            .field("password_requirements", &self.password_requirements)
            .field("rate_limit", &self.rate_limit)
            .field("routes", &self.routes)
            .field("default_access", &self.default_access)
            .field("default_roles", &self.default_roles)
            .finish()
    }
}

impl Settings {
    /// Load from `config.toml` in the working directory, then the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from `path`, then the environment. A missing file is not an error.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Self::extract_from(path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Layer `path` and the environment without validating the result.
    /// For tooling that does not need every setting, e.g. offline user management.
    pub fn extract_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Ok(Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?)
    }

    /// Check everything that would otherwise fail later at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.signing_secret()?;
        self.password_hasher()?;

        if self.lifetime_seconds == 0 || self.remember_me_lifetime_seconds == 0 {
            return Err(ConfigError::Invalid(
                "session lifetimes must be at least one second".to_string(),
            ));
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log_level `{}` is not one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        if !self.sign_in_path.starts_with('/') {
            return Err(ConfigError::Invalid(
                "sign_in_path must be an absolute path".to_string(),
            ));
        }

        if self.password_requirements.min_length < MIN_PASSWORD_RULE_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "password_requirements.min_length must be at least {MIN_PASSWORD_RULE_LENGTH}"
            )));
        }

        if self.rate_limit.max_failed_attempts == 0 || self.rate_limit.lockout_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit values must be greater than zero".to_string(),
            ));
        }

        self.route_table()?;
        Ok(())
    }

    pub fn signing_secret(&self) -> Result<SigningSecret, ConfigError> {
        SigningSecret::from_setting(self.signing_secret.as_deref())
    }

    pub fn password_hasher(&self) -> Result<PasswordHasher, ConfigError> {
        PasswordHasher::new(self.hash_cost_factor)
    }

    pub fn session_lifetimes(&self) -> SessionLifetimes {
        SessionLifetimes {
            lifetime_seconds: self.lifetime_seconds,
            remember_me_lifetime_seconds: self.remember_me_lifetime_seconds,
        }
    }

    pub fn default_route_access(&self) -> Result<RouteAccess, ConfigError> {
        match self.default_access {
            AccessKind::Public => Ok(RouteAccess::Public),
            AccessKind::Authenticated => Ok(RouteAccess::Authenticated),
            AccessKind::Restricted => RoleSet::new(self.default_roles.iter().copied())
                .map(RouteAccess::Restricted)
                .ok_or_else(|| {
                    ConfigError::Invalid(
                        "default_access = \"restricted\" needs default_roles".to_string(),
                    )
                }),
        }
    }

    pub fn route_table(&self) -> Result<RouteTable, ConfigError> {
        RouteTable::from_rules(&self.routes, self.default_route_access()?)
    }

    pub fn rate_limiter(&self) -> AuthRateLimiter {
        AuthRateLimiter::new(
            self.rate_limit.max_failed_attempts,
            Duration::from_secs(self.rate_limit.lockout_secs),
        )
    }
}
