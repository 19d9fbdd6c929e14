// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Authentication and authorization core.

pub mod authenticator;
pub mod gate;
pub mod password;
pub mod rate_limit;
pub mod token;
pub mod token_generator;

pub use authenticator::{Authenticator, Credentials, IdentityAssertion, ProviderClaims};
pub use gate::{AccessKind, AuthorizationDecision, Gate, RoleSet, RouteAccess, RouteRule, RouteTable};
pub use password::{validate_password_strength, PasswordHasher, PasswordRequirements, MIN_PASSWORD_LENGTH};
pub use rate_limit::AuthRateLimiter;
pub use token::{SessionClaims, SessionCodec, SessionLifetimes, SessionToken, SigningSecret};
