//! Authentication module

pub mod jwks;
pub mod middleware;

pub use jwks::JwksVerifier;
pub use middleware::{require_auth, AuthError, AuthUser};
