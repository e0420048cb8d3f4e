//! Authentication middleware for Axum

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::jwks::JwksVerifier;

/// Authenticated caller, inserted into request extensions by [`require_auth`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// `sub` claim of the verified token
    pub user_id: String,
}

/// Middleware that requires a valid bearer token
pub async fn require_auth(
    State(verifier): State<Arc<JwksVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let authorization = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(String::from);

    match verifier.verify_and_decode(authorization.as_deref()).await {
        Ok(user_id) => {
            tracing::debug!(path = %path, user_id = %user_id, "require_auth: authentication successful");
            request.extensions_mut().insert(AuthUser { user_id });
            next.run(request).await
        }
        Err(err) => {
            tracing::warn!(path = %path, code = err.code(), error = %err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

/// Authentication errors
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    NullToken,
    #[error("Token header is malformed or has no kid")]
    UnverifiedHeader,
    #[error("No signing key matches the token")]
    EmptyRsaKey,
    #[error("Invalid token: {0}")]
    InvalidJwt(String),
    #[error("Unable to retrieve signing keys: {0}")]
    TokenValidation(String),
    #[error("Token has no subject")]
    MissingSubClaim,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NullToken => "002-NullToken",
            AuthError::UnverifiedHeader => "003-UnverifiedHeader",
            AuthError::EmptyRsaKey => "004-EmptyRsaKey",
            AuthError::InvalidJwt(_) => "005-InvalidJWT",
            AuthError::TokenValidation(_) => "006-TokenValidation",
            AuthError::MissingSubClaim => "007-MissingSubClaim",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::TokenValidation(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AuthError::InvalidJwt(_) => "Invalid or expired token".to_string(),
            AuthError::TokenValidation(_) => "Token validation is temporarily unavailable".to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "code": self.code(),
            "message": message
        }));

        (status, body).into_response()
    }
}
