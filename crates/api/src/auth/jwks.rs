//! Bearer token verification against the identity provider's JWKS

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{
    decode, decode_header,
    jwk::{Jwk, JwkSet},
    Algorithm, DecodingKey, Validation,
};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::middleware::AuthError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
/// Minimum age of the cached set before an unknown `kid` may force a refetch.
const MIN_FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    sub: Option<String>,
}

#[derive(Clone)]
struct CachedJwks {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
}

/// Verifies RS256 bearer tokens with keys from `<AUTH_URL>/.well-known/jwks.json`.
///
/// The key set is cached for `cache_ttl`; a zero ttl fetches on every
/// request. A token whose `kid` is missing from a cached set triggers one
/// refresh so key rotation is picked up without waiting for expiry, but only
/// once the cached set is older than the forced refresh interval.
pub struct JwksVerifier {
    jwks_url: String,
    http_client: Client,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    cache: RwLock<Option<CachedJwks>>,
}

impl JwksVerifier {
    pub fn new(jwks_url: impl Into<String>, cache_ttl: Duration) -> Self {
        let http_client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            jwks_url: jwks_url.into(),
            http_client,
            cache_ttl,
            min_refresh_interval: MIN_FORCED_REFRESH_INTERVAL,
            cache: RwLock::new(None),
        }
    }

    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Verify an `Authorization` header value and return the token's subject.
    pub async fn verify_and_decode(&self, authorization: Option<&str>) -> Result<String, AuthError> {
        let token = authorization
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NullToken)?;

        let header = decode_header(token).map_err(|e| {
            tracing::debug!(error = %e, "Token header could not be decoded");
            AuthError::UnverifiedHeader
        })?;
        let kid = header.kid.ok_or(AuthError::UnverifiedHeader)?;

        let jwk = self.signing_key(&kid).await?.ok_or_else(|| {
            tracing::warn!(kid = %kid, "No signing key with this kid in JWKS");
            AuthError::EmptyRsaKey
        })?;

        let key = DecodingKey::from_jwk(&jwk).map_err(|e| {
            tracing::warn!(kid = %kid, error = %e, "JWKS entry is not a usable RSA key");
            AuthError::EmptyRsaKey
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;

        let data = decode::<Claims>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidJwt(e.to_string()))?;

        data.claims
            .sub
            .filter(|sub| !sub.is_empty())
            .ok_or(AuthError::MissingSubClaim)
    }

    /// Find a key by `kid`, refreshing the set at most once per call.
    async fn signing_key(&self, kid: &str) -> Result<Option<Jwk>, AuthError> {
        if let Some(cached) = self.cached().await {
            if let Some(jwk) = cached.keys.find(kid) {
                return Ok(Some(jwk.clone()));
            }
            if cached.fetched_at.elapsed() < self.min_refresh_interval {
                tracing::debug!(kid = %kid, "kid not in recently fetched JWKS, skipping refresh");
                return Ok(None);
            }
            tracing::debug!(kid = %kid, "kid not in cached JWKS, refreshing");
        }

        let fresh = self.refresh().await?;
        Ok(fresh.find(kid).cloned())
    }

    async fn cached(&self) -> Option<CachedJwks> {
        if self.cache_ttl.is_zero() {
            return None;
        }

        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.cache_ttl)
            .cloned()
    }

    async fn refresh(&self) -> Result<Arc<JwkSet>, AuthError> {
        let keys = Arc::new(self.fetch().await?);

        if !self.cache_ttl.is_zero() {
            *self.cache.write().await = Some(CachedJwks {
                keys: keys.clone(),
                fetched_at: Instant::now(),
            });
        }

        Ok(keys)
    }

    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        let started = Instant::now();

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                tracing::error!(url = %self.jwks_url, error = %e, "JWKS request failed");
                AuthError::TokenValidation(e.to_string())
            })?;

        let keys: JwkSet = response.json().await.map_err(|e| {
            tracing::error!(url = %self.jwks_url, error = %e, "JWKS response is not a key set");
            AuthError::TokenValidation(e.to_string())
        })?;

        tracing::debug!(
            keys = keys.keys.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Fetched JWKS"
        );
        Ok(keys)
    }
}
