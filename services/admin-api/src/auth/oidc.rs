//! Upstream IdP bearer validation with cached discovery and JWKS fetching.
//!
//! # Purpose
//! Verify the external bearer presented to `POST /v1/auth/login` and hand
//! the verified claims bag to the claim normalizer.
//!
//! # Key invariants
//! - Only ES256 is accepted by default; RS256 is allowed only when the
//!   `oidc-rsa` feature is enabled. Internal credentials are EdDSA and are
//!   never accepted here.
//! - Issuer and (when configured) audience are validated after the signature.
//! - Claims are decoded unverified only to locate the issuer.
//!
//! # Concurrency model
//! Discovery and JWKS documents are cached in `DashMap`s with TTLs and
//! refreshed on expiry or on an unknown `kid`.
use crate::auth::idp_registry::IdpIssuerConfig;
use async_trait::async_trait;
use atrium_authz::RawClaims;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use dashmap::DashMap;
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, JwkSet, KeyAlgorithm};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Verifies an external bearer and returns its claims.
///
/// The login flow depends on this seam rather than on
/// [`UpstreamOidcValidator`] so tests can substitute a static validator.
#[async_trait]
pub trait ExternalTokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<RawClaims, OidcError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OidcError {
    #[error("missing issuer")]
    MissingIssuer,
    #[error("issuer not allowed")]
    IssuerNotAllowed,
    #[error("missing key id")]
    MissingKeyId,
    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,
    #[error("invalid jwk: {0}")]
    InvalidJwk(String),
    #[error("jwks key not found")]
    JwksKeyNotFound,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("invalid claim: {0}")]
    InvalidClaim(String),
}

#[derive(Debug, Clone)]
pub struct UpstreamOidcValidator {
    client: reqwest::Client,
    issuers: Arc<Vec<IdpIssuerConfig>>,
    jwks_cache: Arc<DashMap<String, Cached<JwkSet>>>,
    discovery_cache: Arc<DashMap<String, Cached<String>>>,
    jwks_ttl: Duration,
    discovery_ttl: Duration,
    clock_skew_seconds: u64,
}

/// A cached document and the instant it stops being served.
#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Cached<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn fresh(&self) -> Option<T> {
        (self.expires_at > Instant::now()).then(|| self.value.clone())
    }
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

impl UpstreamOidcValidator {
    pub fn new(
        issuers: Vec<IdpIssuerConfig>,
        jwks_ttl: Duration,
        discovery_ttl: Duration,
        clock_skew_seconds: u64,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            issuers: Arc::new(issuers),
            jwks_cache: Arc::new(DashMap::new()),
            discovery_cache: Arc::new(DashMap::new()),
            jwks_ttl,
            discovery_ttl,
            clock_skew_seconds,
        }
    }

    /// One-hour discovery and JWKS caches with a minute of clock skew.
    pub fn with_defaults(issuers: Vec<IdpIssuerConfig>) -> Self {
        Self::new(
            issuers,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            60,
        )
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn issuers(&self) -> &[IdpIssuerConfig] {
        &self.issuers
    }

    async fn validate_token(&self, token: &str) -> Result<RawClaims, OidcError> {
        // Pin the algorithm before any network work.
        let header = decode_header(token)?;
        if !is_algorithm_allowed(header.alg) {
            return Err(OidcError::UnsupportedAlgorithm);
        }
        let kid = header.kid.as_deref().ok_or(OidcError::MissingKeyId)?;
        let issuer = self.trusted_issuer(token)?;

        let decoding_key = self.decoding_key(issuer, kid, header.alg).await?;
        let validation = self.validation(issuer, header.alg);
        let claims = decode::<RawClaims>(token, &decoding_key, &validation)?.claims;
        validate_iat(&claims, self.clock_skew_seconds)?;
        Ok(claims)
    }

    /// The configured issuer named by the unverified `iss` claim.
    fn trusted_issuer(&self, token: &str) -> Result<&IdpIssuerConfig, OidcError> {
        let unverified = decode_unverified_claims(token)?;
        let issuer = unverified
            .get("iss")
            .and_then(|value| value.as_str())
            .ok_or(OidcError::MissingIssuer)?;
        self.issuers
            .iter()
            .find(|cfg| cfg.issuer == issuer)
            .ok_or(OidcError::IssuerNotAllowed)
    }

    fn validation(&self, issuer: &IdpIssuerConfig, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.set_issuer(&[issuer.issuer.as_str()]);
        validation.required_spec_claims.insert("iss".to_string());
        if issuer.audiences.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&issuer.audiences);
            validation.required_spec_claims.insert("aud".to_string());
        }
        validation.leeway = self.clock_skew_seconds;
        validation
    }

    /// Resolve `kid` from the cached key set, refetching once on a miss so
    /// IdP key rotation is picked up without waiting for the TTL.
    async fn decoding_key(
        &self,
        issuer: &IdpIssuerConfig,
        kid: &str,
        alg: Algorithm,
    ) -> Result<DecodingKey, OidcError> {
        let jwks_url = self.resolve_jwks_url(issuer).await?;
        let cached = self.get_jwks(&jwks_url).await?;
        let jwks = if find_jwk(&cached, kid).is_some() {
            cached
        } else {
            tracing::debug!(issuer = %issuer.issuer, kid, "unknown kid, refreshing idp jwks");
            self.refresh_jwks(&jwks_url).await?
        };
        let jwk = find_jwk(&jwks, kid).ok_or(OidcError::JwksKeyNotFound)?;
        ensure_jwk_matches_algorithm(jwk, alg)?;
        Ok(DecodingKey::from_jwk(jwk)?)
    }

    async fn resolve_jwks_url(&self, issuer: &IdpIssuerConfig) -> Result<String, OidcError> {
        if let Some(url) = &issuer.jwks_url {
            return Ok(url.to_string());
        }
        let discovery_url = issuer.discovery_url();
        if let Some(jwks_url) = self
            .discovery_cache
            .get(&discovery_url)
            .and_then(|entry| entry.fresh())
        {
            return Ok(jwks_url);
        }

        let doc: DiscoveryDocument = self
            .client
            .get(&discovery_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.discovery_cache.insert(
            discovery_url,
            Cached::new(doc.jwks_uri.clone(), self.discovery_ttl),
        );
        Ok(doc.jwks_uri)
    }

    async fn get_jwks(&self, jwks_url: &str) -> Result<JwkSet, OidcError> {
        if let Some(jwks) = self
            .jwks_cache
            .get(jwks_url)
            .and_then(|entry| entry.fresh())
        {
            return Ok(jwks);
        }
        self.refresh_jwks(jwks_url).await
    }

    async fn refresh_jwks(&self, jwks_url: &str) -> Result<JwkSet, OidcError> {
        let jwks: JwkSet = self
            .client
            .get(jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        self.jwks_cache.insert(
            jwks_url.to_string(),
            Cached::new(jwks.clone(), self.jwks_ttl),
        );
        Ok(jwks)
    }
}

#[async_trait]
impl ExternalTokenValidator for UpstreamOidcValidator {
    async fn validate(&self, token: &str) -> Result<RawClaims, OidcError> {
        self.validate_token(token).await
    }
}

fn is_algorithm_allowed(alg: Algorithm) -> bool {
    matches!(alg, Algorithm::ES256)
        || (cfg!(feature = "oidc-rsa") && matches!(alg, Algorithm::RS256))
}

fn ensure_jwk_matches_algorithm(
    jwk: &jsonwebtoken::jwk::Jwk,
    alg: Algorithm,
) -> Result<(), OidcError> {
    let key_alg = jwk
        .common
        .key_algorithm
        .ok_or_else(|| OidcError::InvalidJwk("missing alg".to_string()))?;
    match (key_alg, alg) {
        (KeyAlgorithm::RS256, Algorithm::RS256) => {}
        (KeyAlgorithm::ES256, Algorithm::ES256) => {}
        _ => return Err(OidcError::InvalidJwk("alg mismatch".to_string())),
    }
    match (&jwk.algorithm, alg) {
        (AlgorithmParameters::RSA(_), Algorithm::RS256) => Ok(()),
        (AlgorithmParameters::EllipticCurve(params), Algorithm::ES256) => {
            if params.curve != EllipticCurve::P256 {
                return Err(OidcError::InvalidJwk("unexpected EC curve".to_string()));
            }
            Ok(())
        }
        _ => Err(OidcError::InvalidJwk("kty mismatch".to_string())),
    }
}

fn find_jwk<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a jsonwebtoken::jwk::Jwk> {
    jwks.keys
        .iter()
        .find(|key| key.common.key_id.as_deref() == Some(kid))
}

fn decode_unverified_claims(token: &str) -> Result<RawClaims, OidcError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| OidcError::InvalidClaim("token format".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| OidcError::InvalidClaim("token payload".to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| OidcError::InvalidClaim(format!("token payload: {err}")))
}

fn validate_iat(claims: &RawClaims, leeway_seconds: u64) -> Result<(), OidcError> {
    let iat = claims
        .get("iat")
        .and_then(|value| value.as_i64())
        .ok_or_else(|| OidcError::InvalidClaim("iat".to_string()))?;
    let now = Utc::now().timestamp();
    if iat > now + leeway_seconds as i64 {
        return Err(OidcError::InvalidClaim("iat in future".to_string()));
    }
    Ok(())
}
