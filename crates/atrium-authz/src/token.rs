//! Internal session credential minting and verification.
//!
//! # Purpose
//! After a successful login the admin API stops trusting the external IdP
//! token and issues its own short-lived credential. Every later request is
//! authorized from this credential alone, with no store round-trip.
//!
//! # Key invariants
//! - Credentials are always EdDSA (Ed25519).
//! - `iss` and `aud` are validated on every verify.
//! - The private key is a 32-byte Ed25519 seed; the public key must match it.
//! - Verification maps expiry to [`TokenError::Expired`] and everything else
//!   (signature, issuer, audience, malformed or unknown claim values) to
//!   [`TokenError::Invalid`].
//!
//! # Rotation
//! Tokens carry the signing key `kid`. Verification tries the key named by the
//! header first, then the remaining keys in rotation order, so credentials
//! signed by a previous key stay valid until they expire.
//!
//! # Examples
//! ```rust
//! use atrium_authz::{
//!     AuthorizationContext, CanonicalRole, CustomerClass, InternalTokenService, SigningKey,
//!     SigningKeys,
//! };
//! use std::time::Duration;
//! use uuid::Uuid;
//!
//! let keys = SigningKeys::single(SigningKey::from_seed([7u8; 32]));
//! let service = InternalTokenService::new(
//!     "atrium-auth",
//!     "atrium-admin",
//!     Duration::from_secs(3600),
//!     Duration::from_secs(30),
//!     keys,
//! )
//! .unwrap();
//! let ctx = AuthorizationContext {
//!     user_id: Uuid::new_v4(),
//!     organization_id: Uuid::new_v4(),
//!     customer_type: CustomerClass::Partner,
//!     role: CanonicalRole::Editor,
//! };
//! let issued = service.issue(&ctx).unwrap();
//! assert_eq!(service.verify(&issued.token).unwrap(), ctx);
//! ```
use crate::{AuthorizationContext, CanonicalRole, CustomerClass, TokenError};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use uuid::Uuid;

const ED25519_KEY_LEN: usize = 32;

pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Claims carried by the internal credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub iss: String,
    pub aud: String,
    /// Local user id.
    pub sub: String,
    /// Organization id.
    pub org: String,
    pub role: String,
    /// Customer class.
    pub ctype: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl SessionClaims {
    fn into_context(self) -> Result<AuthorizationContext, TokenError> {
        let user_id = Uuid::parse_str(&self.sub)
            .map_err(|_| TokenError::Invalid("subject is not a user id".to_string()))?;
        let organization_id = Uuid::parse_str(&self.org)
            .map_err(|_| TokenError::Invalid("org is not an organization id".to_string()))?;
        let role = CanonicalRole::from_canonical(&self.role)
            .ok_or_else(|| TokenError::Invalid(format!("unknown role: {}", self.role)))?;
        let customer_type = CustomerClass::parse(&self.ctype)
            .ok_or_else(|| TokenError::Invalid(format!("unknown customer type: {}", self.ctype)))?;
        Ok(AuthorizationContext {
            user_id,
            organization_id,
            customer_type,
            role,
        })
    }
}

/// Ed25519 signing key material.
///
/// `private_key` is the raw seed and must never be logged or serialized.
#[derive(Clone)]
pub struct SigningKey {
    pub kid: String,
    pub alg: Algorithm,
    pub private_key: [u8; ED25519_KEY_LEN],
    pub public_key: [u8; ED25519_KEY_LEN],
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Derive the public key from `seed`. The `kid` is the first 16 hex
    /// characters of the SHA-256 of the public key, so it is stable across
    /// restarts for the same seed.
    pub fn from_seed(seed: [u8; ED25519_KEY_LEN]) -> Self {
        let public_key = Ed25519SigningKey::from_bytes(&seed)
            .verifying_key()
            .to_bytes();
        let digest = Sha256::digest(public_key);
        let kid = hex::encode(&digest[..8]);
        Self {
            kid,
            alg: Algorithm::EdDSA,
            private_key: seed,
            public_key,
        }
    }

    /// Parse a hex-encoded 32-byte seed.
    pub fn from_hex_seed(value: &str) -> Result<Self, TokenError> {
        let bytes = hex::decode(value.trim())
            .map_err(|err| TokenError::Key(format!("signing key is not hex: {err}")))?;
        let seed: [u8; ED25519_KEY_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            TokenError::Key(format!(
                "signing key must be {ED25519_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_seed(seed))
    }

    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = kid.into();
        self
    }

    pub fn validate(&self) -> Result<(), TokenError> {
        if self.alg != Algorithm::EdDSA {
            return Err(TokenError::Key(format!(
                "invalid signing algorithm: {:?}",
                self.alg
            )));
        }
        let expected = Ed25519SigningKey::from_bytes(&self.private_key)
            .verifying_key()
            .to_bytes();
        if expected != self.public_key {
            return Err(TokenError::Key(
                "Ed25519 public key does not match private seed".to_string(),
            ));
        }
        Ok(())
    }

    fn encoding_key(&self) -> Result<EncodingKey, TokenError> {
        let der = Ed25519SigningKey::from_bytes(&self.private_key)
            .to_pkcs8_der()
            .map_err(|err| TokenError::Key(format!("encode Ed25519 key: {err}")))?;
        Ok(EncodingKey::from_ed_der(der.as_bytes()))
    }

    fn decoding_key(&self) -> Result<DecodingKey, TokenError> {
        DecodingKey::from_ed_components(&self.public_x())
            .map_err(|err| TokenError::Key(format!("decode Ed25519 public key: {err}")))
    }

    fn public_x(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.public_key)
    }
}

/// Current key plus keys still accepted for verification.
#[derive(Debug, Clone)]
pub struct SigningKeys {
    pub current: SigningKey,
    pub previous: Vec<SigningKey>,
}

impl SigningKeys {
    pub fn single(current: SigningKey) -> Self {
        Self {
            current,
            previous: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), TokenError> {
        self.current.validate()?;
        for key in &self.previous {
            key.validate()?;
        }
        Ok(())
    }

    /// Current key first, then previous keys.
    pub fn all_keys(&self) -> impl Iterator<Item = &SigningKey> {
        std::iter::once(&self.current).chain(self.previous.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCredential {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IssuedCredential {
    pub fn expires_in_secs(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }
}

struct VerificationKey {
    kid: String,
    key: DecodingKey,
}

/// Issues and verifies internal credentials.
///
/// Encoding and decoding keys are derived once at construction.
pub struct InternalTokenService {
    issuer: String,
    audience: String,
    ttl: Duration,
    leeway: Duration,
    keys: SigningKeys,
    encoding_key: EncodingKey,
    verification_keys: Vec<VerificationKey>,
}

impl std::fmt::Debug for InternalTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalTokenService")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl", &self.ttl)
            .field("current_kid", &self.keys.current.kid)
            .finish_non_exhaustive()
    }
}

impl InternalTokenService {
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        ttl: Duration,
        leeway: Duration,
        keys: SigningKeys,
    ) -> Result<Self, TokenError> {
        keys.validate()?;
        let encoding_key = keys.current.encoding_key()?;
        let verification_keys = keys
            .all_keys()
            .map(|key| {
                Ok(VerificationKey {
                    kid: key.kid.clone(),
                    key: key.decoding_key()?,
                })
            })
            .collect::<Result<Vec<_>, TokenError>>()?;
        Ok(Self {
            issuer: issuer.into(),
            audience: audience.into(),
            ttl,
            leeway,
            keys,
            encoding_key,
            verification_keys,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, ctx: &AuthorizationContext) -> Result<IssuedCredential, TokenError> {
        self.issue_at(ctx, Utc::now())
    }

    pub fn issue_at(
        &self,
        ctx: &AuthorizationContext,
        now: DateTime<Utc>,
    ) -> Result<IssuedCredential, TokenError> {
        let ttl = TimeDelta::from_std(self.ttl)
            .map_err(|err| TokenError::Key(format!("credential ttl out of range: {err}")))?;
        let expires_at = now + ttl;
        let claims = SessionClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: ctx.user_id.to_string(),
            org: ctx.organization_id.to_string(),
            role: ctx.role.as_str().to_string(),
            ctype: ctx.customer_type.as_str().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.keys.current.kid.clone());
        let token = jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(TokenError::Signing)?;
        Ok(IssuedCredential {
            token,
            issued_at: now,
            expires_at,
        })
    }

    pub fn verify(&self, token: &str) -> Result<AuthorizationContext, TokenError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|err| TokenError::Invalid(format!("malformed header: {err}")))?;
        if header.alg != Algorithm::EdDSA {
            return Err(TokenError::Invalid(format!(
                "unexpected algorithm: {:?}",
                header.alg
            )));
        }

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation.leeway = self.leeway.as_secs();

        let mut last_err = None;
        for entry in self.ordered_keys(header.kid.as_deref()) {
            match jsonwebtoken::decode::<SessionClaims>(token, &entry.key, &validation) {
                Ok(data) => return data.claims.into_context(),
                // Claims are only checked once the signature holds, so this
                // key is the right one and trying older keys cannot help.
                Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => {
                    return Err(TokenError::Expired);
                }
                Err(err) if !matches!(err.kind(), ErrorKind::InvalidSignature) => {
                    return Err(TokenError::Invalid(err.to_string()));
                }
                Err(err) => last_err = Some(err),
            }
        }
        Err(TokenError::Invalid(
            last_err
                .map(|err| err.to_string())
                .unwrap_or_else(|| "no verification key".to_string()),
        ))
    }

    fn ordered_keys<'a>(
        &'a self,
        kid: Option<&'a str>,
    ) -> impl Iterator<Item = &'a VerificationKey> {
        let preferred = self
            .verification_keys
            .iter()
            .filter(move |entry| Some(entry.kid.as_str()) == kid);
        let rest = self
            .verification_keys
            .iter()
            .filter(move |entry| Some(entry.kid.as_str()) != kid);
        preferred.chain(rest)
    }

    /// Public keys for every key still accepted by [`Self::verify`].
    pub fn jwks(&self) -> Jwks {
        Jwks {
            keys: self
                .keys
                .all_keys()
                .map(|key| Jwk {
                    kty: "OKP".to_string(),
                    crv: "Ed25519".to_string(),
                    x: key.public_x(),
                    kid: key.kid.clone(),
                    alg: "EdDSA".to_string(),
                    use_field: "sig".to_string(),
                })
                .collect(),
        }
    }
}
