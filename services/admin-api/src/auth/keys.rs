//! Internal credential signing key loading.
//!
//! # Purpose
//! Turn configured hex seeds into [`SigningKeys`], or generate an ephemeral
//! Ed25519 key when none is configured.
//!
//! # Key invariants
//! - Keys are always Ed25519; the public half is derived from the seed.
//! - Seeds are never logged. Only `kid` values appear in logs.
//! - An ephemeral key does not survive restarts, so every credential it
//!   signed becomes invalid on the next start.
use crate::config::TokenConfig;
use anyhow::{Context, Result};
use atrium_authz::{SigningKey, SigningKeys};
use rand::RngCore;

/// Fresh random Ed25519 key.
pub fn generate_signing_key() -> SigningKey {
    let mut seed = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut seed);
    SigningKey::from_seed(seed)
}

pub fn load_signing_keys(config: &TokenConfig) -> Result<SigningKeys> {
    let current = match config.signing_key.as_deref() {
        Some(seed) => SigningKey::from_hex_seed(seed).context("parse ATRIUM_TOKEN_SIGNING_KEY")?,
        None => {
            let key = generate_signing_key();
            tracing::warn!(
                kid = %key.kid,
                "no ATRIUM_TOKEN_SIGNING_KEY configured; using an ephemeral signing key"
            );
            key
        }
    };
    let previous = config
        .previous_signing_keys
        .iter()
        .map(|seed| SigningKey::from_hex_seed(seed))
        .collect::<Result<Vec<_>, _>>()
        .context("parse ATRIUM_TOKEN_PREVIOUS_SIGNING_KEYS")?;
    let keys = SigningKeys { current, previous };
    keys.validate().context("validate signing keys")?;
    tracing::info!(
        current_kid = %keys.current.kid,
        previous = keys.previous.len(),
        "loaded internal credential signing keys"
    );
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(signing_key: Option<&str>, previous: &[&str]) -> TokenConfig {
        TokenConfig {
            signing_key: signing_key.map(str::to_string),
            previous_signing_keys: previous.iter().map(|s| s.to_string()).collect(),
            ..TokenConfig::default()
        }
    }

    #[test]
    fn generated_keys_are_distinct_and_valid() {
        let a = generate_signing_key();
        let b = generate_signing_key();
        assert!(a.validate().is_ok());
        assert_ne!(a.kid, b.kid);
        assert_eq!(a.alg, jsonwebtoken::Algorithm::EdDSA);
    }

    #[test]
    fn configured_seed_is_stable() {
        let seed = hex::encode([7u8; 32]);
        let first = load_signing_keys(&config(Some(&seed), &[])).expect("keys");
        let second = load_signing_keys(&config(Some(&seed), &[])).expect("keys");
        assert_eq!(first.current.kid, second.current.kid);
        assert_eq!(first.current.public_key, second.current.public_key);
    }

    #[test]
    fn previous_keys_are_loaded() {
        let seed = hex::encode([7u8; 32]);
        let old = hex::encode([8u8; 32]);
        let keys = load_signing_keys(&config(Some(&seed), &[&old])).expect("keys");
        assert_eq!(keys.previous.len(), 1);
        assert_ne!(keys.previous[0].kid, keys.current.kid);
    }

    #[test]
    fn missing_seed_falls_back_to_ephemeral() {
        let keys = load_signing_keys(&config(None, &[])).expect("keys");
        assert!(keys.previous.is_empty());
    }

    #[test]
    fn malformed_seeds_are_rejected() {
        assert!(load_signing_keys(&config(Some("zz"), &[])).is_err());
        assert!(load_signing_keys(&config(Some(&hex::encode([1u8; 16])), &[])).is_err());
        let seed = hex::encode([7u8; 32]);
        assert!(load_signing_keys(&config(Some(&seed), &["nope"])).is_err());
    }
}
