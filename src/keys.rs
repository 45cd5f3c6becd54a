// src/keys.rs

use crate::error::JwkError;
use crate::model::{JsonWebKey, JsonWebKeySet};
use jsonwebtoken::{Algorithm, DecodingKey};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Key families a provider may publish for signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    /// Elliptic curve key, with the curve it lives on.
    Ec(EcCurve),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcCurve {
    P256,
    P384,
}

/// A verification key taken from a provider's JWKS.
#[derive(Clone)]
pub struct SigningKey {
    pub decoding_key: DecodingKey,
    pub key_type: KeyType,
    /// The `alg` the provider pinned the key to, if any.
    pub algorithm: Option<Algorithm>,
}

impl SigningKey {
    /// Whether a token signed with `alg` may be verified with this key.
    pub fn supports(&self, alg: Algorithm) -> bool {
        if let Some(pinned) = self.algorithm {
            if pinned != alg {
                return false;
            }
        }
        match (self.key_type, alg) {
            (
                KeyType::Rsa,
                Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512,
            ) => true,
            (KeyType::Ec(EcCurve::P256), Algorithm::ES256) => true,
            (KeyType::Ec(EcCurve::P384), Algorithm::ES384) => true,
            _ => false,
        }
    }

    /// Builds a key from a JWK.
    ///
    /// # Errors
    ///
    /// A [`JwkError`] when the JWK cannot be used for signature verification.
    pub fn from_jwk(jwk: &JsonWebKey) -> Result<Self, JwkError> {
        let algorithm = match jwk.alg.as_deref() {
            Some(alg) => {
                Some(Algorithm::from_str(alg).map_err(|_| JwkError::UnsupportedAlgorithm(alg.to_string()))?)
            }
            None => None,
        };
        let required = |value: &Option<String>, kty, member| {
            value.clone().ok_or(JwkError::MissingMember { kty, member })
        };

        match jwk.kty.as_str() {
            "RSA" => {
                let n = required(&jwk.n, "RSA", "n")?;
                let e = required(&jwk.e, "RSA", "e")?;
                Ok(Self {
                    decoding_key: DecodingKey::from_rsa_components(&n, &e)?,
                    key_type: KeyType::Rsa,
                    algorithm,
                })
            }
            "EC" => {
                let curve = match jwk.crv.as_deref() {
                    Some("P-256") => EcCurve::P256,
                    Some("P-384") => EcCurve::P384,
                    other => return Err(JwkError::UnsupportedCurve(other.map(str::to_string))),
                };
                let x = required(&jwk.x, "EC", "x")?;
                let y = required(&jwk.y, "EC", "y")?;
                Ok(Self {
                    decoding_key: DecodingKey::from_ec_components(&x, &y)?,
                    key_type: KeyType::Ec(curve),
                    algorithm,
                })
            }
            other => Err(JwkError::UnsupportedKeyType(other.to_string())),
        }
    }
}

/// The signing keys one provider currently publishes, keyed by `kid`.
#[derive(Clone)]
pub struct SigningKeySet {
    keys: HashMap<String, SigningKey>,
    fetched_at: Instant,
    ttl: Duration,
}

impl SigningKeySet {
    pub fn new(keys: HashMap<String, SigningKey>, ttl: Duration) -> Self {
        Self {
            keys,
            fetched_at: Instant::now(),
            ttl,
        }
    }

    /// Converts a JWKS document, skipping keys that cannot verify signatures.
    ///
    /// Encryption keys, keys without a `kid` and malformed keys are dropped
    /// with a log line. An empty result is not an error here.
    pub fn from_jwks(jwks: JsonWebKeySet, ttl: Duration) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in jwks.keys {
            if jwk.use_purpose.as_deref() == Some("enc") {
                debug!(kid = ?jwk.kid, "Skipping encryption key");
                continue;
            }
            let Some(kid) = jwk.kid.clone() else {
                debug!(kty = %jwk.kty, "Skipping JWK without kid");
                continue;
            };
            match SigningKey::from_jwk(&jwk) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(reason) => {
                    warn!(kid = %kid, kty = %jwk.kty, error = %reason, "Failed to parse JWK, skipping");
                }
            }
        }
        Self::new(keys, ttl)
    }

    pub fn get(&self, kid: &str) -> Option<&SigningKey> {
        self.keys.get(kid)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// How long this set may be served from cache.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

impl std::fmt::Debug for SigningKeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeySet")
            .field("kids", &self.keys.keys().collect::<Vec<_>>())
            .field("ttl", &self.ttl)
            .field("age", &self.age())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // P-256 public key coordinates of a throwaway test key.
    const EC_X: &str = "nzivFsoeCMX0RRnAZUVvp6-ddeyk-qldL_OMy6JImHE";
    const EC_Y: &str = "_nw_fo4WViET-ZEJhRMduHxzuSqCRAU_gGLR5GIre0I";
    // Modulus of tests/fixtures/signing_key_rotated.pem.
    const RSA_N: &str = "3mZaKuI5W3fellhpgSmDFXGJZYrW0N8sFunKg70u6UkZGUSw7-kGKNccc2vdqVaHZrkaiMKS0qkSG6KDlDkq12tqx2f_aKPIZ66-h4QMZRHPFYHMZd24Z2zkdiwCOx9qrZJzNBQumxXHl56m9o94o5NqmTAUqCCsoCxUZJTOYv7gI4z7Y2WKZbeLcx3091IJh8lRMgVskLtVvnFvscW5HEetVKU1cpPh6lwNqVgy4_496GS1H-rSfPMOwYURheiLvbzYEvD3yi8VDRjcamBHKu4Tt227QxBcduUh01Fbk2OU__PWsv3UToefhNI2sn4qBAoCAy1n6ep5Z2lvlVnl5Q";

    fn jwk(value: serde_json::Value) -> JsonWebKey {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn rsa_key_supports_rsa_family_only() {
        let key = SigningKey::from_jwk(&jwk(json!({"kty": "RSA", "kid": "r1", "n": RSA_N, "e": "AQAB"}))).unwrap();
        assert_eq!(key.key_type, KeyType::Rsa);
        assert!(key.supports(Algorithm::RS256));
        assert!(key.supports(Algorithm::PS512));
        assert!(!key.supports(Algorithm::ES256));
        assert!(!key.supports(Algorithm::HS256));
    }

    #[test]
    fn pinned_alg_restricts_support() {
        let key = SigningKey::from_jwk(&jwk(
            json!({"kty": "RSA", "kid": "r1", "alg": "RS384", "n": RSA_N, "e": "AQAB"}),
        ))
        .unwrap();
        assert!(key.supports(Algorithm::RS384));
        assert!(!key.supports(Algorithm::RS256));
    }

    #[test]
    fn ec_key_matches_its_curve() {
        let key = SigningKey::from_jwk(&jwk(
            json!({"kty": "EC", "kid": "e1", "crv": "P-256", "x": EC_X, "y": EC_Y}),
        ))
        .unwrap();
        assert_eq!(key.key_type, KeyType::Ec(EcCurve::P256));
        assert!(key.supports(Algorithm::ES256));
        assert!(!key.supports(Algorithm::ES384));
    }

    #[test]
    fn unusable_jwks_report_why() {
        let err = SigningKey::from_jwk(&jwk(json!({"kty": "RSA", "kid": "r1", "n": RSA_N}))).err();
        assert!(matches!(err, Some(JwkError::MissingMember { kty: "RSA", member: "e" })));

        let err = SigningKey::from_jwk(&jwk(json!({"kty": "OKP", "kid": "ed", "x": EC_X}))).err();
        assert!(matches!(err, Some(JwkError::UnsupportedKeyType(kty)) if kty == "OKP"));

        let err = SigningKey::from_jwk(&jwk(
            json!({"kty": "EC", "kid": "k1", "crv": "secp256k1", "x": EC_X, "y": EC_Y}),
        ))
        .err();
        assert!(matches!(err, Some(JwkError::UnsupportedCurve(Some(crv))) if crv == "secp256k1"));

        let err = SigningKey::from_jwk(&jwk(
            json!({"kty": "RSA", "kid": "r1", "alg": "XS999", "n": RSA_N, "e": "AQAB"}),
        ))
        .err();
        assert!(matches!(err, Some(JwkError::UnsupportedAlgorithm(_))));
    }

    #[test]
    fn unusable_keys_are_skipped_not_fatal() {
        let jwks: JsonWebKeySet = serde_json::from_value(json!({
            "keys": [
                {"kty": "RSA", "kid": "good", "use": "sig", "n": RSA_N, "e": "AQAB"},
                {"kty": "RSA", "kid": "enc", "use": "enc", "n": RSA_N, "e": "AQAB"},
                {"kty": "RSA", "n": RSA_N, "e": "AQAB"},
                {"kty": "RSA", "kid": "no-exponent", "n": RSA_N},
                {"kty": "OKP", "kid": "ed", "crv": "Ed25519", "x": EC_X},
                {"kty": "EC", "kid": "k1", "crv": "secp256k1", "x": EC_X, "y": EC_Y}
            ]
        }))
        .unwrap();

        let set = SigningKeySet::from_jwks(jwks, Duration::from_secs(60));
        assert_eq!(set.len(), 1);
        assert!(set.contains("good"));
        assert!(set.get("enc").is_none());
    }

    #[test]
    fn empty_document_yields_empty_set() {
        let jwks: JsonWebKeySet = serde_json::from_value(json!({"keys": []})).unwrap();
        let set = SigningKeySet::from_jwks(jwks, Duration::from_secs(60));
        assert!(set.is_empty());
        assert_eq!(set.ttl(), Duration::from_secs(60));
    }
}
