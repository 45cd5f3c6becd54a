// src/validator.rs

mod outcome;

pub use outcome::{ValidationFailure, ValidationOutcome, VerifiedIdentity};

use crate::config::{GatewayConfig, ProviderConfig};
use crate::error::NilaSsoError;
use crate::keys::SigningKeySet;
use crate::provider::Provider;
use crate::resolver::KeyResolver;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode_header, get_current_timestamp, Algorithm};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Validates bearer tokens issued by the configured identity providers.
///
/// Create it once at start-up and share it; it is cheap to clone and all
/// clones use the same key cache.
#[derive(Clone)]
pub struct TokenValidator {
    config: Arc<GatewayConfig>,
    resolver: KeyResolver,
}

// Decodes the payload segment without any verification.
fn decode_raw_payload_to_value(token: &str) -> Option<Value> {
    let payload_segment = token.split('.').nth(1)?;
    let decoded_payload_bytes = base64_url::decode(payload_segment).ok()?;
    serde_json::from_slice(&decoded_payload_bytes).ok()
}

/// Guesses which provider issued `token` from its unverified `iss` claim.
///
/// Falls back to [`Provider::Azure`] for anything it cannot read. The guess
/// only selects the validation rules; it is never a trust decision.
pub fn infer_provider(token: &str) -> Provider {
    decode_raw_payload_to_value(token)
        .as_ref()
        .and_then(|claims| claims.get("iss"))
        .and_then(Value::as_str)
        .and_then(Provider::from_issuer)
        .unwrap_or(Provider::Azure)
}

impl TokenValidator {
    /// Creates a validator with its own key resolver.
    pub fn new(config: GatewayConfig) -> Result<Self, NilaSsoError> {
        let resolver = KeyResolver::new(&config)?;
        Ok(Self::with_resolver(config, resolver))
    }

    /// Creates a validator that resolves keys through `resolver`.
    pub fn with_resolver(config: GatewayConfig, resolver: KeyResolver) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
        }
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// See [`infer_provider`].
    pub fn infer_provider(&self, token: &str) -> Provider {
        infer_provider(token)
    }

    /// Validates `token` against the rules and keys of `provider`.
    ///
    /// Every problem with the token itself, including an unreachable key
    /// endpoint, is reported as [`ValidationOutcome::Invalid`].
    ///
    /// # Arguments
    ///
    /// * `token` - The raw compact JWT, without the `Bearer ` prefix.
    /// * `provider` - The provider whose rules apply.
    ///
    /// # Errors
    ///
    /// `UnsupportedProvider` when `provider` is not configured.
    #[instrument(skip(self, token), err)]
    pub async fn validate(
        &self,
        token: &str,
        provider: Provider,
    ) -> Result<ValidationOutcome, NilaSsoError> {
        let rules = self
            .config
            .provider(provider)
            .ok_or_else(|| NilaSsoError::UnsupportedProvider(provider.to_string()))?;

        // 1. Resolve the provider's signing keys.
        let keys = match self.resolver.resolve_keys(provider).await {
            Ok(keys) => keys,
            Err(NilaSsoError::KeyResolution(e)) => {
                warn!(%provider, error = %e, "Rejecting token, signing keys unavailable");
                return Ok(ValidationOutcome::Invalid(ValidationFailure::KeyResolutionFailed));
            }
            Err(e) => return Err(e),
        };

        // 2. Verify signature and claims.
        match self.verify(token, provider, rules, keys).await {
            Ok(identity) => {
                debug!(%provider, user_id = %identity.user_id, "Token is valid");
                Ok(ValidationOutcome::Valid(identity))
            }
            Err(failure) => {
                warn!(%provider, reason = %failure, "Token rejected");
                Ok(ValidationOutcome::Invalid(failure))
            }
        }
    }

    /// Like [`validate`](Self::validate), with the provider given by name.
    ///
    /// # Errors
    ///
    /// `UnsupportedProvider` when the name is unknown or not configured. An
    /// explicit name is never replaced by inference.
    pub async fn validate_named(
        &self,
        token: &str,
        provider: &str,
    ) -> Result<ValidationOutcome, NilaSsoError> {
        let provider: Provider = provider.parse()?;
        self.validate(token, provider).await
    }

    /// Infers the provider from the token, then validates against it.
    pub async fn validate_inferred(&self, token: &str) -> Result<ValidationOutcome, NilaSsoError> {
        self.validate(token, infer_provider(token)).await
    }

    async fn verify(
        &self,
        token: &str,
        provider: Provider,
        rules: &ProviderConfig,
        keys: Arc<SigningKeySet>,
    ) -> Result<VerifiedIdentity, ValidationFailure> {
        // 1. Decode header to get kid and alg without validation.
        let header = decode_header(token).map_err(|e| ValidationFailure::MalformedToken(e.to_string()))?;
        let kid = header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or(ValidationFailure::UnknownSigningKey)?;

        // 2. Find the key, giving a rotated key one chance to show up.
        let keys = self.resolver.keys_with_kid(provider, keys, kid).await;
        let key = keys.get(kid).ok_or(ValidationFailure::UnknownSigningKey)?;

        // 3. The algorithm must be allowed and fit the key.
        if !self.config.validation.algorithms.contains(&header.alg) || !key.supports(header.alg) {
            return Err(ValidationFailure::UnsupportedAlgorithm(header.alg));
        }

        // 4. Verify the signature over `header.payload`, then read the
        //    payload ourselves. Claims are checked below so each failure gets
        //    its own reason, and a repeated claim name keeps its last value.
        let (message, signature) = signed_parts(token)?;
        let verified = jsonwebtoken::crypto::verify(signature, message.as_bytes(), &key.decoding_key, header.alg)
            .map_err(|e| rejection(e, header.alg))?;
        if !verified {
            return Err(ValidationFailure::InvalidSignature);
        }
        let claims = payload_claims(message)?;

        // 5. Issuer, audience and lifetime.
        check_issuer(&claims, rules)?;
        check_audience(&claims, rules)?;
        self.check_lifetime(&claims)?;

        Ok(VerifiedIdentity::from_claims(provider, claims))
    }

    fn check_lifetime(&self, claims: &HashMap<String, Value>) -> Result<(), ValidationFailure> {
        let now = get_current_timestamp() as f64;
        let leeway = self.config.validation.leeway.as_secs_f64();

        let exp = numeric_claim(claims, "exp")?.ok_or(ValidationFailure::MissingClaim("exp"))?;
        if exp + leeway <= now {
            return Err(ValidationFailure::TokenExpired);
        }
        if let Some(nbf) = numeric_claim(claims, "nbf")? {
            if nbf > now + leeway {
                return Err(ValidationFailure::TokenNotYetValid);
            }
        }
        Ok(())
    }
}

// Splits a compact JWS into its signed message and its signature.
fn signed_parts(token: &str) -> Result<(&str, &str), ValidationFailure> {
    let (message, signature) = token
        .rsplit_once('.')
        .ok_or_else(|| ValidationFailure::MalformedToken("expected three segments".to_string()))?;
    if message.matches('.').count() != 1 {
        return Err(ValidationFailure::MalformedToken("expected three segments".to_string()));
    }
    Ok((message, signature))
}

// Parses the payload segment of a verified message. Repeated names resolve
// to the last occurrence.
fn payload_claims(message: &str) -> Result<HashMap<String, Value>, ValidationFailure> {
    let payload = message.split_once('.').map(|(_, payload)| payload).unwrap_or_default();
    let bytes = base64_url::decode(payload)
        .map_err(|e| ValidationFailure::MalformedToken(format!("payload is not base64url: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ValidationFailure::MalformedToken(format!("payload is not a JSON object: {}", e)))
}

fn check_issuer(claims: &HashMap<String, Value>, rules: &ProviderConfig) -> Result<(), ValidationFailure> {
    match claims.get("iss").and_then(Value::as_str) {
        Some(iss) if iss == rules.issuer => Ok(()),
        _ => Err(ValidationFailure::IssuerMismatch),
    }
}

fn check_audience(claims: &HashMap<String, Value>, rules: &ProviderConfig) -> Result<(), ValidationFailure> {
    let matches = match claims.get("aud") {
        Some(Value::String(aud)) => *aud == rules.audience,
        Some(Value::Array(auds)) => auds.iter().any(|aud| aud.as_str() == Some(rules.audience.as_str())),
        _ => false,
    };
    if matches {
        Ok(())
    } else {
        Err(ValidationFailure::AudienceMismatch)
    }
}

fn numeric_claim(claims: &HashMap<String, Value>, name: &'static str) -> Result<Option<f64>, ValidationFailure> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| ValidationFailure::MalformedToken(format!("{} is not a number", name))),
    }
}

fn rejection(err: jsonwebtoken::errors::Error, alg: Algorithm) -> ValidationFailure {
    match err.kind() {
        ErrorKind::InvalidSignature => ValidationFailure::InvalidSignature,
        ErrorKind::InvalidAlgorithm | ErrorKind::MissingAlgorithm => ValidationFailure::UnsupportedAlgorithm(alg),
        _ => ValidationFailure::MalformedToken(err.to_string()),
    }
}
