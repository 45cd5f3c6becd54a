// src/validator/outcome.rs

use crate::provider::Provider;
use jsonwebtoken::Algorithm;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// The identity carried by a token that passed every check.
///
/// Serialises in the shape clients of the gateway expect
/// (`userId`, `email`, `name`, `provider`, `claims`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedIdentity {
    /// `sub`, falling back to Azure's `oid`; empty if neither is present.
    pub user_id: String,
    /// `email`, falling back to `preferred_username`; empty if neither is present.
    pub email: String,
    /// `name`, or empty.
    #[serde(rename = "name")]
    pub display_name: String,
    pub provider: Provider,
    /// Every claim of the payload. A claim name repeated in the raw payload
    /// keeps its last value.
    pub claims: HashMap<String, Value>,
}

impl VerifiedIdentity {
    pub(crate) fn from_claims(provider: Provider, claims: HashMap<String, Value>) -> Self {
        let text = |name: &str| claims.get(name).and_then(Value::as_str).map(str::to_string);

        let user_id = text("sub").or_else(|| text("oid")).unwrap_or_default();
        let email = text("email")
            .or_else(|| text("preferred_username"))
            .unwrap_or_default();
        let display_name = text("name").unwrap_or_default();

        Self {
            user_id,
            email,
            display_name,
            provider,
            claims,
        }
    }
}

/// Why a token was rejected. Expected and safe to show to clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("key resolution failed")]
    KeyResolutionFailed,
    #[error("unknown signing key")]
    UnknownSigningKey,
    #[error("unsupported algorithm: {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("issuer mismatch")]
    IssuerMismatch,
    #[error("audience mismatch")]
    AudienceMismatch,
    #[error("token expired")]
    TokenExpired,
    #[error("token not yet valid")]
    TokenNotYetValid,
    #[error("missing {0} claim")]
    MissingClaim(&'static str),
    #[error("malformed token: {0}")]
    MalformedToken(String),
}

impl ValidationFailure {
    /// Stable machine-readable code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationFailure::KeyResolutionFailed => "key_resolution_failed",
            ValidationFailure::UnknownSigningKey => "unknown_signing_key",
            ValidationFailure::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            ValidationFailure::InvalidSignature => "invalid_signature",
            ValidationFailure::IssuerMismatch => "issuer_mismatch",
            ValidationFailure::AudienceMismatch => "audience_mismatch",
            ValidationFailure::TokenExpired => "token_expired",
            ValidationFailure::TokenNotYetValid => "token_not_yet_valid",
            ValidationFailure::MissingClaim(_) => "missing_claim",
            ValidationFailure::MalformedToken(_) => "malformed_token",
        }
    }
}

/// The result of validating one token.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid(VerifiedIdentity),
    Invalid(ValidationFailure),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }

    pub fn identity(&self) -> Option<&VerifiedIdentity> {
        match self {
            ValidationOutcome::Valid(identity) => Some(identity),
            ValidationOutcome::Invalid(_) => None,
        }
    }

    pub fn into_identity(self) -> Option<VerifiedIdentity> {
        match self {
            ValidationOutcome::Valid(identity) => Some(identity),
            ValidationOutcome::Invalid(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ValidationFailure> {
        match self {
            ValidationOutcome::Valid(_) => None,
            ValidationOutcome::Invalid(failure) => Some(failure),
        }
    }

    /// Human-readable rejection reason, `None` for a valid token.
    pub fn reason(&self) -> Option<String> {
        self.failure().map(ToString::to_string)
    }
}
