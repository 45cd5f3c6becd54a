// src/server/handlers.rs

use super::error::ApiError;
use super::AppState;
use crate::provider::Provider;
use crate::validator::{ValidationOutcome, VerifiedIdentity};
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of every token validation response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTokenResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<VerifiedIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ValidationOutcome> for ValidateTokenResponse {
    fn from(outcome: ValidationOutcome) -> Self {
        match outcome {
            ValidationOutcome::Valid(identity) => Self::valid(identity),
            ValidationOutcome::Invalid(failure) => Self {
                is_valid: false,
                message: None,
                user: None,
                error: Some(failure.to_string()),
            },
        }
    }
}

impl ValidateTokenResponse {
    fn valid(identity: VerifiedIdentity) -> Self {
        Self {
            is_valid: true,
            message: Some("Token is valid".to_string()),
            user: Some(identity),
            error: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateTokenRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub provider: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub supported_providers: Vec<Provider>,
    /// `cached` or `cold` per configured provider.
    pub key_sets: BTreeMap<String, &'static str>,
}

/// `GET /api/auth/validate`, behind the bearer middleware.
pub async fn validate(Extension(identity): Extension<VerifiedIdentity>) -> Json<ValidateTokenResponse> {
    Json(ValidateTokenResponse::valid(identity))
}

/// `GET /api/auth/user`, behind the bearer middleware.
pub async fn current_user(Extension(identity): Extension<VerifiedIdentity>) -> Json<VerifiedIdentity> {
    Json(identity)
}

/// `POST /api/auth/validate-external`
///
/// Validates a token handed over in the body. An explicit provider name is
/// used as given; otherwise it is inferred from the token. A rejected token
/// is still a 200 with `isValid: false`.
pub async fn validate_external(
    State(state): State<AppState>,
    Json(request): Json<ValidateTokenRequest>,
) -> Result<Json<ValidateTokenResponse>, ApiError> {
    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::bad_request("Token is required"));
    }

    let outcome = match request.provider.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => state.validator.validate_named(token, name).await?,
        _ => state.validator.validate_inferred(token).await?,
    };
    Ok(Json(outcome.into()))
}

/// `GET /api/auth/health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let resolver = state.validator.resolver();
    let mut supported_providers = Vec::new();
    let mut key_sets = BTreeMap::new();

    for provider in Provider::ALL {
        if state.validator.config().provider(provider).is_none() {
            continue;
        }
        let status = if resolver.is_cached(provider).await { "cached" } else { "cold" };
        supported_providers.push(provider);
        key_sets.insert(provider.to_string(), status);
    }

    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        supported_providers,
        key_sets,
    })
}
