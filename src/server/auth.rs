// src/server/auth.rs

use super::error::ApiError;
use super::AppState;
use crate::error::NilaSsoError;
use crate::validator::ValidationOutcome;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

const NO_TOKEN: &str = "No token provided";

/// Reads the bearer token from the `Authorization` header.
///
/// The `Bearer ` prefix is stripped when present. Returns `None` for a
/// missing, non-ASCII or empty header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

/// Authenticates the request against the provider its token names.
///
/// The provider is inferred per request from the token's issuer, then the
/// token is validated with that provider's rules. On success the
/// [`VerifiedIdentity`](crate::validator::VerifiedIdentity) is added to the
/// request extensions.
pub async fn require_bearer(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return ApiError::unauthorized(NO_TOKEN).into_response();
    };

    let outcome = state.validator.validate_inferred(token).await;

    match outcome {
        Ok(ValidationOutcome::Valid(identity)) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Ok(ValidationOutcome::Invalid(failure)) => ApiError::unauthorized(failure.to_string()).into_response(),
        // The client did not pick the provider, so an unconfigured one is
        // still an authentication failure.
        Err(NilaSsoError::UnsupportedProvider(name)) => {
            ApiError::unauthorized(format!("Unsupported provider: {}", name)).into_response()
        }
        Err(fault) => ApiError::from(fault).into_response(),
    }
}
