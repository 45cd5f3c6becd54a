// src/server/mod.rs

//! The HTTP surface of the gateway.

mod auth;
mod error;
mod handlers;

pub use auth::{bearer_token, require_bearer};
pub use error::ApiError;
pub use handlers::{HealthResponse, ValidateTokenRequest, ValidateTokenResponse};

use crate::validator::TokenValidator;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub validator: TokenValidator,
}

impl AppState {
    pub fn new(validator: TokenValidator) -> Self {
        Self { validator }
    }
}

/// Builds the `/api/auth` router.
pub fn router(state: AppState) -> Router {
    let authenticated = Router::new()
        .route("/validate", get(handlers::validate))
        .route("/user", get(handlers::current_user))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    let public = Router::new()
        .route("/validate-external", post(handlers::validate_external))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/auth", authenticated.merge(public))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
