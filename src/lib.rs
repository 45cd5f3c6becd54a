// src/lib.rs

//! Multi-provider bearer token validation for Azure AD, Okta and Auth0.
//!
//! A [`TokenValidator`](validator::TokenValidator) picks the provider a token
//! claims to come from, verifies its signature against that provider's
//! published JWKS (cached by a [`KeyResolver`](resolver::KeyResolver)) and
//! checks issuer, audience and lifetime. The [`server`] module exposes the
//! same checks as an HTTP API.

pub mod client;
pub mod config;
pub mod error;
pub mod keys;
pub mod model;
pub mod provider;
pub mod resolver;
pub mod server;
pub mod validator;

/// The public prelude for the `nila-sso` crate.
///
/// This module re-exports the most commonly used types for convenience.
pub mod prelude {
    pub use crate::config::{GatewayConfig, GatewayConfigBuilder, GatewayFileConfig, ProviderConfig, ProviderSettings};
    pub use crate::error::{KeyResolutionError, NilaSsoError};
    pub use crate::provider::Provider;
    pub use crate::resolver::{KeyCache, KeyResolver};
    pub use crate::validator::{infer_provider, TokenValidator, ValidationFailure, ValidationOutcome, VerifiedIdentity};
    pub use jsonwebtoken::Algorithm;
}
