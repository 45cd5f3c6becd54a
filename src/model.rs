// src/model.rs

use serde::Deserialize;

/// Represents a single JSON Web Key (JWK) as defined in RFC 7517.
///
/// Only the members needed to build a verification key are modelled; anything
/// else a provider publishes (`x5c`, `x5t`, `issuer`, ...) is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonWebKey {
    pub kty: String,
    pub kid: Option<String>,
    #[serde(rename = "use")]
    pub use_purpose: Option<String>,
    pub alg: Option<String>,
    // RSA
    pub n: Option<String>,
    pub e: Option<String>,
    // EC
    pub crv: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
}

/// Represents a JSON Web Key Set (JWKS), which is a collection of JWKs.
#[derive(Debug, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}
