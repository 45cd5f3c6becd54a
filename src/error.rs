// src/error.rs

use thiserror::Error;

/// The primary error type for the `nila-sso` library.
///
/// These are faults: they signal a deployment or programming problem rather
/// than an untrusted token. Per-token problems never show up here, they are
/// reported as [`ValidationOutcome::Invalid`](crate::validator::ValidationOutcome).
#[derive(Debug, Error)]
pub enum NilaSsoError {
    /// A provider name or value that has no configuration in this gateway.
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// A required configuration field is missing.
    #[error("A required configuration field is missing: {0}")]
    MissingConfiguration(String),

    /// A configuration value is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A provided URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The configuration file could not be read.
    #[error("Failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for the gateway schema.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// The HTTP client used for key fetches could not be built.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The signing keys of a provider could not be fetched.
    #[error(transparent)]
    KeyResolution(#[from] KeyResolutionError),
}

/// Failure to obtain a provider's signing key set.
///
/// This is transient by nature (the discovery endpoint is down, slow or
/// returning garbage) and is distinct from a provider that publishes zero keys.
/// It is `Clone` because every caller waiting on a coalesced fetch receives it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyResolutionError {
    /// The request could not be sent or the connection failed.
    #[error("HTTP request to {url} failed: {message}")]
    Http { url: String, message: String },

    /// The endpoint did not answer within the configured fetch timeout.
    #[error("Timed out fetching JWKS from {url}")]
    Timeout { url: String },

    /// The endpoint answered with a non-success status.
    #[error("JWKS endpoint {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body is not a JSON Web Key Set.
    #[error("Malformed JWKS document from {url}: {message}")]
    MalformedJwks { url: String, message: String },
}

/// Why a published JWK cannot be used to verify signatures.
///
/// Such keys are skipped when a key set is built; the error only ends up in
/// the log.
#[derive(Debug, Error)]
pub enum JwkError {
    #[error("unsupported alg '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("unsupported key type '{0}'")]
    UnsupportedKeyType(String),

    #[error("unsupported EC curve {0:?}")]
    UnsupportedCurve(Option<String>),

    /// A required public key member (`n`, `e`, `x` or `y`) is absent.
    #[error("{kty} key missing '{member}'")]
    MissingMember { kty: &'static str, member: &'static str },

    #[error("invalid key material: {0}")]
    InvalidKeyFormat(#[from] jsonwebtoken::errors::Error),
}

impl KeyResolutionError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            KeyResolutionError::Http { .. } | KeyResolutionError::Timeout { .. } => true,
            KeyResolutionError::Status { status, .. } => *status >= 500 || *status == 429,
            KeyResolutionError::MalformedJwks { .. } => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            KeyResolutionError::Timeout { url: url.to_string() }
        } else if err.is_decode() {
            KeyResolutionError::MalformedJwks {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else {
            KeyResolutionError::Http {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        let status = |status| KeyResolutionError::Status { url: "https://idp/keys".into(), status };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(404).is_transient());
        assert!(KeyResolutionError::Timeout { url: "https://idp/keys".into() }.is_transient());
        assert!(!KeyResolutionError::MalformedJwks {
            url: "https://idp/keys".into(),
            message: "expected value".into()
        }
        .is_transient());
    }

    #[test]
    fn jwk_errors_name_the_problem() {
        let missing = JwkError::MissingMember { kty: "RSA", member: "e" };
        assert_eq!(missing.to_string(), "RSA key missing 'e'");
        assert_eq!(
            JwkError::UnsupportedCurve(Some("secp256k1".into())).to_string(),
            "unsupported EC curve Some(\"secp256k1\")"
        );
    }

    #[test]
    fn key_resolution_converts_into_crate_error() {
        let err: NilaSsoError = KeyResolutionError::Timeout { url: "https://idp/keys".into() }.into();
        assert_eq!(err.to_string(), "Timed out fetching JWKS from https://idp/keys");
    }
}
