// src/client.rs

use crate::config::KeyCacheSettings;
use crate::error::{KeyResolutionError, NilaSsoError};
use crate::keys::SigningKeySet;
use crate::model::JsonWebKeySet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Fetches JSON Web Key Sets over HTTP.
///
/// The client is stateless beyond its connection pool; caching is the job of
/// [`KeyResolver`](crate::resolver::KeyResolver).
#[derive(Clone)]
pub struct JwksClient {
    http_client: reqwest::Client,
    settings: KeyCacheSettings,
}

impl JwksClient {
    /// Creates a new `JwksClient` whose requests time out after
    /// `settings.fetch_timeout`.
    pub fn new(settings: KeyCacheSettings) -> Result<Self, NilaSsoError> {
        let http_client = reqwest::Client::builder()
            .timeout(settings.fetch_timeout)
            .build()?;
        Ok(Self { http_client, settings })
    }

    /// Fetches the key set at `jwks_uri`, retrying transient failures up to
    /// `max_retries` times with exponential backoff capped at the fetch
    /// timeout.
    #[instrument(skip(self, jwks_uri), fields(jwks_uri = %jwks_uri), err)]
    pub async fn fetch(&self, jwks_uri: &Url) -> Result<SigningKeySet, KeyResolutionError> {
        let mut delay = self.settings.retry_backoff;
        let mut attempt = 0;
        loop {
            match self.fetch_once(jwks_uri).await {
                Ok(set) => return Ok(set),
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "JWKS fetch failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    delay = next_backoff(delay, self.settings.fetch_timeout);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, jwks_uri: &Url) -> Result<SigningKeySet, KeyResolutionError> {
        let url = jwks_uri.as_str();
        let response = self
            .http_client
            .get(jwks_uri.clone())
            .send()
            .await
            .map_err(|e| KeyResolutionError::from_reqwest(url, e))?;

        if !response.status().is_success() {
            return Err(KeyResolutionError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let ttl = parse_cache_control(response.headers())
            .map(|max_age| self.settings.clamp_ttl(max_age))
            .unwrap_or_else(|| self.settings.clamp_ttl(self.settings.default_ttl));

        let body = response
            .bytes()
            .await
            .map_err(|e| KeyResolutionError::from_reqwest(url, e))?;
        let jwks: JsonWebKeySet = serde_json::from_slice(&body).map_err(|e| KeyResolutionError::MalformedJwks {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let published = jwks.keys.len();
        let set = SigningKeySet::from_jwks(jwks, ttl);
        if set.is_empty() {
            warn!(published, "JWKS contains no usable signing keys");
        } else {
            info!(published, usable = set.len(), "Successfully fetched keys. Caching with TTL: {:?}", ttl);
        }
        debug!(kids = ?set.key_ids().collect::<Vec<_>>(), "Key IDs in set");
        Ok(set)
    }
}

/// Parses the `Cache-Control` header to determine the TTL.
///
/// `no-store` and `no-cache` map to a zero TTL, which the caller clamps to the
/// configured minimum.
pub(crate) fn parse_cache_control(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let value = headers.get(reqwest::header::CACHE_CONTROL)?.to_str().ok()?;
    let mut max_age = None;
    for part in value.split(',') {
        let part = part.trim();
        if part.eq_ignore_ascii_case("no-store") || part.eq_ignore_ascii_case("no-cache") {
            return Some(Duration::ZERO);
        }
        if let Some(secs) = part.strip_prefix("max-age=") {
            max_age = secs.trim_matches('"').parse::<u64>().ok().map(Duration::from_secs);
        }
    }
    max_age
}

// Doubles the retry delay without exceeding `cap`.
fn next_backoff(delay: Duration, cap: Duration) -> Duration {
    delay.saturating_mul(2).min(cap)
}
