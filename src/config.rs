// src/config.rs

use crate::error::NilaSsoError;
use crate::provider::Provider;
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const AZURE_AUTHORITY: &str = "https://login.microsoftonline.com";
const OKTA_DEFAULT_AUDIENCE: &str = "api://default";

/// The validation rules of one identity provider.
///
/// Built once at start-up and shared read-only by every validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Exact value the `iss` claim must carry.
    pub issuer: String,
    /// Value the `aud` claim must equal (or contain, for array audiences).
    pub audience: String,
    /// Where the provider publishes its JSON Web Key Set.
    pub jwks_uri: Url,
}

impl ProviderConfig {
    /// Creates a config from already-resolved values.
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        jwks_uri: &str,
    ) -> Result<Self, NilaSsoError> {
        let jwks_uri = Url::parse(jwks_uri).map_err(|e| NilaSsoError::InvalidUrl(e.to_string()))?;
        Ok(Self {
            issuer: issuer.into(),
            audience: audience.into(),
            jwks_uri,
        })
    }
}

/// The per-provider configuration surface, as operators write it.
///
/// Each provider interprets the fields slightly differently:
///
/// * Azure: `tenant_or_issuer` is the tenant id, `client_id_or_audience` the
///   application (client) id.
/// * Okta: `tenant_or_issuer` is the authorization server issuer URL,
///   `client_id_or_audience` defaults to `api://default`.
/// * Auth0: `tenant_or_issuer` is the tenant domain, `client_id_or_audience`
///   the API identifier.
///
/// `discovery_base_url` replaces the host part the key set is fetched from
/// (sovereign clouds, custom domains). `issuer` and `jwks_uri` override the
/// derived values outright.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderSettings {
    pub tenant_or_issuer: Option<String>,
    pub client_id_or_audience: Option<String>,
    pub discovery_base_url: Option<String>,
    pub issuer: Option<String>,
    pub jwks_uri: Option<String>,
}

impl ProviderSettings {
    /// Derives the validation rules for `provider` from these settings.
    ///
    /// # Errors
    ///
    /// `MissingConfiguration` when a field the provider needs is absent,
    /// `InvalidUrl` when a derived or supplied URL does not parse.
    pub fn into_provider_config(self, provider: Provider) -> Result<ProviderConfig, NilaSsoError> {
        let tenant_or_issuer = non_empty(self.tenant_or_issuer);
        let audience = non_empty(self.client_id_or_audience);
        let base = non_empty(self.discovery_base_url).map(|b| b.trim_end_matches('/').to_string());

        let missing = |field: &str| NilaSsoError::MissingConfiguration(format!("{}.{}", provider, field));

        let (issuer, audience, jwks_uri) = match provider {
            Provider::Azure => {
                let tenant = tenant_or_issuer.ok_or_else(|| missing("tenant_or_issuer"))?;
                let audience = audience.ok_or_else(|| missing("client_id_or_audience"))?;
                let base = base.unwrap_or_else(|| AZURE_AUTHORITY.to_string());
                (
                    format!("{}/{}/v2.0", AZURE_AUTHORITY, tenant),
                    audience,
                    format!("{}/{}/discovery/v2.0/keys", base, tenant),
                )
            }
            Provider::Okta => {
                let issuer = tenant_or_issuer.ok_or_else(|| missing("tenant_or_issuer"))?;
                let issuer = issuer.trim_end_matches('/').to_string();
                let audience = audience.unwrap_or_else(|| OKTA_DEFAULT_AUDIENCE.to_string());
                let base = base.unwrap_or_else(|| issuer.clone());
                (issuer, audience, format!("{}/v1/keys", base))
            }
            Provider::Auth0 => {
                let domain = tenant_or_issuer.ok_or_else(|| missing("tenant_or_issuer"))?;
                let domain = domain
                    .trim_start_matches("https://")
                    .trim_end_matches('/')
                    .to_string();
                let audience = audience.ok_or_else(|| missing("client_id_or_audience"))?;
                let base = base.unwrap_or_else(|| format!("https://{}", domain));
                (
                    format!("https://{}/", domain),
                    audience,
                    format!("{}/.well-known/jwks.json", base),
                )
            }
        };

        let issuer = non_empty(self.issuer).unwrap_or(issuer);
        let jwks_uri = non_empty(self.jwks_uri).unwrap_or(jwks_uri);
        ProviderConfig::new(issuer, audience, &jwks_uri)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// How signing key sets are fetched and cached.
#[derive(Debug, Clone)]
pub struct KeyCacheSettings {
    /// TTL used when the JWKS response carries no `Cache-Control: max-age`.
    pub default_ttl: Duration,
    /// Lower clamp for any TTL, including `max-age=0`.
    pub min_ttl: Duration,
    /// Upper clamp for any TTL.
    pub max_ttl: Duration,
    /// Timeout applied to every JWKS request.
    pub fetch_timeout: Duration,
    /// Retries after the first attempt, only for transient failures.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further one, up to
    /// `fetch_timeout`.
    pub retry_backoff: Duration,
    /// Minimum age of a cached set before an unknown `kid` may trigger a refetch.
    pub unknown_kid_refresh: Duration,
    /// Whether the gateway binary proactively refreshes key sets.
    pub background_refresh: bool,
}

/// Upper bound on `KeyCacheSettings::max_retries`.
pub const MAX_FETCH_RETRIES: u32 = 5;

impl Default for KeyCacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(60 * 60),
            min_ttl: Duration::from_secs(30),
            max_ttl: Duration::from_secs(24 * 60 * 60),
            fetch_timeout: Duration::from_secs(10),
            max_retries: 0,
            retry_backoff: Duration::from_millis(250),
            unknown_kid_refresh: Duration::from_secs(30),
            background_refresh: false,
        }
    }
}

impl KeyCacheSettings {
    /// Clamps a TTL into `[min_ttl, max_ttl]`.
    pub fn clamp_ttl(&self, ttl: Duration) -> Duration {
        ttl.max(self.min_ttl).min(self.max_ttl)
    }
}

/// Token checks shared by every provider.
#[derive(Debug, Clone)]
pub struct ValidationDetails {
    /// The signing algorithms that are permitted. Tokens signed with any other
    /// algorithm are rejected. Symmetric algorithms are never accepted since
    /// providers publish public keys only.
    pub algorithms: Vec<Algorithm>,
    /// Tolerance applied to `exp` and `nbf`. Zero unless configured.
    pub leeway: Duration,
}

impl Default for ValidationDetails {
    fn default() -> Self {
        Self {
            algorithms: vec![
                Algorithm::RS256,
                Algorithm::RS384,
                Algorithm::RS512,
                Algorithm::PS256,
                Algorithm::PS384,
                Algorithm::PS512,
                Algorithm::ES256,
                Algorithm::ES384,
            ],
            leeway: Duration::ZERO,
        }
    }
}

/// Everything the validator and resolver need, assembled by [`GatewayConfigBuilder`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub providers: HashMap<Provider, Arc<ProviderConfig>>,
    pub key_cache: KeyCacheSettings,
    pub validation: ValidationDetails,
}

impl GatewayConfig {
    /// The configured rules for `provider`, if it is enabled.
    pub fn provider(&self, provider: Provider) -> Option<&Arc<ProviderConfig>> {
        self.providers.get(&provider)
    }
}

/// A builder for creating a `GatewayConfig` instance.
#[derive(Default)]
pub struct GatewayConfigBuilder {
    providers: HashMap<Provider, Arc<ProviderConfig>>,
    key_cache: KeyCacheSettings,
    validation: ValidationDetails,
}

impl GatewayConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables `provider` with already-resolved rules.
    pub fn provider(mut self, provider: Provider, config: ProviderConfig) -> Self {
        self.providers.insert(provider, Arc::new(config));
        self
    }

    /// Enables `provider` from the operator-facing settings surface.
    pub fn provider_settings(
        self,
        provider: Provider,
        settings: ProviderSettings,
    ) -> Result<Self, NilaSsoError> {
        let config = settings.into_provider_config(provider)?;
        Ok(self.provider(provider, config))
    }

    /// Sets the fallback TTL for cached key sets.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.key_cache.default_ttl = ttl;
        self
    }

    /// Sets the TTL clamp bounds.
    pub fn ttl_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.key_cache.min_ttl = min;
        self.key_cache.max_ttl = max;
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.key_cache.fetch_timeout = timeout;
        self
    }

    /// Sets bounded retries for transient JWKS fetch failures.
    pub fn retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.key_cache.max_retries = max_retries;
        self.key_cache.retry_backoff = backoff;
        self
    }

    pub fn unknown_kid_refresh(mut self, cooldown: Duration) -> Self {
        self.key_cache.unknown_kid_refresh = cooldown;
        self
    }

    pub fn background_refresh(mut self, enabled: bool) -> Self {
        self.key_cache.background_refresh = enabled;
        self
    }

    /// Sets the allowed signing algorithms.
    pub fn algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.validation.algorithms = algorithms;
        self
    }

    /// Sets the clock skew tolerance for `exp` and `nbf`. Defaults to zero.
    pub fn leeway(mut self, leeway: Duration) -> Self {
        self.validation.leeway = leeway;
        self
    }

    /// Consumes the builder and returns a `GatewayConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is enabled, no asymmetric algorithm is
    /// allowed, or the cache bounds are inconsistent.
    pub fn build(self) -> Result<GatewayConfig, NilaSsoError> {
        if self.providers.is_empty() {
            return Err(NilaSsoError::MissingConfiguration("providers".to_string()));
        }
        if self.validation.algorithms.is_empty() {
            return Err(NilaSsoError::InvalidConfiguration(
                "at least one signing algorithm must be allowed".to_string(),
            ));
        }
        if let Some(alg) = self
            .validation
            .algorithms
            .iter()
            .find(|alg| matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512))
        {
            return Err(NilaSsoError::InvalidConfiguration(format!(
                "symmetric algorithm {:?} cannot be verified against a JWKS",
                alg
            )));
        }
        if self.key_cache.min_ttl.is_zero() {
            return Err(NilaSsoError::InvalidConfiguration(
                "key cache min_ttl must be greater than zero".to_string(),
            ));
        }
        if self.key_cache.min_ttl > self.key_cache.max_ttl {
            return Err(NilaSsoError::InvalidConfiguration(
                "key cache min_ttl is greater than max_ttl".to_string(),
            ));
        }
        if self.key_cache.max_retries > MAX_FETCH_RETRIES {
            return Err(NilaSsoError::InvalidConfiguration(format!(
                "key cache max_retries must be at most {}",
                MAX_FETCH_RETRIES
            )));
        }
        if self.key_cache.fetch_timeout.is_zero() {
            return Err(NilaSsoError::InvalidConfiguration(
                "fetch timeout must be greater than zero".to_string(),
            ));
        }

        Ok(GatewayConfig {
            providers: self.providers,
            key_cache: self.key_cache,
            validation: self.validation,
        })
    }
}

/// The gateway configuration file.
///
/// ```yaml
/// listen_addr: "0.0.0.0:5000"
/// providers:
///   azure:
///     tenant_or_issuer: "00000000-0000-0000-0000-000000000000"
///     client_id_or_audience: "11111111-1111-1111-1111-111111111111"
///   okta:
///     tenant_or_issuer: "https://dev-123456.okta.com/oauth2/default"
/// key_cache:
///   ttl_seconds: 3600
/// validation:
///   leeway_seconds: 0
/// logging:
///   level: info
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayFileConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub providers: HashMap<String, ProviderSettings>,
    #[serde(default)]
    pub key_cache: KeyCacheFileConfig,
    #[serde(default)]
    pub validation: ValidationFileConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeyCacheFileConfig {
    pub ttl_seconds: Option<u64>,
    pub min_ttl_seconds: Option<u64>,
    pub max_ttl_seconds: Option<u64>,
    pub fetch_timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_backoff_millis: Option<u64>,
    pub unknown_kid_refresh_seconds: Option<u64>,
    #[serde(default)]
    pub background_refresh: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidationFileConfig {
    pub algorithms: Option<Vec<Algorithm>>,
    pub leeway_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl GatewayFileConfig {
    /// Reads and parses a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NilaSsoError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| NilaSsoError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, NilaSsoError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Applies the file's settings to a [`GatewayConfigBuilder`] and builds it.
    pub fn to_gateway_config(&self) -> Result<GatewayConfig, NilaSsoError> {
        let mut builder = GatewayConfigBuilder::new();

        for (name, settings) in &self.providers {
            let provider: Provider = name.parse()?;
            builder = builder.provider_settings(provider, settings.clone())?;
        }

        let cache = &self.key_cache;
        if let Some(ttl) = cache.ttl_seconds {
            builder = builder.cache_ttl(Duration::from_secs(ttl));
        }
        if cache.min_ttl_seconds.is_some() || cache.max_ttl_seconds.is_some() {
            let defaults = KeyCacheSettings::default();
            builder = builder.ttl_bounds(
                cache.min_ttl_seconds.map(Duration::from_secs).unwrap_or(defaults.min_ttl),
                cache.max_ttl_seconds.map(Duration::from_secs).unwrap_or(defaults.max_ttl),
            );
        }
        if let Some(timeout) = cache.fetch_timeout_seconds {
            builder = builder.fetch_timeout(Duration::from_secs(timeout));
        }
        if cache.max_retries.is_some() || cache.retry_backoff_millis.is_some() {
            let defaults = KeyCacheSettings::default();
            builder = builder.retries(
                cache.max_retries.unwrap_or(defaults.max_retries),
                cache
                    .retry_backoff_millis
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.retry_backoff),
            );
        }
        if let Some(cooldown) = cache.unknown_kid_refresh_seconds {
            builder = builder.unknown_kid_refresh(Duration::from_secs(cooldown));
        }
        builder = builder.background_refresh(cache.background_refresh);

        if let Some(algorithms) = &self.validation.algorithms {
            builder = builder.algorithms(algorithms.clone());
        }
        if let Some(leeway) = self.validation.leeway_seconds {
            builder = builder.leeway(Duration::from_secs(leeway));
        }

        builder.build()
    }
}
