// src/resolver.rs

use crate::client::JwksClient;
use crate::config::GatewayConfig;
use crate::error::NilaSsoError;
use crate::keys::SigningKeySet;
use crate::provider::Provider;
use moka::future::Cache;
use moka::Expiry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

const REFRESH_RETRY_BASE: Duration = Duration::from_secs(5);
const REFRESH_RETRY_MAX: Duration = Duration::from_secs(300);
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Expires each cached key set after its own TTL.
struct KeySetExpiry;

impl Expiry<Provider, Arc<SigningKeySet>> for KeySetExpiry {
    fn expire_after_create(
        &self,
        _provider: &Provider,
        keys: &Arc<SigningKeySet>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(keys.ttl())
    }

    fn expire_after_update(
        &self,
        _provider: &Provider,
        keys: &Arc<SigningKeySet>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(keys.ttl())
    }
}

/// Per-provider storage of fetched key sets.
///
/// Entries live for the TTL carried by the set (derived from the JWKS
/// response's `Cache-Control`, or the configured default). The cache is keyed
/// by provider only, so share one instance only between resolvers that point
/// at the same endpoints.
#[derive(Clone)]
pub struct KeyCache {
    sets: Cache<Provider, Arc<SigningKeySet>>,
}

impl KeyCache {
    pub fn new() -> Self {
        Self {
            sets: Cache::builder()
                .max_capacity(Provider::ALL.len() as u64)
                .expire_after(KeySetExpiry)
                .build(),
        }
    }

    pub async fn get(&self, provider: Provider) -> Option<Arc<SigningKeySet>> {
        self.sets.get(&provider).await
    }

    pub async fn insert(&self, provider: Provider, keys: Arc<SigningKeySet>) {
        self.sets.insert(provider, keys).await;
    }

    pub async fn invalidate(&self, provider: Provider) {
        self.sets.invalidate(&provider).await;
    }
}

impl Default for KeyCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves the current signing keys of each configured provider.
///
/// Cheap to clone; all clones share the same cache. Concurrent cold-cache
/// lookups for one provider are coalesced into a single JWKS request whose
/// result (keys or error) every waiter receives. Failures are never cached.
#[derive(Clone)]
pub struct KeyResolver {
    inner: Arc<Inner>,
}

struct Inner {
    client: JwksClient,
    endpoints: HashMap<Provider, Url>,
    cache: KeyCache,
    unknown_kid_refresh: Duration,
    // Serializes refresh-on-unknown-kid per provider.
    refresh_locks: HashMap<Provider, Mutex<()>>,
}

impl KeyResolver {
    /// Creates a resolver with its own, empty cache.
    pub fn new(config: &GatewayConfig) -> Result<Self, NilaSsoError> {
        Self::with_cache(config, KeyCache::new())
    }

    /// Creates a resolver over an existing cache.
    pub fn with_cache(config: &GatewayConfig, cache: KeyCache) -> Result<Self, NilaSsoError> {
        let client = JwksClient::new(config.key_cache.clone())?;
        let endpoints: HashMap<Provider, Url> = config
            .providers
            .iter()
            .map(|(provider, rules)| (*provider, rules.jwks_uri.clone()))
            .collect();
        let refresh_locks = endpoints.keys().map(|p| (*p, Mutex::new(()))).collect();

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                endpoints,
                cache,
                unknown_kid_refresh: config.key_cache.unknown_kid_refresh,
                refresh_locks,
            }),
        })
    }

    fn endpoint(&self, provider: Provider) -> Result<&Url, NilaSsoError> {
        self.inner
            .endpoints
            .get(&provider)
            .ok_or_else(|| NilaSsoError::UnsupportedProvider(provider.to_string()))
    }

    /// Returns the provider's key set, fetching it on a cache miss.
    ///
    /// # Errors
    ///
    /// `KeyResolution` when the fetch failed (never reported as an empty
    /// set), `UnsupportedProvider` when the provider has no endpoint.
    #[instrument(skip(self), err)]
    pub async fn resolve_keys(&self, provider: Provider) -> Result<Arc<SigningKeySet>, NilaSsoError> {
        let jwks_uri = self.endpoint(provider)?;

        if let Some(keys) = self.inner.cache.get(provider).await {
            debug!("JWKS cache hit for {}", provider);
            return Ok(keys);
        }

        debug!("JWKS cache miss for {}. Fetching from provider.", provider);
        self.inner
            .cache
            .sets
            .try_get_with(provider, async {
                self.inner.client.fetch(jwks_uri).await.map(Arc::new)
            })
            .await
            .map_err(|e| NilaSsoError::KeyResolution((*e).clone()))
    }

    /// Fetches the provider's key set now and replaces the cached one.
    ///
    /// On failure the previously cached set, if any, stays in place.
    #[instrument(skip(self), err)]
    pub async fn refresh_keys(&self, provider: Provider) -> Result<Arc<SigningKeySet>, NilaSsoError> {
        let jwks_uri = self.endpoint(provider)?;
        let keys = Arc::new(self.inner.client.fetch(jwks_uri).await?);
        self.inner.cache.insert(provider, keys.clone()).await;
        Ok(keys)
    }

    /// Resolves the provider's key set and makes sure it has had a chance to
    /// pick up `kid`. See [`keys_with_kid`](Self::keys_with_kid).
    pub async fn resolve_for_kid(
        &self,
        provider: Provider,
        kid: &str,
    ) -> Result<Arc<SigningKeySet>, NilaSsoError> {
        let current = self.resolve_keys(provider).await?;
        Ok(self.keys_with_kid(provider, current, kid).await)
    }

    /// Returns a set that should contain `kid`, refetching once if `current`
    /// lacks it and is older than the unknown-kid cooldown.
    ///
    /// Providers rotate keys ahead of cache expiry; this picks up a new key
    /// without waiting for the TTL while bounding how often a stream of
    /// forged kids can hit the provider. If the refetch fails, `current` is
    /// returned.
    pub async fn keys_with_kid(
        &self,
        provider: Provider,
        current: Arc<SigningKeySet>,
        kid: &str,
    ) -> Arc<SigningKeySet> {
        if current.contains(kid) {
            return current;
        }
        let Some(lock) = self.inner.refresh_locks.get(&provider) else {
            return current;
        };
        let _guard = lock.lock().await;

        // Another task may have refreshed while this one waited.
        let latest = self.inner.cache.get(provider).await.unwrap_or(current);
        if latest.contains(kid) || latest.age() < self.inner.unknown_kid_refresh {
            return latest;
        }

        info!(%provider, kid, "Unknown key id, refreshing JWKS");
        match self.refresh_keys(provider).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(%provider, error = %e, "JWKS refresh for unknown key id failed");
                latest
            }
        }
    }

    /// Whether a live key set is cached for `provider`.
    pub async fn is_cached(&self, provider: Provider) -> bool {
        self.inner.cache.get(provider).await.is_some()
    }

    /// The providers this resolver can fetch keys for.
    pub fn providers(&self) -> impl Iterator<Item = Provider> + '_ {
        self.inner.endpoints.keys().copied()
    }

    /// Resolves every configured provider once, returning how many succeeded.
    /// Failures are logged and left for lazy resolution.
    pub async fn warm_up(&self) -> usize {
        let mut ready = 0;
        for provider in Provider::ALL {
            if !self.inner.endpoints.contains_key(&provider) {
                continue;
            }
            match self.resolve_keys(provider).await {
                Ok(keys) => {
                    info!(%provider, keys = keys.len(), "Signing keys warmed up");
                    ready += 1;
                }
                Err(e) => warn!(%provider, error = %e, "Could not warm up signing keys"),
            }
        }
        ready
    }

    /// Spawns one task per provider that refreshes its key set before expiry.
    pub fn spawn_background_refresh(&self) -> Vec<JoinHandle<()>> {
        self.providers()
            .map(|provider| {
                let resolver = self.clone();
                tokio::spawn(async move {
                    resolver.key_refresh_loop(provider).await;
                })
            })
            .collect()
    }

    /// The main loop for the background key refresh task.
    async fn key_refresh_loop(&self, provider: Provider) {
        let mut current_retry_delay = REFRESH_RETRY_BASE;

        loop {
            let ttl = match self.refresh_keys(provider).await {
                Ok(keys) => {
                    current_retry_delay = REFRESH_RETRY_BASE;
                    keys.ttl()
                }
                Err(e) => {
                    error!(
                        "Failed to refresh {} JWKS in background: {}. Retrying in {:?}.",
                        provider, e, current_retry_delay
                    );
                    tokio::time::sleep(current_retry_delay).await;
                    current_retry_delay = (current_retry_delay * 2).min(REFRESH_RETRY_MAX);
                    continue;
                }
            };

            // Refresh at 80% of the TTL's lifetime.
            let refresh_interval = ttl.mul_f64(0.8).max(MIN_REFRESH_INTERVAL);
            debug!("{} JWKS background refresh scheduled in {:?}", provider, refresh_interval);
            tokio::time::sleep(refresh_interval).await;
        }
    }
}
