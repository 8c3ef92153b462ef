// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Pool of free HTTP proxies, persisted between runs.
//!
//! Addresses come from public plain-text lists and are kept in the proxy
//! store for a day. An in-memory cache of valid addresses is refreshed every
//! few minutes. A proxy is probed before every hand-out and evicted on its
//! first failure. Callers never wait long: if no proxy is ready within a
//! second they get a direct connection instead.

use crate::config::{HarvesterConfig, DEFAULT_PROBE_URL, DEFAULT_PROXY_SOURCES};
use crate::model::ProxyEntry;
use crate::store::ProxyStore;
use anyhow::Result;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use rand::seq::SliceRandom;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

static PROXY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}:\d+$").expect("valid regex"));

/// `ip:port` entries of a newline-delimited list, de-duplicated in order.
pub fn parse_proxy_list(body: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    body.lines()
        .map(str::trim)
        .filter(|line| PROXY_LINE.is_match(line))
        .filter(|line| seen.insert(line.to_string()))
        .map(str::to_string)
        .collect()
}

/// Checks that a proxy can reach the outside world.
#[async_trait]
pub trait ProxyProbe: Send + Sync {
    async fn probe(&self, address: &str) -> bool;
}

/// Sends a `HEAD` request through the proxy to a known endpoint.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_URL)
    }
}

#[async_trait]
impl ProxyProbe for HttpProbe {
    async fn probe(&self, address: &str) -> bool {
        let result = async {
            let client = reqwest::Client::builder()
                .proxy(reqwest::Proxy::all(format!("http://{address}"))?)
                .timeout(self.timeout)
                .build()?;
            client.head(&self.url).send().await?.error_for_status()?;
            Ok::<_, reqwest::Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                debug!(proxy = address, "proxy validated");
                true
            }
            Err(e) => {
                warn!(proxy = address, "proxy validation failed: {e}");
                false
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxyPoolConfig {
    pub sources: Vec<String>,
    /// Below this many valid stored proxies, the sources are fetched again.
    pub min_proxies: usize,
    pub cache_ttl: Duration,
    pub entry_ttl: chrono::Duration,
    pub fetch_timeout: Duration,
    /// Upper bound on [`ProxyPool::acquire`].
    pub acquire_timeout: Duration,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            sources: DEFAULT_PROXY_SOURCES.iter().map(|s| s.to_string()).collect(),
            min_proxies: 10,
            cache_ttl: Duration::from_secs(5 * 60),
            entry_ttl: chrono::Duration::hours(24),
            fetch_timeout: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(1),
        }
    }
}

impl ProxyPoolConfig {
    pub fn from_config(config: &HarvesterConfig) -> Self {
        Self {
            sources: config.proxy_sources.clone(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct ProxyCache {
    addresses: Vec<String>,
    refreshed_at: Option<Instant>,
}

impl ProxyCache {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.refreshed_at.map_or(true, |at| at.elapsed() > ttl)
    }
}

type RefreshFuture = Shared<BoxFuture<'static, usize>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ProxyPool {
    store: Arc<dyn ProxyStore>,
    probe: Arc<dyn ProxyProbe>,
    config: ProxyPoolConfig,
    client: reqwest::Client,
    cache: Mutex<ProxyCache>,
    inflight: Mutex<Option<RefreshFuture>>,
}

impl ProxyPool {
    pub fn new(
        store: Arc<dyn ProxyStore>,
        probe: Arc<dyn ProxyProbe>,
        config: ProxyPoolConfig,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .unwrap_or_default();
        Self {
            store,
            probe,
            config,
            client,
            cache: Mutex::new(ProxyCache::default()),
            inflight: Mutex::new(None),
        }
    }

    /// Addresses currently in the memory cache.
    pub fn cached(&self) -> Vec<String> {
        lock(&self.cache).addresses.clone()
    }

    /// Reload the cache from the store, topping the store up from the
    /// sources when it runs low. Concurrent callers share one refresh.
    /// Returns the number of cached addresses.
    pub async fn refresh(self: &Arc<Self>) -> usize {
        let refresh = {
            let mut inflight = lock(&self.inflight);
            match inflight.as_ref() {
                Some(running) => running.clone(),
                None => {
                    let pool = Arc::clone(self);
                    let running = async move {
                        let count = pool.refresh_inner().await;
                        *lock(&pool.inflight) = None;
                        count
                    }
                    .boxed()
                    .shared();
                    *inflight = Some(running.clone());
                    running
                }
            }
        };
        refresh.await
    }

    async fn refresh_inner(&self) -> usize {
        let mut valid = self.valid_addresses();
        if valid.len() < self.config.min_proxies {
            info!(
                stored = valid.len(),
                minimum = self.config.min_proxies,
                "proxy store below minimum, fetching new proxies"
            );
            self.fetch_and_store().await;
            valid = self.valid_addresses();
        }

        let count = valid.len();
        let mut cache = lock(&self.cache);
        cache.addresses = valid;
        cache.refreshed_at = Some(Instant::now());
        info!(count, "proxy cache refreshed");
        count
    }

    fn valid_addresses(&self) -> Vec<String> {
        match self.store.list_valid(chrono::Utc::now()) {
            Ok(entries) => entries.into_iter().map(|e| e.address).collect(),
            Err(e) => {
                warn!("failed to list stored proxies: {e}");
                Vec::new()
            }
        }
    }

    /// Fetch every source independently and upsert what they list.
    async fn fetch_and_store(&self) {
        let mut found: Vec<String> = Vec::new();
        for source in &self.config.sources {
            match self.fetch_source(source).await {
                Ok(addresses) => {
                    debug!(source = %source, count = addresses.len(), "fetched proxy list");
                    for address in addresses {
                        if !found.contains(&address) {
                            found.push(address);
                        }
                    }
                }
                Err(e) => warn!(source = %source, "failed to fetch proxies: {e:#}"),
            }
        }
        if found.is_empty() {
            return;
        }

        let expires_at = chrono::Utc::now() + self.config.entry_ttl;
        let entries: Vec<ProxyEntry> = found
            .into_iter()
            .map(|address| ProxyEntry {
                address,
                expires_at,
                failure_count: 0,
            })
            .collect();
        match self.store.upsert_batch(&entries) {
            Ok(()) => info!(count = entries.len(), "stored fetched proxies"),
            Err(e) => warn!("failed to store proxies: {e}"),
        }
    }

    async fn fetch_source(&self, source: &str) -> Result<Vec<String>> {
        let body = self
            .client
            .get(source)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(parse_proxy_list(&body))
    }

    /// A probed proxy address, or `None` for a direct connection.
    pub async fn acquire(self: &Arc<Self>) -> Option<String> {
        match tokio::time::timeout(self.config.acquire_timeout, self.select_validated()).await {
            Ok(Some(address)) => Some(address),
            Ok(None) => {
                warn!("no proxies available, falling back to direct connection");
                None
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.acquire_timeout.as_millis() as u64,
                    "proxy resolution timed out, falling back to direct connection"
                );
                None
            }
        }
    }

    async fn select_validated(self: &Arc<Self>) -> Option<String> {
        loop {
            let candidate = self.pick_cached().await?;
            if self.probe.probe(&candidate).await {
                return Some(candidate);
            }
            self.evict(&candidate);
        }
    }

    /// A random cached address, refreshing first when the cache is empty.
    /// A stale but non-empty cache is refreshed in the background.
    async fn pick_cached(self: &Arc<Self>) -> Option<String> {
        let (empty, stale) = {
            let cache = lock(&self.cache);
            (cache.addresses.is_empty(), cache.is_stale(self.config.cache_ttl))
        };
        if empty {
            // Spawned so a caller timing out does not stall the refresh.
            let pool = Arc::clone(self);
            if let Err(e) = tokio::spawn(async move { pool.refresh().await }).await {
                warn!("proxy refresh task failed: {e}");
            }
        } else if stale {
            let pool = Arc::clone(self);
            tokio::spawn(async move {
                pool.refresh().await;
            });
        }

        let cache = lock(&self.cache);
        cache.addresses.choose(&mut rand::thread_rng()).cloned()
    }

    fn evict(&self, address: &str) {
        match self.store.increment_failure(address) {
            Ok(failures) if failures >= 1 => {
                if let Err(e) = self.store.delete(address) {
                    warn!(proxy = address, "failed to delete proxy: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(proxy = address, "failed to record proxy failure: {e}"),
        }
        lock(&self.cache).addresses.retain(|a| a != address);
        debug!(proxy = address, "evicted proxy");
    }

    /// Refresh now and then every cache TTL until the handle is aborted.
    pub fn start_background_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.cache_ttl);
            loop {
                ticker.tick().await;
                pool.refresh().await;
            }
        })
    }
}

/// An HTTP client routed through a pooled proxy when one is ready, or
/// direct otherwise.
pub async fn http_client(
    pool: Option<&Arc<ProxyPool>>,
    timeout: Duration,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if let Some(pool) = pool {
        if let Some(address) = pool.acquire().await {
            builder = builder.proxy(reqwest::Proxy::all(format!("http://{address}"))?);
        }
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe {
        good: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ProxyProbe for FixedProbe {
        async fn probe(&self, address: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            address == self.good
        }
    }

    fn offline_config() -> ProxyPoolConfig {
        ProxyPoolConfig {
            sources: Vec::new(),
            ..ProxyPoolConfig::default()
        }
    }

    fn entry(address: &str) -> ProxyEntry {
        ProxyEntry {
            address: address.into(),
            expires_at: chrono::Utc::now() + chrono::Duration::hours(1),
            failure_count: 0,
        }
    }

    #[test]
    fn test_parse_proxy_list() {
        let body = "1.2.3.4:8080\r\n  5.6.7.8:3128 \nnot-a-proxy\n1.2.3.4:8080\n1.2.3:80\n";
        assert_eq!(parse_proxy_list(body), vec!["1.2.3.4:8080", "5.6.7.8:3128"]);
    }

    #[tokio::test]
    async fn test_empty_pool_gives_direct_connection() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let probe = Arc::new(FixedProbe {
            good: "",
            calls: AtomicUsize::new(0),
        });
        let pool = Arc::new(ProxyPool::new(store, probe.clone(), offline_config()));

        assert_eq!(pool.acquire().await, None);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_proxy_is_evicted() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.upsert_batch(&[entry("10.0.0.1:80")]).unwrap();
        let probe = Arc::new(FixedProbe {
            good: "10.0.0.2:80",
            calls: AtomicUsize::new(0),
        });
        let pool = Arc::new(ProxyPool::new(store.clone(), probe.clone(), offline_config()));

        assert_eq!(pool.acquire().await, None);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert!(store.list_valid(chrono::Utc::now()).unwrap().is_empty());
        assert!(pool.cached().is_empty());

        store.upsert_batch(&[entry("10.0.0.2:80")]).unwrap();
        assert_eq!(pool.refresh().await, 1);
        assert_eq!(pool.acquire().await.as_deref(), Some("10.0.0.2:80"));
    }
}
