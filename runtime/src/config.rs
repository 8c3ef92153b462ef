// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration read from `HARVESTER_*` environment variables.

use crate::retry::RetryPolicy;
use crate::strategy::portfolio::{DEFAULT_BASE_URL, DEFAULT_SITE_NAME};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 7800;
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_PROBE_URL: &str = "https://api.ipify.org";
pub const DEFAULT_PROXY_SOURCES: &[&str] = &[
    "https://api.proxyscrape.com/v2/?request=getproxies&protocol=http&timeout=10000&country=all",
    "https://www.proxy-list.download/api/v1/get?type=http",
    "https://proxy.webshare.io/api/v2/proxy/list/download/",
];

/// Timing and limits of one crawl.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub navigation_timeout: Duration,
    pub navigation_retry: RetryPolicy,
    pub scroll_delay: Duration,
    pub max_scrolls: u32,
    /// Wait for table rows after each scroll.
    pub content_wait: Duration,
    pub table_change_timeout: Duration,
    pub table_poll_interval: Duration,
    /// Minimum pause between asset classes; a random jitter is added.
    pub asset_class_pause: Duration,
    pub asset_class_jitter: Duration,
    /// Safety cap on pages per asset class.
    pub max_pages: u32,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(30),
            navigation_retry: RetryPolicy::default(),
            scroll_delay: Duration::from_secs(2),
            max_scrolls: 20,
            content_wait: Duration::from_secs(5),
            table_change_timeout: Duration::from_secs(5),
            table_poll_interval: Duration::from_millis(100),
            asset_class_pause: Duration::from_millis(1000),
            asset_class_jitter: Duration::from_millis(500),
            max_pages: 500,
        }
    }
}

/// Everything the binary needs to wire the services together.
#[derive(Debug, Clone)]
pub struct HarvesterConfig {
    pub site_name: String,
    pub base_url: String,
    pub database_path: PathBuf,
    pub http_host: String,
    pub http_port: u16,
    pub geocoder_url: String,
    pub use_proxies: bool,
    pub proxy_sources: Vec<String>,
    pub proxy_probe_url: String,
    pub chromium_path: Option<PathBuf>,
    pub headful: bool,
    /// Records persisted concurrently per batch.
    pub batch_size: usize,
    pub crawl: CrawlSettings,
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        Self {
            site_name: DEFAULT_SITE_NAME.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            database_path: default_database_path(),
            http_host: "127.0.0.1".to_string(),
            http_port: DEFAULT_PORT,
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            use_proxies: false,
            proxy_sources: DEFAULT_PROXY_SOURCES.iter().map(|s| s.to_string()).collect(),
            proxy_probe_url: DEFAULT_PROBE_URL.to_string(),
            chromium_path: None,
            headful: false,
            batch_size: 10,
            crawl: CrawlSettings::default(),
        }
    }
}

/// `~/.harvester/harvester.db`, or the working directory without a home.
pub fn default_database_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".harvester"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("harvester.db")
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        None => Ok(None),
    }
}

fn env_millis(name: &str) -> Result<Option<Duration>> {
    Ok(env_parse::<u64>(name)?.map(Duration::from_millis))
}

fn env_flag(name: &str) -> Option<bool> {
    env_var(name).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl HarvesterConfig {
    /// Defaults overridden by any `HARVESTER_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_var("HARVESTER_SITE_NAME") {
            config.site_name = v;
        }
        if let Some(v) = env_var("HARVESTER_BASE_URL") {
            config.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env_var("HARVESTER_DB_PATH") {
            config.database_path = PathBuf::from(v);
        }
        if let Some(v) = env_var("HARVESTER_HOST") {
            config.http_host = v;
        }
        if let Some(v) = env_parse("HARVESTER_PORT")? {
            config.http_port = v;
        }
        if let Some(v) = env_var("HARVESTER_GEOCODER_URL") {
            config.geocoder_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = env_flag("HARVESTER_USE_PROXIES") {
            config.use_proxies = v;
        }
        if let Some(v) = env_var("HARVESTER_PROXY_SOURCES") {
            config.proxy_sources = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = env_var("HARVESTER_PROXY_PROBE_URL") {
            config.proxy_probe_url = v;
        }
        if let Some(v) = env_var("HARVESTER_CHROMIUM_PATH") {
            config.chromium_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_flag("HARVESTER_HEADFUL") {
            config.headful = v;
        }
        if let Some(v) = env_parse::<usize>("HARVESTER_BATCH_SIZE")? {
            config.batch_size = v.max(1);
        }

        let crawl = &mut config.crawl;
        if let Some(v) = env_millis("HARVESTER_NAV_TIMEOUT_MS")? {
            crawl.navigation_timeout = v;
        }
        if let Some(v) = env_millis("HARVESTER_SCROLL_DELAY_MS")? {
            crawl.scroll_delay = v;
        }
        if let Some(v) = env_parse("HARVESTER_MAX_SCROLLS")? {
            crawl.max_scrolls = v;
        }
        if let Some(v) = env_millis("HARVESTER_ASSET_PAUSE_MS")? {
            crawl.asset_class_pause = v;
        }

        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
