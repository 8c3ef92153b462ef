// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI subcommand implementations for the harvester binary.

pub mod companies;
pub mod crawl;
pub mod serve;
pub mod summary;

use crate::company::CompanyService;
use crate::config::HarvesterConfig;
use crate::geo::{GeoResolver, NominatimClient};
use crate::proxy::{HttpProbe, ProxyPool, ProxyPoolConfig};
use crate::service::HarvestService;
use crate::session::{ChromiumLauncher, SessionManager};
use crate::store::SqliteStore;
use crate::strategy::{Pipeline, PortfolioSiteStrategy};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the default
/// `harvester=<level>` directive.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("harvester={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wire the store, proxies, browser sessions, geocoder and pipeline
/// described by `config`.
pub async fn build_service(config: &HarvesterConfig) -> Result<Arc<HarvestService>> {
    let store = Arc::new(
        SqliteStore::open(&config.database_path)
            .with_context(|| format!("failed to open {}", config.database_path.display()))?,
    );
    info!(path = %config.database_path.display(), "opened database");

    let proxies = if config.use_proxies {
        let pool = Arc::new(ProxyPool::new(
            store.clone(),
            Arc::new(HttpProbe::new(config.proxy_probe_url.clone())),
            ProxyPoolConfig::from_config(config),
        ));
        pool.start_background_refresh();
        Some(pool)
    } else {
        None
    };

    let launcher = Arc::new(ChromiumLauncher {
        chrome_path: config.chromium_path.clone(),
        headful: config.headful,
    });
    let mut sessions = SessionManager::new(launcher, config.crawl.navigation_timeout);
    let mut geocoder = NominatimClient::new(config.geocoder_url.clone());
    if let Some(pool) = &proxies {
        sessions = sessions.with_proxies(Arc::clone(pool));
        geocoder = geocoder.with_proxies(Arc::clone(pool));
    }

    let geo = Arc::new(GeoResolver::new(Arc::new(geocoder), store.clone()));
    geo.warm()?;

    let strategy = Arc::new(PortfolioSiteStrategy::new(
        config.site_name.clone(),
        config.base_url.clone(),
    ));
    let pipeline = Pipeline::new(strategy, Arc::new(sessions), config.crawl.clone());
    let companies = Arc::new(CompanyService::new(store, config.batch_size));

    Ok(Arc::new(HarvestService::new(pipeline, geo, companies)))
}

/// Pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
