// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

pub mod fake_site;

use anyhow::{bail, Result};
use async_trait::async_trait;
use harvester_runtime::company::CompanyService;
use harvester_runtime::config::CrawlSettings;
use harvester_runtime::geo::{GeoResolver, Geocoder};
use harvester_runtime::model::GeoLocation;
use harvester_runtime::retry::RetryPolicy;
use harvester_runtime::service::HarvestService;
use harvester_runtime::session::SessionManager;
use harvester_runtime::store::SqliteStore;
use harvester_runtime::strategy::{Pipeline, PortfolioSiteStrategy};
use std::sync::Arc;
use std::time::Duration;

pub use fake_site::{FakeLauncher, FakeSite};

/// Crawl timing shrunk to milliseconds.
pub fn fast_settings() -> CrawlSettings {
    CrawlSettings {
        navigation_timeout: Duration::from_secs(1),
        navigation_retry: RetryPolicy::new(3, Duration::from_millis(1), true),
        scroll_delay: Duration::from_millis(1),
        max_scrolls: 3,
        content_wait: Duration::from_millis(20),
        table_change_timeout: Duration::from_millis(200),
        table_poll_interval: Duration::from_millis(5),
        asset_class_pause: Duration::ZERO,
        asset_class_jitter: Duration::ZERO,
        max_pages: 10,
    }
}

/// A geocoder with no network behind it.
pub struct OfflineGeocoder;

#[async_trait]
impl Geocoder for OfflineGeocoder {
    async fn geocode(&self, _query: &str) -> Result<Option<GeoLocation>> {
        bail!("geocoder unreachable")
    }
}

pub fn pipeline(launcher: Arc<FakeLauncher>) -> Pipeline<PortfolioSiteStrategy> {
    let sessions = Arc::new(SessionManager::new(launcher, Duration::from_secs(1)));
    Pipeline::new(
        Arc::new(PortfolioSiteStrategy::default()),
        sessions,
        fast_settings(),
    )
}

/// A full service over `site`, an in-memory store and `geocoder`.
pub fn harvest_service(
    site: FakeSite,
    geocoder: Arc<dyn Geocoder>,
) -> (HarvestService, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let geo = Arc::new(
        GeoResolver::new(geocoder, store.clone())
            .with_min_interval(Duration::from_millis(1))
            .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(1), false)),
    );
    let companies = Arc::new(CompanyService::new(store.clone(), 4));
    let service = HarvestService::new(
        pipeline(Arc::new(FakeLauncher::new(site))),
        geo,
        companies,
    );
    (service, store)
}
