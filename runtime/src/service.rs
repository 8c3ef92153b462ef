// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! The harvest operations shared by the REST API and the CLI.
//!
//! A crawl runs the pipeline, resolves every headquarters, reconciles the
//! records with the store and reloads the company list.

use crate::company::{to_normalized, CompanyService, CompanySummary, SaveReport};
use crate::geo::GeoResolver;
use crate::model::{NormalizedCompany, ScrapedRecord, StoredCompany};
use crate::store::StoreError;
use crate::strategy::{Pipeline, PortfolioSiteStrategy, ScraperStrategy};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("a crawl is already running")]
    CrawlInProgress,
    #[error("crawl failed: {0:#}")]
    Crawl(anyhow::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one triggered crawl.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestOutcome {
    pub crawled: usize,
    pub enriched: usize,
    pub saved: SaveReport,
    pub duration_ms: u64,
    /// Every stored company once the crawl has been persisted.
    pub companies: Vec<StoredCompany>,
}

pub struct HarvestService<S: ScraperStrategy + 'static = PortfolioSiteStrategy> {
    pipeline: Pipeline<S>,
    geo: Arc<GeoResolver>,
    companies: Arc<CompanyService>,
    crawl_lock: Mutex<()>,
}

impl<S: ScraperStrategy + 'static> HarvestService<S> {
    pub fn new(
        pipeline: Pipeline<S>,
        geo: Arc<GeoResolver>,
        companies: Arc<CompanyService>,
    ) -> Self {
        Self {
            pipeline,
            geo,
            companies,
            crawl_lock: Mutex::new(()),
        }
    }

    /// Run one full crawl and persist what it found. A second trigger while
    /// a crawl is running is rejected.
    pub async fn trigger_crawl(&self) -> Result<HarvestOutcome, HarvestError> {
        let _guard = self
            .crawl_lock
            .try_lock()
            .map_err(|_| HarvestError::CrawlInProgress)?;
        let started = Instant::now();

        let report = self.pipeline.run().await.map_err(HarvestError::Crawl)?;
        let normalized = self.normalize(&report.records).await;
        let saved = self.companies.save_all(normalized).await;
        let companies = self.companies.get_companies(true).await?;

        let outcome = HarvestOutcome {
            crawled: report.records.len(),
            enriched: report.enriched,
            saved,
            duration_ms: started.elapsed().as_millis() as u64,
            companies,
        };
        info!(
            crawled = outcome.crawled,
            stored = outcome.companies.len(),
            duration_ms = outcome.duration_ms,
            "harvest complete"
        );
        Ok(outcome)
    }

    /// Resolve each record's headquarters and shape it for the store.
    pub async fn normalize(&self, records: &[ScrapedRecord]) -> Vec<NormalizedCompany> {
        let base_url = self.pipeline.strategy().base_url();
        let mut companies = Vec::with_capacity(records.len());
        for record in records {
            if record.name.trim().is_empty() {
                warn!("skipping record without a name");
                continue;
            }
            let location = match record.headquarters.as_deref() {
                Some(hq) => self.geo.resolve(hq).await,
                None => Default::default(),
            };
            companies.push(to_normalized(record, base_url, location));
        }
        companies
    }

    pub async fn list_companies(&self, force: bool) -> Result<Vec<StoredCompany>, HarvestError> {
        Ok(self.companies.get_companies(force).await?)
    }

    pub async fn summary(&self) -> Result<CompanySummary, HarvestError> {
        Ok(self.companies.summary().await?)
    }

    pub fn is_crawling(&self) -> bool {
        self.crawl_lock.try_lock().is_err()
    }
}
