// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Site strategies and the generic crawl pipeline.
//!
//! A [`ScraperStrategy`] describes one site: where its portfolio lives, the
//! selectors of its table, modal, filters and pagination, the background
//! endpoint to listen to, and which secondary pages enrich a record.
//! [`Pipeline`] drives any strategy through the crawl.

pub mod capture;
pub mod enrich;
pub mod portfolio;
pub mod runner;

pub use portfolio::PortfolioSiteStrategy;
pub use runner::{CrawlReport, Pipeline};

use crate::extraction::{
    normalize_url, ClickOptions, ExtractionRule, Extractor, FieldValue, TableSpec,
};
use crate::model::ScrapedRecord;
use crate::renderer::RenderContext;
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, warn};

/// How long a detail modal gets to appear after its row is clicked.
const MODAL_WAIT: Duration = Duration::from_secs(2);

/// Selectors for the results table and its detail modal.
#[derive(Debug, Clone)]
pub struct TableSelectors {
    pub table: String,
    pub row: String,
    pub modal: String,
    pub close_button: String,
}

/// Everything the pipeline needs to know about one site.
#[async_trait]
pub trait ScraperStrategy: Send + Sync {
    /// Stamped into every record's `source`.
    fn name(&self) -> &str;
    fn base_url(&self) -> &str;
    fn portfolio_path(&self) -> &str;
    /// Rules applied inside the detail modal.
    fn extraction_rules(&self) -> &[ExtractionRule];
    fn table_selectors(&self) -> &TableSelectors;
    /// Record field for a table header label.
    fn header_field(&self, header: &str) -> Option<&'static str>;
    /// `<option>` elements listing the asset-class filters.
    fn asset_class_options(&self) -> &str;
    /// Container of the custom asset-class dropdown.
    fn asset_class_dropdown(&self) -> &str;
    /// The active pagination control, carrying `data-page`.
    fn active_page_selector(&self) -> &str;
    fn page_control_selector(&self, page: u32) -> String;
    /// URL fragment of the background data endpoint.
    fn capture_endpoint(&self) -> &str;
    /// Related links worth visiting for enrichment.
    fn enrichment_pattern(&self) -> &Regex;
    /// Container whose text blocks are mined on enrichment pages.
    fn enrichment_container(&self) -> &str;

    fn portfolio_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url().trim_end_matches('/'),
            self.portfolio_path()
        )
    }

    fn normalize_url(&self, raw: &str) -> Option<String> {
        normalize_url(self.base_url(), raw)
    }

    /// Trim, absolutize and stamp a raw record. `None` when it has no name.
    fn normalize_record(&self, record: ScrapedRecord) -> Option<ScrapedRecord> {
        let name = record.name.trim().to_string();
        if name.is_empty() {
            debug!("skipping record without a name");
            return None;
        }
        let trim = |v: Option<String>| {
            v.map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let url = |v: Option<String>| v.and_then(|s| self.normalize_url(&s));

        Some(ScrapedRecord {
            name,
            logo: url(record.logo),
            year_of_investment: trim(record.year_of_investment),
            headquarters: trim(record.headquarters),
            description: trim(record.description),
            industry: trim(record.industry),
            asset_class: trim(record.asset_class),
            region: trim(record.region),
            url: url(record.url),
            related_link_one: url(record.related_link_one),
            related_link_two: url(record.related_link_two),
            related_links: record
                .related_links
                .iter()
                .filter_map(|l| self.normalize_url(l))
                .collect(),
            employee_count: trim(record.employee_count),
            executive_members: record.executive_members,
            ownership_details: trim(record.ownership_details),
            source: Some(self.name().to_string()),
            scraped_at: Some(chrono::Utc::now().to_rfc3339()),
        })
    }

    /// Page number of the active pagination control.
    async fn current_page(&self, page: &dyn RenderContext) -> Result<Option<u32>> {
        let pages = page
            .attributes(self.active_page_selector(), "data-page")
            .await?;
        Ok(pages
            .first()
            .and_then(|p| p.trim().parse::<u32>().ok())
            .filter(|p| *p > 0))
    }

    /// Whether a control for the page after the active one exists.
    async fn is_next_page_available(&self, page: &dyn RenderContext) -> Result<bool> {
        let Some(current) = self.current_page(page).await? else {
            return Ok(false);
        };
        Ok(page.count(&self.page_control_selector(current + 1)).await? > 0)
    }

    /// Scrape the visible page: the table in one pass, then every row's
    /// detail modal. Row failures are logged and skipped.
    async fn scrape_current_page(
        &self,
        page: &dyn RenderContext,
        extractor: &Extractor,
    ) -> Result<Vec<ScrapedRecord>> {
        let selectors = self.table_selectors();
        let mut records = Vec::new();

        let spec = TableSpec::new(selectors.table.clone()).with_row(selectors.row.clone());
        for row in extractor.extract_table(page, &spec).await? {
            let mut record = ScrapedRecord::default();
            for (header, value) in row {
                if let (Some(field), Some(value)) = (self.header_field(&header), value) {
                    record.set_field(field, FieldValue::Text(value));
                }
            }
            match self.normalize_record(record) {
                Some(record) => records.push(record),
                None => warn!("skipping table row without a company name"),
            }
        }

        let rows = page.count(&selectors.row).await?;
        for index in 0..rows {
            match self.scrape_row_detail(page, extractor, index).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => warn!(row = index + 1, "skipping modal entry without a name"),
                Err(e) => warn!(row = index + 1, "failed to process row: {e:#}"),
            }
        }

        Ok(records)
    }

    /// Open the detail modal of row `index`, extract it, and close it.
    async fn scrape_row_detail(
        &self,
        page: &dyn RenderContext,
        extractor: &Extractor,
        index: usize,
    ) -> Result<Option<ScrapedRecord>> {
        let selectors = self.table_selectors();
        page.scroll_into_view(&selectors.row, index).await?;
        page.click(&selectors.row, index).await?;
        if !page.wait_for_selector(&selectors.modal, MODAL_WAIT).await? {
            debug!(row = index + 1, "modal not visible yet, reading anyway");
        }

        let fields = extractor
            .extract(page, self.extraction_rules(), Some(&selectors.modal))
            .await;
        extractor
            .click(page, &selectors.close_button, ClickOptions::default())
            .await;

        let mut record = ScrapedRecord::default();
        for (field, value) in fields? {
            record.set_field(&field, value);
        }
        Ok(self.normalize_record(record))
    }
}
