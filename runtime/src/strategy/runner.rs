// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! The crawl state machine, generic over a [`ScraperStrategy`].
//!
//! Navigate (with retry) → discover asset-class filters → per filter, or once
//! unfiltered, scroll and paginate the table → merge table, modal and
//! captured records by name → enrich from success-story pages.

use super::capture::CaptureListener;
use super::enrich::{mine_story, StoryFacts, BLOCK_SELECTOR, MAX_BLOCKS};
use super::ScraperStrategy;
use crate::config::CrawlSettings;
use crate::extraction::{ClickOptions, Extractor};
use crate::merge::{dedup_by_name, DeepMerge};
use crate::model::ScrapedRecord;
use crate::renderer::{dom, RenderContext};
use crate::retry::{with_retry, with_retry_notify, RetryPolicy};
use crate::session::SessionManager;
use anyhow::{bail, Context, Result};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How long an enrichment page gets to render its text container.
const ENRICH_WAIT: Duration = Duration::from_secs(5);

/// Outcome of one crawl.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    /// Deduplicated and enriched records.
    pub records: Vec<ScrapedRecord>,
    /// Records read from the table and modals, before dedup.
    pub scraped: usize,
    /// Records taken from the background endpoint.
    pub captured: usize,
    /// Records that gained data from an enrichment page.
    pub enriched: usize,
    pub duration_ms: u64,
}

/// Drives one strategy through a crawl on pages from a [`SessionManager`].
pub struct Pipeline<S: ScraperStrategy + 'static> {
    strategy: Arc<S>,
    extractor: Extractor,
    sessions: Arc<SessionManager>,
    settings: CrawlSettings,
}

impl<S: ScraperStrategy + 'static> Pipeline<S> {
    pub fn new(strategy: Arc<S>, sessions: Arc<SessionManager>, settings: CrawlSettings) -> Self {
        let extractor = Extractor::new(strategy.base_url());
        Self {
            strategy,
            extractor,
            sessions,
            settings,
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Open a page, crawl, and release the page and browser whatever the
    /// outcome.
    pub async fn run(&self) -> Result<CrawlReport> {
        let page = self
            .sessions
            .create_page(None, Some(self.settings.navigation_timeout))
            .await
            .context("failed to open a browser page")?;

        let result = self.crawl(page.as_ref()).await;
        self.sessions.cleanup(page).await;
        result
    }

    /// Crawl on an already open page.
    pub async fn crawl(&self, page: &dyn RenderContext) -> Result<CrawlReport> {
        let started = Instant::now();
        info!(site = self.strategy.name(), "starting crawl");

        // Listening starts before navigation so the first search response
        // is not missed.
        let listener = self.start_capture(page).await?;

        if let Err(e) = self.navigate_portfolio(page).await {
            listener.finish().await;
            return Err(e);
        }

        let scraped = self.scrape_portfolio_list(page).await;
        let captured = listener.finish().await;
        info!(
            scraped = scraped.len(),
            captured = captured.len(),
            "portfolio list complete"
        );

        let scraped_count = scraped.len();
        let captured_count = captured.len();
        let mut records = dedup_by_name(scraped.into_iter().chain(captured).collect());
        info!(unique = records.len(), "merged records by company name");

        let enriched = self.enrich_all(page, &mut records).await;

        let report = CrawlReport {
            records,
            scraped: scraped_count,
            captured: captured_count,
            enriched,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            site = self.strategy.name(),
            records = report.records.len(),
            enriched = report.enriched,
            duration_ms = report.duration_ms,
            "crawl finished"
        );
        Ok(report)
    }

    async fn start_capture(&self, page: &dyn RenderContext) -> Result<CaptureListener> {
        let responses = page
            .capture_responses(self.strategy.capture_endpoint())
            .await
            .context("failed to attach response listener")?;
        let strategy = Arc::clone(&self.strategy);
        Ok(CaptureListener::spawn(responses, move |record| {
            strategy.normalize_record(record)
        }))
    }

    async fn navigate_portfolio(&self, page: &dyn RenderContext) -> Result<()> {
        let url = self.strategy.portfolio_url();
        let timeout_ms = self.settings.navigation_timeout.as_millis() as u64;
        let target = url.as_str();

        let result = with_retry_notify(
            self.settings.navigation_retry,
            move || async move { page.navigate(target, timeout_ms).await },
            |attempt, e: &anyhow::Error| {
                warn!(attempt, url = target, "navigation failed: {e:#}");
            },
        )
        .await
        .with_context(|| format!("failed to load {url}"))?;

        info!(
            url = %result.final_url,
            load_time_ms = result.load_time_ms,
            "portfolio page loaded"
        );
        Ok(())
    }

    /// Non-empty asset-class filter values offered by the page. A page
    /// that cannot be read offers none.
    pub async fn asset_classes(&self, page: &dyn RenderContext) -> Vec<String> {
        let values = match page
            .attributes(self.strategy.asset_class_options(), "value")
            .await
        {
            Ok(values) => values,
            Err(e) => {
                warn!("failed to read asset classes: {e:#}");
                return Vec::new();
            }
        };
        let mut classes: Vec<String> = Vec::new();
        for value in values {
            let value = value.trim();
            if !value.is_empty() && !classes.iter().any(|c| c == value) {
                classes.push(value.to_string());
            }
        }
        classes
    }

    async fn scrape_portfolio_list(&self, page: &dyn RenderContext) -> Vec<ScrapedRecord> {
        let classes = self.asset_classes(page).await;
        if classes.is_empty() {
            info!("no asset-class filters found, crawling unfiltered");
            return self.scrape_all_pages(page).await;
        }

        info!(count = classes.len(), "crawling per asset class");
        let mut records = Vec::new();
        for (i, class) in classes.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pause()).await;
            }
            if !self.select_asset_class(page, class).await {
                continue;
            }
            let found = self.scrape_all_pages(page).await;
            info!(asset_class = %class, records = found.len(), "asset class done");
            records.extend(found);
        }
        records
    }

    fn pause(&self) -> Duration {
        let jitter_ms = self.settings.asset_class_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.settings.asset_class_pause + Duration::from_millis(jitter)
    }

    /// Apply one filter and wait for the table to reflect it. `false` means
    /// the class should be skipped.
    async fn select_asset_class(&self, page: &dyn RenderContext, class: &str) -> bool {
        let before = match self.table_snapshot(page).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(asset_class = class, "failed to read table: {e:#}");
                return false;
            }
        };

        if !self
            .extractor
            .select_custom_option(page, self.strategy.asset_class_dropdown(), class)
            .await
        {
            warn!(asset_class = class, "failed to select asset class, skipping");
            return false;
        }

        if let Err(e) = self.wait_for_table_change(page, &before).await {
            warn!(asset_class = class, "table did not update, skipping: {e:#}");
            return false;
        }
        debug!(asset_class = class, "filter applied");
        true
    }

    /// Row texts joined into one comparable string.
    async fn table_snapshot(&self, page: &dyn RenderContext) -> Result<String> {
        let rows = page.texts(&self.strategy.table_selectors().row).await?;
        Ok(rows.join("|"))
    }

    async fn wait_for_table_change(&self, page: &dyn RenderContext, before: &str) -> Result<()> {
        let policy = RetryPolicy::poll(
            self.settings.table_change_timeout,
            self.settings.table_poll_interval,
        );
        with_retry(policy, move || async move {
            let now = self.table_snapshot(page).await?;
            if now == before {
                bail!("table unchanged");
            }
            Ok(())
        })
        .await
    }

    /// Scroll until the table stops growing, bounded by `max_scrolls`.
    async fn load_all_content(&self, page: &dyn RenderContext) -> Result<()> {
        let row = &self.strategy.table_selectors().row;
        let mut height = page.scroll_height().await?;

        for scroll in 1..=self.settings.max_scrolls {
            page.scroll_to_bottom().await?;
            tokio::time::sleep(self.settings.scroll_delay).await;
            if !page.wait_for_selector(row, self.settings.content_wait).await? {
                debug!(scroll, "no rows visible after scrolling");
            }

            let grown = page.scroll_height().await?;
            if grown <= height {
                debug!(scroll, height, "page stopped growing");
                break;
            }
            height = grown;
        }
        Ok(())
    }

    /// Scrape every page reachable through the pagination controls. A
    /// failing page ends pagination; records from earlier pages are kept.
    async fn scrape_all_pages(&self, page: &dyn RenderContext) -> Vec<ScrapedRecord> {
        if let Err(e) = self.load_all_content(page).await {
            warn!("auto-scroll failed, scraping what is loaded: {e:#}");
        }

        let mut records = Vec::new();
        let mut pages = 0u32;
        loop {
            pages += 1;
            match self
                .strategy
                .scrape_current_page(page, &self.extractor)
                .await
            {
                Ok(found) => {
                    debug!(page = pages, records = found.len(), "page scraped");
                    records.extend(found);
                }
                Err(e) => {
                    warn!(page = pages, "failed to scrape page, stopping pagination: {e:#}");
                    break;
                }
            }

            if pages >= self.settings.max_pages {
                warn!(pages, "page limit reached, stopping pagination");
                break;
            }
            match self.go_to_next_page(page).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!(page = pages, "failed to advance pagination: {e:#}");
                    break;
                }
            }
            if let Err(e) = page.scroll_to_top().await {
                warn!(page = pages + 1, "failed to scroll to top, stopping pagination: {e:#}");
                break;
            }
        }
        records
    }

    /// Advance one page. `false` ends pagination.
    async fn go_to_next_page(&self, page: &dyn RenderContext) -> Result<bool> {
        if !self.strategy.is_next_page_available(page).await? {
            debug!("no further pages");
            return Ok(false);
        }
        let Some(current) = self.strategy.current_page(page).await? else {
            return Ok(false);
        };
        let next = self.strategy.page_control_selector(current + 1);
        if page.count(&next).await? == 0 {
            return Ok(false);
        }

        let before = self.table_snapshot(page).await?;
        if !self
            .extractor
            .click(page, &next, ClickOptions::default())
            .await
        {
            warn!(page = current + 1, "failed to open next page");
            return Ok(false);
        }
        if let Err(e) = self.wait_for_table_change(page, &before).await {
            warn!(page = current + 1, "next page never loaded: {e:#}");
            return Ok(false);
        }
        debug!(page = current + 1, "moved to next page");
        Ok(true)
    }

    /// Success-story links of a record, absolute and de-duplicated.
    pub fn enrichment_links(&self, record: &ScrapedRecord) -> Vec<String> {
        let mut links: Vec<String> = Vec::new();
        for candidate in record.link_candidates() {
            let Some(link) = self.strategy.normalize_url(candidate) else {
                continue;
            };
            if self.strategy.enrichment_pattern().is_match(&link) && !links.contains(&link) {
                links.push(link);
            }
        }
        links
    }

    /// Enrich every record in place. Returns how many gained data.
    async fn enrich_all(&self, page: &dyn RenderContext, records: &mut [ScrapedRecord]) -> usize {
        let mut enriched = 0;
        for record in records.iter_mut() {
            let links = self.enrichment_links(record);
            if links.is_empty() {
                continue;
            }

            let mut extra = ScrapedRecord::default();
            for link in &links {
                match self
                    .enrich_from(page, link, record.year_of_investment.as_deref())
                    .await
                {
                    Ok(facts) => extra.merge_from(facts.into_record()),
                    Err(e) => warn!(company = %record.name, link = %link, "enrichment failed: {e:#}"),
                }
            }

            if !extra.is_blank() {
                record.merge_from(extra);
                enriched += 1;
                debug!(company = %record.name, "record enriched");
            }
        }
        enriched
    }

    async fn enrich_from(
        &self,
        page: &dyn RenderContext,
        link: &str,
        known_year: Option<&str>,
    ) -> Result<StoryFacts> {
        let timeout_ms = self.settings.navigation_timeout.as_millis() as u64;
        page.navigate(link, timeout_ms).await?;

        let container = self.strategy.enrichment_container();
        if !page.wait_for_selector(container, ENRICH_WAIT).await? {
            bail!("text container {container} never appeared");
        }
        let html = page.get_html().await?;
        let blocks = dom::text_blocks(&html, container, BLOCK_SELECTOR, MAX_BLOCKS)?;
        Ok(mine_story(&blocks, known_year))
    }
}
