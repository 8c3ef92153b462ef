// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! An in-memory stand-in for the portfolio site.
//!
//! Serves the portfolio table with one asset-class filter, two pages, a
//! detail flyout per row, a background search response, and one
//! success-story page. Clicks and selections mutate the rendered state the
//! way the live site's scripts do.

use anyhow::{bail, Result};
use async_trait::async_trait;
use harvester_runtime::renderer::{
    dom, CapturedResponse, NavigationResult, PageOptions, RenderContext, Renderer,
};
use harvester_runtime::session::RendererLauncher;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const BASE_URL: &str = "https://www.kkr.com";
pub const PORTFOLIO_URL: &str = "https://www.kkr.com/invest/portfolio";
pub const STORY_URL: &str = "https://www.kkr.com/approach/shared-success/acme";
pub const ASSET_CLASS: &str = "private-equity";

const ROW: &str = ".cmp-portfolio-filter__result--table-body tr.toggle-table-row-click";
const CLOSE: &str = ".cmp-portfolio-filter__close-btn";
const DROPDOWN_ITEMS: &str = ".cmp-portfolio-filter__custom-select > :not(select) div";

/// One company as the fake site lists it.
#[derive(Debug, Clone)]
pub struct Listing {
    pub name: &'static str,
    pub industry: &'static str,
    pub region: &'static str,
    pub headquarters: &'static str,
    pub website: &'static str,
    pub year: &'static str,
    pub story: bool,
}

const fn listing(
    name: &'static str,
    industry: &'static str,
    region: &'static str,
    headquarters: &'static str,
    website: &'static str,
    year: &'static str,
) -> Listing {
    Listing {
        name,
        industry,
        region,
        headquarters,
        website,
        year,
        story: false,
    }
}

pub fn page_one() -> Vec<Listing> {
    vec![
        Listing {
            story: true,
            ..listing(
                "Acme",
                "Industrials",
                "Americas",
                "Austin, TX, USA",
                "https://acme.com/",
                "2018",
            )
        },
        listing(
            "Globex",
            "Technology",
            "Europe",
            "Berlin, Germany",
            "https://globex.example",
            "2020",
        ),
        listing(
            "Initech",
            "Software",
            "Americas, Asia",
            "Dallas, Texas, United States",
            "https://initech.example",
            "2016",
        ),
    ]
}

pub fn page_two() -> Vec<Listing> {
    vec![
        listing(
            "Umbrella",
            "Health Care",
            "Asia Pacific",
            "Tokyo, Japan",
            "https://umbrella.example",
            "2021",
        ),
        listing(
            "Stark",
            "Energy",
            "Americas",
            "New York, NY, USA",
            "https://stark.example",
            "2015",
        ),
    ]
}

/// JSON body of the background search endpoint.
pub fn search_response() -> String {
    serde_json::json!({
        "resultsText": "2 results",
        "results": [
            {
                "name": "Acme",
                "hq": "Austin, TX, USA",
                "yoi": 2018,
                "relatedLinkOne": "/approach/shared-success/acme"
            },
            {
                "name": "Wayne Enterprises",
                "hq": "Gotham, USA",
                "industry": "Conglomerate",
                "assetClass": "Private Equity",
                "url": "wayne.example"
            }
        ]
    })
    .to_string()
}

const STORY_PAGE: &str = r#"
<html><body>
  <div class="cmp-text">
    <p>KKR acquired Acme in March 2018, to build a regional leader. Today it grows.</p>
    <p>Acme has over 12,500 employees across three continents.</p>
    <p>Jane Smith, CEO of Acme, welcomed the partnership.</p>
  </div>
</body></html>
"#;

#[derive(Debug, Default)]
struct SiteState {
    url: String,
    filter: Option<String>,
    page: u32,
    modal: Option<usize>,
    watchers: Vec<(String, mpsc::UnboundedSender<CapturedResponse>)>,
    clicks: Vec<String>,
    /// The page whose context dies once it is reached.
    broken_page: Option<u32>,
    /// The company whose row never opens its flyout.
    broken_flyout: Option<String>,
}

/// A shared fake page. Clones observe the same state.
#[derive(Clone)]
pub struct FakeSite {
    state: Arc<Mutex<SiteState>>,
    /// Navigation attempts that fail before the site answers.
    failing_navigations: Arc<AtomicUsize>,
    with_filters: bool,
}

impl FakeSite {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SiteState {
                url: "about:blank".to_string(),
                page: 1,
                ..SiteState::default()
            })),
            failing_navigations: Arc::new(AtomicUsize::new(0)),
            with_filters: true,
        }
    }

    /// A site without asset-class filters; the table is filled from the start.
    pub fn without_filters() -> Self {
        Self {
            with_filters: false,
            ..Self::new()
        }
    }

    /// Fail the next `count` navigations.
    pub fn fail_navigations(&self, count: usize) {
        self.failing_navigations.store(count, Ordering::SeqCst);
    }

    /// Make the page context unusable once pagination reaches `page`.
    pub fn break_on_page(&self, page: u32) {
        self.state.lock().unwrap().broken_page = Some(page);
    }

    /// Make clicking `name`'s row fail.
    pub fn break_flyout(&self, name: &str) {
        self.state.lock().unwrap().broken_flyout = Some(name.to_string());
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().unwrap().clicks.clone()
    }

    pub fn current_page(&self) -> u32 {
        self.state.lock().unwrap().page
    }

    fn rows(&self, state: &SiteState) -> Vec<Listing> {
        if self.with_filters && state.filter.is_none() {
            return vec![listing("Loading…", "", "", "", "", "")];
        }
        match state.page {
            1 => page_one(),
            2 => page_two(),
            _ => Vec::new(),
        }
    }

    fn render(&self, state: &SiteState) -> String {
        if state.url == STORY_URL {
            return STORY_PAGE.to_string();
        }
        if state.url != PORTFOLIO_URL {
            return "<html><body><h1>Not found</h1></body></html>".to_string();
        }

        let rows = self.rows(state);
        let mut html = String::from("<html><body>");

        if self.with_filters {
            html.push_str(
                r#"<div class="cmp-portfolio-filter__item--selectassetclass cmp-portfolio-filter__custom-select">
                     <select>
                       <option value="">All Asset Classes</option>
                       <option value="private-equity">Private Equity</option>
                     </select>
                     <div class="select-items"><div>All Asset Classes</div><div>Private Equity</div></div>
                   </div>"#,
            );
        }

        html.push_str(
            r#"<table class="cmp-portfolio-filter__result--table-portfolio">
                 <thead><tr><th>Portfolio Company</th><th>Asset Class</th><th>Industry</th><th>Region</th></tr></thead>
                 <tbody class="cmp-portfolio-filter__result--table-body">"#,
        );
        for row in &rows {
            html.push_str(&format!(
                r#"<tr class="toggle-table-row-click"><td>{}</td><td>Private Equity</td><td>{}</td><td>{}</td></tr>"#,
                row.name, row.industry, row.region
            ));
        }
        html.push_str("</tbody></table>");

        if !self.with_filters || state.filter.is_some() {
            html.push_str(r#"<div class="cmp-portfolio-filter__pagination">"#);
            for page in 1..=2 {
                let active = if page == state.page { " active" } else { "" };
                html.push_str(&format!(
                    r#"<a class="cmp-portfolio-filter__page{active}" data-page="{page}">{page}</a>"#
                ));
            }
            html.push_str("</div>");
        }

        if let Some(row) = state.modal.and_then(|i| rows.get(i)) {
            let story = if row.story {
                r#"<a class="site-link" href="/approach/shared-success/acme/">Read the story</a>"#
            } else {
                ""
            };
            html.push_str(&format!(
                r#"<div id="portfolio-flyout">
                     <button class="cmp-portfolio-filter__close-btn">Close</button>
                     <div class="cmp-portfolio-filter__portfolio-header"><img src="/content/dam/logos/{slug}.png"></div>
                     <h3 class="cmp-portfolio-filter__portfolio-title"> {name} </h3>
                     <div class="cmp-portfolio-filter__portfolio-description"><p>{name} is a portfolio company.</p></div>
                     <div class="hq-details"><span class="sub-desc">{hq}</span></div>
                     <div class="year-details"><span class="sub-desc">{year}</span></div>
                     <div class="website-details"><a class="site-link" href="{website}">Website</a></div>
                     <div class="cmp-portfolio-filter__additional-details--values">
                       {story}
                       <a class="site-link" href="undefined">Broken</a>
                     </div>
                   </div>"#,
                slug = row.name.to_lowercase(),
                name = row.name,
                hq = row.headquarters,
                year = row.year,
                website = row.website,
            ));
        }

        html.push_str("</body></html>");
        html
    }

    fn announce(&self, state: &mut SiteState) {
        let body = search_response();
        state.watchers.retain(|(fragment, tx)| {
            let url = format!("{BASE_URL}/content/kkr/sites/global/en/invest/portfolio/jcr:content/root/main-par/bioportfoliosearch.bioportfoliosearch.json?page=1");
            if !url.contains(fragment.as_str()) {
                return true;
            }
            tx.send(CapturedResponse {
                url,
                status: 200,
                body: body.clone(),
            })
            .is_ok()
        });
    }
}

impl Default for FakeSite {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenderContext for FakeSite {
    async fn navigate(&self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        let pending = self.failing_navigations.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_navigations.store(pending - 1, Ordering::SeqCst);
            bail!("net::ERR_CONNECTION_RESET at {url}");
        }

        let mut state = self.state.lock().unwrap();
        state.url = url.trim_end_matches('/').to_string();
        state.modal = None;
        if state.url == PORTFOLIO_URL {
            state.page = 1;
            state.filter = None;
            self.announce(&mut state);
        }
        Ok(NavigationResult {
            final_url: state.url.clone(),
            load_time_ms: 12,
        })
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn get_html(&self) -> Result<String> {
        let state = self.state.lock().unwrap();
        Ok(self.render(&state))
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn click(&self, selector: &str, index: usize) -> Result<()> {
        let html = self.get_html().await?;
        if dom::count(&html, selector)? <= index {
            bail!("no element {index} for {selector}");
        }

        let mut state = self.state.lock().unwrap();
        if selector == ROW {
            let rows = self.rows(&state);
            let broken = state.broken_flyout.as_deref();
            if rows.get(index).map(|r| r.name) == broken {
                bail!("Node is detached from document");
            }
        }
        state.clicks.push(format!("{selector}#{index}"));
        if selector == ROW {
            state.modal = Some(index);
        } else if selector == CLOSE {
            state.modal = None;
        } else if selector.contains(r#"data-page="2""#) {
            state.page = 2;
            state.modal = None;
        } else if selector == DROPDOWN_ITEMS {
            state.page = 1;
        }
        Ok(())
    }

    async fn scroll_into_view(&self, _selector: &str, _index: usize) -> Result<()> {
        Ok(())
    }

    async fn set_select_value(&self, selector: &str, value: &str) -> Result<bool> {
        if !self.with_filters || !selector.ends_with("select") || value != ASSET_CLASS {
            return Ok(false);
        }
        let mut state = self.state.lock().unwrap();
        state.filter = Some(value.to_string());
        state.page = 1;
        self.announce(&mut state);
        Ok(true)
    }

    async fn wait_for_navigation(&self, _timeout_ms: u64) -> Result<()> {
        Ok(())
    }

    async fn scroll_height(&self) -> Result<u64> {
        Ok(2400)
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        Ok(())
    }

    async fn scroll_to_top(&self) -> Result<()> {
        let state = self.state.lock().unwrap();
        if state.broken_page == Some(state.page) {
            bail!("Execution context was destroyed");
        }
        Ok(())
    }

    async fn capture_responses(
        &self,
        url_fragment: &str,
    ) -> Result<mpsc::UnboundedReceiver<CapturedResponse>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .lock()
            .unwrap()
            .watchers
            .push((url_fragment.to_string(), tx));
        Ok(rx)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// A browser whose every tab is the same [`FakeSite`].
pub struct FakeBrowser {
    site: FakeSite,
}

#[async_trait]
impl Renderer for FakeBrowser {
    async fn new_context(&self, _options: &PageOptions) -> Result<Box<dyn RenderContext>> {
        Ok(Box::new(self.site.clone()))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn active_contexts(&self) -> usize {
        1
    }
}

/// Launches [`FakeBrowser`]s and records the proxy each launch asked for.
pub struct FakeLauncher {
    site: FakeSite,
    pub launches: Mutex<Vec<Option<String>>>,
}

impl FakeLauncher {
    pub fn new(site: FakeSite) -> Self {
        Self {
            site,
            launches: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RendererLauncher for FakeLauncher {
    async fn launch(&self, proxy_server: Option<String>) -> Result<Arc<dyn Renderer>> {
        self.launches.lock().unwrap().push(proxy_server);
        Ok(Arc::new(FakeBrowser {
            site: self.site.clone(),
        }))
    }
}
