// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! The investment-portfolio site the harvester targets.
//!
//! Every selector here is part of an external contract with the site's
//! markup and will need updating when the site changes.

use super::{ScraperStrategy, TableSelectors};
use crate::extraction::{ExtractionRule, Transform};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};

pub const DEFAULT_SITE_NAME: &str = "KKR";
pub const DEFAULT_BASE_URL: &str = "https://www.kkr.com";

const MODAL: &str = "#portfolio-flyout";

pub struct PortfolioSiteStrategy {
    name: String,
    base_url: String,
    rules: Vec<ExtractionRule>,
    selectors: TableSelectors,
    enrichment: Regex,
}

impl PortfolioSiteStrategy {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        let enrichment = RegexBuilder::new(r"/approach/shared-success")
            .case_insensitive(true)
            .build()
            .expect("valid regex");

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rules: modal_rules(),
            selectors: TableSelectors {
                table: ".cmp-portfolio-filter__result--table-portfolio".to_string(),
                row: ".cmp-portfolio-filter__result--table-body tr.toggle-table-row-click"
                    .to_string(),
                modal: MODAL.to_string(),
                close_button: ".cmp-portfolio-filter__close-btn".to_string(),
            },
            enrichment,
        }
    }
}

impl Default for PortfolioSiteStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_SITE_NAME, DEFAULT_BASE_URL)
    }
}

/// Fields of the detail flyout, relative to the flyout root.
fn modal_rules() -> Vec<ExtractionRule> {
    vec![
        ExtractionRule::text("name", ".cmp-portfolio-filter__portfolio-title")
            .transform(Transform::Trim)
            .required(),
        ExtractionRule::attr("logo", ".cmp-portfolio-filter__portfolio-header img", "src"),
        ExtractionRule::text("description", ".cmp-portfolio-filter__portfolio-description p")
            .transform(Transform::Trim),
        ExtractionRule::attr("url", ".website-details .site-link", "href")
            .transform(Transform::AbsoluteUrl),
        ExtractionRule::text("headquarters", ".hq-details .sub-desc").transform(Transform::Trim),
        ExtractionRule::text("assetClass", ".asset-details .sub-desc").transform(Transform::Trim),
        ExtractionRule::text("industry", ".industry-details .sub-desc").transform(Transform::Trim),
        ExtractionRule::text("region", ".region-details .sub-desc").transform(Transform::Trim),
        ExtractionRule::text("yearOfInvestment", ".year-details .sub-desc")
            .transform(Transform::Trim),
        ExtractionRule::attr(
            "relatedLinks",
            r#".cmp-portfolio-filter__additional-details--values a.site-link[href]:not([href*="undefined"])"#,
            "href",
        )
        .transform(Transform::Trim)
        .multiple(),
    ]
}

#[async_trait]
impl ScraperStrategy for PortfolioSiteStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn portfolio_path(&self) -> &str {
        "/invest/portfolio"
    }

    fn extraction_rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    fn table_selectors(&self) -> &TableSelectors {
        &self.selectors
    }

    fn header_field(&self, header: &str) -> Option<&'static str> {
        match header.trim() {
            "Portfolio Company" => Some("name"),
            "Asset Class" => Some("assetClass"),
            "Industry" => Some("industry"),
            "Region" => Some("region"),
            _ => None,
        }
    }

    fn asset_class_options(&self) -> &str {
        ".cmp-portfolio-filter__item--selectassetclass option"
    }

    fn asset_class_dropdown(&self) -> &str {
        ".cmp-portfolio-filter__custom-select"
    }

    fn active_page_selector(&self) -> &str {
        ".cmp-portfolio-filter__page.active"
    }

    fn page_control_selector(&self, page: u32) -> String {
        format!(r#".cmp-portfolio-filter__page[data-page="{page}"]"#)
    }

    fn capture_endpoint(&self) -> &str {
        "bioportfoliosearch.bioportfoliosearch.json"
    }

    fn enrichment_pattern(&self) -> &Regex {
        &self.enrichment
    }

    fn enrichment_container(&self) -> &str {
        ".cmp-text"
    }
}
