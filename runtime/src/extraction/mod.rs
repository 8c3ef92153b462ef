// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Declarative DOM extraction and resilient page interactions.
//!
//! Field reads run against one snapshot of the current document per call.
//! Clicks and selects go to the live page and report failure as `false`
//! rather than raising.

pub mod rules;

pub use rules::{normalize_url, strip_tags, ExtractionRule, FieldValue, Transform};

use crate::renderer::{dom, RenderContext};
use anyhow::Result;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Why a rule-driven extraction failed as a whole.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("required field `{field}` is missing")]
    RequiredFieldMissing { field: String },
    #[error("failed to read field `{field}`: {message}")]
    Page { field: String, message: String },
}

/// Extracted values keyed by field name. Missing optional fields are absent.
pub type ExtractedFields = BTreeMap<String, FieldValue>;

/// One table row keyed by header label; short rows yield `None`.
pub type TableRow = BTreeMap<String, Option<String>>;

/// Selectors describing a data table.
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub table: String,
    pub row: String,
    pub header: String,
    pub cell: String,
}

impl TableSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            row: "tbody tr".to_string(),
            header: "thead th".to_string(),
            cell: "td".to_string(),
        }
    }

    pub fn with_row(mut self, row: impl Into<String>) -> Self {
        self.row = row.into();
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClickOptions {
    pub wait_for_navigation: bool,
    /// Pause before the click lands.
    pub delay: Duration,
    /// How long to wait for the element to become visible.
    pub timeout: Duration,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            wait_for_navigation: false,
            delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Runs extraction rules and interactions against a page.
#[derive(Debug, Clone)]
pub struct Extractor {
    base_url: String,
}

impl Extractor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Apply `rules` under an optional `scope` selector.
    pub async fn extract(
        &self,
        page: &dyn RenderContext,
        rules: &[ExtractionRule],
        scope: Option<&str>,
    ) -> Result<ExtractedFields, ExtractionError> {
        let html = match page.get_html().await {
            Ok(html) => html,
            Err(e) => {
                return Err(ExtractionError::Page {
                    field: rules.first().map(|r| r.field.clone()).unwrap_or_default(),
                    message: format!("{e:#}"),
                })
            }
        };
        self.extract_from_html(&html, rules, scope)
    }

    /// Apply `rules` to an already captured document.
    pub fn extract_from_html(
        &self,
        html: &str,
        rules: &[ExtractionRule],
        scope: Option<&str>,
    ) -> Result<ExtractedFields, ExtractionError> {
        let mut fields = ExtractedFields::new();

        for rule in rules {
            let selector = dom::scoped(scope, &rule.selector);
            let value = match self.read_rule(html, rule, &selector) {
                Ok(value) => value,
                Err(e) if rule.required => {
                    return Err(ExtractionError::Page {
                        field: rule.field.clone(),
                        message: format!("{e:#}"),
                    })
                }
                Err(e) => {
                    debug!(field = %rule.field, "field read failed: {e:#}");
                    None
                }
            };

            match value {
                Some(value) if !value.is_empty() => {
                    fields.insert(rule.field.clone(), value);
                }
                _ if rule.required => {
                    return Err(ExtractionError::RequiredFieldMissing {
                        field: rule.field.clone(),
                    })
                }
                _ => debug!(field = %rule.field, selector = %selector, "optional field not found"),
            }
        }

        Ok(fields)
    }

    fn read_rule(
        &self,
        html: &str,
        rule: &ExtractionRule,
        selector: &str,
    ) -> Result<Option<FieldValue>> {
        let raw = match &rule.attribute {
            Some(attribute) => dom::attributes(html, selector, attribute)?,
            None => dom::texts(html, selector)?,
        };

        let transform = |value: &str| -> Vec<String> {
            match rule.transform {
                Some(t) => t.apply(value, &self.base_url),
                None => vec![value.to_string()],
            }
        };

        if rule.multiple {
            let values: Vec<String> = raw
                .iter()
                .flat_map(|v| transform(v.as_str()))
                .filter(|v| !v.trim().is_empty())
                .collect();
            return Ok(Some(FieldValue::List(values)));
        }

        let Some(first) = raw.first() else {
            return Ok(None);
        };
        let mut values = transform(first.as_str());
        Ok(match values.len() {
            0 => None,
            1 => values.pop().map(FieldValue::Text),
            _ => Some(FieldValue::List(values)),
        })
    }

    /// Read a table's rows keyed by its header labels.
    pub async fn extract_table(
        &self,
        page: &dyn RenderContext,
        spec: &TableSpec,
    ) -> Result<Vec<TableRow>> {
        let html = page.get_html().await?;
        let headers = dom::texts(&html, &dom::scoped(Some(&spec.table), &spec.header))?;
        let rows = dom::row_cells(&html, &dom::scoped(Some(&spec.table), &spec.row), &spec.cell)?;

        Ok(rows
            .into_iter()
            .map(|cells| {
                headers
                    .iter()
                    .enumerate()
                    .map(|(i, header)| {
                        let cell = cells.get(i).filter(|c| !c.is_empty()).cloned();
                        (header.clone(), cell)
                    })
                    .collect()
            })
            .collect())
    }

    /// Wait for `selector` to become visible, then click it.
    pub async fn click(&self, page: &dyn RenderContext, selector: &str, opts: ClickOptions) -> bool {
        match page.wait_for_selector(selector, opts.timeout).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(selector, "element never became visible");
                return false;
            }
            Err(e) => {
                warn!(selector, "visibility check failed: {e:#}");
                return false;
            }
        }

        let click = async {
            if !opts.delay.is_zero() {
                tokio::time::sleep(opts.delay).await;
            }
            page.click(selector, 0).await
        };

        let result = if opts.wait_for_navigation {
            let timeout_ms = opts.timeout.as_millis() as u64;
            let (nav, click) = tokio::join!(page.wait_for_navigation(timeout_ms), click);
            click.and(nav)
        } else {
            click.await
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(selector, "click failed: {e:#}");
                false
            }
        }
    }

    /// Choose `value` in a custom dropdown that mirrors a hidden `<select>`.
    ///
    /// Sets the native select and fires `change`, then clicks the visible
    /// option whose text matches the option label.
    pub async fn select_custom_option(
        &self,
        page: &dyn RenderContext,
        container: &str,
        value: &str,
    ) -> bool {
        let select = format!("{container} select");
        let option = format!("{select} option[value={}]", dom::quote_attr(value));

        let label = match page.texts(&option).await {
            Ok(labels) => labels.into_iter().next(),
            Err(e) => {
                warn!(container, value, "failed to read dropdown: {e:#}");
                return false;
            }
        };
        let Some(label) = label else {
            warn!(container, value, "dropdown option not found");
            return false;
        };

        match page.set_select_value(&select, value).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(container, value, "native select rejected value");
                return false;
            }
            Err(e) => {
                warn!(container, value, "failed to set select value: {e:#}");
                return false;
            }
        }

        let items = format!("{container} > :not(select) div");
        let position = match page.texts(&items).await {
            Ok(texts) => texts.iter().position(|t| t == &label),
            Err(e) => {
                warn!(container, "failed to read dropdown items: {e:#}");
                return false;
            }
        };
        let Some(index) = position else {
            warn!(container, label = %label, "dropdown item not found");
            return false;
        };

        match page.click(&items, index).await {
            Ok(()) => true,
            Err(e) => {
                warn!(container, label = %label, "failed to click dropdown item: {e:#}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::testing::StaticPage;

    const MODAL: &str = r##"
        <html><body>
          <div id="flyout">
            <h2 class="title">  Acme Corp </h2>
            <div class="links">
              <a class="site-link" href="/approach/shared-success/acme">Story</a>
              <a class="site-link" href="https://acme.com/">Site</a>
            </div>
            <div class="tags"><span>Tech, Health</span></div>
          </div>
        </body></html>
    "##;

    fn extractor() -> Extractor {
        Extractor::new("https://www.example.com")
    }

    #[tokio::test]
    async fn test_extract_scoped_rules() {
        let page = StaticPage::new(MODAL);
        let rules = vec![
            ExtractionRule::text("name", ".title")
                .transform(Transform::Trim)
                .required(),
            ExtractionRule::attr("relatedLinks", ".links a", "href")
                .transform(Transform::AbsoluteUrl)
                .multiple(),
            ExtractionRule::text("industry", ".tags span").transform(Transform::CommaSplit),
            ExtractionRule::text("region", ".region"),
        ];

        let fields = extractor()
            .extract(&page, &rules, Some("#flyout"))
            .await
            .unwrap();

        assert_eq!(fields["name"], FieldValue::Text("Acme Corp".into()));
        assert_eq!(
            fields["relatedLinks"],
            FieldValue::List(vec![
                "https://www.example.com/approach/shared-success/acme".into(),
                "https://acme.com/".into()
            ])
        );
        assert_eq!(
            fields["industry"],
            FieldValue::List(vec!["Tech".into(), "Health".into()])
        );
        assert!(!fields.contains_key("region"));
    }

    #[tokio::test]
    async fn test_required_field_missing_fails() {
        let page = StaticPage::new(MODAL);
        let rules = vec![ExtractionRule::text("name", ".missing").required()];
        let err = extractor()
            .extract(&page, &rules, Some("#flyout"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::RequiredFieldMissing { ref field } if field == "name"
        ));
    }

    #[tokio::test]
    async fn test_extract_table_short_rows() {
        let page = StaticPage::new(
            r#"<table class="t">
                 <thead><tr><th>Portfolio Company</th><th>Region</th></tr></thead>
                 <tbody><tr><td>Acme</td><td>Americas</td></tr><tr><td>Beta</td></tr></tbody>
               </table>"#,
        );
        let rows = extractor()
            .extract_table(&page, &TableSpec::new(".t"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Region"].as_deref(), Some("Americas"));
        assert_eq!(rows[1]["Portfolio Company"].as_deref(), Some("Beta"));
        assert_eq!(rows[1]["Region"], None);
    }

    #[tokio::test]
    async fn test_select_custom_option_clicks_matching_item() {
        let page = StaticPage::new(
            r#"<div class="dd">
                 <select><option value="">All</option><option value="pe">Private Equity</option></select>
                 <div class="items"><div>All</div><div>Private Equity</div></div>
               </div>"#,
        );
        assert!(extractor().select_custom_option(&page, ".dd", "pe").await);
        assert_eq!(page.selects(), vec![(".dd select".to_string(), "pe".to_string())]);
        assert_eq!(page.clicks(), vec![(".dd > :not(select) div".to_string(), 1)]);

        assert!(!extractor().select_custom_option(&page, ".dd", "nope").await);
    }

    #[tokio::test]
    async fn test_click_missing_element_returns_false() {
        let page = StaticPage::new("<p>nothing</p>");
        let opts = ClickOptions {
            timeout: Duration::from_millis(150),
            ..ClickOptions::default()
        };
        assert!(!extractor().click(&page, ".close", opts).await);
        assert!(page.clicks().is_empty());
    }
}
