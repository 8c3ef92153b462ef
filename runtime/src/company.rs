// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Crawl records → persisted companies.
//!
//! [`to_normalized`] shapes one crawl record into the stored entity.
//! [`CompanyService`] reconciles it with what is already stored: a known
//! company is deep-merged and updated, an unknown one is created.

use crate::extraction::strip_tags;
use crate::merge::DeepMerge;
use crate::model::{
    GeoLocation, General, Industry, Location, NormalizedCompany, Ownership, ScrapedRecord,
    StoredCompany,
};
use crate::store::{CompanyStore, StoreError};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

static REGION_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i),| and ").expect("valid regex"));

static COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(",").expect("valid regex"));

fn absolute(base_url: &str, link: &str) -> String {
    let trimmed = link.trim().trim_end_matches('/');
    if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            trimmed.trim_start_matches('/')
        )
    }
}

fn split_list(value: Option<&str>, separator: &Regex) -> Vec<String> {
    value
        .map(|v| {
            separator
                .split(v)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Shape a crawl record into a company, with its resolved location.
pub fn to_normalized(
    record: &ScrapedRecord,
    base_url: &str,
    location: GeoLocation,
) -> NormalizedCompany {
    let website_url = non_empty(
        record
            .url
            .as_deref()
            .map(|u| u.trim().trim_end_matches('/').to_string()),
    );

    let logo_url = record
        .logo
        .as_deref()
        .map(|l| l.trim().trim_start_matches('/'))
        .filter(|l| !l.is_empty())
        .map(|l| {
            if l.starts_with("http") {
                l.to_string()
            } else {
                format!("{}/{l}", base_url.trim_end_matches('/'))
            }
        });

    let mut relevant_links: Vec<String> = Vec::new();
    for link in record.link_candidates() {
        let link = absolute(base_url, link);
        if !relevant_links.contains(&link) {
            relevant_links.push(link);
        }
    }

    NormalizedCompany {
        general: General {
            name: record.name.trim().to_string(),
            description: non_empty(
                record
                    .description
                    .as_deref()
                    .map(|d| strip_tags(d).trim().to_string()),
            ),
            website_url,
            logo_url,
            relevant_links,
            employee_count: non_empty(record.employee_count.clone()),
            executive_members: record.executive_members.clone(),
        },
        location: Location {
            headquarters: non_empty(record.headquarters.clone().map(|h| h.trim().to_string())),
            city: location.city,
            state: location.state,
            country: location.country,
        },
        industry: Industry {
            industry_type: non_empty(record.industry.clone()),
        },
        ownership: Ownership {
            operating_region: split_list(record.region.as_deref(), &REGION_SEPARATOR),
            year_since_investment: non_empty(record.year_of_investment.clone()),
            asset_classes: split_list(record.asset_class.as_deref(), &COMMA),
            investment_interest: non_empty(record.ownership_details.clone()),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub created: usize,
    pub updated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanySummary {
    pub total_companies: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

pub struct CompanyService {
    store: Arc<dyn CompanyStore>,
    cache: RwLock<Vec<StoredCompany>>,
    batch_size: usize,
}

impl CompanyService {
    pub fn new(store: Arc<dyn CompanyStore>, batch_size: usize) -> Self {
        Self {
            store,
            cache: RwLock::new(Vec::new()),
            batch_size: batch_size.max(1),
        }
    }

    /// Find the stored counterpart by website, or by name when the company
    /// has no website.
    fn find_existing(
        &self,
        company: &NormalizedCompany,
    ) -> Result<Option<StoredCompany>, StoreError> {
        match company.general.website_url.as_deref() {
            Some(website) => self.store.find_by_website(website),
            None => self.store.find_by_name(&company.general.name),
        }
    }

    /// Merge into the stored company, or create it.
    pub async fn save_or_update(
        &self,
        company: NormalizedCompany,
    ) -> Result<SaveOutcome, StoreError> {
        match self.find_existing(&company)? {
            Some(existing) => {
                let mut merged = existing.company;
                merged.merge_from(company);
                self.store.update(existing.company_id, &merged)?;
                debug!(company = %merged.general.name, id = existing.company_id, "updated company");
                Ok(SaveOutcome::Updated)
            }
            None => {
                let stored = self.store.create(&company)?;
                debug!(company = %company.general.name, id = stored.company_id, "created company");
                Ok(SaveOutcome::Created)
            }
        }
    }

    /// Save in concurrent batches. One failure never affects the others.
    pub async fn save_all(&self, companies: Vec<NormalizedCompany>) -> SaveReport {
        let mut report = SaveReport::default();
        let mut pending = companies.into_iter().peekable();

        while pending.peek().is_some() {
            let batch: Vec<NormalizedCompany> = pending.by_ref().take(self.batch_size).collect();
            let names: Vec<String> = batch.iter().map(|c| c.general.name.clone()).collect();
            let results = join_all(batch.into_iter().map(|c| self.save_or_update(c))).await;

            for (name, result) in names.iter().zip(results) {
                match result {
                    Ok(SaveOutcome::Created) => report.created += 1,
                    Ok(SaveOutcome::Updated) => report.updated += 1,
                    Err(e) => {
                        warn!(company = %name, "failed to save company: {e}");
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            created = report.created,
            updated = report.updated,
            failed = report.failed,
            "companies saved"
        );
        report
    }

    /// Stored companies, from memory unless empty or `force` is set.
    pub async fn get_companies(&self, force: bool) -> Result<Vec<StoredCompany>, StoreError> {
        {
            let cache = self.cache.read().await;
            if !force && !cache.is_empty() {
                return Ok(cache.clone());
            }
        }

        let companies = self.store.list_all()?;
        info!(count = companies.len(), "loaded companies from store");
        *self.cache.write().await = companies.clone();
        Ok(companies)
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
        debug!("company cache cleared");
    }

    pub async fn summary(&self) -> Result<CompanySummary, StoreError> {
        let total_companies = self.get_companies(false).await?.len();
        Ok(CompanySummary {
            total_companies,
            last_updated: self.store.last_updated()?,
        })
    }
}
