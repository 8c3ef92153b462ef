// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Domain records: raw scraped entries and the normalized company entity.

use crate::extraction::FieldValue;
use crate::impl_deep_merge;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw per-company entry observed during a crawl.
///
/// Produced by table extraction, modal extraction, or passive capture, and
/// mutated only by the merge engine. `name` is the identity key; a record
/// whose name is blank never leaves normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_of_investment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headquarters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_link_one: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_link_two: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub executive_members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraped_at: Option<String>,
}

impl_deep_merge!(ScrapedRecord {
    name,
    logo,
    year_of_investment,
    headquarters,
    description,
    industry,
    asset_class,
    region,
    url,
    related_link_one,
    related_link_two,
    related_links,
    employee_count,
    executive_members,
    ownership_details,
    source,
    scraped_at,
});

impl ScrapedRecord {
    /// Create a record carrying only its identity key.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Assign an extracted value to the field with the given camelCase name.
    ///
    /// List fields accept either shape; scalar fields take the first element
    /// of a list. Returns `false` for unknown field names.
    pub fn set_field(&mut self, field: &str, value: FieldValue) -> bool {
        let slot = match field {
            "name" => {
                self.name = value.into_text().unwrap_or_default();
                return true;
            }
            "relatedLinks" => {
                self.related_links = value.into_list();
                return true;
            }
            "executiveMembers" => {
                self.executive_members = value.into_list();
                return true;
            }
            "logo" => &mut self.logo,
            "yearOfInvestment" => &mut self.year_of_investment,
            "headquarters" => &mut self.headquarters,
            "description" => &mut self.description,
            "industry" => &mut self.industry,
            "assetClass" => &mut self.asset_class,
            "region" => &mut self.region,
            "url" => &mut self.url,
            "relatedLinkOne" => &mut self.related_link_one,
            "relatedLinkTwo" => &mut self.related_link_two,
            "employeeCount" => &mut self.employee_count,
            "ownershipDetails" => &mut self.ownership_details,
            "source" => &mut self.source,
            _ => return false,
        };
        *slot = value.into_text();
        true
    }

    /// All related-link candidates: the two explicit slots, then the list.
    pub fn link_candidates(&self) -> Vec<&str> {
        self.related_link_one
            .iter()
            .chain(self.related_link_two.iter())
            .chain(self.related_links.iter())
            .map(String::as_str)
            .filter(|l| !l.trim().is_empty())
            .collect()
    }
}

/// `general` section of a company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct General {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub relevant_links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<String>,
    #[serde(default)]
    pub executive_members: Vec<String>,
}

impl_deep_merge!(General {
    name,
    description,
    website_url,
    logo_url,
    relevant_links,
    employee_count,
    executive_members,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headquarters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl_deep_merge!(Location {
    headquarters,
    city,
    state,
    country,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Industry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry_type: Option<String>,
}

impl_deep_merge!(Industry { industry_type });

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ownership {
    #[serde(default)]
    pub operating_region: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_since_investment: Option<String>,
    #[serde(default)]
    pub asset_classes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investment_interest: Option<String>,
}

impl_deep_merge!(Ownership {
    operating_region,
    year_since_investment,
    asset_classes,
    investment_interest,
});

/// The persisted company entity, minus store-assigned metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedCompany {
    pub general: General,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub industry: Industry,
    #[serde(default)]
    pub ownership: Ownership,
}

impl_deep_merge!(NormalizedCompany {
    general,
    location,
    industry,
    ownership,
});

/// A company as held by the store, with its assigned id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCompany {
    pub company_id: i64,
    #[serde(flatten)]
    pub company: NormalizedCompany,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A proxy address known to the persistent proxy store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyEntry {
    pub address: String,
    pub expires_at: DateTime<Utc>,
    pub failure_count: u32,
}

/// A resolved headquarters location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl GeoLocation {
    pub fn is_empty(&self) -> bool {
        self.city.is_none() && self.state.is_none() && self.country.is_none()
    }
}

/// An insert-only geocode cache row keyed by the raw headquarters text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoCacheEntry {
    pub headquarters_text: String,
    #[serde(flatten)]
    pub location: GeoLocation,
}
