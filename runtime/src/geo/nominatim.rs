// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Nominatim-style `/search` client.

use super::Geocoder;
use crate::model::GeoLocation;
use crate::proxy::{self, ProxyPool};
use crate::stealth::identified_user_agent;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, USER_AGENT};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const APP_NAME: &str = "Portfolio Harvester";
const CONTACT: &str = "harvester@example.com";

#[derive(Debug, Deserialize)]
struct Place {
    #[serde(default)]
    address: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

impl From<Address> for GeoLocation {
    fn from(a: Address) -> Self {
        GeoLocation {
            city: a.city.or(a.town).or(a.village).or(a.hamlet),
            state: a.state,
            country: a.country,
        }
    }
}

pub struct NominatimClient {
    base_url: String,
    timeout: Duration,
    proxies: Option<Arc<ProxyPool>>,
}

impl NominatimClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(2),
            proxies: None,
        }
    }

    /// Route lookups through pooled proxies.
    pub fn with_proxies(mut self, pool: Arc<ProxyPool>) -> Self {
        self.proxies = Some(pool);
        self
    }
}

#[async_trait]
impl Geocoder for NominatimClient {
    async fn geocode(&self, query: &str) -> Result<Option<GeoLocation>> {
        let client = proxy::http_client(self.proxies.as_ref(), self.timeout).await?;
        let places: Vec<Place> = client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("q", query),
                ("format", "json"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ])
            .header(USER_AGENT, identified_user_agent(APP_NAME, CONTACT))
            .header(ACCEPT_LANGUAGE, "en")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let location = places
            .into_iter()
            .next()
            .map(|place| GeoLocation::from(place.address.unwrap_or_default()));
        debug!(query, found = location.is_some(), "geocoded");
        Ok(location)
    }
}
