// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Headquarters text → city / state / country.
//!
//! Lookups go memory → persistent cache → remote geocoder → comma-split
//! heuristic. The remote service is only asked about two-part texts such as
//! `"Austin, USA"`, where a bare split cannot tell a state from a city.

pub mod nominatim;
pub mod states;

pub use nominatim::NominatimClient;

use crate::model::{GeoCacheEntry, GeoLocation};
use crate::rate_limit::MinIntervalLimiter;
use crate::retry::{with_retry_notify, RetryPolicy};
use crate::store::{GeoCacheStore, StoreError};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A remote free-text geocoder.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the service knows no match.
    async fn geocode(&self, query: &str) -> Result<Option<GeoLocation>>;
}

fn split_parts(text: &str) -> Vec<&str> {
    text.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Comma-split interpretation: one part is a country, two are city and
/// country, three or more are city, state and country (extra parts ignored).
pub fn parse_headquarters(text: &str) -> GeoLocation {
    fn owned(part: &str) -> Option<String> {
        Some(part.to_string())
    }
    let location = match split_parts(text).as_slice() {
        [] => GeoLocation::default(),
        [country] => GeoLocation {
            country: owned(country),
            ..GeoLocation::default()
        },
        [city, country] => GeoLocation {
            city: owned(city),
            country: owned(country),
            ..GeoLocation::default()
        },
        [city, state, country, ..] => GeoLocation {
            city: owned(city),
            state: owned(state),
            country: owned(country),
        },
    };
    normalize_location(location)
}

/// Canonical country for `USA`, and full US state names.
pub fn normalize_location(mut location: GeoLocation) -> GeoLocation {
    location.country = location.country.map(|c| states::normalize_country(&c));
    let country = location.country.clone();
    location.state = location
        .state
        .map(|s| states::normalize_us_state(&s, country.as_deref()));
    location
}

pub struct GeoResolver {
    remote: Arc<dyn Geocoder>,
    store: Arc<dyn GeoCacheStore>,
    memory: DashMap<String, GeoLocation>,
    limiter: MinIntervalLimiter,
    retry: RetryPolicy,
}

impl GeoResolver {
    pub fn new(remote: Arc<dyn Geocoder>, store: Arc<dyn GeoCacheStore>) -> Self {
        Self {
            remote,
            store,
            memory: DashMap::new(),
            limiter: MinIntervalLimiter::new(Duration::from_secs(1)),
            retry: RetryPolicy::new(5, Duration::from_secs(1), true),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.limiter = MinIntervalLimiter::new(interval);
        self
    }

    /// Load every persisted resolution into memory.
    pub fn warm(&self) -> Result<usize, StoreError> {
        let entries = self.store.list_all()?;
        let count = entries.len();
        for entry in entries {
            self.memory.insert(entry.headquarters_text, entry.location);
        }
        info!(count, "loaded headquarters cache");
        Ok(count)
    }

    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }

    /// Resolve a headquarters text. Never fails; the worst case is the
    /// heuristic split.
    pub async fn resolve(&self, headquarters: &str) -> GeoLocation {
        let key = headquarters.trim();
        if key.is_empty() {
            return GeoLocation::default();
        }
        if let Some(hit) = self.memory.get(key) {
            return hit.clone();
        }

        match self.store.find(key) {
            Ok(Some(entry)) => {
                self.memory.insert(key.to_string(), entry.location.clone());
                return entry.location;
            }
            Ok(None) => {}
            Err(e) => warn!(headquarters = key, "geo cache lookup failed: {e}"),
        }

        if split_parts(key).len() == 2 {
            if let Some(location) = self.lookup_remote(key).await {
                let location = normalize_location(location);
                self.remember(key, &location);
                return location;
            }
        }

        let location = parse_headquarters(key);
        debug!(headquarters = key, ?location, "resolved by comma split");
        self.remember(key, &location);
        location
    }

    async fn lookup_remote(&self, key: &str) -> Option<GeoLocation> {
        let result = with_retry_notify(
            self.retry,
            move || async move {
                self.limiter.acquire().await;
                self.remote.geocode(key).await
            },
            |attempt, e: &anyhow::Error| {
                warn!(attempt, headquarters = key, "geocoding attempt failed: {e:#}");
            },
        )
        .await;

        match result {
            Ok(Some(location)) if !location.is_empty() => Some(location),
            Ok(_) => {
                debug!(headquarters = key, "geocoder found no match");
                None
            }
            Err(e) => {
                warn!(headquarters = key, "geocoding failed: {e:#}");
                None
            }
        }
    }

    fn remember(&self, key: &str, location: &GeoLocation) {
        if location.is_empty() {
            return;
        }
        self.memory.insert(key.to_string(), location.clone());
        let entry = GeoCacheEntry {
            headquarters_text: key.to_string(),
            location: location.clone(),
        };
        if let Err(e) = self.store.insert_if_absent(&entry) {
            warn!(headquarters = key, "failed to persist geocode: {e}");
        }
    }
}
