// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Persistent stores for companies, geocodes and proxies.
//!
//! The traits are the seams the services depend on; [`SqliteStore`]
//! implements all three over one database file.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::model::{GeoCacheEntry, NormalizedCompany, ProxyEntry, StoredCompany};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to (de)serialize stored document: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("invalid stored timestamp {0:?}")]
    Timestamp(String),
    #[error("company {0} not found")]
    NotFound(i64),
    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

pub trait CompanyStore: Send + Sync {
    fn find_by_name(&self, name: &str) -> StoreResult<Option<StoredCompany>>;
    fn find_by_website(&self, website_url: &str) -> StoreResult<Option<StoredCompany>>;
    fn find_by_id(&self, company_id: i64) -> StoreResult<Option<StoredCompany>>;
    fn create(&self, company: &NormalizedCompany) -> StoreResult<StoredCompany>;
    /// Replace the document of an existing company and bump `updated_at`.
    fn update(&self, company_id: i64, company: &NormalizedCompany) -> StoreResult<StoredCompany>;
    /// Returns whether a row was removed.
    fn delete(&self, company_id: i64) -> StoreResult<bool>;
    fn list_all(&self) -> StoreResult<Vec<StoredCompany>>;
    /// Most recent `updated_at` over all companies.
    fn last_updated(&self) -> StoreResult<Option<DateTime<Utc>>>;
}

pub trait GeoCacheStore: Send + Sync {
    fn find(&self, headquarters_text: &str) -> StoreResult<Option<GeoCacheEntry>>;
    /// Keep the first resolution of a text. Returns whether it was stored.
    fn insert_if_absent(&self, entry: &GeoCacheEntry) -> StoreResult<bool>;
    fn list_all(&self) -> StoreResult<Vec<GeoCacheEntry>>;
}

pub trait ProxyStore: Send + Sync {
    /// Entries expiring after `now` that have never failed a probe.
    fn list_valid(&self, now: DateTime<Utc>) -> StoreResult<Vec<ProxyEntry>>;
    fn upsert_batch(&self, entries: &[ProxyEntry]) -> StoreResult<()>;
    /// Bump the failure counter and return its new value. Unknown addresses
    /// report zero.
    fn increment_failure(&self, address: &str) -> StoreResult<u32>;
    fn delete(&self, address: &str) -> StoreResult<bool>;
}
