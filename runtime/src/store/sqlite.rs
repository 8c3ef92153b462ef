// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! SQLite-backed stores.
//!
//! Companies are kept as JSON documents with the lookup keys (name, website)
//! mirrored into indexed columns. Timestamps are RFC 3339 UTC with
//! millisecond precision, so they compare correctly as text.

use super::{CompanyStore, GeoCacheStore, ProxyStore, StoreError, StoreResult};
use crate::model::{GeoCacheEntry, GeoLocation, NormalizedCompany, ProxyEntry, StoredCompany};
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS companies (
    company_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    website_url TEXT,
    document TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_companies_name ON companies(name);
CREATE INDEX IF NOT EXISTS idx_companies_website ON companies(website_url);

CREATE TABLE IF NOT EXISTS hq_locations (
    headquarters_text TEXT PRIMARY KEY,
    city TEXT,
    state TEXT,
    country TEXT
);

CREATE TABLE IF NOT EXISTS proxies (
    address TEXT PRIMARY KEY,
    expires_at TEXT NOT NULL,
    failures INTEGER NOT NULL DEFAULT 0
);
";

const COMPANY_COLUMNS: &str = "company_id, document, created_at, updated_at";

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp(raw.to_string()))
}

/// Raw company row, decoded outside the rusqlite row closure.
struct CompanyRow {
    company_id: i64,
    document: String,
    created_at: String,
    updated_at: String,
}

impl CompanyRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            company_id: row.get(0)?,
            document: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    fn decode(self) -> StoreResult<StoredCompany> {
        Ok(StoredCompany {
            company_id: self.company_id,
            company: serde_json::from_str(&self.document)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// One SQLite connection behind a mutex, shared by all three stores.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database: {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("failed to create schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn query_company(
        &self,
        filter: &str,
        value: &dyn rusqlite::ToSql,
    ) -> StoreResult<Option<StoredCompany>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE {filter} ORDER BY company_id LIMIT 1"
        );
        let row = conn.query_row(&sql, [value], CompanyRow::read).optional()?;
        row.map(CompanyRow::decode).transpose()
    }
}

impl CompanyStore for SqliteStore {
    fn find_by_name(&self, name: &str) -> StoreResult<Option<StoredCompany>> {
        self.query_company("name = ?1", &name.trim())
    }

    fn find_by_website(&self, website_url: &str) -> StoreResult<Option<StoredCompany>> {
        self.query_company("website_url = ?1", &website_url.trim())
    }

    fn find_by_id(&self, company_id: i64) -> StoreResult<Option<StoredCompany>> {
        self.query_company("company_id = ?1", &company_id)
    }

    fn create(&self, company: &NormalizedCompany) -> StoreResult<StoredCompany> {
        let now = Utc::now();
        let document = serde_json::to_string(company)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO companies (name, website_url, document, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                company.general.name.trim(),
                company.general.website_url.as_deref(),
                document,
                timestamp(now),
            ],
        )?;
        let company_id = conn.last_insert_rowid();
        drop(conn);

        self.find_by_id(company_id)?
            .ok_or(StoreError::NotFound(company_id))
    }

    fn update(&self, company_id: i64, company: &NormalizedCompany) -> StoreResult<StoredCompany> {
        let document = serde_json::to_string(company)?;
        let changed = self.conn()?.execute(
            "UPDATE companies SET name = ?1, website_url = ?2, document = ?3, updated_at = ?4
             WHERE company_id = ?5",
            params![
                company.general.name.trim(),
                company.general.website_url.as_deref(),
                document,
                timestamp(Utc::now()),
                company_id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(company_id));
        }
        self.find_by_id(company_id)?
            .ok_or(StoreError::NotFound(company_id))
    }

    fn delete(&self, company_id: i64) -> StoreResult<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM companies WHERE company_id = ?1", [company_id])?;
        Ok(removed > 0)
    }

    fn list_all(&self) -> StoreResult<Vec<StoredCompany>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies ORDER BY company_id"
        ))?;
        let rows = stmt
            .query_map([], CompanyRow::read)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(CompanyRow::decode).collect()
    }

    fn last_updated(&self) -> StoreResult<Option<DateTime<Utc>>> {
        let latest: Option<String> = self
            .conn()?
            .query_row("SELECT MAX(updated_at) FROM companies", [], |row| row.get(0))?;
        latest.as_deref().map(parse_timestamp).transpose()
    }
}

impl GeoCacheStore for SqliteStore {
    fn find(&self, headquarters_text: &str) -> StoreResult<Option<GeoCacheEntry>> {
        let conn = self.conn()?;
        let entry = conn
            .query_row(
                "SELECT headquarters_text, city, state, country FROM hq_locations
                 WHERE headquarters_text = ?1",
                [headquarters_text],
                read_geo,
            )
            .optional()?;
        Ok(entry)
    }

    fn insert_if_absent(&self, entry: &GeoCacheEntry) -> StoreResult<bool> {
        let inserted = self.conn()?.execute(
            "INSERT OR IGNORE INTO hq_locations (headquarters_text, city, state, country)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.headquarters_text,
                entry.location.city,
                entry.location.state,
                entry.location.country,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn list_all(&self) -> StoreResult<Vec<GeoCacheEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT headquarters_text, city, state, country FROM hq_locations
             ORDER BY headquarters_text",
        )?;
        let entries = stmt
            .query_map([], read_geo)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

fn read_geo(row: &Row<'_>) -> rusqlite::Result<GeoCacheEntry> {
    Ok(GeoCacheEntry {
        headquarters_text: row.get(0)?,
        location: GeoLocation {
            city: row.get(1)?,
            state: row.get(2)?,
            country: row.get(3)?,
        },
    })
}

impl ProxyStore for SqliteStore {
    fn list_valid(&self, now: DateTime<Utc>) -> StoreResult<Vec<ProxyEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT address, expires_at, failures FROM proxies
             WHERE expires_at > ?1 AND failures < 1 ORDER BY address",
        )?;
        let rows = stmt
            .query_map([timestamp(now)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(address, expires_at, failure_count)| {
                Ok(ProxyEntry {
                    address,
                    expires_at: parse_timestamp(&expires_at)?,
                    failure_count,
                })
            })
            .collect()
    }

    fn upsert_batch(&self, entries: &[ProxyEntry]) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO proxies (address, expires_at, failures) VALUES (?1, ?2, ?3)
                 ON CONFLICT(address) DO UPDATE SET
                     expires_at = excluded.expires_at,
                     failures = excluded.failures",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.address,
                    timestamp(entry.expires_at),
                    entry.failure_count
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn increment_failure(&self, address: &str) -> StoreResult<u32> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE proxies SET failures = failures + 1 WHERE address = ?1",
            [address],
        )?;
        let failures = conn
            .query_row(
                "SELECT failures FROM proxies WHERE address = ?1",
                [address],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        Ok(failures.unwrap_or(0))
    }

    fn delete(&self, address: &str) -> StoreResult<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM proxies WHERE address = ?1", [address])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::General;
    use chrono::Duration;

    fn company(name: &str, website: Option<&str>) -> NormalizedCompany {
        NormalizedCompany {
            general: General {
                name: name.into(),
                website_url: website.map(str::to_string),
                ..General::default()
            },
            ..NormalizedCompany::default()
        }
    }

    #[test]
    fn test_company_crud() {
        let store = SqliteStore::open_in_memory().unwrap();
        let created = store
            .create(&company("Acme", Some("https://acme.com")))
            .unwrap();
        assert_eq!(created.company.general.name, "Acme");
        assert_eq!(created.created_at, created.updated_at);

        let by_site = store.find_by_website("https://acme.com").unwrap().unwrap();
        assert_eq!(by_site.company_id, created.company_id);
        assert!(store.find_by_name("Acme").unwrap().is_some());
        assert!(store.find_by_name("Nope").unwrap().is_none());

        let mut changed = created.company.clone();
        changed.general.description = Some("Widgets".into());
        let updated = store.update(created.company_id, &changed).unwrap();
        assert_eq!(updated.company.general.description.as_deref(), Some("Widgets"));
        assert!(updated.updated_at >= created.updated_at);
        assert_eq!(store.last_updated().unwrap(), Some(updated.updated_at));

        assert!(CompanyStore::delete(&store, created.company_id).unwrap());
        assert!(!CompanyStore::delete(&store, created.company_id).unwrap());
        assert!(CompanyStore::list_all(&store).unwrap().is_empty());
        assert_eq!(store.last_updated().unwrap(), None);
    }

    #[test]
    fn test_update_missing_company() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.update(42, &company("Ghost", None)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(42)));
    }

    #[test]
    fn test_geo_cache_is_insert_only() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = GeoCacheEntry {
            headquarters_text: "Austin, TX".into(),
            location: GeoLocation {
                city: Some("Austin".into()),
                state: Some("Texas".into()),
                country: Some("United States".into()),
            },
        };
        let second = GeoCacheEntry {
            location: GeoLocation::default(),
            ..first.clone()
        };

        assert!(store.insert_if_absent(&first).unwrap());
        assert!(!store.insert_if_absent(&second).unwrap());
        assert_eq!(store.find("Austin, TX").unwrap(), Some(first));
        assert_eq!(GeoCacheStore::list_all(&store).unwrap().len(), 1);
    }

    #[test]
    fn test_proxy_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        let now = Utc::now();
        store
            .upsert_batch(&[
                ProxyEntry {
                    address: "1.2.3.4:80".into(),
                    expires_at: now + Duration::hours(24),
                    failure_count: 0,
                },
                ProxyEntry {
                    address: "5.6.7.8:8080".into(),
                    expires_at: now - Duration::hours(1),
                    failure_count: 0,
                },
            ])
            .unwrap();

        let valid = store.list_valid(now).unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(valid[0].address, "1.2.3.4:80");

        assert_eq!(store.increment_failure("1.2.3.4:80").unwrap(), 1);
        assert_eq!(store.increment_failure("9.9.9.9:1").unwrap(), 0);
        assert!(ProxyStore::delete(&store, "1.2.3.4:80").unwrap());
        assert!(store.list_valid(now).unwrap().is_empty());
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("harvester.db");
        let store = SqliteStore::open(&path).unwrap();
        store.create(&company("Acme", None)).unwrap();
        assert!(path.exists());
    }
}
