// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! The SQLite store across process restarts.

use harvester_runtime::company::{to_normalized, CompanyService};
use harvester_runtime::model::{GeoCacheEntry, GeoLocation, ProxyEntry, ScrapedRecord};
use harvester_runtime::store::{CompanyStore, GeoCacheStore, ProxyStore, SqliteStore};
use std::sync::Arc;
use tempfile::TempDir;

const BASE: &str = "https://www.kkr.com";

fn record(name: &str, website: &str) -> ScrapedRecord {
    ScrapedRecord {
        url: Some(website.to_string()),
        description: Some(format!("{name} builds things.")),
        asset_class: Some("Private Equity".to_string()),
        ..ScrapedRecord::named(name)
    }
}

#[tokio::test]
async fn test_companies_survive_reopen_and_merge_on_update() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("harvester.db");

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let service = CompanyService::new(store, 10);
        let report = service
            .save_all(vec![
                to_normalized(&record("Acme", "https://acme.com"), BASE, GeoLocation::default()),
                to_normalized(&record("Globex", "https://globex.example"), BASE, GeoLocation::default()),
            ])
            .await;
        assert_eq!(report.created, 2);
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    let acme = store.find_by_website("https://acme.com").unwrap().unwrap();
    let created_at = acme.created_at;
    assert_eq!(acme.company.general.name, "Acme");

    // Renamed on the site but same website: merged into the same row.
    let service = CompanyService::new(store.clone(), 10);
    let mut renamed = record("Acme Holdings", "https://acme.com");
    renamed.description = None;
    renamed.asset_class = Some("Infrastructure".to_string());
    let report = service
        .save_all(vec![to_normalized(&renamed, BASE, GeoLocation::default())])
        .await;
    assert_eq!(report.updated, 1);

    let merged = store.find_by_id(acme.company_id).unwrap().unwrap();
    assert_eq!(merged.company.general.name, "Acme Holdings");
    assert_eq!(
        merged.company.general.description.as_deref(),
        Some("Acme builds things.")
    );
    assert_eq!(
        merged.company.ownership.asset_classes,
        vec!["Private Equity", "Infrastructure"]
    );
    assert_eq!(merged.created_at, created_at);
    assert!(merged.updated_at >= created_at);
    assert_eq!(store.last_updated().unwrap(), Some(merged.updated_at));
    assert_eq!(CompanyStore::list_all(&*store).unwrap().len(), 2);
}

#[test]
fn test_geo_cache_is_insert_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("geo.db");
    let austin = GeoCacheEntry {
        headquarters_text: "Austin, TX".to_string(),
        location: GeoLocation {
            city: Some("Austin".to_string()),
            state: Some("Texas".to_string()),
            country: None,
        },
    };

    {
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.insert_if_absent(&austin).unwrap());
        let mut other = austin.clone();
        other.location.city = Some("Elsewhere".to_string());
        assert!(!store.insert_if_absent(&other).unwrap());
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(store.find("Austin, TX").unwrap(), Some(austin));
    assert_eq!(GeoCacheStore::list_all(&store).unwrap().len(), 1);
}

#[test]
fn test_proxy_validity_and_failures() {
    let store = SqliteStore::open_in_memory().unwrap();
    let now = chrono::Utc::now();
    let entry = |address: &str, hours: i64| ProxyEntry {
        address: address.to_string(),
        expires_at: now + chrono::Duration::hours(hours),
        failure_count: 0,
    };
    store
        .upsert_batch(&[entry("1.1.1.1:80", 24), entry("2.2.2.2:80", -1), entry("3.3.3.3:80", 24)])
        .unwrap();

    let valid: Vec<String> = store
        .list_valid(now)
        .unwrap()
        .into_iter()
        .map(|e| e.address)
        .collect();
    assert_eq!(valid.len(), 2);
    assert!(!valid.contains(&"2.2.2.2:80".to_string()));

    assert_eq!(store.increment_failure("3.3.3.3:80").unwrap(), 1);
    assert_eq!(store.increment_failure("9.9.9.9:80").unwrap(), 0);
    assert_eq!(store.list_valid(now).unwrap().len(), 1);

    // Re-listing a proxy gives it a clean slate.
    store.upsert_batch(&[entry("3.3.3.3:80", 24)]).unwrap();
    assert_eq!(store.list_valid(now).unwrap().len(), 2);

    assert!(ProxyStore::delete(&store, "1.1.1.1:80").unwrap());
    assert!(!ProxyStore::delete(&store, "1.1.1.1:80").unwrap());
}
