// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Proxy pool against mocked list sources and probes.

use async_trait::async_trait;
use harvester_runtime::proxy::{http_client, HttpProbe, ProxyPool, ProxyPoolConfig, ProxyProbe};
use harvester_runtime::store::{ProxyStore, SqliteStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LIST: &str = "1.2.3.4:8080\n5.6.7.8:3128\nnot a proxy\n\n1.2.3.4:8080\n";

struct AcceptOnly {
    good: Option<&'static str>,
    probes: AtomicUsize,
}

impl AcceptOnly {
    fn new(good: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            good,
            probes: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ProxyProbe for AcceptOnly {
    async fn probe(&self, address: &str) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        Some(address) == self.good
    }
}

async fn list_source(expected_fetches: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/proxies.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(LIST))
        .expect(expected_fetches)
        .mount(&server)
        .await;
    server
}

fn config(server: &MockServer) -> ProxyPoolConfig {
    ProxyPoolConfig {
        sources: vec![
            format!("{}/proxies.txt", server.uri()),
            format!("{}/missing.txt", server.uri()),
        ],
        acquire_timeout: Duration::from_millis(300),
        fetch_timeout: Duration::from_secs(2),
        ..ProxyPoolConfig::default()
    }
}

#[tokio::test]
async fn test_concurrent_refreshes_fetch_once() {
    let server = list_source(1).await;
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let pool = Arc::new(ProxyPool::new(
        store.clone(),
        AcceptOnly::new(None),
        config(&server),
    ));

    let (a, b, c) = tokio::join!(pool.refresh(), pool.refresh(), pool.refresh());
    assert_eq!((a, b, c), (2, 2, 2));

    let mut cached = pool.cached();
    cached.sort();
    assert_eq!(cached, vec!["1.2.3.4:8080", "5.6.7.8:3128"]);
    assert_eq!(store.list_valid(chrono::Utc::now()).unwrap().len(), 2);
}

#[tokio::test]
async fn test_acquire_returns_validated_proxy() {
    let server = list_source(1).await;
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let probe = AcceptOnly::new(Some("5.6.7.8:3128"));
    let pool = Arc::new(ProxyPool::new(store.clone(), probe.clone(), config(&server)));

    let address = pool.acquire().await;
    assert_eq!(address.as_deref(), Some("5.6.7.8:3128"));

    // A rejected candidate, if one was drawn, is gone from cache and store.
    if probe.probes.load(Ordering::SeqCst) > 1 {
        assert_eq!(pool.cached(), vec!["5.6.7.8:3128"]);
        let stored: Vec<String> = store
            .list_valid(chrono::Utc::now())
            .unwrap()
            .into_iter()
            .map(|e| e.address)
            .collect();
        assert_eq!(stored, vec!["5.6.7.8:3128"]);
    }
}

#[tokio::test]
async fn test_acquire_falls_back_to_direct_connection() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let pool = Arc::new(ProxyPool::new(store, AcceptOnly::new(None), config(&server)));

    let started = Instant::now();
    assert_eq!(pool.acquire().await, None);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_http_probe_through_proxy() {
    // The mock server stands in for the proxy; any forwarded request succeeds.
    let proxy = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(1..)
        .mount(&proxy)
        .await;
    let address = proxy.address().to_string();

    let probe = HttpProbe::new("http://probe.invalid/ip");
    assert!(probe.probe(&address).await);
}

#[tokio::test]
async fn test_http_probe_rejects_dead_proxy() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let probe = HttpProbe::new("http://probe.invalid/ip");
    assert!(!probe.probe(&address).await);
}

#[tokio::test]
async fn test_http_client_without_pool_is_direct() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .expect(1)
        .mount(&server)
        .await;

    let client = http_client(None, Duration::from_secs(2)).await.unwrap();
    let body = client
        .get(format!("{}/ping", server.uri()))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "pong");
}
