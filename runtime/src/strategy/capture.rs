// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Passive capture of the site's background data endpoint.
//!
//! A listener task reads matching responses off the page and keeps the
//! first record seen for each company name. The crawl drains the buffer once
//! pagination is done.

use crate::model::ScrapedRecord;
use crate::renderer::CapturedResponse;
use dashmap::DashMap;
use serde::{Deserialize, Deserializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Keyed accumulator of passively captured records. First insert per name
/// wins; iteration follows insertion order.
#[derive(Debug, Default)]
pub struct InterceptionBuffer {
    entries: DashMap<String, (u64, ScrapedRecord)>,
    seq: AtomicU64,
}

impl InterceptionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the name is already present. Returns whether it was new.
    pub fn insert_if_absent(&self, name: &str, record: ScrapedRecord) -> bool {
        let mut inserted = false;
        self.entries.entry(name.to_string()).or_insert_with(|| {
            inserted = true;
            (self.seq.fetch_add(1, Ordering::SeqCst), record)
        });
        inserted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every record out, oldest first.
    pub fn drain(&self) -> Vec<ScrapedRecord> {
        let keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut records: Vec<(u64, ScrapedRecord)> = keys
            .into_iter()
            .filter_map(|k| self.entries.remove(&k).map(|(_, v)| v))
            .collect();
        records.sort_by_key(|(seq, _)| *seq);
        records.into_iter().map(|(_, r)| r).collect()
    }
}

/// Body of the background search endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchResponse {
    pub results_text: Option<String>,
    pub results: Vec<CapturedCompany>,
}

/// One company as the endpoint reports it.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CapturedCompany {
    pub name: Option<String>,
    pub logo: Option<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub yoi: Option<String>,
    pub hq: Option<String>,
    pub description: Option<String>,
    pub industry: Option<String>,
    pub asset_class: Option<String>,
    pub region: Option<String>,
    pub url: Option<String>,
    pub related_link_one: Option<String>,
    pub related_link_two: Option<String>,
    pub related_links: Option<Vec<String>>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl From<CapturedCompany> for ScrapedRecord {
    fn from(c: CapturedCompany) -> Self {
        ScrapedRecord {
            name: c.name.unwrap_or_default(),
            logo: c.logo,
            year_of_investment: c.yoi,
            headquarters: c.hq,
            description: c.description,
            industry: c.industry,
            asset_class: c.asset_class,
            region: c.region,
            url: c.url,
            related_link_one: c.related_link_one,
            related_link_two: c.related_link_two,
            related_links: c.related_links.unwrap_or_default(),
            ..ScrapedRecord::default()
        }
    }
}

/// Parse one captured body into the buffer. Returns how many names were new.
pub fn ingest<F>(buffer: &InterceptionBuffer, response: &CapturedResponse, normalize: &F) -> usize
where
    F: Fn(ScrapedRecord) -> Option<ScrapedRecord>,
{
    let parsed: SearchResponse = match serde_json::from_str(&response.body) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(url = %response.url, "failed to parse captured response: {e}");
            return 0;
        }
    };
    debug!(url = %response.url, results = ?parsed.results_text, "captured search response");

    let mut added = 0;
    for company in parsed.results {
        let key = company.name.as_deref().map(str::trim).unwrap_or_default().to_string();
        if key.is_empty() {
            continue;
        }
        if buffer.entries.contains_key(&key) {
            debug!(company = %key, "already captured, keeping first payload");
            continue;
        }
        let Some(record) = normalize(company.into()) else {
            continue;
        };
        if buffer.insert_if_absent(&key, record) {
            debug!(company = %key, "captured company");
            added += 1;
        }
    }
    added
}

/// A running listener feeding an [`InterceptionBuffer`].
pub struct CaptureListener {
    buffer: Arc<InterceptionBuffer>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CaptureListener {
    /// Spawn a task draining `responses` into a fresh buffer.
    pub fn spawn<F>(mut responses: mpsc::UnboundedReceiver<CapturedResponse>, normalize: F) -> Self
    where
        F: Fn(ScrapedRecord) -> Option<ScrapedRecord> + Send + Sync + 'static,
    {
        let buffer = Arc::new(InterceptionBuffer::new());
        let sink = Arc::clone(&buffer);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    message = responses.recv() => match message {
                        Some(response) => {
                            ingest(&sink, &response, &normalize);
                        }
                        None => break,
                    },
                    _ = &mut stop_rx => {
                        while let Ok(response) = responses.try_recv() {
                            ingest(&sink, &response, &normalize);
                        }
                        break;
                    }
                }
            }
        });

        Self {
            buffer,
            stop: Some(stop_tx),
            task,
        }
    }

    /// Records captured so far.
    pub fn captured(&self) -> usize {
        self.buffer.len()
    }

    /// Stop listening after pending responses are processed, and drain.
    pub async fn finish(mut self) -> Vec<ScrapedRecord> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            warn!("capture listener ended abnormally: {e}");
        }
        self.buffer.drain()
    }
}
