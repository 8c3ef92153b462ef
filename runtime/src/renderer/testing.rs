// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! A fixed-document page for unit tests.

use super::{dom, CapturedResponse, NavigationResult, RenderContext};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::mpsc;

pub(crate) struct StaticPage {
    html: Mutex<String>,
    url: Mutex<String>,
    clicks: Mutex<Vec<(String, usize)>>,
    selects: Mutex<Vec<(String, String)>>,
    detached: bool,
}

impl StaticPage {
    pub(crate) fn new(html: &str) -> Self {
        Self {
            html: Mutex::new(html.to_string()),
            url: Mutex::new("about:blank".to_string()),
            clicks: Mutex::new(Vec::new()),
            selects: Mutex::new(Vec::new()),
            detached: false,
        }
    }

    /// A page whose document can no longer be read.
    pub(crate) fn detached() -> Self {
        Self {
            detached: true,
            ..Self::new("")
        }
    }

    pub(crate) fn clicks(&self) -> Vec<(String, usize)> {
        self.clicks.lock().unwrap().clone()
    }

    pub(crate) fn selects(&self) -> Vec<(String, String)> {
        self.selects.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderContext for StaticPage {
    async fn navigate(&self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        *self.url.lock().unwrap() = url.to_string();
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 0,
        })
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn get_html(&self) -> Result<String> {
        if self.detached {
            bail!("Execution context was destroyed");
        }
        Ok(self.html.lock().unwrap().clone())
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn click(&self, selector: &str, index: usize) -> Result<()> {
        let html = self.get_html().await?;
        if dom::count(&html, selector)? <= index {
            bail!("no element {index} for {selector}");
        }
        self.clicks.lock().unwrap().push((selector.to_string(), index));
        Ok(())
    }

    async fn scroll_into_view(&self, _selector: &str, _index: usize) -> Result<()> {
        Ok(())
    }

    async fn set_select_value(&self, selector: &str, value: &str) -> Result<bool> {
        let html = self.get_html().await?;
        let option = format!("{selector} option[value={}]", dom::quote_attr(value));
        if dom::count(&html, &option)? == 0 {
            return Ok(false);
        }
        self.selects
            .lock()
            .unwrap()
            .push((selector.to_string(), value.to_string()));
        Ok(true)
    }

    async fn wait_for_navigation(&self, _timeout_ms: u64) -> Result<()> {
        Ok(())
    }

    async fn scroll_height(&self) -> Result<u64> {
        Ok(1080)
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        Ok(())
    }

    async fn scroll_to_top(&self) -> Result<()> {
        Ok(())
    }

    async fn capture_responses(
        &self,
        _url_fragment: &str,
    ) -> Result<mpsc::UnboundedReceiver<CapturedResponse>> {
        let (_tx, rx) = mpsc::unbounded_channel();
        Ok(rx)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
