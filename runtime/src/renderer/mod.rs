// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Renderer abstraction for browser-based page rendering.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). Interactions
//! go to the live page; DOM reads are served from a parsed snapshot of the
//! current document (see [`dom`]).

pub mod chromium;
pub mod dom;
#[cfg(test)]
pub(crate) mod testing;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Options applied to every new page.
#[derive(Debug, Clone)]
pub struct PageOptions {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Default timeout for navigation and page operations.
    pub timeout: Duration,
}

impl PageOptions {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            viewport_width: 1920,
            viewport_height: 1080,
            timeout,
        }
    }
}

/// A network response observed on a page whose URL matched a watch fragment.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self, options: &PageOptions) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Whether the underlying browser is still reachable.
    fn is_connected(&self) -> bool;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for rendering pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Click the `index`-th element matching `selector`.
    async fn click(&self, selector: &str, index: usize) -> Result<()>;
    /// Scroll the `index`-th element matching `selector` into view.
    async fn scroll_into_view(&self, selector: &str, index: usize) -> Result<()>;
    /// Set a native `<select>` value and fire `change`. `false` when the
    /// select or the option is missing.
    async fn set_select_value(&self, selector: &str, value: &str) -> Result<bool>;
    /// Wait for an in-flight navigation to settle.
    async fn wait_for_navigation(&self, timeout_ms: u64) -> Result<()>;
    /// Current document scroll height in pixels.
    async fn scroll_height(&self) -> Result<u64>;
    async fn scroll_to_bottom(&self) -> Result<()>;
    async fn scroll_to_top(&self) -> Result<()>;
    /// Stream responses whose URL contains `url_fragment` for the lifetime
    /// of the page.
    async fn capture_responses(
        &self,
        url_fragment: &str,
    ) -> Result<mpsc::UnboundedReceiver<CapturedResponse>>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;

    /// Whether the first element matching `selector` is rendered.
    async fn is_visible(&self, selector: &str) -> Result<bool> {
        Ok(self.count(selector).await? > 0)
    }

    /// Number of elements matching `selector`.
    async fn count(&self, selector: &str) -> Result<usize> {
        let html = self.get_html().await?;
        dom::count(&html, selector)
    }

    /// Trimmed text of every element matching `selector`.
    async fn texts(&self, selector: &str) -> Result<Vec<String>> {
        let html = self.get_html().await?;
        dom::texts(&html, selector)
    }

    /// Value of `attribute` on every matching element that carries it.
    async fn attributes(&self, selector: &str, attribute: &str) -> Result<Vec<String>> {
        let html = self.get_html().await?;
        dom::attributes(&html, selector, attribute)
    }

    /// Cell texts of every row matching `row_selector`.
    async fn row_cells(&self, row_selector: &str, cell_selector: &str) -> Result<Vec<Vec<String>>> {
        let html = self.get_html().await?;
        dom::row_cells(&html, row_selector, cell_selector)
    }

    /// Poll until `selector` matches something visible or `timeout` elapses.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_visible(selector).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
