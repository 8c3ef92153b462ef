// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Browser and page lifecycle for a crawl.
//!
//! One browser is shared by every page the crawl opens. It is launched on
//! first use and relaunched when the connection drops. Page creation is
//! serialized through the mutex guarding the browser handle.

use crate::proxy::ProxyPool;
use crate::renderer::chromium::{ChromiumRenderer, LaunchOptions};
use crate::renderer::{PageOptions, RenderContext, Renderer};
use crate::stealth::random_user_agent;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Starts a browser engine, optionally routed through a proxy.
#[async_trait]
pub trait RendererLauncher: Send + Sync {
    async fn launch(&self, proxy_server: Option<String>) -> Result<Arc<dyn Renderer>>;
}

/// Launches Chromium through chromiumoxide.
#[derive(Debug, Clone, Default)]
pub struct ChromiumLauncher {
    pub chrome_path: Option<PathBuf>,
    pub headful: bool,
}

#[async_trait]
impl RendererLauncher for ChromiumLauncher {
    async fn launch(&self, proxy_server: Option<String>) -> Result<Arc<dyn Renderer>> {
        let renderer = ChromiumRenderer::launch(LaunchOptions {
            chrome_path: self.chrome_path.clone(),
            proxy_server,
            headful: self.headful,
        })
        .await?;
        Ok(Arc::new(renderer))
    }
}

/// Owns the crawl's browser and hands out isolated pages.
pub struct SessionManager {
    launcher: Arc<dyn RendererLauncher>,
    proxies: Option<Arc<ProxyPool>>,
    browser: Mutex<Option<Arc<dyn Renderer>>>,
    default_timeout: Duration,
}

impl SessionManager {
    pub fn new(launcher: Arc<dyn RendererLauncher>, default_timeout: Duration) -> Self {
        Self {
            launcher,
            proxies: None,
            browser: Mutex::new(None),
            default_timeout,
        }
    }

    /// Route browser launches through proxies drawn from `pool`.
    pub fn with_proxies(mut self, pool: Arc<ProxyPool>) -> Self {
        self.proxies = Some(pool);
        self
    }

    async fn connected_browser(
        &self,
        slot: &mut Option<Arc<dyn Renderer>>,
    ) -> Result<Arc<dyn Renderer>> {
        if let Some(browser) = slot.as_ref() {
            if browser.is_connected() {
                return Ok(Arc::clone(browser));
            }
            warn!("browser disconnected, relaunching");
        }

        let proxy = match &self.proxies {
            Some(pool) => pool.acquire().await,
            None => None,
        };
        match &proxy {
            Some(address) => info!(proxy = %address, "launching browser through proxy"),
            None => info!("launching browser"),
        }

        let browser = self.launcher.launch(proxy).await?;
        *slot = Some(Arc::clone(&browser));
        Ok(browser)
    }

    /// Open a new page with a random or given user agent.
    pub async fn create_page(
        &self,
        user_agent: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Box<dyn RenderContext>> {
        let mut slot = self.browser.lock().await;
        let browser = self.connected_browser(&mut slot).await?;
        let options = PageOptions::new(
            user_agent.unwrap_or_else(random_user_agent),
            timeout.unwrap_or(self.default_timeout),
        );
        browser.new_context(&options).await
    }

    /// Close a page. Failures are logged, never raised.
    pub async fn close_page(&self, page: Box<dyn RenderContext>) {
        if let Err(e) = page.close().await {
            warn!("failed to close page: {e:#}");
        }
    }

    /// Shut down the browser if one is running.
    pub async fn close_browser(&self) {
        let browser = self.browser.lock().await.take();
        if let Some(browser) = browser {
            if let Err(e) = browser.shutdown().await {
                warn!("failed to close browser: {e:#}");
            }
        }
    }

    /// Close `page` and then the browser.
    pub async fn cleanup(&self, page: Box<dyn RenderContext>) {
        self.close_page(page).await;
        self.close_browser().await;
    }

    /// Whether a connected browser is currently held.
    pub async fn has_browser(&self) -> bool {
        self.browser
            .lock()
            .await
            .as_ref()
            .is_some_and(|b| b.is_connected())
    }
}
