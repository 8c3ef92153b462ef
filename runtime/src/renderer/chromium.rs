// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Chromium-based renderer using chromiumoxide.

use super::{CapturedResponse, NavigationResult, PageOptions, RenderContext, Renderer};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, GetResponseBodyParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EventExceptionThrown;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

/// Flags passed to every launch.
const LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-setuid-sandbox",
    "--disable-dev-shm-usage",
    "--disable-accelerated-2d-canvas",
    "--disable-gpu",
    "--window-size=1920,1080",
    "--disable-blink-features=AutomationControlled",
    "--disable-web-security",
    "--disable-features=IsolateOrigins,site-per-process",
    "--allow-running-insecure-content",
    "--disable-extensions",
    "--disable-plugins",
    "--disable-default-apps",
    "--ignore-certificate-errors",
];

/// Response bodies are fetched after a short settle so Chromium has buffered
/// them.
const BODY_SETTLE: Duration = Duration::from_millis(50);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. HARVESTER_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("HARVESTER_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.harvester/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".harvester/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".harvester/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".harvester/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".harvester/chromium/chrome-linux64/chrome"),
                home.join(".harvester/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// How to launch Chromium.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    /// Explicit binary; falls back to [`find_chromium`].
    pub chrome_path: Option<PathBuf>,
    /// `host:port` of an HTTP proxy for all browser traffic.
    pub proxy_server: Option<String>,
    /// Show the browser window.
    pub headful: bool,
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    connected: Arc<AtomicBool>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance.
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        let chrome_path = match options.chrome_path {
            Some(path) => path,
            None => find_chromium()
                .context("Chromium not found. Set HARVESTER_CHROMIUM_PATH or install Chrome.")?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1920, 1080)
            .request_timeout(Duration::from_secs(30));
        if options.headful {
            builder = builder.with_head();
        }
        for arg in LAUNCH_ARGS {
            builder = builder.arg(*arg);
        }
        if let Some(proxy) = &options.proxy_server {
            builder = builder.arg(format!("--proxy-server=http://{proxy}"));
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&connected);
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser handler error: {e}");
                }
            }
            flag.store(false, Ordering::SeqCst);
            debug!("browser connection closed");
        });

        Ok(Self {
            browser: Mutex::new(browser),
            connected,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self, options: &PageOptions) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        page.set_user_agent(SetUserAgentOverrideParams::new(options.user_agent.clone()))
            .await
            .context("failed to set user agent")?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(options.viewport_width),
            i64::from(options.viewport_height),
            1.0,
            false,
        ))
        .await
        .context("failed to set viewport")?;
        page.execute(EnableParams::default())
            .await
            .context("failed to enable network events")?;

        spawn_diagnostics(&page).await;

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            timeout: options.timeout,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close browser")?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// Log page errors and failed responses at debug level.
async fn spawn_diagnostics(page: &Page) {
    match page.event_listener::<EventResponseReceived>().await {
        Ok(mut responses) => {
            tokio::spawn(async move {
                while let Some(event) = responses.next().await {
                    if event.response.status >= 400 {
                        debug!(
                            status = event.response.status,
                            url = %event.response.url,
                            "page response failed"
                        );
                    }
                }
            });
        }
        Err(e) => debug!("response diagnostics unavailable: {e}"),
    }

    match page.event_listener::<EventExceptionThrown>().await {
        Ok(mut errors) => {
            tokio::spawn(async move {
                while let Some(event) = errors.next().await {
                    debug!(error = %event.exception_details.text, "page error");
                }
            });
        }
        Err(e) => debug!("error diagnostics unavailable: {e}"),
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    timeout: Duration,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumContext {
    fn js_string(value: &str) -> String {
        serde_json::Value::String(value.to_string()).to_string()
    }

    async fn nth_element(
        &self,
        selector: &str,
        index: usize,
    ) -> Result<chromiumoxide::element::Element> {
        let mut elements = self
            .page
            .find_elements(selector)
            .await
            .with_context(|| format!("failed to query {selector}"))?;
        if index >= elements.len() {
            bail!("no element {index} for {selector} ({} found)", elements.len());
        }
        Ok(elements.swap_remove(index))
    }

    async fn with_timeout<T>(
        &self,
        what: &str,
        fut: impl std::future::Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => bail!("{what} timed out after {}ms", self.timeout.as_millis()),
        }
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .with_timeout("script", async {
                self.page.evaluate(script).await.context("JS execution failed")
            })
            .await?;

        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn get_html(&self) -> Result<String> {
        let html = self.execute_js("document.documentElement.outerHTML").await?;
        html.as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("page HTML was not a string"))
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .unwrap_or_default();
        Ok(url)
    }

    async fn click(&self, selector: &str, index: usize) -> Result<()> {
        let element = self.nth_element(selector, index).await?;
        self.with_timeout("click", async {
            element.click().await.context("click failed")?;
            Ok(())
        })
        .await
    }

    async fn scroll_into_view(&self, selector: &str, index: usize) -> Result<()> {
        let element = self.nth_element(selector, index).await?;
        element
            .scroll_into_view()
            .await
            .context("scroll into view failed")?;
        Ok(())
    }

    async fn set_select_value(&self, selector: &str, value: &str) -> Result<bool> {
        let script = format!(
            r#"(() => {{
                const select = document.querySelector({sel});
                if (!select) return false;
                const option = Array.from(select.options).find(o => o.value === {val});
                if (!option) return false;
                select.value = {val};
                select.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = Self::js_string(selector),
            val = Self::js_string(value),
        );
        Ok(self.execute_js(&script).await?.as_bool().unwrap_or(false))
    }

    async fn wait_for_navigation(&self, timeout_ms: u64) -> Result<()> {
        match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.page.wait_for_navigation(),
        )
        .await
        {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => bail!("navigation wait failed: {e}"),
            Err(_) => bail!("navigation wait timed out after {timeout_ms}ms"),
        }
    }

    async fn scroll_height(&self) -> Result<u64> {
        let height = self.execute_js("document.body.scrollHeight").await?;
        Ok(height.as_f64().map(|h| h.max(0.0) as u64).unwrap_or(0))
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.execute_js("window.scrollTo(0, document.body.scrollHeight)")
            .await?;
        Ok(())
    }

    async fn scroll_to_top(&self) -> Result<()> {
        self.execute_js("window.scrollTo(0, 0)").await?;
        Ok(())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                return style.visibility !== 'hidden' && style.display !== 'none'
                    && (rect.width > 0 || rect.height > 0);
            }})()"#,
            sel = Self::js_string(selector),
        );
        Ok(self.execute_js(&script).await?.as_bool().unwrap_or(false))
    }

    async fn capture_responses(
        &self,
        url_fragment: &str,
    ) -> Result<mpsc::UnboundedReceiver<CapturedResponse>> {
        let mut events = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to subscribe to responses")?;
        let page = self.page.clone();
        let fragment = url_fragment.to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if !event.response.url.contains(&fragment) {
                    continue;
                }
                tokio::time::sleep(BODY_SETTLE).await;
                let body = match page
                    .execute(GetResponseBodyParams::new(event.request_id.clone()))
                    .await
                {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(url = %event.response.url, "failed to read captured body: {e}");
                        continue;
                    }
                };
                if body.result.base64_encoded {
                    debug!(url = %event.response.url, "skipping binary captured body");
                    continue;
                }
                let captured = CapturedResponse {
                    url: event.response.url.clone(),
                    status: u16::try_from(event.response.status).unwrap_or(0),
                    body: body.result.body.clone(),
                };
                if tx.send(captured).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.page.close().await.context("failed to close page")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_args_hide_automation() {
        assert!(LAUNCH_ARGS.contains(&"--disable-blink-features=AutomationControlled"));
        assert!(LAUNCH_ARGS.contains(&"--window-size=1920,1080"));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_navigate_and_read_dom() {
        let renderer = ChromiumRenderer::launch(LaunchOptions::default())
            .await
            .expect("failed to launch");
        let options = PageOptions::new(crate::stealth::random_user_agent(), Duration::from_secs(30));
        let ctx = renderer
            .new_context(&options)
            .await
            .expect("failed to create context");

        ctx.navigate(
            "data:text/html,<h1>Hello</h1><select id=s><option value=a>A</option></select>",
            10000,
        )
        .await
        .expect("navigation failed");

        assert_eq!(ctx.texts("h1").await.unwrap(), vec!["Hello"]);
        assert!(ctx.set_select_value("#s", "a").await.unwrap());
        assert!(!ctx.set_select_value("#s", "zzz").await.unwrap());

        ctx.close().await.expect("close failed");
        assert_eq!(renderer.active_contexts(), 0);

        renderer.shutdown().await.expect("shutdown failed");
    }
}
