//! Headless Chromium sessions for roster pages that only exist after
//! client-side rendering.
//!
//! Each call launches its own browser, runs one query against one page,
//! and tears the browser down again before returning, on success, error,
//! and timeout alike. Nothing is shared between calls. The whole
//! interaction, launch included, is bounded by the fetch timeout.

use std::path::PathBuf;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::task::JoinHandle;

use roster_core::FetchError;

use crate::config::FetchConfig;

/// Launch and timing settings for one browser session.
#[derive(Debug, Clone)]
pub struct BrowserOptions {
    pub timeout: Duration,
    pub settle: Duration,
    pub user_agent: String,
    pub chrome_executable: Option<PathBuf>,
    pub no_sandbox: bool,
}

impl From<&FetchConfig> for BrowserOptions {
    fn from(config: &FetchConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            settle: Duration::from_millis(config.settle_ms),
            user_agent: config.user_agent.clone(),
            chrome_executable: config.chrome_executable.clone(),
            no_sandbox: config.no_sandbox,
        }
    }
}

/// A running browser plus the task pumping its DevTools event stream.
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    async fn launch(opts: &BrowserOptions, url: &str) -> Result<Self, FetchError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(opts.timeout)
            .arg(format!("--user-agent={}", opts.user_agent));
        if let Some(path) = &opts.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        if opts.no_sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder.build().map_err(|e| FetchError::Network {
            url: url.to_string(),
            message: format!("browser config: {}", e),
        })?;

        let (browser, mut events) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                message: format!("browser launch: {}", e),
            })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self { browser, handler })
    }

    /// Open `url`, wait `settle`, and evaluate `script` in the page.
    async fn evaluate<T: DeserializeOwned>(
        &self,
        url: &str,
        script: &str,
        settle: Duration,
    ) -> Result<T, FetchError> {
        let network = |message: String| FetchError::Network {
            url: url.to_string(),
            message,
        };

        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| network(format!("navigation: {}", e)))?;
        tokio::time::sleep(settle).await;

        let params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(network)?;
        let value = page
            .evaluate_expression(params)
            .await
            .map_err(|e| network(format!("script evaluation: {}", e)))?
            .into_value::<T>()
            .map_err(|e| network(format!("script result: {}", e)))?;

        if let Err(e) = page.close().await {
            tracing::debug!(url, error = %e, "page close failed");
        }
        Ok(value)
    }

    async fn close(mut self) {
        let shutdown = async {
            if let Err(e) = self.browser.close().await {
                tracing::debug!(error = %e, "browser close failed");
            }
            if let Err(e) = self.browser.wait().await {
                tracing::debug!(error = %e, "browser wait failed");
            }
        };
        if tokio::time::timeout(Duration::from_secs(5), shutdown).await.is_err() {
            tracing::warn!("browser did not exit in time; killing");
            if let Err(e) = self.browser.kill().await.transpose() {
                tracing::debug!(error = %e, "browser kill failed");
            }
        }
        self.handler.abort();
    }
}

/// Launch a session, evaluate `script` on `url`, and always tear down.
async fn run_script<T: DeserializeOwned>(
    opts: &BrowserOptions,
    url: &str,
    script: &str,
) -> Result<T, FetchError> {
    let mut session: Option<BrowserSession> = None;

    let outcome = tokio::time::timeout(opts.timeout, async {
        let active = session.insert(BrowserSession::launch(opts, url).await?);
        active.evaluate::<T>(url, script, opts.settle).await
    })
    .await;

    if let Some(active) = session.take() {
        active.close().await;
    }

    match outcome {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            secs: opts.timeout.as_secs(),
        }),
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Resolved link target of the first element matching `selector`.
///
/// An element that is not itself a link resolves through its nearest
/// enclosing anchor.
pub async fn resolve_link(
    opts: &BrowserOptions,
    page_url: &str,
    selector: &str,
) -> Result<String, FetchError> {
    let script = format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            if (!el) return '';
            const a = el.closest('a') || el;
            return a.href || a.getAttribute('href') || '';
        }})()"#,
        sel = js_string(selector)
    );

    let href: String = run_script(opts, page_url, &script).await?;
    if href.trim().is_empty() {
        return Err(FetchError::ElementNotFound {
            url: page_url.to_string(),
            selector: selector.to_string(),
        });
    }
    Ok(href.trim().to_string())
}

#[derive(Deserialize)]
struct ListingResult {
    matched: usize,
    items: Vec<String>,
}

/// Trimmed, non-empty text content of every element matching `selector`.
pub async fn collect_listing(
    opts: &BrowserOptions,
    page_url: &str,
    selector: &str,
) -> Result<Vec<String>, FetchError> {
    let script = format!(
        r#"(() => {{
            const nodes = Array.from(document.querySelectorAll({sel}));
            return {{
                matched: nodes.length,
                items: nodes.map(n => (n.textContent || '').trim()).filter(t => t.length > 0),
            }};
        }})()"#,
        sel = js_string(selector)
    );

    let listing: ListingResult = run_script(opts, page_url, &script).await?;
    if listing.matched == 0 {
        return Err(FetchError::ElementNotFound {
            url: page_url.to_string(),
            selector: selector.to_string(),
        });
    }
    Ok(listing.items)
}
