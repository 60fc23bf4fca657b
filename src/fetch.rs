//! Document acquisition.
//!
//! [`DocumentFetcher`] is the seam the refresh pipeline fetches through;
//! [`Fetcher`] is the live implementation. Direct sources are a single
//! HTTP GET. Browser sources go through [`crate::browser`] first: link
//! sources resolve a download URL and then download it like a direct
//! source, listing sources return the gathered text nodes as-is.
//!
//! No retries happen here. A failure is returned to the caller.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use roster_core::{Acquisition, FetchError, IntermediateForm, RawDocument, Source};

use crate::browser::{self, BrowserOptions};
use crate::config::FetchConfig;

/// Acquires the raw document for one source.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<RawDocument, FetchError>;
}

/// Live fetcher backed by `reqwest` and headless Chromium.
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
    browser: BrowserOptions,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            timeout,
            browser: BrowserOptions::from(config),
        })
    }

    /// GET `url` and return the body bytes.
    pub async fn download(&self, url: &str) -> Result<RawDocument, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Network {
                url: url.to_string(),
                message: format!("HTTP {}", status),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.classify(url, e))?;

        tracing::debug!(url, bytes = bytes.len(), "downloaded document");
        Ok(RawDocument::Bytes {
            url: url.to_string(),
            bytes: bytes.to_vec(),
        })
    }

    fn classify(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            }
        } else {
            FetchError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl DocumentFetcher for Fetcher {
    #[tracing::instrument(skip_all, fields(county = %source.county))]
    async fn fetch(&self, source: &Source) -> Result<RawDocument, FetchError> {
        match &source.acquisition {
            Acquisition::Direct { url } => self.download(url).await,
            Acquisition::Browser { page_url, selector } => {
                if source.form == IntermediateForm::DomListing {
                    let items = browser::collect_listing(&self.browser, page_url, selector).await?;
                    tracing::debug!(items = items.len(), "collected listing");
                    Ok(RawDocument::Listing {
                        url: page_url.clone(),
                        items,
                    })
                } else {
                    let link = browser::resolve_link(&self.browser, page_url, selector).await?;
                    tracing::debug!(link = %link, "resolved document link");
                    self.download(&link).await
                }
            }
        }
    }
}
