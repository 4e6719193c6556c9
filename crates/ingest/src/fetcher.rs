use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

use crate::config::IngestConfig;

pub trait DocumentFetcher {
    fn can_render(&self) -> bool;

    /// Fetch `url`. With `render_scripts` set and rendering available, the
    /// returned markup reflects the page after its scripts have settled.
    fn fetch(&self, url: &str, render_scripts: bool) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderRequest<'a> {
    url: &'a str,
    wait_for_timeout: u64,
    user_agent: &'a str,
}

pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
    render_endpoint: Option<String>,
    settle: Duration,
}

fn build_client(timeout: Duration, user_agent: &str) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .context("failed to build HTTP client")
}

impl HttpFetcher {
    pub fn from_config(cfg: &IngestConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(cfg.fetch_timeout, &cfg.user_agent)?,
            user_agent: cfg.user_agent.clone(),
            render_endpoint: cfg.render_endpoint.clone(),
            settle: cfg.render_settle,
        })
    }

    async fn get(&self, url: &str) -> Result<String> {
        tracing::info!(url, "fetching page");
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .send()
            .await
            .with_context(|| format!("failed to fetch {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("{url} returned HTTP {}", status);
        }
        response.text().await.context("failed to read response body")
    }

    async fn render(&self, endpoint: &str, url: &str) -> Result<String> {
        tracing::info!(url, endpoint, settle_ms = self.settle.as_millis() as u64, "rendering page");
        let body = RenderRequest {
            url,
            wait_for_timeout: self.settle.as_millis() as u64,
            user_agent: &self.user_agent,
        };
        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to render {url}"))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("render service returned HTTP {} for {url}", status);
        }
        response.text().await.context("failed to read rendered body")
    }
}

impl DocumentFetcher for HttpFetcher {
    fn can_render(&self) -> bool {
        self.render_endpoint.is_some()
    }

    async fn fetch(&self, url: &str, render_scripts: bool) -> Result<String> {
        match (&self.render_endpoint, render_scripts) {
            (Some(endpoint), true) => self.render(endpoint, url).await,
            (None, true) => {
                tracing::warn!(url, "page needs script rendering but no render endpoint is configured, fetching plain markup");
                self.get(url).await
            }
            (_, false) => self.get(url).await,
        }
    }
}
