//! Shopware version listing backed by the GitHub releases API

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use shopilot_copilot::FunctionDefinition;
use shopilot_core::{ErrorContext, ShopilotError, ShopilotResult};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::ToolHandler;

pub const VERSIONS_TOOL: &str = "get_shopware_versions";

const RELEASES_PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    published_at: Option<String>,
}

/// Lists every published Shopware release.
///
/// The release list is fetched once per process and cached forever; Shopware
/// versions that shipped before the process started do not change.
pub struct VersionsTool {
    http: reqwest::Client,
    github_api_url: String,
    cache: Arc<RwLock<Option<String>>>,
}

impl VersionsTool {
    pub fn new(github_api_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            github_api_url: github_api_url.trim_end_matches('/').to_string(),
            cache: Arc::new(RwLock::new(None)),
        }
    }

    async fn versions(&self) -> ShopilotResult<String> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            debug!("Serving Shopware versions from cache");
            return Ok(cached.clone());
        }

        // Holding the write lock across the fetch keeps concurrent callers
        // queued behind a single upstream request.
        let mut slot = self.cache.write().await;
        if let Some(cached) = slot.as_ref() {
            return Ok(cached.clone());
        }

        let listing = self.fetch_all_releases().await?;
        *slot = Some(listing.clone());
        Ok(listing)
    }

    async fn fetch_all_releases(&self) -> ShopilotResult<String> {
        let mut lines = Vec::new();
        let mut page = 1usize;

        loop {
            let url = format!(
                "{}/repos/shopware/shopware/releases",
                self.github_api_url
            );
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("per_page", RELEASES_PER_PAGE.to_string()),
                    ("page", page.to_string()),
                ])
                .header("User-Agent", "shopilot")
                .header("Accept", "application/vnd.github+json")
                .send()
                .await
                .map_err(|err| releases_error("request failed", Some(Box::new(err))))?;

            if !response.status().is_success() {
                return Err(releases_error(
                    &format!("GitHub returned status {}", response.status()),
                    None,
                ));
            }

            let releases: Vec<Release> = response
                .json()
                .await
                .map_err(|err| releases_error("invalid release payload", Some(Box::new(err))))?;

            if releases.is_empty() {
                break;
            }
            let page_len = releases.len();
            for release in releases {
                let published = release
                    .published_at
                    .unwrap_or_else(|| "unknown".to_string());
                lines.push(format!("{} released at: {}", release.tag_name, published));
            }
            if page_len < RELEASES_PER_PAGE {
                break;
            }
            page += 1;
        }

        info!(releases = lines.len(), "Fetched Shopware release list");
        Ok(lines.join("\n"))
    }
}

#[async_trait]
impl ToolHandler for VersionsTool {
    fn name(&self) -> &str {
        VERSIONS_TOOL
    }

    fn definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: VERSIONS_TOOL.to_string(),
            description: "Get all available Shopware versions".to_string(),
            parameters: None,
        }
    }

    async fn invoke(&self, _arguments: &str) -> ShopilotResult<String> {
        self.versions().await
    }
}

fn releases_error(
    message: &str,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
) -> ShopilotError {
    ShopilotError::Network {
        message: format!("fetching Shopware releases: {message}"),
        source,
        context: ErrorContext::new("versions_tool").with_operation("fetch_all_releases"),
    }
}
