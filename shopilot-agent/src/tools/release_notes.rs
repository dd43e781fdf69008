//! Release note lookup against the shopware/release-notes repository

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use shopilot_copilot::FunctionDefinition;
use shopilot_core::{ErrorContext, ShopilotError, ShopilotResult};
use tracing::debug;

use super::ToolHandler;

pub const RELEASE_NOTES_TOOL: &str = "get_release_notes";

const DEFAULT_BASE_URL: &str =
    "https://raw.githubusercontent.com/shopware/release-notes/main/src";

#[derive(Debug, Deserialize)]
struct ReleaseNotesArgs {
    version: String,
}

/// Fetches the markdown release notes for one Shopware version
pub struct ReleaseNotesTool {
    http: reqwest::Client,
    base_url: String,
}

impl ReleaseNotesTool {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn notes_for(&self, version: &str) -> ShopilotResult<String> {
        let version = version.trim().trim_start_matches('v');
        // Notes are filed under their minor line, e.g. src/6.5/6.5.3.0.md.
        let prefix: String = version.chars().take(3).collect();
        let url = format!("{}/{}/{}.md", self.base_url, prefix, version);

        let response = self
            .http
            .get(&url)
            .header("User-Agent", "shopilot")
            .send()
            .await
            .map_err(|err| ShopilotError::Network {
                message: format!("fetching release notes for {version}"),
                source: Some(Box::new(err)),
                context: ErrorContext::new("release_notes_tool").with_operation("notes_for"),
            })?;

        // A version without published notes is an answerable outcome, not a
        // failure; the model is told nothing was found.
        if !response.status().is_success() {
            debug!(version, status = %response.status(), "No release notes found");
            return Ok(String::new());
        }

        response.text().await.map_err(|err| ShopilotError::Network {
            message: format!("reading release notes for {version}"),
            source: Some(Box::new(err)),
            context: ErrorContext::new("release_notes_tool").with_operation("notes_for"),
        })
    }
}

impl Default for ReleaseNotesTool {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl ToolHandler for ReleaseNotesTool {
    fn name(&self) -> &str {
        RELEASE_NOTES_TOOL
    }

    fn definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: RELEASE_NOTES_TOOL.to_string(),
            description: "Get the release notes of a specific Shopware version".to_string(),
            parameters: Some(json!({
                "type": "object",
                "properties": {
                    "version": {
                        "type": "string",
                        "description": "The Shopware version to look up, for example 6.5.3.0",
                    },
                },
                "required": ["version"],
            })),
        }
    }

    async fn invoke(&self, arguments: &str) -> ShopilotResult<String> {
        let args: ReleaseNotesArgs =
            serde_json::from_str(arguments).map_err(|err| ShopilotError::Dispatch {
                tool: RELEASE_NOTES_TOOL.to_string(),
                message: format!("malformed arguments: {err}"),
                source: Some(Box::new(err)),
                context: ErrorContext::new("release_notes_tool").with_operation("invoke"),
            })?;

        self.notes_for(&args.version).await
    }
}
