//! Extension lookup against the Shopware store catalog

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use shopilot_copilot::FunctionDefinition;
use shopilot_core::{ErrorContext, ShopilotError, ShopilotResult};

use super::ToolHandler;

pub const STORE_EXTENSION_TOOL: &str = "get_store_extension";

const DEFAULT_BASE_URL: &str = "https://api.shopware.com";

#[derive(Debug, Deserialize)]
struct StoreExtensionArgs {
    name: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Extension {
    label: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    changelog: Vec<ChangelogEntry>,
}

#[derive(Debug, Deserialize)]
struct ChangelogEntry {
    #[serde(default)]
    version: String,
    #[serde(default)]
    text: String,
}

/// Looks up store extensions by technical name and renders them as Markdown
pub struct StoreExtensionTool {
    http: reqwest::Client,
    base_url: String,
}

impl StoreExtensionTool {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn extensions(&self, names: &[String]) -> ShopilotResult<String> {
        let url = format!("{}/pluginStore/pluginsByName", self.base_url);
        let pairs: Vec<(&str, &str)> = names
            .iter()
            .map(|name| ("technicalNames[]", name.as_str()))
            .collect();

        let response = self
            .http
            .get(&url)
            .query(&pairs)
            .header("User-Agent", "shopilot")
            .send()
            .await
            .map_err(|err| catalog_error("request failed", Some(Box::new(err))))?;

        if !response.status().is_success() {
            return Err(catalog_error(
                &format!("catalog returned status {}", response.status()),
                None,
            ));
        }

        let extensions: Vec<Extension> = response
            .json()
            .await
            .map_err(|err| catalog_error("invalid catalog payload", Some(Box::new(err))))?;

        Ok(render_extensions(&extensions))
    }
}

impl Default for StoreExtensionTool {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

fn render_extensions(extensions: &[Extension]) -> String {
    let sections: Vec<String> = extensions
        .iter()
        .map(|extension| {
            let mut section = format!(
                "## {}\n\n{}\n\nCurrent version: {}",
                extension.label, extension.description, extension.version
            );
            if !extension.changelog.is_empty() {
                section.push_str("\n\nChangelog:");
                for entry in &extension.changelog {
                    section.push_str(&format!("\n- {}: {}", entry.version, entry.text));
                }
            }
            section
        })
        .collect();
    sections.join("\n\n")
}

fn catalog_error(
    message: &str,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
) -> ShopilotError {
    ShopilotError::Dispatch {
        tool: STORE_EXTENSION_TOOL.to_string(),
        message: message.to_string(),
        source,
        context: ErrorContext::new("store_extension_tool").with_operation("extensions"),
    }
}

#[async_trait]
impl ToolHandler for StoreExtensionTool {
    fn name(&self) -> &str {
        STORE_EXTENSION_TOOL
    }

    fn definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: STORE_EXTENSION_TOOL.to_string(),
            description: "Get details about extensions from the Shopware store".to_string(),
            parameters: Some(json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Technical names of the extensions to look up",
                    },
                },
                "required": ["name"],
            })),
        }
    }

    async fn invoke(&self, arguments: &str) -> ShopilotResult<String> {
        let args: StoreExtensionArgs =
            serde_json::from_str(arguments).map_err(|err| ShopilotError::Dispatch {
                tool: STORE_EXTENSION_TOOL.to_string(),
                message: format!("malformed arguments: {err}"),
                source: Some(Box::new(err)),
                context: ErrorContext::new("store_extension_tool").with_operation("invoke"),
            })?;

        self.extensions(&args.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn renders_extensions_as_markdown_sections() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/pluginStore/pluginsByName"))
            .and(query_param("technicalNames[]", "SwagPayPal"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "label": "PayPal",
                    "description": "Payments for your shop.",
                    "version": "8.1.0",
                    "changelog": [
                        {"version": "8.1.0", "text": "Bug fixes"},
                        {"version": "8.0.0", "text": "New checkout"}
                    ]
                },
                {
                    "label": "Bare",
                }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let tool = StoreExtensionTool::new(&server.uri());
        let rendered = tool
            .invoke(r#"{"name": ["SwagPayPal"]}"#)
            .await
            .unwrap();

        assert!(rendered.starts_with("## PayPal\n\nPayments for your shop.\n\nCurrent version: 8.1.0"));
        assert!(rendered.contains("Changelog:\n- 8.1.0: Bug fixes\n- 8.0.0: New checkout"));
        assert!(rendered.contains("## Bare\n\n\n\nCurrent version: "));
        assert!(!rendered.ends_with("Changelog:"));
    }

    #[tokio::test]
    async fn each_requested_name_becomes_a_query_parameter() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/pluginStore/pluginsByName"))
            .and(query_param("technicalNames[]", "First"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let tool = StoreExtensionTool::new(&server.uri());
        let rendered = tool
            .invoke(r#"{"name": ["First", "Second"]}"#)
            .await
            .unwrap();

        assert_eq!(rendered, "");
        let received = server.received_requests().await.unwrap();
        let query = received[0].url.query().unwrap_or_default();
        assert!(query.contains("First"));
        assert!(query.contains("Second"));
    }

    #[tokio::test]
    async fn malformed_catalog_payload_fails_dispatch() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/pluginStore/pluginsByName"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let tool = StoreExtensionTool::new(&server.uri());
        let err = tool.invoke(r#"{"name": ["X"]}"#).await.unwrap_err();

        assert!(matches!(
            err,
            ShopilotError::Dispatch { tool, .. } if tool == STORE_EXTENSION_TOOL
        ));
    }

    #[tokio::test]
    async fn upstream_error_status_fails_dispatch() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/pluginStore/pluginsByName"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tool = StoreExtensionTool::new(&server.uri());
        let err = tool.invoke(r#"{"name": ["X"]}"#).await.unwrap_err();

        assert!(matches!(err, ShopilotError::Dispatch { .. }));
    }
}
