//! Process configuration
//!
//! All configuration comes from environment variables; binaries load an
//! optional `.env` file before calling [`AppConfig::from_env`].

use crate::error::{ErrorContext, ShopilotError, ShopilotResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const FQDN_ENV: &str = "FQDN";
const CLIENT_ID_ENV: &str = "CLIENT_ID";
const CLIENT_SECRET_ENV: &str = "CLIENT_SECRET";

/// Application configuration shared by the server and the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Internet facing host address where the application lives
    /// (e.g. https://example.com), used to build the OAuth callback URL
    pub fqdn: String,
    /// Client ID of the configured GitHub App
    pub client_id: String,
    /// Client secret of the configured GitHub App
    pub client_secret: String,
    /// Host the HTTP server binds to
    pub host: String,
    /// Port the HTTP server listens on
    pub port: u16,
    /// Directory holding the persisted vector store
    pub db_dir: PathBuf,
    /// Directory walked by the indexing pipeline
    pub data_dir: PathBuf,
    /// GitHub token used for locally initiated Copilot calls (index/search/ask)
    pub github_token: Option<String>,
    /// Integration id sent along with locally initiated Copilot calls
    pub github_integration_id: Option<String>,
    /// Skip request signature verification (local debugging only)
    pub debug_skip_verification: bool,
    /// Base URL of the Copilot completions API
    pub copilot_api_url: String,
    /// Base URL of the GitHub REST API
    pub github_api_url: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ShopilotResult<Self> {
        Ok(Self {
            fqdn: required_env(FQDN_ENV)?,
            client_id: required_env(CLIENT_ID_ENV)?,
            client_secret: required_env(CLIENT_SECRET_ENV)?,
            host: std::env::var("SHOPILOT_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("SHOPILOT_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
            db_dir: std::env::var("SHOPILOT_DB_DIR")
                .unwrap_or_else(|_| "./db".to_string())
                .into(),
            data_dir: std::env::var("SHOPILOT_DATA_DIR")
                .unwrap_or_else(|_| "data".to_string())
                .into(),
            github_token: std::env::var("GITHUB_TOKEN").ok(),
            github_integration_id: std::env::var("GITHUB_INTEGRATION_ID").ok(),
            debug_skip_verification: std::env::var("DEBUG").as_deref() == Ok("true"),
            copilot_api_url: std::env::var("COPILOT_API_URL")
                .unwrap_or_else(|_| "https://api.githubcopilot.com".to_string()),
            github_api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".to_string()),
        })
    }

    /// Get the server bind address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Locally configured GitHub credentials, required by the CLI commands
    /// that call the Copilot API on their own behalf
    pub fn local_credentials(&self) -> ShopilotResult<(String, String)> {
        let token = self.github_token.clone().ok_or_else(|| missing_credentials())?;
        let integration_id = self
            .github_integration_id
            .clone()
            .ok_or_else(|| missing_credentials())?;
        Ok((token, integration_id))
    }
}

fn required_env(name: &str) -> ShopilotResult<String> {
    std::env::var(name).map_err(|_| ShopilotError::Config {
        message: format!("{} environment variable required", name),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("from_env")
            .with_metadata("variable", name)
            .with_suggestion("Set the variable in the environment or in a .env file"),
    })
}

fn missing_credentials() -> ShopilotError {
    ShopilotError::Config {
        message: "GITHUB_TOKEN and GITHUB_INTEGRATION_ID must be set for this command"
            .to_string(),
        source: None,
        context: ErrorContext::new("config")
            .with_operation("local_credentials")
            .with_suggestion("Create a personal access token with Copilot access"),
    }
}
