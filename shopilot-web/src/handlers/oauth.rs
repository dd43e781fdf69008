//! GitHub App OAuth flow
//!
//! Only the installation handshake: send the user to GitHub, exchange the
//! callback code once, confirm. Tokens are not persisted anywhere; Copilot
//! sends a fresh token with every agent request.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use shopilot_core::{ErrorContext, ShopilotError};
use tracing::info;
use utoipa::IntoParams;

use crate::error::WebError;
use crate::state::AppState;

const GITHUB_OAUTH_URL: &str = "https://github.com/login/oauth";

const CONFIRMATION_PAGE: &str = concat!(
    "<!DOCTYPE html><html><body>",
    "<p>All done! Shopilot is connected to your GitHub account. ",
    "You can close this window and return to your editor.</p>",
    "</body></html>",
);

#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: String,
}

/// Start the GitHub OAuth handshake
#[utoipa::path(
    get,
    path = "/auth/authorization",
    tag = "Auth",
    summary = "Redirect to the GitHub authorization page",
    responses(
        (status = 302, description = "Redirect to GitHub")
    )
)]
pub async fn oauth_authorization(State(state): State<AppState>) -> Response {
    let callback = format!("{}/auth/callback", state.config.fqdn);
    let url = format!(
        "{}/authorize?client_id={}&redirect_uri={}",
        GITHUB_OAUTH_URL,
        state.config.client_id,
        urlencoding::encode(&callback),
    );

    (StatusCode::FOUND, [(header::LOCATION, url)]).into_response()
}

/// Complete the GitHub OAuth handshake
#[utoipa::path(
    get,
    path = "/auth/callback",
    tag = "Auth",
    summary = "Exchange the OAuth code",
    params(CallbackParams),
    responses(
        (status = 200, description = "Authorization confirmed"),
        (status = 400, description = "Missing code parameter"),
        (status = 502, description = "Code exchange failed")
    )
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Html<&'static str>, WebError> {
    if params.code.is_empty() {
        return Err(ShopilotError::MalformedRequest {
            message: "code query parameter required".to_string(),
            source: None,
            context: ErrorContext::new("oauth").with_operation("callback"),
        }
        .into());
    }

    let response = reqwest::Client::new()
        .post(format!("{GITHUB_OAUTH_URL}/access_token"))
        .header("Accept", "application/json")
        .form(&[
            ("client_id", state.config.client_id.as_str()),
            ("client_secret", state.config.client_secret.as_str()),
            ("code", params.code.as_str()),
        ])
        .send()
        .await
        .map_err(|err| exchange_error("code exchange request failed", Some(Box::new(err))))?;

    if !response.status().is_success() {
        return Err(exchange_error(
            &format!("GitHub returned status {}", response.status()),
            None,
        )
        .into());
    }

    let token: AccessTokenResponse = response
        .json()
        .await
        .map_err(|err| exchange_error("undecodable token response", Some(Box::new(err))))?;
    if token.access_token.is_empty() {
        return Err(exchange_error("exchange response carried no token", None).into());
    }

    info!("Completed an OAuth code exchange");
    Ok(Html(CONFIRMATION_PAGE))
}

fn exchange_error(
    message: &str,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
) -> ShopilotError {
    ShopilotError::Network {
        message: format!("OAuth code exchange: {message}"),
        source,
        context: ErrorContext::new("oauth").with_operation("callback"),
    }
}
