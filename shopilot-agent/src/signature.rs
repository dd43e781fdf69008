//! ECDSA verification of inbound webhook signatures
//!
//! GitHub signs the raw request body with a P-256 key published on its meta
//! API. The signature header carries the DER-encoded (R, S) pair in base64.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::FutureExt;
use p256::ecdsa::signature::DigestVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use shopilot_core::{retry_async, ErrorContext, RetryConfig, ShopilotError, ShopilotResult};
use tracing::debug;

/// Header carrying the body signature on inbound webhook requests
pub const SIGNATURE_HEADER: &str = "Github-Public-Key-Signature";

/// Verifies that a request body was signed by the trusted key
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Parse a PEM-encoded P-256 public key
    pub fn from_pem(pem: &str) -> ShopilotResult<Self> {
        let key = p256::PublicKey::from_public_key_pem(pem).map_err(|e| {
            ShopilotError::Authentication {
                message: format!("invalid public key: {e}"),
                context: ErrorContext::new("signature")
                    .with_operation("from_pem")
                    .with_suggestion("Refetch the key list from the GitHub meta API"),
            }
        })?;
        Ok(Self::new(VerifyingKey::from(key)))
    }

    /// Check a base64-encoded DER signature against the raw request body
    ///
    /// Malformed base64, malformed DER and cryptographic mismatch all come
    /// back as `false`; the caller rejects the request the same way for each.
    pub fn verify(&self, body: &[u8], signature: &str) -> bool {
        let Ok(der) = BASE64.decode(signature) else {
            return false;
        };
        let Ok(signature) = Signature::from_der(&der) else {
            return false;
        };
        self.key
            .verify_digest(Sha256::new_with_prefix(body), &signature)
            .is_ok()
    }
}

#[derive(Debug, Deserialize)]
struct PublicKeyList {
    public_keys: Vec<PublicKeyEntry>,
}

#[derive(Debug, Deserialize)]
struct PublicKeyEntry {
    key: String,
    #[serde(default)]
    key_identifier: String,
    #[serde(default)]
    is_current: bool,
}

/// Fetch the current Copilot request-signing key from the GitHub meta API
///
/// Runs once at process start; requests cannot be verified without it, so
/// transient fetch failures are retried.
pub async fn fetch_public_key(github_api_url: &str) -> ShopilotResult<SignatureVerifier> {
    let url = format!(
        "{}/meta/public_keys/copilot_api",
        github_api_url.trim_end_matches('/')
    );

    let retry = RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 500,
        ..Default::default()
    };
    let list = retry_async(
        move || {
            let url = url.clone();
            async move { fetch_key_list(&url).await }.boxed()
        },
        retry,
        "fetch_public_key",
    )
    .await?;

    let entry = list
        .public_keys
        .into_iter()
        .find(|entry| entry.is_current)
        .ok_or_else(|| ShopilotError::Authentication {
            message: "key list contains no current key".to_string(),
            context: ErrorContext::new("signature").with_operation("fetch_public_key"),
        })?;

    debug!(key_identifier = %entry.key_identifier, "Fetched request signing key");
    SignatureVerifier::from_pem(&entry.key.replace("\\n", "\n"))
}

async fn fetch_key_list(url: &str) -> ShopilotResult<PublicKeyList> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .header("User-Agent", "shopilot")
        .send()
        .await
        .map_err(|e| key_fetch_error(format!("request failed: {e}"), Some(Box::new(e))))?;

    let status = response.status();
    if !status.is_success() {
        return Err(key_fetch_error(
            format!("key list endpoint returned {status}"),
            None,
        ));
    }

    response
        .json()
        .await
        .map_err(|e| key_fetch_error(format!("undecodable key list: {e}"), Some(Box::new(e))))
}

fn key_fetch_error(
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
) -> ShopilotError {
    ShopilotError::Network {
        message,
        source,
        context: ErrorContext::new("signature").with_operation("fetch_public_key"),
    }
}
