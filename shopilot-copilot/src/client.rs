//! HTTP client for the Copilot chat completions and embeddings endpoints

use std::pin::Pin;

use async_stream::try_stream;
use futures::{FutureExt, Stream, StreamExt};
use shopilot_core::{retry_async, ErrorContext, RetryConfig, ShopilotError, ShopilotResult};
use tracing::{debug, warn};

use crate::types::{
    ChatCompletionChunk, ChatCompletionsRequest, ChatCompletionsResponse, EmbeddingsRequest,
    EmbeddingsResponse, Model,
};

/// Stream of decoded chat completion chunks
pub type ChatCompletionStream =
    Pin<Box<dyn Stream<Item = ShopilotResult<ChatCompletionChunk>> + Send>>;

/// Per-request credentials forwarded from the inbound webhook headers
#[derive(Debug, Clone)]
pub struct CopilotAuth {
    pub token: String,
    pub integration_id: String,
}

impl CopilotAuth {
    pub fn new(token: impl Into<String>, integration_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            integration_id: integration_id.into(),
        }
    }
}

/// Client for the Copilot API
///
/// Authentication is per request, not per client: the same client instance
/// serves every inbound webhook, each carrying its own token.
#[derive(Debug, Clone)]
pub struct CopilotClient {
    http: reqwest::Client,
    base_url: String,
}

impl CopilotClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn post(&self, path: &str, auth: &CopilotAuth) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&auth.token)
            .header("Accept", "application/json");
        if !auth.integration_id.is_empty() {
            builder = builder.header("Copilot-Integration-Id", &auth.integration_id);
        }
        builder
    }

    /// Open a streaming chat completion
    ///
    /// The HTTP status is checked before any stream is handed back, so a
    /// rejected request fails here and the caller never starts its own
    /// response body.
    pub async fn chat_completions_stream(
        &self,
        auth: &CopilotAuth,
        request: ChatCompletionsRequest,
    ) -> ShopilotResult<ChatCompletionStream> {
        debug!(
            model = ?request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Opening chat completion stream"
        );

        let response = self
            .post("/chat/completions", auth)
            .json(&request)
            .send()
            .await
            .map_err(|e| network_error("chat_completions_stream", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, "Chat completion request rejected");
            return Err(ShopilotError::UpstreamStream {
                message: format!("chat completions returned {status}: {body}"),
                source: None,
                context: ErrorContext::new("copilot")
                    .with_operation("chat_completions_stream")
                    .with_metadata("status", status.as_str()),
            });
        }

        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            let mut buffer = String::new();
            let mut done = false;

            while let Some(piece) = bytes.next().await {
                let piece = piece.map_err(|e| ShopilotError::UpstreamStream {
                    message: format!("reading chat completion stream failed: {e}"),
                    source: Some(Box::new(e)),
                    context: ErrorContext::new("copilot")
                        .with_operation("chat_completions_stream"),
                })?;
                buffer.push_str(&String::from_utf8_lossy(&piece));

                // Frames may arrive split at arbitrary byte boundaries, so
                // only complete lines are consumed from the buffer.
                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        done = true;
                        break;
                    }
                    let chunk: ChatCompletionChunk = serde_json::from_str(data)
                        .map_err(|e| ShopilotError::UpstreamStream {
                            message: format!("undecodable chat completion chunk: {e}"),
                            source: Some(Box::new(e)),
                            context: ErrorContext::new("copilot")
                                .with_operation("chat_completions_stream")
                                .with_metadata("data", data),
                        })?;
                    yield chunk;
                }

                if done {
                    break;
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Non-streaming chat completion
    pub async fn chat_completions(
        &self,
        auth: &CopilotAuth,
        request: ChatCompletionsRequest,
    ) -> ShopilotResult<ChatCompletionsResponse> {
        let response = self
            .post("/chat/completions", auth)
            .json(&request)
            .send()
            .await
            .map_err(|e| network_error("chat_completions", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShopilotError::Network {
                message: format!("chat completions returned {status}: {body}"),
                source: None,
                context: ErrorContext::new("copilot")
                    .with_operation("chat_completions")
                    .with_metadata("status", status.as_str()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| network_error("chat_completions", e))
    }

    /// Embed the given inputs, retrying transient failures
    ///
    /// Vectors come back in input order regardless of the order the API
    /// returned them in.
    pub async fn embeddings(
        &self,
        auth: &CopilotAuth,
        input: Vec<String>,
    ) -> ShopilotResult<Vec<Vec<f32>>> {
        let retry = RetryConfig {
            max_attempts: 3,
            initial_delay_ms: 500,
            ..Default::default()
        };

        let client = self.clone();
        let auth = auth.clone();
        retry_async(
            move || {
                let client = client.clone();
                let auth = auth.clone();
                let input = input.clone();
                async move { client.embeddings_once(&auth, input).await }.boxed()
            },
            retry,
            "copilot_embeddings",
        )
        .await
    }

    async fn embeddings_once(
        &self,
        auth: &CopilotAuth,
        input: Vec<String>,
    ) -> ShopilotResult<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            model: Model::TextEmbeddingAda002,
            input,
        };

        let response = self
            .post("/embeddings", auth)
            .json(&request)
            .send()
            .await
            .map_err(|e| network_error("embeddings", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShopilotError::Network {
                message: format!("embeddings returned {status}: {body}"),
                source: None,
                context: ErrorContext::new("copilot")
                    .with_operation("embeddings")
                    .with_metadata("status", status.as_str()),
            });
        }

        let mut parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| network_error("embeddings", e))?;
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

fn network_error(operation: &str, err: reqwest::Error) -> ShopilotError {
    ShopilotError::Network {
        message: format!("request to Copilot API failed: {err}"),
        source: Some(Box::new(err)),
        context: ErrorContext::new("copilot").with_operation(operation),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, Model};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

    fn auth() -> CopilotAuth {
        CopilotAuth::new("test-token", "test-integration")
    }

    fn stream_request() -> ChatCompletionsRequest {
        ChatCompletionsRequest {
            model: Model::Gpt4o,
            messages: vec![ChatMessage::user("hi")],
            tools: Vec::new(),
            stream: true,
        }
    }

    struct NoIntegrationHeader;

    impl Match for NoIntegrationHeader {
        fn matches(&self, request: &Request) -> bool {
            !request.headers.contains_key("Copilot-Integration-Id")
        }
    }

    #[tokio::test]
    async fn chat_stream_decodes_content_and_tool_fragments() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"get_shopware_versions\",\"arguments\":\"{}\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-token"))
            .and(header("Copilot-Integration-Id", "test-integration"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("content-type", "text/event-stream"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = CopilotClient::new(server.uri());
        let mut stream = client
            .chat_completions_stream(&auth(), stream_request())
            .await
            .unwrap();

        let mut content = String::new();
        let mut tool_names = Vec::new();
        let mut finish = None;
        while let Some(chunk) = stream.next().await {
            for choice in chunk.unwrap().choices {
                if let Some(text) = choice.delta.content {
                    content.push_str(&text);
                }
                for call in choice.delta.tool_calls {
                    if let Some(name) = call.function.and_then(|f| f.name) {
                        tool_names.push(name);
                    }
                }
                if let Some(reason) = choice.finish_reason {
                    finish = Some(reason);
                }
            }
        }

        assert_eq!(content, "Hello");
        assert_eq!(tool_names, vec!["get_shopware_versions"]);
        assert_eq!(finish.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn chat_stream_ignores_non_data_lines_and_crlf() {
        let server = MockServer::start().await;
        let body = concat!(
            ": keep-alive comment\r\n",
            "event: message\r\n",
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"ok\"}}]}\r\n",
            "\r\n",
            "data: [DONE]\r\n",
            "\r\n",
        );

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("content-type", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let client = CopilotClient::new(server.uri());
        let mut stream = client
            .chat_completions_stream(&auth(), stream_request())
            .await
            .unwrap();

        let mut content = String::new();
        while let Some(chunk) = stream.next().await {
            for choice in chunk.unwrap().choices {
                if let Some(text) = choice.delta.content {
                    content.push_str(&text);
                }
            }
        }

        assert_eq!(content, "ok");
    }

    #[tokio::test]
    async fn chat_stream_rejects_non_success_before_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .expect(1)
            .mount(&server)
            .await;

        let client = CopilotClient::new(server.uri());
        let err = client
            .chat_completions_stream(&auth(), stream_request())
            .await
            .unwrap_err();

        assert!(matches!(err, ShopilotError::UpstreamStream { .. }));
    }

    #[tokio::test]
    async fn integration_header_omitted_when_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(NoIntegrationHeader)
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.1, 0.2]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CopilotClient::new(server.uri());
        let vectors = client
            .embeddings(&CopilotAuth::new("test-token", ""), vec!["hi".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 1);
    }

    #[tokio::test]
    async fn embeddings_returns_vectors_in_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({
                "model": "text-embedding-ada-002",
                "input": ["first", "second"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.5, 0.6]},
                    {"index": 0, "embedding": [0.1, 0.2]}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = CopilotClient::new(server.uri());
        let vectors = client
            .embeddings(
                &auth(),
                vec!["first".to_string(), "second".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.5, 0.6]]);
    }
}
