//! Retrieval-grounded context injection
//!
//! The newest non-empty user message is embedded and matched against the
//! document store; the hits become one system message plus a list of source
//! references resolved from the stored chunk IDs.

use std::sync::Arc;

use shopilot_copilot::{ChatMessage, CopilotAuth, CopilotClient, Role};
use shopilot_core::{ErrorContext, ShopilotError, ShopilotResult};
use shopilot_retrieval::DocumentStore;
use tracing::{debug, info};

/// How many documents ground each conversation
pub const RETRIEVAL_TOP_K: usize = 5;

const SYSTEM_PROMPT: &str = "You are a specialized technical chatbot for Shopware 6 development. Your primary goal is to assist developers with precise and accurate technical information about Shopware 6. Always provide detailed, developer-focused responses that cover both theoretical concepts and practical implementation. When asked, generate relevant code examples and explain them thoroughly, including best practices for Shopware 6 development. Your knowledge is based on the provided Shopware 6 documentation and code examples. If you're unsure about something, admit it and suggest where the user might find more information. Respond in a clear, concise, and technical manner suitable for developers. Use proper formatting for code snippets and technical terms. When explaining concepts, break them down into easily understandable parts. If providing step-by-step instructions, number them clearly. Always strive for accuracy and completeness in your responses. If a question is ambiguous, ask for clarification to ensure you provide the most relevant information.\n";

const TOOL_DIRECTIVE: &str = "When you need live data, call one of the provided functions and pass its arguments as a single JSON object.\n";

const DOCS_PREFIX: &str = "data/docs/";
const DOCS_BASE_URL: &str = "https://github.com/shopware/docs/blob/main/";

/// A documentation source backing the injected context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub id: String,
    pub display_name: String,
    pub url: String,
}

impl Reference {
    /// Resolve display name and URL from a stored chunk ID
    ///
    /// `data/docs/guides/foo.md_3` strips its chunk suffix and maps into the
    /// public docs repository; IDs outside the known prefix resolve to
    /// "unknown".
    pub fn from_document_id(id: &str) -> Self {
        let path = strip_chunk_suffix(id);
        if let Some(relative) = path.strip_prefix(DOCS_PREFIX) {
            let display_name = relative.rsplit('/').next().unwrap_or(relative).to_string();
            return Self {
                id: id.to_string(),
                display_name,
                url: format!("{DOCS_BASE_URL}{relative}"),
            };
        }

        Self {
            id: id.to_string(),
            display_name: "unknown".to_string(),
            url: "unknown".to_string(),
        }
    }
}

fn strip_chunk_suffix(id: &str) -> &str {
    if let Some(pos) = id.rfind('_') {
        let suffix = &id[pos + 1..];
        if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            return &id[..pos];
        }
    }
    id
}

/// Context assembled for one inbound conversation
pub struct InjectedContext {
    /// Absent when the conversation holds no non-empty user message
    pub system_message: Option<ChatMessage>,
    pub references: Vec<Reference>,
}

/// Builds the grounding system message for inbound conversations
pub struct ContextInjector {
    client: CopilotClient,
    store: Arc<DocumentStore>,
    top_k: usize,
}

impl ContextInjector {
    pub fn new(client: CopilotClient, store: Arc<DocumentStore>) -> Self {
        Self {
            client,
            store,
            top_k: RETRIEVAL_TOP_K,
        }
    }

    /// Embed the newest non-empty user message and assemble the context
    ///
    /// The embedding uses the request's own credentials. Retrieval failures
    /// abort the request; there is no silent empty-context fallback.
    pub async fn build_context(
        &self,
        auth: &CopilotAuth,
        messages: &[ChatMessage],
    ) -> ShopilotResult<InjectedContext> {
        let Some(question) = latest_user_message(messages) else {
            debug!("No user message to ground, skipping context injection");
            return Ok(InjectedContext {
                system_message: None,
                references: Vec::new(),
            });
        };

        let vectors = self
            .client
            .embeddings(auth, vec![question.to_string()])
            .await
            .map_err(retrieval_error)?;
        let embedding = vectors
            .into_iter()
            .next()
            .ok_or_else(|| ShopilotError::Retrieval {
                message: "embeddings response contained no vectors".to_string(),
                source: None,
                context: ErrorContext::new("context").with_operation("build_context"),
            })?;

        let hits = self
            .store
            .query_by_vector(&embedding, self.top_k, None)
            .await;
        info!(hits = hits.len(), "Retrieved context documents");

        let mut context_block = String::new();
        let mut references = Vec::with_capacity(hits.len());
        for hit in &hits {
            debug!(id = %hit.id, similarity = hit.similarity, "Context document");
            context_block.push_str(&hit.content);
            context_block.push('\n');
            references.push(Reference::from_document_id(&hit.id));
        }

        let system_message = ChatMessage::system(format!(
            "{SYSTEM_PROMPT}{TOOL_DIRECTIVE}Context: {context_block}"
        ));

        Ok(InjectedContext {
            system_message: Some(system_message),
            references,
        })
    }
}

fn latest_user_message(messages: &[ChatMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|message| message.role == Role::User && !message.content.is_empty())
        .map(|message| message.content.as_str())
}

fn retrieval_error(err: ShopilotError) -> ShopilotError {
    ShopilotError::Retrieval {
        message: format!("context retrieval failed: {err}"),
        source: Some(Box::new(err)),
        context: ErrorContext::new("context").with_operation("build_context"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shopilot_retrieval::StoredDocument;
    use std::collections::HashMap;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn resolves_docs_ids_to_display_name_and_url() {
        let reference = Reference::from_document_id("data/docs/foo.md_3");
        assert_eq!(reference.display_name, "foo.md");
        assert_eq!(
            reference.url,
            "https://github.com/shopware/docs/blob/main/foo.md"
        );

        let nested = Reference::from_document_id("data/docs/guides/plugins/base.md_12");
        assert_eq!(nested.display_name, "base.md");
        assert_eq!(
            nested.url,
            "https://github.com/shopware/docs/blob/main/guides/plugins/base.md"
        );
    }

    #[test]
    fn unknown_prefixes_resolve_to_unknown() {
        let reference = Reference::from_document_id("somewhere/else.md_1");
        assert_eq!(reference.display_name, "unknown");
        assert_eq!(reference.url, "unknown");
    }

    #[test]
    fn chunk_suffix_is_only_stripped_when_numeric() {
        assert_eq!(strip_chunk_suffix("data/docs/foo.md_3"), "data/docs/foo.md");
        assert_eq!(strip_chunk_suffix("data/docs/foo_bar.md"), "data/docs/foo_bar.md");
        assert_eq!(strip_chunk_suffix("data/docs/foo.md_"), "data/docs/foo.md_");
    }

    #[test]
    fn picks_the_newest_non_empty_user_message() {
        let messages = vec![
            ChatMessage::user("first question"),
            ChatMessage::assistant("an answer"),
            ChatMessage::user("second question"),
            ChatMessage::user(""),
            ChatMessage::assistant("closing remark"),
        ];

        assert_eq!(latest_user_message(&messages), Some("second question"));
        assert_eq!(latest_user_message(&[ChatMessage::assistant("hi")]), None);
    }

    fn docs_chunk(id: &str, content: &str, embedding: Vec<f32>) -> StoredDocument {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), "docs".to_string());
        StoredDocument {
            id: id.to_string(),
            content: content.to_string(),
            embedding,
            metadata,
        }
    }

    #[tokio::test]
    async fn builds_system_message_from_retrieved_documents() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"input": ["How do plugins work?"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [1.0, 0.0]}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(DocumentStore::in_memory());
        store
            .upsert(vec![
                docs_chunk("data/docs/plugins.md_0", "Plugins extend the core.", vec![1.0, 0.0]),
                docs_chunk("data/docs/themes.md_0", "Themes style the storefront.", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let injector = ContextInjector::new(CopilotClient::new(server.uri()), store);
        let auth = CopilotAuth::new("token", "integration");
        let messages = vec![ChatMessage::user("How do plugins work?")];

        let context = injector.build_context(&auth, &messages).await.unwrap();
        let system_message = context.system_message.unwrap();

        assert_eq!(system_message.role, Role::System);
        assert!(system_message.content.contains("Plugins extend the core."));
        assert!(system_message.content.contains("Context: "));
        assert_eq!(context.references.len(), 2);
        assert_eq!(context.references[0].display_name, "plugins.md");
    }

    #[tokio::test]
    async fn no_user_message_means_no_context() {
        let server = MockServer::start().await;
        // The embeddings endpoint must not be called at all
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .expect(0)
            .mount(&server)
            .await;

        let injector = ContextInjector::new(
            CopilotClient::new(server.uri()),
            Arc::new(DocumentStore::in_memory()),
        );
        let auth = CopilotAuth::new("token", "integration");

        let context = injector
            .build_context(&auth, &[ChatMessage::assistant("hello")])
            .await
            .unwrap();

        assert!(context.system_message.is_none());
        assert!(context.references.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_maps_to_retrieval_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let injector = ContextInjector::new(
            CopilotClient::new(server.uri()),
            Arc::new(DocumentStore::in_memory()),
        );
        let auth = CopilotAuth::new("token", "integration");

        let err = injector
            .build_context(&auth, &[ChatMessage::user("question")])
            .await
            .unwrap_err();

        assert!(matches!(err, ShopilotError::Retrieval { .. }));
    }
}
