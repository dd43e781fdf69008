//! OpenAPI specification for the shopilot server

use utoipa::OpenApi;

use crate::handlers::{HealthResponse, SearchHit};
use shopilot_copilot::{ChatMessage, ChatRequest, FunctionCall, Role, ToolCall};

/// Main OpenAPI specification
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shopilot API",
        version = "0.1.0",
        description = "GitHub Copilot chat extension for Shopware 6 development"
    ),
    paths(
        crate::handlers::health::health_check,
        crate::handlers::agent::agent_webhook,
        crate::handlers::search::search_documents,
        crate::handlers::oauth::oauth_authorization,
        crate::handlers::oauth::oauth_callback,
    ),
    components(
        schemas(
            HealthResponse,
            SearchHit,
            ChatRequest,
            ChatMessage,
            Role,
            ToolCall,
            FunctionCall,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Agent", description = "Copilot Chat agent webhook"),
        (name = "Search", description = "Documentation search"),
        (name = "Auth", description = "GitHub OAuth handshake"),
    )
)]
pub struct ApiDoc;
