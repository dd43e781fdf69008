//! The streaming completion loop
//!
//! Each request runs a bounded sequence of rounds against the model. A round
//! streams one completion, forwarding content to the client as it arrives and
//! accumulating fragmented tool-call deltas. A round that finishes with tool
//! calls dispatches them and feeds the results back into the conversation;
//! a round that finishes any other way ends the request. Every terminal path
//! writes the `[DONE]` marker, including failures that surface mid-stream.

use std::collections::HashSet;

use futures::StreamExt;
use shopilot_copilot::{
    ChatCompletionsRequest, ChatMessage, CopilotAuth, CopilotClient, FinishReason, Model,
};
use shopilot_core::{ErrorContext, ShopilotError, ShopilotResult};
use tracing::{debug, info, warn};

use crate::accumulator::ToolCallAccumulator;
use crate::context::{ContextInjector, Reference};
use crate::sse::{
    content_chunk, dispatch_error_payload, references_payload, SseWriter, ERRORS_EVENT,
    REFERENCES_EVENT,
};
use crate::tools::ToolRegistry;

/// A conversation with retrieval context already injected
///
/// Produced before any SSE bytes are written, so failures up to this point
/// can still surface as plain HTTP status codes.
pub struct PreparedConversation {
    pub messages: Vec<ChatMessage>,
    pub references: Vec<Reference>,
}

enum RoundOutcome {
    /// The model finished its answer
    Completed,
    /// The model requested tools; results go back into the conversation
    ToolResults(Vec<ChatMessage>),
}

pub struct Orchestrator {
    client: CopilotClient,
    injector: ContextInjector,
    tools: ToolRegistry,
    model: Model,
}

impl Orchestrator {
    pub fn new(client: CopilotClient, injector: ContextInjector, tools: ToolRegistry) -> Self {
        Self {
            client,
            injector,
            tools,
            model: Model::Gpt4,
        }
    }

    /// Ground the conversation in retrieved documentation
    ///
    /// The context system message lands directly before the newest message,
    /// keeping it close to the question it grounds.
    pub async fn prepare(
        &self,
        auth: &CopilotAuth,
        messages: Vec<ChatMessage>,
    ) -> ShopilotResult<PreparedConversation> {
        let context = self.injector.build_context(auth, &messages).await?;

        let mut outgoing = messages;
        if let Some(system) = context.system_message {
            let position = outgoing.len().saturating_sub(1);
            outgoing.insert(position, system);
        }

        Ok(PreparedConversation {
            messages: outgoing,
            references: context.references,
        })
    }

    /// Drive the completion loop, writing the whole response to `writer`
    ///
    /// Errors after streaming has begun still terminate the stream with
    /// `[DONE]` before being returned to the caller.
    pub async fn run(
        &self,
        auth: &CopilotAuth,
        prepared: PreparedConversation,
        writer: &SseWriter,
    ) -> ShopilotResult<()> {
        let PreparedConversation {
            mut messages,
            references,
        } = prepared;

        if !references.is_empty() {
            writer
                .event(REFERENCES_EVENT, references_payload(&references))
                .await?;
        }

        let mut used_tools: HashSet<String> = HashSet::new();
        // One round per tool plus the final answer round.
        let max_rounds = self.tools.len() + 1;

        for round in 1..=max_rounds {
            debug!(round, max_rounds, "Starting completion round");
            match self.run_round(auth, &messages, &mut used_tools, writer).await {
                Ok(RoundOutcome::Completed) => {
                    writer.done().await?;
                    return Ok(());
                }
                Ok(RoundOutcome::ToolResults(results)) if results.is_empty() => {
                    // Tool finish without a dispatchable call; nothing new
                    // would reach the model, so the request is over.
                    debug!(round, "Tool round produced no results, finishing");
                    writer.done().await?;
                    return Ok(());
                }
                Ok(RoundOutcome::ToolResults(results)) => {
                    info!(round, results = results.len(), "Feeding tool results back");
                    messages.extend(results);
                }
                Err(err) => {
                    if let ShopilotError::Dispatch { tool, message, .. } = &err {
                        let payload = dispatch_error_payload(tool, message);
                        if let Err(send_err) = writer.event(ERRORS_EVENT, payload).await {
                            warn!(error = %send_err, "Could not deliver the error event");
                        }
                    }
                    if let Err(send_err) = writer.done().await {
                        warn!(error = %send_err, "Could not terminate the stream");
                    }
                    return Err(err);
                }
            }
        }

        if let Err(send_err) = writer.done().await {
            warn!(error = %send_err, "Could not terminate the stream");
        }
        Err(ShopilotError::Internal {
            message: "completion loop exceeded its round budget".to_string(),
            source: None,
            context: ErrorContext::new("orchestrator")
                .with_operation("run")
                .with_metadata("max_rounds", &max_rounds.to_string()),
        })
    }

    async fn run_round(
        &self,
        auth: &CopilotAuth,
        messages: &[ChatMessage],
        used_tools: &mut HashSet<String>,
        writer: &SseWriter,
    ) -> ShopilotResult<RoundOutcome> {
        let request = ChatCompletionsRequest {
            model: self.model,
            messages: messages.to_vec(),
            tools: self.tools.definitions_excluding(used_tools),
            stream: true,
        };

        let mut stream = self.client.chat_completions_stream(auth, request).await?;
        let mut accumulator = ToolCallAccumulator::default();
        let mut finish: Option<FinishReason> = None;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            for choice in &chunk.choices {
                for delta in &choice.delta.tool_calls {
                    accumulator.absorb(delta);
                }
                if let Some(content) = &choice.delta.content {
                    if !content.is_empty() {
                        writer.data(content_chunk(choice.index, content)).await?;
                    }
                }
                if let Some(reason) = &choice.finish_reason {
                    finish = Some(FinishReason::parse(reason));
                }
            }
        }

        if finish != Some(FinishReason::ToolCalls) {
            return Ok(RoundOutcome::Completed);
        }

        let calls = accumulator.drain();
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if !used_tools.insert(call.name.clone()) {
                warn!(tool = %call.name, "Skipping repeated call for an already used tool");
                continue;
            }
            let result = self.tools.dispatch(&call.name, &call.arguments).await?;
            results.push(result);
        }
        Ok(RoundOutcome::ToolResults(results))
    }
}
