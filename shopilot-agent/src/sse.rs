//! The closed set of events the agent writes to its response stream

use serde_json::{json, Value};
use shopilot_core::{ErrorContext, ShopilotError, ShopilotResult};
use tokio::sync::mpsc;

use crate::context::Reference;

/// Event name for the source reference list
pub const REFERENCES_EVENT: &str = "copilot_references";

/// Event name for surfaced errors
pub const ERRORS_EVENT: &str = "copilot_errors";

/// One emission on the response stream
#[derive(Debug, Clone, PartialEq)]
pub enum SseMessage {
    /// `data: <json>`
    Data(Value),
    /// `event: <name>` followed by `data: <json>`
    Named { event: String, data: Value },
    /// The literal `data: [DONE]` terminator
    Done,
}

/// Sending half of the response stream
///
/// The HTTP layer flushes every message as soon as it is written, so each
/// send here is immediately observable by the client. A failed send means
/// the client went away and the request should be abandoned.
#[derive(Debug, Clone)]
pub struct SseWriter {
    sender: mpsc::Sender<SseMessage>,
}

impl SseWriter {
    pub fn new(sender: mpsc::Sender<SseMessage>) -> Self {
        Self { sender }
    }

    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<SseMessage>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self::new(sender), receiver)
    }

    pub async fn data(&self, payload: Value) -> ShopilotResult<()> {
        self.send(SseMessage::Data(payload)).await
    }

    pub async fn event(&self, event: &str, data: Value) -> ShopilotResult<()> {
        self.send(SseMessage::Named {
            event: event.to_string(),
            data,
        })
        .await
    }

    pub async fn done(&self) -> ShopilotResult<()> {
        self.send(SseMessage::Done).await
    }

    async fn send(&self, message: SseMessage) -> ShopilotResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| ShopilotError::Internal {
                message: "client disconnected before the stream finished".to_string(),
                source: None,
                context: ErrorContext::new("sse").with_operation("send"),
            })
    }
}

/// Payload for one streamed assistant content chunk, keeping the upstream
/// choice index
pub fn content_chunk(index: u32, content: &str) -> Value {
    json!({
        "choices": [{
            "index": index,
            "delta": {
                "role": "assistant",
                "content": content,
            },
        }],
    })
}

/// Payload for the `copilot_references` event
pub fn references_payload(references: &[Reference]) -> Value {
    Value::Array(
        references
            .iter()
            .map(|reference| {
                json!({
                    "type": "shopware.docs",
                    "id": reference.id,
                    "data": {
                        "file": reference.display_name,
                    },
                    "metadata": {
                        "display_name": reference.display_name,
                        "display_url": reference.url,
                    },
                })
            })
            .collect(),
    )
}

/// Payload for a `copilot_errors` event naming a failed tool
pub fn dispatch_error_payload(tool: &str, message: &str) -> Value {
    json!([{
        "type": "function",
        "code": "dispatch_failed",
        "message": message,
        "identifier": tool,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writer_delivers_messages_in_order() {
        let (writer, mut receiver) = SseWriter::channel(8);

        writer.data(json!({"n": 1})).await.unwrap();
        writer
            .event(ERRORS_EVENT, dispatch_error_payload("get_shopware_versions", "boom"))
            .await
            .unwrap();
        writer.done().await.unwrap();
        drop(writer);

        assert_eq!(receiver.recv().await, Some(SseMessage::Data(json!({"n": 1}))));
        match receiver.recv().await {
            Some(SseMessage::Named { event, data }) => {
                assert_eq!(event, ERRORS_EVENT);
                assert_eq!(data[0]["identifier"], "get_shopware_versions");
                assert_eq!(data[0]["type"], "function");
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(receiver.recv().await, Some(SseMessage::Done));
        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test]
    async fn send_fails_once_the_receiver_is_gone() {
        let (writer, receiver) = SseWriter::channel(1);
        drop(receiver);

        assert!(writer.done().await.is_err());
    }

    #[test]
    fn content_chunk_carries_choice_index_and_role() {
        let payload = content_chunk(2, "partial text");
        assert_eq!(payload["choices"][0]["index"], 2);
        assert_eq!(payload["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(payload["choices"][0]["delta"]["content"], "partial text");
    }
}
