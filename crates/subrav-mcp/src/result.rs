//! The MCP tool-result shape [`McpPaymentHandler::handle_call`](crate::handler::McpPaymentHandler::handle_call)
//! returns: a `content` block array plus a `structuredContent` companion
//! object, the conventional MCP tool-result envelope. The payment envelope
//! is surfaced both ways per spec §6: as a `resource` content item and as
//! the `structuredContent.__nuwa_payment` field.

use serde_json::{Map, Value};

use subrav_types::error::ProtocolError;
use subrav_types::proto::ResponseEnvelope;

use crate::codec::{response_field, response_resource_content};

pub struct McpToolResult {
    pub is_error: bool,
    pub content: Vec<Value>,
    pub structured_content: Map<String, Value>,
}

impl McpToolResult {
    /// A tool call that completed, with `payment` present whenever the call
    /// was billable (spec §4.4: not every tool call carries a cost).
    pub fn ok(result: Value, payment: Option<ResponseEnvelope>) -> Self {
        let mut structured = match result {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };
        let summary = serde_json::to_string(&structured).unwrap_or_else(|_| "{}".to_string());
        let mut content = vec![serde_json::json!({"type": "text", "text": summary})];

        if let Some(envelope) = &payment {
            match response_field(envelope) {
                Ok((key, value)) => {
                    structured.insert(key, value);
                }
                Err(e) => tracing::warn!(error = %e, "failed to encode payment envelope as structured content"),
            }
            match response_resource_content(envelope) {
                Ok(resource) => content.push(resource),
                Err(e) => tracing::warn!(error = %e, "failed to encode payment envelope as resource content"),
            }
        }

        McpToolResult { is_error: false, content, structured_content: structured }
    }

    /// A rejected tool call (spec §4.4/§7): `err`'s MCP code, carrying the
    /// error envelope the same two ways a success does.
    pub fn error(err: ProtocolError) -> Self {
        let envelope = crate::response::error_envelope(&err);
        let mut structured = Map::new();
        if let Ok((key, value)) = response_field(&envelope) {
            structured.insert(key, value);
        }
        let mut content = vec![serde_json::json!({"type": "text", "text": err.message})];
        if let Ok(resource) = response_resource_content(&envelope) {
            content.push(resource);
        }
        McpToolResult { is_error: true, content, structured_content: structured }
    }

    /// The full MCP tool-result JSON object.
    pub fn into_json(self) -> Value {
        serde_json::json!({
            "content": self.content,
            "structuredContent": self.structured_content,
            "isError": self.is_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subrav_types::error::ProtocolError;

    #[test]
    fn ok_without_payment_leaves_structured_content_untouched() {
        let result = McpToolResult::ok(serde_json::json!({"answer": 42}), None);
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 1);
        assert!(!result.structured_content.contains_key(super::super::codec::PAYMENT_PARAM));
    }

    #[test]
    fn error_carries_the_envelope_as_both_a_resource_and_a_field() {
        let result = McpToolResult::error(ProtocolError::payment_required("missing payment"));
        assert!(result.is_error);
        assert_eq!(result.content.len(), 2);
        assert!(result.structured_content.contains_key(super::super::codec::PAYMENT_PARAM));
    }
}
