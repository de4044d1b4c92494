//! The MCP tool-parameter envelope (spec §6): the same
//! [`RequestEnvelope`]/[`ResponseEnvelope`] JSON as the HTTP header, carried
//! unencoded under reserved parameter/result keys instead of base64url in a
//! header. `subrav_types::proto::envelope` is the shared source of truth;
//! this module only adds the MCP-specific embedding.

use serde_json::{Map, Value};

use subrav_types::proto::{RequestEnvelope, ResponseEnvelope};

/// The reserved request parameter carrying a DID-Auth v1 token (spec §6).
pub const AUTH_PARAM: &str = "__nuwa_auth";
/// The reserved request parameter, and structured-result field, carrying
/// the payment envelope (spec §6).
pub const PAYMENT_PARAM: &str = "__nuwa_payment";
/// The `resource` content item's URI when the envelope is surfaced that way
/// instead of as a structured field (spec §6).
pub const RESOURCE_URI: &str = "nuwa:payment";
pub const RESOURCE_MIME_TYPE: &str = "application/vnd.nuwa.payment+json";

#[derive(Debug, thiserror::Error)]
pub enum McpCodecError {
    #[error("invalid {PAYMENT_PARAM} parameter: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pulls `__nuwa_payment` out of a tool call's parameters, if present.
pub fn extract_request(params: &Map<String, Value>) -> Result<Option<RequestEnvelope>, McpCodecError> {
    match params.get(PAYMENT_PARAM) {
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
        None => Ok(None),
    }
}

/// Pulls the DID-Auth v1 token out of `__nuwa_auth`, if present.
pub fn extract_auth_token(params: &Map<String, Value>) -> Option<String> {
    params.get(AUTH_PARAM).and_then(Value::as_str).map(str::to_string)
}

/// The structured-result embedding: `{"__nuwa_payment": <envelope JSON>}`,
/// merged into a tool's own `structuredContent`.
pub fn response_field(envelope: &ResponseEnvelope) -> Result<(String, Value), serde_json::Error> {
    Ok((PAYMENT_PARAM.to_string(), serde_json::to_value(envelope)?))
}

/// The content-item embedding: an MCP `resource` block carrying the
/// envelope as its `text`, for clients that only read `content`.
pub fn response_resource_content(envelope: &ResponseEnvelope) -> Result<Value, serde_json::Error> {
    let text = serde_json::to_string(envelope)?;
    Ok(serde_json::json!({
        "type": "resource",
        "resource": {
            "uri": RESOURCE_URI,
            "mimeType": RESOURCE_MIME_TYPE,
            "text": text,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_request_reads_the_reserved_parameter() {
        let mut params = Map::new();
        params.insert(
            PAYMENT_PARAM.to_string(),
            serde_json::json!({"version": 1, "clientTxRef": "ctx-1", "maxAmount": null, "signedSubRav": null}),
        );
        let envelope = extract_request(&params).unwrap().unwrap();
        assert_eq!(envelope.client_tx_ref, "ctx-1");
    }

    #[test]
    fn extract_request_is_none_when_absent() {
        assert!(extract_request(&Map::new()).unwrap().is_none());
    }

    #[test]
    fn extract_auth_token_reads_the_reserved_parameter() {
        let mut params = Map::new();
        params.insert(AUTH_PARAM.to_string(), Value::String("token".to_string()));
        assert_eq!(extract_auth_token(&params).as_deref(), Some("token"));
    }
}
