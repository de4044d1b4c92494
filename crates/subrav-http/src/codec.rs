//! The `X-Payment-Channel-Data` header codec (spec §6): base64url, no
//! padding, of the UTF-8 JSON request/response envelope. MCP's
//! `__nuwa_payment` carries the same JSON without the base64url step, so
//! [`subrav_types::proto::envelope`] is the shared source of truth and this
//! module only adds the transport-specific wrapping.

use base64::Engine;

use subrav_types::proto::{RequestEnvelope, ResponseEnvelope};

/// Case-insensitive per spec §6; header map lookups in both axum and
/// reqwest already fold case, so this is just the canonical spelling.
pub const HEADER_NAME: &str = "x-payment-channel-data";

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeCodecError {
    #[error("invalid base64url in payment header: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payment header is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("invalid payment envelope JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn encode_request(envelope: &RequestEnvelope) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(envelope)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json))
}

pub fn decode_request(value: &str) -> Result<RequestEnvelope, EnvelopeCodecError> {
    let json = decode_to_string(value)?;
    Ok(serde_json::from_str(&json)?)
}

pub fn decode_response(value: &str) -> Result<ResponseEnvelope, EnvelopeCodecError> {
    let json = decode_to_string(value)?;
    Ok(serde_json::from_str(&json)?)
}

fn decode_to_string(value: &str) -> Result<String, EnvelopeCodecError> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(value.trim())?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_envelope_round_trips_through_the_header_encoding() {
        let envelope = RequestEnvelope {
            version: 1,
            client_tx_ref: "ctx-1".to_string(),
            max_amount: Some("1000".to_string()),
            signed_sub_rav: None,
        };
        let header = encode_request(&envelope).unwrap();
        assert!(!header.contains('='));
        let decoded = decode_request(&header).unwrap();
        assert_eq!(decoded.client_tx_ref, "ctx-1");
        assert_eq!(decoded.max_amount.as_deref(), Some("1000"));
    }

    #[test]
    fn decode_request_rejects_malformed_base64() {
        assert!(decode_request("not base64url!!").is_err());
    }
}
