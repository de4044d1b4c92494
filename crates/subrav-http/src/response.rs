//! Turns a [`ProtocolError`] or a completed [`BillingContext`] into the
//! wire-shape [`ResponseEnvelope`] and, for HTTP, the response carrying it
//! (spec §6, §7).

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use subrav_types::billing::BillingContext;
use subrav_types::channel::ChannelInfo;
use subrav_types::error::ProtocolError;
use subrav_types::proto::envelope::{ErrorBody, WireSubRav};
use subrav_types::proto::ResponseEnvelope;
use subrav_types::subrav::PendingProposal;

use crate::codec::HEADER_NAME;

/// The envelope for a rejected request: no `subRav`/`cost`, just the error.
pub fn error_envelope(err: &ProtocolError) -> ResponseEnvelope {
    ResponseEnvelope {
        version: 1,
        error: Some(ErrorBody { code: err.kind().mcp_code().to_string(), message: Some(err.message.clone()) }),
        ..Default::default()
    }
}

/// The envelope for a request that completed steps A-C successfully.
pub fn success_envelope(ctx: &BillingContext) -> ResponseEnvelope {
    ResponseEnvelope {
        version: 1,
        client_tx_ref: Some(ctx.client_tx_ref.clone()),
        service_tx_ref: None,
        sub_rav: ctx.state.unsigned_sub_rav.as_ref().map(WireSubRav::from),
        cost: ctx.state.cost.map(|c| c.to_string()),
        cost_usd: ctx.state.cost_usd.map(|c| c.to_string()),
        error: None,
    }
}

/// An HTTP response carrying `envelope` in the `X-Payment-Channel-Data`
/// header, with `status` as the HTTP status line.
pub fn envelope_response(status: StatusCode, envelope: &ResponseEnvelope) -> Response {
    let mut response = status.into_response();
    match envelope.header_value() {
        Ok(value) => match HeaderValue::from_str(&value) {
            Ok(header) => {
                response.headers_mut().insert(HEADER_NAME, header);
            }
            Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "payment header encoding failed").into_response(),
        },
        Err(_) => return (StatusCode::INTERNAL_SERVER_ERROR, "payment envelope encoding failed").into_response(),
    }
    response
}

/// A rejected request's response: `err`'s mapped HTTP status, carrying the
/// error envelope and, if a pending proposal is known, the unsigned SubRAV
/// the payer still owes a signature for (spec §4.4: a `paymentRequired`
/// rejection still surfaces the proposal to sign).
pub fn protocol_error_response(
    err: &ProtocolError,
    channel_info: Option<&ChannelInfo>,
    pending: Option<&PendingProposal>,
) -> Response {
    let mut envelope = error_envelope(err);
    if let (Some(pending), Some(channel_info)) = (pending, channel_info) {
        envelope.sub_rav = Some(WireSubRav {
            version: "1".to_string(),
            chain_id: channel_info.chain_id.to_string(),
            channel_id: pending.channel_id.to_string(),
            channel_epoch: pending.epoch.0.to_string(),
            vm_id_fragment: pending.vm_id_fragment.0.clone(),
            accumulated_amount: pending.accumulated_amount.to_string(),
            nonce: pending.nonce.to_string(),
        });
    }
    let status = StatusCode::from_u16(err.kind().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    envelope_response(status, &envelope)
}
