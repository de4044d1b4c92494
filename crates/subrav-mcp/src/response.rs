//! Turns a [`ProtocolError`] or a completed [`BillingContext`] into the
//! wire-shape [`ResponseEnvelope`] (spec §6). Same construction as
//! `subrav_http::response`, without the HTTP-specific response wrapping.

use subrav_types::billing::BillingContext;
use subrav_types::error::ProtocolError;
use subrav_types::proto::envelope::{ErrorBody, WireSubRav};
use subrav_types::proto::ResponseEnvelope;

pub fn error_envelope(err: &ProtocolError) -> ResponseEnvelope {
    ResponseEnvelope {
        version: 1,
        error: Some(ErrorBody { code: err.kind().mcp_code().to_string(), message: Some(err.message.clone()) }),
        ..Default::default()
    }
}

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
