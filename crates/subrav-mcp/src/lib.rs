//! MCP transport adapter for the SubRAV micropayment channel protocol
//! (spec §4.7, §6).
//!
//! This is the second of the protocol's two transports alongside
//! `subrav-http`: instead of a base64url-encoded header, the same
//! [`subrav_types::proto::envelope`] JSON rides in a tool call's own
//! parameters and result, under the reserved `__nuwa_auth`/`__nuwa_payment`
//! keys [`codec`] defines. There is no MCP server framework in this
//! workspace's corpus, so this crate has no `tower`-style layer to offer —
//! [`handler::McpPaymentHandler`] is a plain async wrapper an embedder's own
//! MCP tool dispatcher calls around each tool's business logic.
//!
//! DID-Auth v1 verification is out of scope here exactly as it is in
//! `subrav-http`: [`handler::McpPaymentHandler::handle_call`] takes an
//! already-authenticated payer DID, pushing the `__nuwa_auth` token's
//! verification to the caller.

pub mod codec;
pub mod handler;
pub mod response;
pub mod result;
pub mod usage;

pub use codec::{McpCodecError, AUTH_PARAM, PAYMENT_PARAM};
pub use handler::{McpHandlerConfig, McpPaymentHandler, UsageRecorder};
pub use result::McpToolResult;
