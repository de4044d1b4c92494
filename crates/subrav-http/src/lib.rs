//! HTTP transport adapters for the SubRAV micropayment channel protocol
//! (spec §6).
//!
//! This crate is the HTTP half of the dual-transport requirement: the same
//! JSON envelope defined in [`subrav_types::proto::envelope`] is carried
//! base64url-encoded in the `X-Payment-Channel-Data` header here, and
//! unencoded under an MCP tool-result field by `subrav-mcp`. Three pieces:
//!
//! - [`codec`] — the header encoding, shared by both sides of a connection.
//! - [`payee`] — an [`axum`] [`tower::Layer`] driving
//!   [`subrav_payee::PaymentProcessor`]'s pre-process/settle/persist pipeline
//!   around a protected route, plus the built-in `nuwa.*` control-plane
//!   routes every payee exposes alongside it.
//! - [`payer`] — a [`reqwest_middleware::Middleware`] driving
//!   [`subrav_payer::PayerClient`]'s proactive payment handshake around
//!   outgoing requests, plus the [`reqwest`]-backed transport it talks
//!   through.
//!
//! DID-Auth v1 itself is out of scope (spec §1): [`auth::DidAuthVerifier`]
//! and [`subrav_payer::DidAuthIssuer`] are the narrow boundaries an embedder
//! plugs a real implementation into.

pub mod auth;
pub mod codec;
pub mod payee;
pub mod payer;
pub mod response;

pub use auth::{DidAuthVerifier, NoAuth};
pub use codec::{decode_request, decode_response, encode_request, EnvelopeCodecError, HEADER_NAME};
