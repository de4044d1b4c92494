//! Core types for the SubRAV micro-payment-channel protocol.
//!
//! This crate provides the foundational, transport-agnostic types shared by
//! every other crate in the workspace: the [`subrav`] value type itself, the
//! [`channel`] metadata that anchors it to an on-chain payment channel, the
//! [`money`] newtypes used to move between USD-denominated prices and
//! asset-denominated balances, and the [`proto`] wire shapes for the HTTP and
//! MCP transports.
//!
//! # Modules
//!
//! - [`subrav`] — `SubRAV`, `SignedSubRAV`, `PendingProposal`.
//! - [`channel`] — `ChannelId`, `VmIdFragment`, `ChannelInfo`, `SubChannelInfo`.
//! - [`billing`] — `BillingRule`, `StrategyConfig`, `BillingContext`.
//! - [`money`] — `PicoUsd`, `AssetAmount` newtypes with ceiling-safe arithmetic.
//! - [`timestamp`] — `UnixTimestamp`.
//! - [`error`] — `ProtocolError` and the shared error taxonomy (spec §7).
//! - [`proto`] — HTTP/MCP envelope JSON shapes and well-known discovery.
//! - [`util`] — base64url helper used by the HTTP envelope codec.

pub mod billing;
pub mod channel;
pub mod error;
pub mod money;
pub mod proto;
pub mod subrav;
pub mod timestamp;
pub mod util;

pub use billing::{BillingContext, BillingRule, BillingState, StrategyConfig};
pub use channel::{ChannelEpoch, ChannelId, ChannelInfo, ChannelStatus, SubChannelInfo, VmIdFragment};
pub use error::{ErrorKind, ProtocolError};
pub use money::{AssetAmount, PicoUsd};
pub use subrav::{PendingProposal, SignedSubRAV, SubRAV, SUPPORTED_VERSIONS};
pub use timestamp::UnixTimestamp;
