//! Shared error taxonomy (spec §7): one [`ErrorKind`] per row of the table,
//! carried by a single [`ProtocolError`] and mapped to a transport-specific
//! status/code at the edge rather than threaded as separate error types per
//! transport.
//!
//! Grounded on the teacher's `PaymentVerificationError` / `ErrorReason`
//! split in `crates/x402-types/src/proto/mod.rs`: one internal enum carrying
//! the failure, a thin accessor translating it to whatever the transport
//! wants to say.

use std::fmt;

/// The kind of a [`ProtocolError`], independent of which transport reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Auth-required rule without a verified DID.
    Unauthorized,
    /// Admin-only operation requested by a non-admin DID.
    Forbidden,
    /// A pending proposal exists but no signed SubRAV accompanied the request.
    PaymentRequired,
    /// Hub balance insufficient at claim time, or the contract reports as much.
    InsufficientFunds,
    /// The submitted signed SubRAV contradicts the current pending proposal.
    RavConflict,
    /// Unknown/tampered SubRAV, unsupported version, invalid nonce/amount/epoch,
    /// or `maxAmount` exceeded.
    BadRequest,
    /// Channel or sub-channel not found.
    NotFound,
    /// Contract in maintenance, or the rate provider is down.
    ServiceUnavailable,
    /// Anything else — a bug, not a protocol condition.
    InternalError,
}

impl ErrorKind {
    /// The HTTP status this kind maps to (spec §7 table).
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::PaymentRequired => 402,
            ErrorKind::InsufficientFunds => 402,
            ErrorKind::RavConflict => 409,
            ErrorKind::BadRequest => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::ServiceUnavailable => 503,
            ErrorKind::InternalError => 500,
        }
    }

    /// The MCP error code this kind maps to (spec §7 table; §6 builtin ops).
    pub fn mcp_code(self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::PaymentRequired => "PAYMENT_REQUIRED",
            ErrorKind::InsufficientFunds => "INSUFFICIENT_FUNDS",
            ErrorKind::RavConflict => "CONFLICT",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mcp_code())
    }
}

/// The single error type returned across the workspace's traits (storage,
/// codec, billing, contract adapters, transports). Carries a [`ErrorKind`]
/// plus a human-readable message; transport adapters are responsible for
/// picking which details, if any, leave the process.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProtocolError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProtocolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ProtocolError { kind, message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    pub fn payment_required(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PaymentRequired, message)
    }

    pub fn insufficient_funds(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InsufficientFunds, message)
    }

    pub fn rav_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RavConflict, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_spec_table_codes() {
        assert_eq!(ErrorKind::PaymentRequired.http_status(), 402);
        assert_eq!(ErrorKind::RavConflict.http_status(), 409);
        assert_eq!(ErrorKind::RavConflict.mcp_code(), "CONFLICT");
        assert_eq!(ErrorKind::InternalError.http_status(), 500);
    }
}
