//! Transport-facing JSON shapes (spec §6). The HTTP codec is the canonical
//! reference; the MCP envelope reuses the same request/response JSON inside
//! its reserved tool-parameter keys.

pub mod builtin;
pub mod discovery;
pub mod envelope;

pub use discovery::DiscoveryInfo;
pub use envelope::{ErrorBody, RequestEnvelope, ResponseEnvelope, WireSignedSubRav, WireSubRav};
