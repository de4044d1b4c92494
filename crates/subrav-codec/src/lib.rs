//! Canonical binary encoding (spec §6) and the signer/verifier trait
//! boundary (spec §4.1) for SubRAV receipts.
//!
//! DID resolution and private-key signing are treated as external
//! collaborators: this crate defines the narrow traits a transport adapter
//! must supply, and composes them into `sign`/`verify`, but never reaches
//! into a DID document or a key store itself.

pub mod binary;
pub mod error;
pub mod signer;

pub use binary::{decode, encode};
pub use error::DecodeError;
pub use signer::{DidResolver, KeyType, SignatureVerifier, SubRavSigner, VerificationMethod, sign, verify, verify_with_key};
