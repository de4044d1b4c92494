//! Demo stand-ins for the three external collaborators `subrav-codec`
//! leaves to the embedder (spec §4.1): signer, resolver, verifier. None of
//! these talk to a real key store or DID document — they exist so the demo
//! binaries have something to run end to end. A real deployment plugs in a
//! wallet-backed signer and an actual DID resolver here instead.

use subrav_codec::{DidResolver, KeyType, SignatureVerifier, SubRavSigner, VerificationMethod};

const DEMO_SUFFIX: &[u8] = b":demo-signed";

/// Signs by appending a fixed suffix to the message. Not cryptography.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoSigner;

impl SubRavSigner for DemoSigner {
    type Error = std::convert::Infallible;

    async fn sign(&self, _key_id: &str, message: &[u8]) -> Result<Vec<u8>, Self::Error> {
        let mut signature = message.to_vec();
        signature.extend_from_slice(DEMO_SUFFIX);
        Ok(signature)
    }
}

/// Verifies a [`DemoSigner`] signature by recomputing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoVerifier;

impl SignatureVerifier for DemoVerifier {
    fn verify(&self, _key_type: &KeyType, _public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        let mut expected = message.to_vec();
        expected.extend_from_slice(DEMO_SUFFIX);
        expected == signature
    }
}

/// Resolves every `did#fragment` to the same placeholder Ed25519 key. A real
/// resolver would fetch and cache the payer's DID document.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoResolver;

impl DidResolver for DemoResolver {
    type Error = std::convert::Infallible;

    async fn resolve_verification_method(&self, _did: &str, _vm_id_fragment: &str) -> Result<Option<VerificationMethod>, Self::Error> {
        Ok(Some(VerificationMethod { public_key: vec![0u8; 32], key_type: KeyType::Ed25519 }))
    }
}
