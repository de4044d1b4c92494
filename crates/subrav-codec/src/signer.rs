//! The signer/resolver/verifier trait boundary (spec §4.1).
//!
//! Three collaborators are external to this workspace by design: the key
//! store that holds a payer's private key, the DID resolver that turns a
//! `did#fragment` into a public key, and the key-type-specific signature
//! algorithm. This module defines the narrow trait each one must satisfy
//! and composes them into `sign`/`verify`/`verify_with_key`; it never
//! touches a private key or a DID document itself.
//!
//! The `Arc<T>` blanket impls mirror the teacher's `Facilitator` trait
//! (`src/facilitator.rs`), which lets a transport adapter hold a cheaply
//! cloneable handle to any of these without going through a trait object.

use std::sync::Arc;

use subrav_types::subrav::{SignedSubRAV, SubRAV};

use crate::binary::encode;

/// The cryptographic family of a verification method's key, as reported by
/// a [`DidResolver`]. Kept open-ended: a DID may use key types this
/// workspace has no built-in verifier for, and that is expected — the
/// `SignatureVerifier` is supplied by the embedder, not this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyType {
    Ed25519,
    EcdsaSecp256k1,
    Other(String),
}

/// A resolved verification method: a public key and its key type.
#[derive(Debug, Clone)]
pub struct VerificationMethod {
    pub public_key: Vec<u8>,
    pub key_type: KeyType,
}

/// Signs arbitrary bytes on behalf of a `keyId` (`"<did>#<fragment>"`).
/// Never exposes the private key to the caller.
pub trait SubRavSigner {
    type Error: std::fmt::Debug + std::fmt::Display;

    fn sign(
        &self,
        key_id: &str,
        message: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send;
}

impl<T: SubRavSigner + Sync> SubRavSigner for Arc<T> {
    type Error = T::Error;

    fn sign(
        &self,
        key_id: &str,
        message: &[u8],
    ) -> impl Future<Output = Result<Vec<u8>, Self::Error>> + Send {
        self.as_ref().sign(key_id, message)
    }
}

/// Resolves the verification method named by `did#vm_id_fragment` to a
/// public key and key type (spec §4.1: "find the verification method whose
/// id ends with `#vmIdFragment`"). Returns `Ok(None)` for an unknown DID or
/// fragment; the codec never throws on a missing resolution, only on a
/// transport failure reaching the resolver.
pub trait DidResolver {
    type Error: std::fmt::Debug + std::fmt::Display;

    fn resolve_verification_method(
        &self,
        did: &str,
        vm_id_fragment: &str,
    ) -> impl Future<Output = Result<Option<VerificationMethod>, Self::Error>> + Send;
}

impl<T: DidResolver + Sync> DidResolver for Arc<T> {
    type Error = T::Error;

    fn resolve_verification_method(
        &self,
        did: &str,
        vm_id_fragment: &str,
    ) -> impl Future<Output = Result<Option<VerificationMethod>, Self::Error>> + Send {
        self.as_ref().resolve_verification_method(did, vm_id_fragment)
    }
}

/// Verifies a signature given an already-resolved public key and key type.
/// The one place key-type-specific cryptography lives; this workspace
/// supplies no built-in implementation, since the concrete algorithms
/// (Ed25519, secp256k1 ECDSA, ...) are an external collaborator's concern.
pub trait SignatureVerifier {
    fn verify(&self, key_type: &KeyType, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool;
}

impl<T: SignatureVerifier> SignatureVerifier for Arc<T> {
    fn verify(&self, key_type: &KeyType, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        self.as_ref().verify(key_type, public_key, message, signature)
    }
}

/// Signs `sub_rav` with `signer`, using `key_id` to select the payer's key
/// (spec §4.1: `sign(SubRAV, signer, keyId) -> SignedSubRAV`).
pub async fn sign<S: SubRavSigner>(sub_rav: SubRAV, signer: &S, key_id: &str) -> Result<SignedSubRAV, S::Error> {
    let message = encode(&sub_rav);
    let signature = signer.sign(key_id, &message).await?;
    Ok(SignedSubRAV { sub_rav, signature })
}

/// Verifies `signed` by resolving the payer's DID and delegating to
/// `verifier` (spec §4.1: `verify(SignedSubRAV, didResolver) -> bool`).
/// Returns `false` (never an error) on DID-not-found, VM-not-found,
/// unsupported key type, or an invalid signature; resolver transport
/// failures are the only case propagated as `Err`.
pub async fn verify<R: DidResolver, V: SignatureVerifier>(
    signed: &SignedSubRAV,
    payer_did: &str,
    resolver: &R,
    verifier: &V,
) -> Result<bool, R::Error> {
    let vm = resolver
        .resolve_verification_method(payer_did, &signed.sub_rav.vm_id_fragment.0)
        .await?;
    Ok(match vm {
        Some(vm) => verify_with_key(signed, &vm.public_key, &vm.key_type, verifier),
        None => false,
    })
}

/// Verifies `signed` against an already-known public key and key type,
/// skipping DID resolution (spec §4.1: `verifyWithKey`).
pub fn verify_with_key<V: SignatureVerifier>(
    signed: &SignedSubRAV,
    public_key: &[u8],
    key_type: &KeyType,
    verifier: &V,
) -> bool {
    let message = encode(&signed.sub_rav);
    verifier.verify(key_type, public_key, &message, &signed.signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use subrav_types::channel::{ChannelEpoch, ChannelId, VmIdFragment};
    use subrav_types::money::AssetAmount;
    use std::str::FromStr;

    struct AlwaysValid;
    impl SignatureVerifier for AlwaysValid {
        fn verify(&self, _key_type: &KeyType, _public_key: &[u8], _message: &[u8], signature: &[u8]) -> bool {
            signature == b"valid"
        }
    }

    fn sample_signed(signature: &[u8]) -> SignedSubRAV {
        SignedSubRAV {
            sub_rav: SubRAV {
                version: 1,
                chain_id: 4,
                channel_id: ChannelId::from_str(&format!("0x{}", "11".repeat(32))).unwrap(),
                channel_epoch: ChannelEpoch(0),
                vm_id_fragment: VmIdFragment::from("k"),
                accumulated_amount: AssetAmount::ZERO,
                nonce: 0,
            },
            signature: signature.to_vec(),
        }
    }

    #[test]
    fn verify_with_key_delegates_to_the_supplied_verifier() {
        let verifier = AlwaysValid;
        assert!(verify_with_key(&sample_signed(b"valid"), b"pub", &KeyType::Ed25519, &verifier));
        assert!(!verify_with_key(&sample_signed(b"garbage"), b"pub", &KeyType::Ed25519, &verifier));
    }
}
