//! The DID-Auth v1 verifier boundary. Outside this crate's core scope the
//! same way [`subrav_codec::signer::DidResolver`] is: transport adapters need
//! a narrow trait to turn a bearer token into an authenticated payer DID, but
//! neither the resolution of the signing key nor the token format itself is
//! this crate's concern.

use std::sync::Arc;

/// Verifies a DID-Auth v1 token scoped to one URL/method pair (spec §6:
/// the `__nuwa_auth` MCP parameter and the HTTP `Authorization` header carry
/// the same token). Returns the authenticated payer DID, or `None` if the
/// token itself is well-formed but does not authenticate (as opposed to an
/// `Err`, which signals the verifier couldn't evaluate it at all).
pub trait DidAuthVerifier {
    type Error: std::fmt::Debug + std::fmt::Display;

    fn verify(
        &self,
        token: &str,
        url: &str,
        method: &str,
    ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send;
}

impl<T: DidAuthVerifier + Sync> DidAuthVerifier for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        token: &str,
        url: &str,
        method: &str,
    ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send {
        self.as_ref().verify(token, url, method)
    }
}

/// A verifier that never authenticates anyone. Useful for exercising
/// unauthenticated routes and for services with no `authRequired`/`adminOnly`
/// rules at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl DidAuthVerifier for NoAuth {
    type Error = std::convert::Infallible;

    async fn verify(&self, _token: &str, _url: &str, _method: &str) -> Result<Option<String>, Self::Error> {
        Ok(None)
    }
}

pub const AUTHORIZATION_HEADER: &str = "authorization";
pub const MCP_AUTH_PARAM: &str = "__nuwa_auth";
