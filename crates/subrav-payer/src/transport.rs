//! The two external collaborators a payer client needs that aren't the
//! on-chain contract: the authenticated channel of talking to a payee
//! (discovery/recovery/commit) and a DID-Auth token issuer. Both are outside
//! this crate's scope by design (spec §1: "HTTP framework glue ... the
//! signer that produces key-scoped signatures" are external collaborators);
//! `subrav-http` supplies the real HTTP-backed implementations.

use std::sync::Arc;

use subrav_types::proto::builtin::RecoveryResponse;
use subrav_types::proto::DiscoveryInfo;
use subrav_types::subrav::SignedSubRAV;

/// The payee-side operations a payer client calls outside the billable
/// request/response cycle (spec §4.6: `discoverService`, `recoverFromService`,
/// `commitSubRAV`).
pub trait PayeeTransport {
    type Error: std::fmt::Debug + std::fmt::Display;

    /// `GET /.well-known/nuwa-payment/info` (spec §6).
    fn discover(&self) -> impl Future<Output = Result<DiscoveryInfo, Self::Error>> + Send;

    /// The authenticated `nuwa.recovery` call (spec §4.6: "the service
    /// returns `{channel?, subChannel?, pendingSubRav?}`").
    fn recover(&self, auth_token: &str) -> impl Future<Output = Result<RecoveryResponse, Self::Error>> + Send;

    /// The authenticated `nuwa.commit` call (spec §4.6: `commitSubRAV`).
    fn commit(
        &self,
        auth_token: &str,
        signed: &SignedSubRAV,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<T: PayeeTransport + Sync> PayeeTransport for Arc<T> {
    type Error = T::Error;

    fn discover(&self) -> impl Future<Output = Result<DiscoveryInfo, Self::Error>> + Send {
        self.as_ref().discover()
    }

    fn recover(&self, auth_token: &str) -> impl Future<Output = Result<RecoveryResponse, Self::Error>> + Send {
        self.as_ref().recover(auth_token)
    }

    fn commit(
        &self,
        auth_token: &str,
        signed: &SignedSubRAV,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.as_ref().commit(auth_token, signed)
    }
}

/// Issues a DID-Auth v1 token scoped to one URL/method pair (spec §4.6:
/// "attach a DID-auth token for the target URL/method"). The codec crate's
/// [`subrav_codec::signer::SubRavSigner`] signs SubRAVs, not HTTP requests;
/// this is a distinct, narrower capability.
pub trait DidAuthIssuer {
    type Error: std::fmt::Debug + std::fmt::Display;

    fn issue(&self, url: &str, method: &str) -> impl Future<Output = Result<String, Self::Error>> + Send;
}

impl<T: DidAuthIssuer + Sync> DidAuthIssuer for Arc<T> {
    type Error = T::Error;

    fn issue(&self, url: &str, method: &str) -> impl Future<Output = Result<String, Self::Error>> + Send {
        self.as_ref().issue(url, method)
    }
}
