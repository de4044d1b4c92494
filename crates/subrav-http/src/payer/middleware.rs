//! A [`reqwest_middleware::Middleware`] that attaches the payment envelope
//! to every outgoing request and resolves it from the response, driving
//! [`PayerClient::before_request`]/[`after_response`](PayerClient::after_response)
//! around the call. Grounded on the teacher's `x402_reqwest::middleware::X402Payments`
//! (`crates/x402-reqwest/src/middleware.rs`): a `reqwest_middleware::Middleware`
//! wrapping `next.run(..)`. Unlike the teacher, which only attaches a payment
//! after a first attempt comes back `402`, this protocol proposes its *next*
//! SubRAV proactively on every request (spec §4.6) — there is no bare retry.

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware as rqm;

use subrav_codec::signer::SubRavSigner;
use subrav_contract::PaymentChannelContract;
use subrav_payer::{DidAuthIssuer, PayeeTransport, PayerClient, PayerStateRepository};
use subrav_types::AssetAmount;

use crate::codec::{decode_response, HEADER_NAME};

#[derive(Debug, thiserror::Error)]
pub enum PayerMiddlewareError {
    #[error("payer channel not ready: {0}")]
    ChannelNotReady(subrav_types::ProtocolError),
    #[error("failed to build payment request envelope: {0}")]
    BeforeRequest(subrav_types::ProtocolError),
    #[error("payment header is not a valid HTTP header value")]
    InvalidHeaderValue,
}

impl From<PayerMiddlewareError> for rqm::Error {
    fn from(error: PayerMiddlewareError) -> Self {
        rqm::Error::Middleware(error.into())
    }
}

/// Wraps a [`PayerClient`] as outgoing-request middleware. The client must
/// already have `ensure_channel_ready` available to call lazily on the first
/// request; this middleware does not open channels itself ahead of time.
pub struct SubravPayments<TR, ST, CT, SG, AU> {
    client: std::sync::Arc<PayerClient<TR, ST, CT, SG, AU>>,
    max_amount: Option<AssetAmount>,
}

impl<TR, ST, CT, SG, AU> SubravPayments<TR, ST, CT, SG, AU> {
    pub fn new(client: std::sync::Arc<PayerClient<TR, ST, CT, SG, AU>>) -> Self {
        SubravPayments { client, max_amount: None }
    }

    /// Caps every request's `maxAmount` (spec §4.3: the client-side guard
    /// against a misbehaving or compromised payee over-proposing cost).
    pub fn with_max_amount(mut self, max_amount: AssetAmount) -> Self {
        self.max_amount = Some(max_amount);
        self
    }
}

#[async_trait::async_trait]
impl<TR, ST, CT, SG, AU> rqm::Middleware for SubravPayments<TR, ST, CT, SG, AU>
where
    TR: PayeeTransport + Send + Sync + 'static,
    ST: PayerStateRepository + Send + Sync + 'static,
    CT: PaymentChannelContract + Send + Sync + 'static,
    SG: SubRavSigner + Send + Sync + 'static,
    AU: DidAuthIssuer + Send + Sync + 'static,
{
    async fn handle(&self, mut req: Request, extensions: &mut Extensions, next: rqm::Next<'_>) -> rqm::Result<Response> {
        self.client.ensure_channel_ready().await.map_err(PayerMiddlewareError::ChannelNotReady)?;

        let (envelope, resolution) =
            self.client.before_request(self.max_amount).await.map_err(PayerMiddlewareError::BeforeRequest)?;

        let header_json = crate::codec::encode_request(&envelope).map_err(|_| PayerMiddlewareError::InvalidHeaderValue)?;
        let header_value = http::HeaderValue::from_str(&header_json).map_err(|_| PayerMiddlewareError::InvalidHeaderValue)?;
        req.headers_mut().insert(HEADER_NAME, header_value);

        let response = next.run(req, extensions).await?;

        let settled = response
            .headers()
            .get(HEADER_NAME)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| decode_response(v).ok());

        match settled {
            Some(envelope) => {
                self.client.after_response(&envelope).await;
                match resolution.resolve().await {
                    Ok(info) => tracing::debug!(cost = ?info.cost, nonce = ?info.nonce, "request settled"),
                    Err(error) => tracing::warn!(%error, "in-flight request resolved with an error"),
                }
            }
            // Non-billable route, or a transport-level failure before the
            // payee's own middleware ran: the in-flight entry resolves on
            // its own via the watchdog timeout.
            None => drop(resolution),
        }

        Ok(response)
    }
}
