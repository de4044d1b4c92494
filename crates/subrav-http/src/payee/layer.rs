//! Payee-side axum middleware driving [`PaymentProcessor`]'s three-step
//! pipeline around a protected route. Grounded on the teacher's
//! `x402_axum::layer::{X402Middleware, X402MiddlewareService, X402Paygate}`
//! (`crates/x402-axum/src/layer.rs`): a `tower::Layer` builder wrapping the
//! inner service, with a paygate-style helper doing
//! verify → call inner → settle and injecting a response header on the way
//! out. Unlike the teacher, verification and settlement here are not always
//! back-to-back around one handler call — `payment_required` rejections
//! return before the handler ever runs, matching the deferred-billing
//! handshake (spec §4.4).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::response::Response;
use tower::{Layer, Service};

use subrav_billing::{RateProvider, RequestMeta};
use subrav_codec::{DidResolver, SignatureVerifier};
use subrav_contract::PaymentChannelContract;
use subrav_storage::{ChannelRepository, PendingSubRAVRepository, RAVRepository};
use subrav_types::billing::{BillingContext, BillingRule};
use subrav_types::channel::{ChannelId, VmIdFragment};
use subrav_types::error::ProtocolError;
use subrav_types::subrav::SignedSubRAV;

use subrav_payee::PaymentProcessor;

use crate::auth::{DidAuthVerifier, AUTHORIZATION_HEADER};
use crate::codec::{decode_request, HEADER_NAME};
use crate::payee::usage::UsageCell;
use crate::response::{protocol_error_response, success_envelope};

/// Static, per-route configuration a [`PaymentLayer`] needs beyond the
/// processor itself.
#[derive(Clone)]
pub struct PaymentLayerConfig {
    pub rules: Arc<Vec<BillingRule>>,
    /// The channel a bare request (no `signedSubRav` yet) is assumed to
    /// belong to, for services that map one host to one channel (spec §4.4
    /// step A: "channel/sub-channel resolution"). `None` requires every
    /// request to carry a `signedSubRav` identifying its channel.
    pub host_channel_id: Option<ChannelId>,
    pub host_vm_id_fragment: Option<VmIdFragment>,
}

/// A [`tower::Layer`] wrapping a protected route with the payee payment
/// pipeline (spec §4.4, §4.7).
#[derive(Clone)]
pub struct PaymentLayer<CR, RR, PR, CT, RT, DR, SV, AV> {
    processor: Arc<PaymentProcessor<CR, RR, PR, CT, RT, DR, SV>>,
    auth: Arc<AV>,
    config: PaymentLayerConfig,
}

impl<CR, RR, PR, CT, RT, DR, SV, AV> PaymentLayer<CR, RR, PR, CT, RT, DR, SV, AV> {
    pub fn new(processor: Arc<PaymentProcessor<CR, RR, PR, CT, RT, DR, SV>>, auth: AV, config: PaymentLayerConfig) -> Self {
        PaymentLayer { processor, auth: Arc::new(auth), config }
    }
}

impl<S, CR, RR, PR, CT, RT, DR, SV, AV> Layer<S> for PaymentLayer<CR, RR, PR, CT, RT, DR, SV, AV> {
    type Service = PaymentService<S, CR, RR, PR, CT, RT, DR, SV, AV>;

    fn layer(&self, inner: S) -> Self::Service {
        PaymentService { inner, layer: self.clone() }
    }
}

#[derive(Clone)]
pub struct PaymentService<S, CR, RR, PR, CT, RT, DR, SV, AV> {
    inner: S,
    layer: PaymentLayer<CR, RR, PR, CT, RT, DR, SV, AV>,
}

impl<S, CR, RR, PR, CT, RT, DR, SV, AV> Service<Request> for PaymentService<S, CR, RR, PR, CT, RT, DR, SV, AV>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    CR: ChannelRepository + Send + Sync + 'static,
    RR: RAVRepository + Send + Sync + 'static,
    PR: PendingSubRAVRepository + Send + Sync + 'static,
    CT: PaymentChannelContract + Send + Sync + 'static,
    RT: RateProvider + Send + Sync + 'static,
    DR: DidResolver + Send + Sync + 'static,
    SV: SignatureVerifier + Send + Sync + 'static,
    AV: DidAuthVerifier + Send + Sync + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let inner = self.inner.clone();
        let layer = self.layer.clone();
        Box::pin(async move { handle(layer, inner, req).await })
    }
}

async fn handle<S, CR, RR, PR, CT, RT, DR, SV, AV>(
    layer: PaymentLayer<CR, RR, PR, CT, RT, DR, SV, AV>,
    mut inner: S,
    mut req: Request,
) -> Result<Response, S::Error>
where
    S: Service<Request, Response = Response> + Send,
    CR: ChannelRepository + Send + Sync + 'static,
    RR: RAVRepository + Send + Sync + 'static,
    PR: PendingSubRAVRepository + Send + Sync + 'static,
    CT: PaymentChannelContract + Send + Sync + 'static,
    RT: RateProvider + Send + Sync + 'static,
    DR: DidResolver + Send + Sync + 'static,
    SV: SignatureVerifier + Send + Sync + 'static,
    AV: DidAuthVerifier + Send + Sync + 'static,
{
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let request_meta = RequestMeta { path, method: method.clone(), extra: Default::default() };

    // Header presence/decoding is only enforced once a rule is known to
    // apply (below, after `pre_process`): an unmatched route must pass
    // through untouched even with no header at all.
    let header = req.headers().get(HEADER_NAME).and_then(|v| v.to_str().ok()).map(str::to_string);
    let mut header_error = None;
    let mut ctx = BillingContext::new("payee", "", String::new());
    match &header {
        None => header_error = Some(ProtocolError::payment_required("missing X-Payment-Channel-Data header")),
        Some(header) => match decode_request(header) {
            Ok(envelope) => {
                ctx.client_tx_ref = envelope.client_tx_ref.clone();
                ctx.max_amount = envelope.max_amount.as_deref().and_then(|s| s.parse().ok());
                if let Some(wire) = &envelope.signed_sub_rav {
                    match SignedSubRAV::try_from(wire) {
                        Ok(signed) => ctx.signed_sub_rav = Some(signed),
                        Err(e) => header_error = Some(ProtocolError::bad_request(e.to_string())),
                    }
                }
            }
            Err(e) => header_error = Some(ProtocolError::bad_request(e.to_string())),
        },
    }

    if let Some(token) = req.headers().get(AUTHORIZATION_HEADER).and_then(|v| v.to_str().ok()) {
        let url = req.uri().to_string();
        if let Ok(Some(did)) = layer.auth.verify(token, &url, &method).await {
            ctx.did_auth = true;
            ctx.payer_did = Some(did);
        }
    }

    ctx.vm_id_fragment = ctx
        .signed_sub_rav
        .as_ref()
        .map(|s| s.sub_rav.vm_id_fragment.clone())
        .or_else(|| layer.config.host_vm_id_fragment.clone());

    if let Err(e) = layer.processor.pre_process(&mut ctx, &layer.config.rules, &request_meta, layer.config.host_channel_id).await
    {
        return Ok(protocol_error_response(&e, ctx.state.channel_info.as_ref(), ctx.state.pending_proposal.as_ref()));
    }

    // No rule matched this request: it is not billable at all, pass through untouched.
    if ctx.rule.is_none() {
        return inner.call(req).await;
    }

    if let Some(e) = header_error {
        return Ok(protocol_error_response(&e, ctx.state.channel_info.as_ref(), ctx.state.pending_proposal.as_ref()));
    }

    if let Some(err) = ctx.state.error.clone() {
        return Ok(protocol_error_response(&err, ctx.state.channel_info.as_ref(), ctx.state.pending_proposal.as_ref()));
    }

    let (channel_id, vm_id_fragment) = match (ctx.channel_id, ctx.vm_id_fragment.clone()) {
        (Some(c), Some(v)) => (c, v),
        _ => return Ok(protocol_error_response(&ProtocolError::bad_request("no sub-channel identity"), None, None)),
    };
    let _guard = layer.processor.lock(channel_id, vm_id_fragment).await;

    let usage_cell = UsageCell::default();
    req.extensions_mut().insert(usage_cell.clone());

    let inner_response = match inner.call(req).await {
        Ok(response) => response,
        Err(error) => {
            layer.processor.settle_after_handler_failure(&mut ctx);
            if let Err(e) = layer.processor.persist(&ctx).await {
                tracing::warn!(error = %e, "best-effort persist after handler failure also failed");
            }
            return Err(error);
        }
    };

    let usage = usage_cell.0.lock().expect("usage mutex poisoned").clone();
    if let Err(e) = layer.processor.settle(&mut ctx, usage).await {
        return Ok(protocol_error_response(&e, None, None));
    }
    if let Err(e) = layer.processor.persist(&ctx).await {
        return Ok(protocol_error_response(&e, None, None));
    }

    let envelope = success_envelope(&ctx);
    let mut response = inner_response;
    match envelope.header_value() {
        Ok(header_value) => {
            if let Ok(value) = axum::http::HeaderValue::from_str(&header_value) {
                response.headers_mut().insert(HEADER_NAME, value);
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to encode response payment envelope"),
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::str::FromStr;

    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};

    use subrav_billing::AssetInfo;
    use subrav_codec::{DidResolver, KeyType, SignatureVerifier, VerificationMethod};
    use subrav_contract::testing::MockContract;
    use subrav_payee::ProcessorConfig;
    use subrav_storage::{InMemoryChannelRepository, InMemoryPendingSubRAVRepository, InMemoryRAVRepository, SubChannelPatch};
    use subrav_types::channel::{ChannelEpoch, ChannelId, ChannelInfo, ChannelStatus};
    use subrav_types::money::PicoUsd;
    use subrav_types::proto::RequestEnvelope;
    use subrav_types::subrav::{SignedSubRAV, SubRAV};

    use crate::auth::NoAuth;
    use crate::codec::encode_request;

    use super::*;

    struct NullResolver;
    impl DidResolver for NullResolver {
        type Error = ProtocolError;
        async fn resolve_verification_method(&self, _did: &str, _vm_id_fragment: &str) -> Result<Option<VerificationMethod>, Self::Error> {
            Ok(Some(VerificationMethod { public_key: vec![], key_type: KeyType::Ed25519 }))
        }
    }

    struct AlwaysValid;
    impl SignatureVerifier for AlwaysValid {
        fn verify(&self, _key_type: &KeyType, _public_key: &[u8], _message: &[u8], signature: &[u8]) -> bool {
            signature == b"valid"
        }
    }

    struct FixedRate;
    impl RateProvider for FixedRate {
        type Error = ProtocolError;
        async fn get_price_pico_usd(&self, _asset_id: &str) -> Result<PicoUsd, Self::Error> {
            Ok(PicoUsd(1_000_000_000_000))
        }
        async fn get_asset_info(&self, asset_id: &str) -> Result<Option<AssetInfo>, Self::Error> {
            Ok(Some(AssetInfo { asset_id: asset_id.to_string(), symbol: "USD".into(), decimals: 8 }))
        }
        async fn get_last_updated(&self, _asset_id: &str) -> Result<Option<subrav_types::timestamp::UnixTimestamp>, Self::Error> {
            Ok(None)
        }
        async fn clear_cache(&self) {}
    }

    #[derive(Clone)]
    struct Echo;

    impl tower::Service<Request> for Echo {
        type Response = Response;
        type Error = Infallible;
        type Future = std::pin::Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: Request) -> Self::Future {
            Box::pin(async { Ok(Response::builder().status(StatusCode::OK).body(Body::empty()).unwrap()) })
        }
    }

    type TestProcessor = PaymentProcessor<InMemoryChannelRepository, InMemoryRAVRepository, InMemoryPendingSubRAVRepository, MockContract, FixedRate, NullResolver, AlwaysValid>;

    async fn seeded_layer(rule: BillingRule) -> (PaymentLayer<InMemoryChannelRepository, InMemoryRAVRepository, InMemoryPendingSubRAVRepository, MockContract, FixedRate, NullResolver, AlwaysValid, NoAuth>, ChannelId) {
        let channel_repo = InMemoryChannelRepository::new();
        let rav_repo = InMemoryRAVRepository::new();
        let pending_repo = InMemoryPendingSubRAVRepository::new();
        let contract = MockContract::new(4);

        let channel_id = ChannelId::from_str(&format!("0x{}", "cd".repeat(32))).unwrap();
        channel_repo
            .set_channel_metadata(ChannelInfo {
                channel_id,
                payer_did: "did:example:payer".into(),
                payee_did: "did:example:payee".into(),
                asset_id: "0xusdc".into(),
                chain_id: 4,
                epoch: ChannelEpoch(0),
                status: ChannelStatus::Active,
            })
            .await
            .unwrap();
        channel_repo.update_sub_channel_state(channel_id, VmIdFragment::from("k"), SubChannelPatch::default()).await.unwrap();

        let processor: TestProcessor =
            PaymentProcessor::new(channel_repo, rav_repo, pending_repo, contract, FixedRate, NullResolver, AlwaysValid, ProcessorConfig::default());
        let config = PaymentLayerConfig { rules: Arc::new(vec![rule]), host_channel_id: Some(channel_id), host_vm_id_fragment: Some(VmIdFragment::from("k")) };
        (PaymentLayer::new(Arc::new(processor), NoAuth, config), channel_id)
    }

    fn per_request_rule() -> BillingRule {
        BillingRule {
            id: "chat".into(),
            when: Some(subrav_types::billing::RuleMatch { path: Some("/chat".into()), ..Default::default() }),
            default: false,
            strategy: subrav_types::billing::StrategyConfig::PerRequest { price_pico_usd: PicoUsd(1_000_000_000) },
            auth_required: false,
            admin_only: false,
            payment_required: false,
        }
    }

    fn request_with_envelope(envelope: &RequestEnvelope) -> Request {
        HttpRequest::builder()
            .method("POST")
            .uri("/chat")
            .header(HEADER_NAME, encode_request(envelope).unwrap())
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn unmatched_route_passes_through_with_no_payment_header() {
        let (layer, _channel_id) = seeded_layer(per_request_rule()).await;
        let req = HttpRequest::builder().method("GET").uri("/health").body(Body::empty()).unwrap();
        let response = handle(layer, Echo, req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(HEADER_NAME).is_none());
    }

    #[tokio::test]
    async fn billable_call_without_the_header_is_rejected_before_the_handler_runs() {
        let (layer, _channel_id) = seeded_layer(per_request_rule()).await;
        let req = HttpRequest::builder().method("POST").uri("/chat").body(Body::empty()).unwrap();
        let response = handle(layer, Echo, req).await.unwrap();
        assert_ne!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn handshake_submission_succeeds_and_carries_a_response_envelope() {
        let (layer, channel_id) = seeded_layer(per_request_rule()).await;
        let envelope = RequestEnvelope {
            version: 1,
            client_tx_ref: "tx-1".into(),
            max_amount: None,
            signed_sub_rav: Some((&SignedSubRAV {
                sub_rav: SubRAV::handshake(4, channel_id, ChannelEpoch(0), VmIdFragment::from("k")),
                signature: b"valid".to_vec(),
            })
                .into()),
        };
        let req = request_with_envelope(&envelope);
        let response = handle(layer, Echo, req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(HEADER_NAME).is_some());
    }
}
