//! The payer's per-host client state machine (spec §4.6).

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, oneshot};
use uuid::Uuid;

use subrav_codec::signer::SubRavSigner;
use subrav_contract::PaymentChannelContract;
use subrav_types::proto::{DiscoveryInfo, RequestEnvelope, ResponseEnvelope, WireSignedSubRav};
use subrav_types::{AssetAmount, ChannelId, PicoUsd, ProtocolError, SignedSubRAV, SubRAV, UnixTimestamp, VmIdFragment};

use crate::state::{PayerClientState, PayerStateRepository};
use crate::transport::{DidAuthIssuer, PayeeTransport};

/// Configuration for a [`PayerClient`] (spec §4.6: in-flight timeouts "default
/// 5-30s, configurable", plus the bounded retry used while waiting for a
/// freshly authorized sub-channel to become visible through the contract).
#[derive(Debug, Clone)]
pub struct PayerClientConfig {
    pub default_request_timeout: Duration,
    pub sub_channel_poll_interval: Duration,
    pub sub_channel_poll_max_attempts: u32,
}

impl Default for PayerClientConfig {
    fn default() -> Self {
        PayerClientConfig {
            default_request_timeout: Duration::from_secs(10),
            sub_channel_poll_interval: Duration::from_millis(250),
            sub_channel_poll_max_attempts: 20,
        }
    }
}

/// What an in-flight request resolves to (spec §4.6: `afterResponse`
/// "Resolve the in-flight request by `clientTxRef` with `PaymentInfo`").
#[derive(Debug, Clone)]
pub struct PaymentInfo {
    pub cost: Option<AssetAmount>,
    pub cost_usd: Option<PicoUsd>,
    pub nonce: Option<u64>,
    pub channel_id: Option<ChannelId>,
    pub vm_id_fragment: Option<VmIdFragment>,
    pub asset_id: String,
    pub timestamp: UnixTimestamp,
    pub service_tx_ref: Option<String>,
}

impl PaymentInfo {
    /// The resolution used by [`PayerClient::resolve_all_as_free`]: no charge
    /// was ever confirmed, because the request never completed normally.
    fn free(asset_id: String) -> Self {
        PaymentInfo {
            cost: None,
            cost_usd: None,
            nonce: None,
            channel_id: None,
            vm_id_fragment: None,
            asset_id,
            timestamp: UnixTimestamp::now(),
            service_tx_ref: None,
        }
    }
}

struct InFlightRequest {
    sender: oneshot::Sender<Result<PaymentInfo, ProtocolError>>,
    deadline: Instant,
}

/// Resolution handle returned by [`PayerClient::before_request`]. Await
/// [`Self::resolve`] directly; the client's watchdog task resolves it with a
/// timeout error if no [`PayerClient::after_response`] call claims it first.
pub struct PendingResolution {
    pub client_tx_ref: String,
    receiver: oneshot::Receiver<Result<PaymentInfo, ProtocolError>>,
}

impl PendingResolution {
    pub async fn resolve(self) -> Result<PaymentInfo, ProtocolError> {
        self.receiver
            .await
            .unwrap_or_else(|_| Err(ProtocolError::internal("in-flight request sender dropped")))
    }
}

/// Per-host payer client (spec §4.6). Generic over the external
/// collaborators it composes: the authenticated channel to the payee
/// ([`PayeeTransport`]), persisted state ([`PayerStateRepository`]), the
/// on-chain contract ([`PaymentChannelContract`]), the SubRAV signer
/// ([`SubRavSigner`]), and the DID-Auth token issuer ([`DidAuthIssuer`]).
///
/// Grounded on `x402_reqwest::middleware::X402Payments`: select a payment
/// requirement, build and sign a payload, attach a header, retry — except
/// here the "retry" is spread across `beforeRequest`/`afterResponse`, since
/// this protocol settles by proposing the *next* SubRAV rather than replaying
/// the same request with a freshly signed one.
pub struct PayerClient<TR, ST, CT, SG, AU> {
    transport: TR,
    state_repo: ST,
    contract: CT,
    signer: SG,
    auth: AU,
    config: PayerClientConfig,
    state: RwLock<PayerClientState>,
    readiness_lock: Mutex<()>,
    in_flight: DashMap<String, InFlightRequest>,
}

impl<TR, ST, CT, SG, AU> PayerClient<TR, ST, CT, SG, AU>
where
    TR: PayeeTransport + Send + Sync + 'static,
    ST: PayerStateRepository + Send + Sync + 'static,
    CT: PaymentChannelContract + Send + Sync + 'static,
    SG: SubRavSigner + Send + Sync + 'static,
    AU: DidAuthIssuer + Send + Sync + 'static,
{
    pub fn new(
        transport: TR,
        state_repo: ST,
        contract: CT,
        signer: SG,
        auth: AU,
        config: PayerClientConfig,
        initial_state: PayerClientState,
    ) -> Arc<Self> {
        Arc::new(PayerClient {
            transport,
            state_repo,
            contract,
            signer,
            auth,
            config,
            state: RwLock::new(initial_state),
            readiness_lock: Mutex::new(()),
            in_flight: DashMap::new(),
        })
    }

    /// A read-only snapshot of the current state, for inspection and tests.
    pub async fn snapshot(&self) -> PayerClientState {
        self.state.read().await.clone()
    }

    /// `GET /.well-known/nuwa-payment/info`, caching the result; falls back
    /// to `basePath = "/payment-channel"` if discovery fails (spec §4.6).
    pub async fn discover_service(&self) -> DiscoveryInfo {
        match self.transport.discover().await {
            Ok(info) => {
                self.state.write().await.discovery = Some(info.clone());
                info
            }
            Err(error) => {
                tracing::warn!(%error, "service discovery failed, falling back to default base path");
                let default_asset_id = self.state.read().await.default_asset_id.clone();
                DiscoveryInfo {
                    version: 1,
                    service_id: String::new(),
                    service_did: String::new(),
                    network: String::new(),
                    default_asset_id,
                    default_price_pico_usd: None,
                    base_path: DiscoveryInfo::FALLBACK_BASE_PATH.to_string(),
                }
            }
        }
    }

    /// Idempotent; concurrent callers serialize through `readiness_lock` and
    /// the first to arrive does the work (spec §4.6: "deduplicated by a
    /// single in-flight promise").
    pub async fn ensure_channel_ready(&self) -> Result<(), ProtocolError> {
        let _guard = self.readiness_lock.lock().await;

        if self.state.read().await.is_ready() {
            return Ok(());
        }

        let host = self.state.read().await.host.clone();
        if let Ok(Some(persisted)) = self.state_repo.load(&host).await {
            if persisted.is_ready() {
                *self.state.write().await = persisted;
                return Ok(());
            }
        }

        self.recover_or_open().await?;

        let state = self.state.read().await.clone();
        self.state_repo.save(&state).await.map_err(|e| ProtocolError::internal(e.to_string()))?;
        Ok(())
    }

    async fn recover_or_open(&self) -> Result<(), ProtocolError> {
        let (payer_did, vm_id_fragment, default_asset_id, payee_did_hint, recovery_url) = {
            let state = self.state.read().await;
            (
                state.payer_did().to_string(),
                state.vm_id_fragment.clone(),
                state.default_asset_id.clone(),
                state.payee_did.clone(),
                "/nuwa.recovery".to_string(),
            )
        };

        let recovery_auth = self
            .auth
            .issue(&recovery_url, "POST")
            .await
            .map_err(|e| ProtocolError::service_unavailable(e.to_string()))?;

        match self.transport.recover(&recovery_auth).await {
            Ok(recovered) => {
                let channel_id = recovered.channel.channel_id;
                let sub_channel_info = match self
                    .contract
                    .get_sub_channel(channel_id, vm_id_fragment.clone())
                    .await
                    .map_err(|e| ProtocolError::service_unavailable(e.to_string()))?
                {
                    Some(info) => info,
                    None => {
                        self.contract
                            .authorize_sub_channel(channel_id, vm_id_fragment.clone())
                            .await
                            .map_err(|e| ProtocolError::service_unavailable(e.to_string()))?;
                        self.poll_sub_channel(channel_id, vm_id_fragment.clone()).await?
                    }
                };

                let mut state = self.state.write().await;
                state.payee_did = Some(recovered.channel.payee_did.clone());
                state.channel_id = Some(channel_id);
                state.channel_info = Some(recovered.channel);
                state.sub_channel_info = Some(sub_channel_info);
                if let Some(wire) = recovered.pending_sub_rav.as_ref() {
                    if let Ok(candidate) = SubRAV::try_from(wire) {
                        accept_pending(&mut state, candidate);
                    }
                }
                Ok(())
            }
            Err(error) => {
                tracing::info!(%error, "recovery unavailable, opening a new channel");
                let payee_did = payee_did_hint.unwrap_or_default();
                let (receipt, authorization) = self
                    .contract
                    .open_channel_with_sub_channel(&payer_did, &payee_did, &default_asset_id, vm_id_fragment)
                    .await
                    .map_err(|e| ProtocolError::service_unavailable(e.to_string()))?;

                let mut state = self.state.write().await;
                state.channel_id = Some(receipt.channel.channel_id);
                state.channel_info = Some(receipt.channel);
                state.sub_channel_info = Some(authorization.sub_channel);
                Ok(())
            }
        }
    }

    async fn poll_sub_channel(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> Result<subrav_types::SubChannelInfo, ProtocolError> {
        for attempt in 0..self.config.sub_channel_poll_max_attempts {
            if let Some(info) = self
                .contract
                .get_sub_channel(channel_id, vm_id_fragment.clone())
                .await
                .map_err(|e| ProtocolError::service_unavailable(e.to_string()))?
            {
                return Ok(info);
            }
            if attempt + 1 < self.config.sub_channel_poll_max_attempts {
                tokio::time::sleep(self.config.sub_channel_poll_interval).await;
            }
        }
        Err(ProtocolError::service_unavailable(format!(
            "sub-channel {vm_id_fragment} on channel {channel_id} did not become visible after authorization"
        )))
    }

    /// Signs the cached pending proposal (or synthesizes the handshake
    /// SubRAV on the very first call) and registers the request for
    /// resolution by `clientTxRef` (spec §4.6: `beforeRequest`). Requires
    /// [`Self::ensure_channel_ready`] to have already succeeded.
    pub async fn before_request(
        self: &Arc<Self>,
        max_amount: Option<AssetAmount>,
    ) -> Result<(RequestEnvelope, PendingResolution), ProtocolError> {
        let (base, key_id) = {
            let state = self.state.read().await;
            let channel_info = state
                .channel_info
                .as_ref()
                .ok_or_else(|| ProtocolError::bad_request("channel not ready; call ensure_channel_ready first"))?;
            let channel_id = state
                .channel_id
                .ok_or_else(|| ProtocolError::bad_request("channel not ready; call ensure_channel_ready first"))?;
            let base = state.pending_sub_rav.clone().unwrap_or_else(|| {
                SubRAV::handshake(channel_info.chain_id, channel_id, channel_info.epoch, state.vm_id_fragment.clone())
            });
            (base, state.key_id.clone())
        };

        let signed = subrav_codec::sign(base, &self.signer, &key_id)
            .await
            .map_err(|e| ProtocolError::internal(e.to_string()))?;

        let client_tx_ref = Uuid::new_v4().to_string();
        let envelope = RequestEnvelope {
            version: 1,
            client_tx_ref: client_tx_ref.clone(),
            max_amount: max_amount.map(|a| a.to_string()),
            signed_sub_rav: Some(WireSignedSubRav::from(&signed)),
        };

        let (sender, receiver) = oneshot::channel();
        let deadline = Instant::now() + self.config.default_request_timeout;
        self.in_flight.insert(client_tx_ref.clone(), InFlightRequest { sender, deadline });
        self.spawn_watchdog(client_tx_ref.clone());

        Ok((envelope, PendingResolution { client_tx_ref, receiver }))
    }

    fn spawn_watchdog(self: &Arc<Self>, client_tx_ref: String) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let deadline = match client.in_flight.get(&client_tx_ref) {
                    Some(entry) => entry.deadline,
                    None => return,
                };
                let now = Instant::now();
                if deadline <= now {
                    if let Some((_, entry)) = client.in_flight.remove(&client_tx_ref) {
                        let _ = entry.sender.send(Err(ProtocolError::service_unavailable("payer request timed out")));
                    }
                    return;
                }
                tokio::time::sleep(deadline - now).await;
            }
        });
    }

    /// Extends an in-flight request's timeout (spec §4.6: `extendTimeout`,
    /// "supported for slow handlers"). A no-op if the request already
    /// resolved or timed out.
    pub fn extend_timeout(&self, client_tx_ref: &str, extra: Duration) {
        if let Some(mut entry) = self.in_flight.get_mut(client_tx_ref) {
            entry.deadline += extra;
        }
    }

    /// Accepts a new proposal (if any) and resolves the matching in-flight
    /// request (spec §4.6: `afterResponse`). A response whose `clientTxRef`
    /// names no known in-flight request — because it already timed out, or
    /// the ref is simply unrecognized — is silently ignored, which is how
    /// this crate realizes the spec's "ref is marked recently rejected" rule
    /// without a second bookkeeping set.
    pub async fn after_response(&self, response: &ResponseEnvelope) {
        let mut response_nonce = None;
        let mut accepted = false;
        if let Some(wire) = &response.sub_rav {
            if let Ok(candidate) = SubRAV::try_from(wire) {
                response_nonce = Some(candidate.nonce);
                let mut state = self.state.write().await;
                accepted = accept_pending(&mut state, candidate);
            }
        }

        if accepted {
            let state = self.state.read().await.clone();
            if let Err(error) = self.state_repo.save(&state).await {
                tracing::warn!(%error, "failed to persist payer state after accepting a pending proposal");
            }
        }

        let Some(client_tx_ref) = response.client_tx_ref.as_ref() else {
            return;
        };
        let Some((_, entry)) = self.in_flight.remove(client_tx_ref) else {
            tracing::debug!(%client_tx_ref, "response for unknown or already-resolved in-flight request, ignoring");
            return;
        };

        let state = self.state.read().await;
        let info = PaymentInfo {
            cost: response.cost.as_deref().and_then(|s| AssetAmount::from_str(s).ok()),
            cost_usd: response.cost_usd.as_deref().and_then(|s| PicoUsd::from_str(s).ok()),
            nonce: response_nonce,
            channel_id: state.channel_id,
            vm_id_fragment: Some(state.vm_id_fragment.clone()),
            asset_id: state.default_asset_id.clone(),
            timestamp: UnixTimestamp::now(),
            service_tx_ref: response.service_tx_ref.clone(),
        };
        let _ = entry.sender.send(Ok(info));
    }

    /// Finalizes a pending proposal without another billable call (spec
    /// §4.6: `commitSubRAV`).
    pub async fn commit_sub_rav(&self, signed: SignedSubRAV) -> Result<(), ProtocolError> {
        let auth_token = self
            .auth
            .issue("/nuwa.commit", "POST")
            .await
            .map_err(|e| ProtocolError::service_unavailable(e.to_string()))?;
        self.transport
            .commit(&auth_token, &signed)
            .await
            .map_err(|e| ProtocolError::service_unavailable(e.to_string()))
    }

    /// Rejects every in-flight request with `err` (spec §4.6: `rejectAll`,
    /// used on shutdown).
    pub fn reject_all(&self, err: &ProtocolError) {
        for client_tx_ref in self.in_flight_keys() {
            if let Some((_, entry)) = self.in_flight.remove(&client_tx_ref) {
                let _ = entry.sender.send(Err(ProtocolError::new(err.kind(), err.message.clone())));
            }
        }
    }

    /// Resolves every in-flight request as if it were free (spec §4.6:
    /// `resolveAllAsFree`, used on a downgrade path where no charge could be
    /// confirmed).
    pub async fn resolve_all_as_free(&self) {
        let asset_id = self.state.read().await.default_asset_id.clone();
        for client_tx_ref in self.in_flight_keys() {
            if let Some((_, entry)) = self.in_flight.remove(&client_tx_ref) {
                let _ = entry.sender.send(Ok(PaymentInfo::free(asset_id.clone())));
            }
        }
    }

    fn in_flight_keys(&self) -> Vec<String> {
        self.in_flight.iter().map(|entry| entry.key().clone()).collect()
    }
}

/// The monotonic guard (spec §4.6): accepts `candidate` into
/// `state.pending_sub_rav` iff it names the same `vmIdFragment` and its
/// nonce strictly exceeds both the current pending nonce and
/// `highestObservedNonce`; on acceptance, raises `highestObservedNonce` to
/// match.
fn accept_pending(state: &mut PayerClientState, candidate: SubRAV) -> bool {
    if candidate.vm_id_fragment != state.vm_id_fragment {
        return false;
    }
    let floor = state
        .pending_sub_rav
        .as_ref()
        .map(|p| p.nonce)
        .unwrap_or(0)
        .max(state.highest_observed_nonce.unwrap_or(0));
    if candidate.nonce <= floor {
        return false;
    }
    state.highest_observed_nonce = Some(state.highest_observed_nonce.unwrap_or(0).max(candidate.nonce));
    state.pending_sub_rav = Some(candidate);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    use subrav_contract::testing::MockContract;
    use subrav_types::ChannelEpoch;
    use subrav_types::proto::WireSubRav;
    use subrav_types::proto::builtin::RecoveryResponse;

    use crate::state::InMemoryPayerStateRepository;

    struct FailingTransport;

    impl PayeeTransport for FailingTransport {
        type Error = ProtocolError;

        async fn discover(&self) -> Result<DiscoveryInfo, Self::Error> {
            Err(ProtocolError::service_unavailable("no discovery in test"))
        }

        async fn recover(&self, _auth_token: &str) -> Result<RecoveryResponse, Self::Error> {
            Err(ProtocolError::not_found("no channel yet"))
        }

        async fn commit(&self, _auth_token: &str, _signed: &SignedSubRAV) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    struct StubAuth;

    impl DidAuthIssuer for StubAuth {
        type Error = Infallible;

        async fn issue(&self, _url: &str, _method: &str) -> Result<String, Self::Error> {
            Ok("token".to_string())
        }
    }

    struct StubSigner;

    impl SubRavSigner for StubSigner {
        type Error = Infallible;

        async fn sign(&self, _key_id: &str, _message: &[u8]) -> Result<Vec<u8>, Self::Error> {
            Ok(b"sig".to_vec())
        }
    }

    type TestClient = PayerClient<FailingTransport, InMemoryPayerStateRepository, MockContract, StubSigner, StubAuth>;

    fn seeded_client() -> Arc<TestClient> {
        let state = PayerClientState::new(
            "payee.example",
            "https://payee.example/payment-channel",
            "0xasset",
            "did:example:payer#k1",
            VmIdFragment::from("k1"),
        );
        PayerClient::new(
            FailingTransport,
            InMemoryPayerStateRepository::new(),
            MockContract::new(4),
            StubSigner,
            StubAuth,
            PayerClientConfig::default(),
            state,
        )
    }

    #[tokio::test]
    async fn ensure_channel_ready_opens_a_new_channel_when_recovery_fails() {
        let client = seeded_client();
        client.ensure_channel_ready().await.unwrap();
        let snapshot = client.snapshot().await;
        assert!(snapshot.is_ready());
        assert_eq!(snapshot.channel_info.unwrap().status, subrav_types::ChannelStatus::Active);
    }

    #[tokio::test]
    async fn before_request_synthesizes_handshake_on_first_call() {
        let client = seeded_client();
        client.ensure_channel_ready().await.unwrap();
        let (envelope, _resolution) = client.before_request(None).await.unwrap();
        let signed = envelope.signed_sub_rav.unwrap();
        assert_eq!(signed.sub_rav.nonce, "0");
        assert_eq!(signed.sub_rav.accumulated_amount, "0");
    }

    #[tokio::test]
    async fn after_response_resolves_in_flight_request_and_caches_next_pending() {
        let client = seeded_client();
        client.ensure_channel_ready().await.unwrap();
        let (envelope, resolution) = client.before_request(None).await.unwrap();

        let channel_id = client.snapshot().await.channel_id.unwrap();
        let next = SubRAV {
            version: 1,
            chain_id: 4,
            channel_id,
            channel_epoch: ChannelEpoch(0),
            vm_id_fragment: VmIdFragment::from("k1"),
            accumulated_amount: AssetAmount::from_u128(100_000),
            nonce: 1,
        };
        let response = ResponseEnvelope {
            version: 1,
            client_tx_ref: Some(envelope.client_tx_ref.clone()),
            service_tx_ref: Some("svc-1".to_string()),
            sub_rav: Some(WireSubRav::from(&next)),
            cost: Some("100000".to_string()),
            cost_usd: Some("1000000000".to_string()),
            error: None,
        };
        client.after_response(&response).await;

        let info = resolution.resolve().await.unwrap();
        assert_eq!(info.nonce, Some(1));
        assert_eq!(info.cost, Some(AssetAmount::from_u128(100_000)));

        let snapshot = client.snapshot().await;
        assert_eq!(snapshot.pending_sub_rav.unwrap().nonce, 1);
        assert_eq!(snapshot.highest_observed_nonce, Some(1));
    }

    #[test]
    fn accept_pending_drops_stale_and_cross_fragment_updates() {
        let mut state = PayerClientState::new("h", "https://h", "0xasset", "did:example:p#k1", VmIdFragment::from("k1"));
        let base = SubRAV {
            version: 1,
            chain_id: 4,
            channel_id: ChannelId::from_str(&format!("0x{}", "11".repeat(32))).unwrap(),
            channel_epoch: ChannelEpoch(0),
            vm_id_fragment: VmIdFragment::from("k1"),
            accumulated_amount: AssetAmount::ZERO,
            nonce: 5,
        };
        assert!(accept_pending(&mut state, base.clone()));
        assert_eq!(state.highest_observed_nonce, Some(5));

        let stale = SubRAV { nonce: 5, ..base.clone() };
        assert!(!accept_pending(&mut state, stale));

        let wrong_fragment = SubRAV { vm_id_fragment: VmIdFragment::from("other"), nonce: 6, ..base.clone() };
        assert!(!accept_pending(&mut state, wrong_fragment));

        let higher = SubRAV { nonce: 6, ..base };
        assert!(accept_pending(&mut state, higher));
        assert_eq!(state.pending_sub_rav.unwrap().nonce, 6);
    }
}
