//! The six built-in, rule-identified operations every payee exposes
//! identically on both transports (spec §6, §4.6 scenario 5): discovery and
//! health are free and unauthenticated, recovery/commit require DID-Auth,
//! and the two admin operations additionally require the admin allow-list.
//! These run outside [`super::layer::PaymentLayer`] — they are control-plane
//! calls on channel/scheduler state, not billable business calls.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

use subrav_codec::{DidResolver, SignatureVerifier};
use subrav_contract::{HubBalanceProvider, PaymentChannelContract};
use subrav_payee::ClaimScheduler;
use subrav_storage::{ChannelFilter, ChannelRepository, Page, PendingSubRAVRepository, RAVRepository};
use subrav_types::error::ProtocolError;
use subrav_types::proto::builtin::{
    ClaimTriggerRequest, CommitRequest, HealthResponse, RecoveryResponse, SubChannelSummary,
};
use subrav_types::proto::envelope::WireSubRav;
use subrav_types::proto::DiscoveryInfo;
use subrav_types::subrav::SignedSubRAV;

use crate::auth::{DidAuthVerifier, AUTHORIZATION_HEADER};

pub struct NuwaRoutesState<CR, RR, PR, CT, DR, SV, AV, RP> {
    pub channel_repo: CR,
    pub rav_repo: RR,
    pub pending_repo: PR,
    pub scheduler: Arc<ClaimScheduler<CT, RR, CR, RP>>,
    pub resolver: DR,
    pub verifier: SV,
    pub auth: AV,
    pub admins: HashSet<String>,
    pub discovery: DiscoveryInfo,
}

type SharedState<CR, RR, PR, CT, DR, SV, AV, RP> = Arc<NuwaRoutesState<CR, RR, PR, CT, DR, SV, AV, RP>>;

/// Builds the router for `GET /.well-known/nuwa-payment/info` plus the five
/// `nuwa.*` operations (spec §6), path-and-method-identified the same way on
/// both transports.
pub fn nuwa_routes<CR, RR, PR, CT, DR, SV, AV, RP>(state: NuwaRoutesState<CR, RR, PR, CT, DR, SV, AV, RP>) -> Router
where
    CR: ChannelRepository + Send + Sync + 'static,
    RR: RAVRepository + Send + Sync + 'static,
    PR: PendingSubRAVRepository + Send + Sync + 'static,
    CT: PaymentChannelContract + HubBalanceProvider + Send + Sync + 'static,
    DR: DidResolver + Send + Sync + 'static,
    SV: SignatureVerifier + Send + Sync + 'static,
    AV: DidAuthVerifier + Send + Sync + 'static,
    RP: subrav_billing::RateProvider + Send + Sync + 'static,
{
    let state: SharedState<CR, RR, PR, CT, DR, SV, AV, RP> = Arc::new(state);
    Router::new()
        .route("/.well-known/nuwa-payment/info", get(discover::<CR, RR, PR, CT, DR, SV, AV, RP>))
        .route("/nuwa.health", get(health))
        .route("/nuwa.recovery", post(recovery::<CR, RR, PR, CT, DR, SV, AV, RP>))
        .route("/nuwa.commit", post(commit::<CR, RR, PR, CT, DR, SV, AV, RP>))
        .route("/nuwa.admin.status", get(admin_status::<CR, RR, PR, CT, DR, SV, AV, RP>))
        .route("/nuwa.admin.claim-trigger", post(admin_claim_trigger::<CR, RR, PR, CT, DR, SV, AV, RP>))
        .with_state(state)
}

async fn discover<CR, RR, PR, CT, DR, SV, AV, RP>(
    State(state): State<SharedState<CR, RR, PR, CT, DR, SV, AV, RP>>,
) -> Json<DiscoveryInfo>
where
    CR: Send + Sync,
    RR: Send + Sync,
    PR: Send + Sync,
    CT: Send + Sync,
    DR: Send + Sync,
    SV: Send + Sync,
    AV: Send + Sync,
    RP: Send + Sync,
{
    Json(state.discovery.clone())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { healthy: true })
}

/// Looks up the authenticated payer's channel by a linear scan: the in-memory
/// reference repository has no `payer_did` index, only `payee_did`/`status`.
async fn find_channel_for_payer<CR: ChannelRepository>(
    channel_repo: &CR,
    payer_did: &str,
) -> Result<Option<subrav_types::channel::ChannelInfo>, CR::Error> {
    let page = Page { offset: 0, limit: 10_000 };
    let channels = channel_repo.list_channel_metadata(ChannelFilter::default(), page).await?;
    Ok(channels.into_iter().find(|c| c.payer_did == payer_did))
}

async fn authenticate<AV: DidAuthVerifier>(
    auth: &AV,
    headers: &axum::http::HeaderMap,
    url: &str,
    method: &str,
) -> Option<String> {
    let token = headers.get(AUTHORIZATION_HEADER)?.to_str().ok()?;
    auth.verify(token, url, method).await.ok().flatten()
}

fn error_response(err: ProtocolError) -> Response {
    let status = StatusCode::from_u16(err.kind().http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, err.message).into_response()
}

async fn recovery<CR, RR, PR, CT, DR, SV, AV, RP>(
    State(state): State<SharedState<CR, RR, PR, CT, DR, SV, AV, RP>>,
    headers: axum::http::HeaderMap,
) -> Response
where
    CR: ChannelRepository + Send + Sync,
    RR: RAVRepository + Send + Sync,
    PR: PendingSubRAVRepository + Send + Sync,
    CT: Send + Sync,
    DR: Send + Sync,
    SV: Send + Sync,
    AV: DidAuthVerifier + Send + Sync,
    RP: Send + Sync,
{
    let Some(payer_did) = authenticate(&state.auth, &headers, "/nuwa.recovery", "POST").await else {
        return error_response(ProtocolError::unauthorized("nuwa.recovery requires DID-auth"));
    };

    let channel = match find_channel_for_payer(&state.channel_repo, &payer_did).await {
        Ok(channel) => channel,
        Err(e) => return error_response(ProtocolError::internal(e.to_string())),
    };
    let Some(channel) = channel else {
        return error_response(ProtocolError::not_found("no channel for this payer"));
    };

    // Reference adapter: picks the first sub-channel on record for this
    // channel. A payer with more than one sub-channel must follow up with
    // `get_sub_channel_state` directly, keyed by its own `vmIdFragment`.
    let signed = match state.rav_repo.list(channel.channel_id).await {
        Ok(signed) => signed,
        Err(e) => return error_response(ProtocolError::internal(e.to_string())),
    };
    let Some(vm_id_fragment) = signed.into_iter().next().map(|s| s.sub_rav.vm_id_fragment) else {
        return Json(RecoveryResponse { channel, sub_channel: None::<SubChannelSummary>, pending_sub_rav: None }).into_response();
    };

    let sub_channel = match state.channel_repo.get_sub_channel_state(channel.channel_id, vm_id_fragment.clone()).await {
        Ok(sub_channel) => sub_channel.map(|sc| SubChannelSummary {
            vm_id_fragment: sc.vm_id_fragment,
            last_confirmed_nonce: sc.last_confirmed_nonce,
            last_claimed_amount: sc.last_claimed_amount,
        }),
        Err(e) => return error_response(ProtocolError::internal(e.to_string())),
    };
    let pending_sub_rav = match state.pending_repo.find_latest_by_sub_channel(channel.channel_id, vm_id_fragment).await {
        Ok(Some(pending)) => Some(WireSubRav {
            version: "1".to_string(),
            chain_id: channel.chain_id.to_string(),
            channel_id: pending.channel_id.to_string(),
            channel_epoch: pending.epoch.0.to_string(),
            vm_id_fragment: pending.vm_id_fragment.0.clone(),
            accumulated_amount: pending.accumulated_amount.to_string(),
            nonce: pending.nonce.to_string(),
        }),
        Ok(None) => None,
        Err(e) => return error_response(ProtocolError::internal(e.to_string())),
    };

    Json(RecoveryResponse { channel, sub_channel, pending_sub_rav }).into_response()
}

async fn commit<CR, RR, PR, CT, DR, SV, AV, RP>(
    State(state): State<SharedState<CR, RR, PR, CT, DR, SV, AV, RP>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<CommitRequest>,
) -> Response
where
    CR: ChannelRepository + Send + Sync,
    RR: RAVRepository + Send + Sync,
    PR: PendingSubRAVRepository + Send + Sync,
    CT: PaymentChannelContract + HubBalanceProvider + Send + Sync,
    DR: DidResolver + Send + Sync,
    SV: SignatureVerifier + Send + Sync,
    AV: DidAuthVerifier + Send + Sync,
    RP: subrav_billing::RateProvider + Send + Sync + 'static,
{
    let Some(payer_did) = authenticate(&state.auth, &headers, "/nuwa.commit", "POST").await else {
        return error_response(ProtocolError::unauthorized("nuwa.commit requires DID-auth"));
    };

    let signed = match SignedSubRAV::try_from(&body.signed_sub_rav) {
        Ok(signed) => signed,
        Err(e) => return error_response(ProtocolError::bad_request(e.to_string())),
    };

    let verified = match subrav_codec::verify(&signed, &payer_did, &state.resolver, &state.verifier).await {
        Ok(verified) => verified,
        Err(e) => return error_response(ProtocolError::internal(e.to_string())),
    };
    if !verified {
        return error_response(ProtocolError::bad_request("SubRAV signature verification failed"));
    }

    let pending = match state
        .pending_repo
        .find_latest_by_sub_channel(signed.sub_rav.channel_id, signed.sub_rav.vm_id_fragment.clone())
        .await
    {
        Ok(pending) => pending,
        Err(e) => return error_response(ProtocolError::internal(e.to_string())),
    };
    if let Some(pending) = &pending
        && !pending.matches(&signed.sub_rav)
    {
        return error_response(ProtocolError::rav_conflict("committed SubRAV does not match the pending proposal"));
    }

    let sub_channel =
        match state.channel_repo.get_sub_channel_state(signed.sub_rav.channel_id, signed.sub_rav.vm_id_fragment.clone()).await {
            Ok(sub_channel) => sub_channel,
            Err(e) => return error_response(ProtocolError::internal(e.to_string())),
        };

    if let Err(e) = state.rav_repo.save(signed.clone()).await {
        return error_response(ProtocolError::internal(e.to_string()));
    }
    if let Err(e) = state.pending_repo.remove(signed.sub_rav.channel_id, signed.sub_rav.vm_id_fragment.clone()).await {
        return error_response(ProtocolError::internal(e.to_string()));
    }

    if let Some(sub_channel) = sub_channel {
        let delta = if signed.sub_rav.accumulated_amount >= sub_channel.last_claimed_amount {
            signed.sub_rav.accumulated_amount - sub_channel.last_claimed_amount
        } else {
            subrav_types::money::AssetAmount::ZERO
        };
        state.scheduler.maybe_queue(signed.sub_rav.channel_id, signed.sub_rav.vm_id_fragment.clone(), delta).await;
    }

    StatusCode::NO_CONTENT.into_response()
}

async fn admin_status<CR, RR, PR, CT, DR, SV, AV, RP>(
    State(state): State<SharedState<CR, RR, PR, CT, DR, SV, AV, RP>>,
    headers: axum::http::HeaderMap,
) -> Response
where
    CR: ChannelRepository + Send + Sync,
    RR: RAVRepository + Send + Sync,
    PR: Send + Sync,
    CT: PaymentChannelContract + HubBalanceProvider + Send + Sync,
    DR: Send + Sync,
    SV: Send + Sync,
    AV: DidAuthVerifier + Send + Sync,
    RP: subrav_billing::RateProvider + Send + Sync + 'static,
{
    let Some(payer_did) = authenticate(&state.auth, &headers, "/nuwa.admin.status", "GET").await else {
        return error_response(ProtocolError::unauthorized("nuwa.admin.status requires DID-auth"));
    };
    if !state.admins.contains(&payer_did) {
        return error_response(ProtocolError::forbidden("nuwa.admin.status is admin-only"));
    }
    Json(state.scheduler.get_status()).into_response()
}

async fn admin_claim_trigger<CR, RR, PR, CT, DR, SV, AV, RP>(
    State(state): State<SharedState<CR, RR, PR, CT, DR, SV, AV, RP>>,
    headers: axum::http::HeaderMap,
    Json(body): Json<ClaimTriggerRequest>,
) -> Response
where
    CR: ChannelRepository + Send + Sync,
    RR: RAVRepository + Send + Sync,
    PR: Send + Sync,
    CT: PaymentChannelContract + HubBalanceProvider + Send + Sync,
    DR: Send + Sync,
    SV: Send + Sync,
    AV: DidAuthVerifier + Send + Sync,
    RP: subrav_billing::RateProvider + Send + Sync + 'static,
{
    let Some(payer_did) = authenticate(&state.auth, &headers, "/nuwa.admin.claim-trigger", "POST").await else {
        return error_response(ProtocolError::unauthorized("nuwa.admin.claim-trigger requires DID-auth"));
    };
    if !state.admins.contains(&payer_did) {
        return error_response(ProtocolError::forbidden("nuwa.admin.claim-trigger is admin-only"));
    }
    match state.scheduler.trigger_claim(body.channel_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(ProtocolError::internal(e)),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use axum::http::HeaderMap;

    use subrav_billing::{AssetInfo, RateProvider};
    use subrav_codec::{KeyType, VerificationMethod};
    use subrav_contract::testing::MockContract;
    use subrav_payee::SchedulerPolicy;
    use subrav_storage::{InMemoryChannelRepository, InMemoryPendingSubRAVRepository, InMemoryRAVRepository, SubChannelPatch};
    use subrav_types::channel::{ChannelEpoch, ChannelId, ChannelStatus, VmIdFragment};
    use subrav_types::money::PicoUsd;
    use subrav_types::proto::envelope::WireSignedSubRav;
    use subrav_types::subrav::{SignedSubRAV, SubRAV};
    use subrav_types::timestamp::UnixTimestamp;

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

    #[derive(Clone)]
    struct FixedAuth(&'static str);
    impl DidAuthVerifier for FixedAuth {
        type Error = std::convert::Infallible;
        async fn verify(&self, token: &str, _url: &str, _method: &str) -> Result<Option<String>, Self::Error> {
            Ok((token == "good").then(|| self.0.to_string()))
        }
    }

    struct FixedRate;
    impl RateProvider for FixedRate {
        type Error = ProtocolError;
        async fn get_price_pico_usd(&self, _asset_id: &str) -> Result<PicoUsd, Self::Error> {
            Ok(PicoUsd(1_000_000_000_000))
        }
        async fn get_asset_info(&self, asset_id: &str) -> Result<Option<AssetInfo>, Self::Error> {
            Ok(Some(AssetInfo { asset_id: asset_id.to_string(), symbol: "USD".into(), decimals: 0 }))
        }
        async fn get_last_updated(&self, _asset_id: &str) -> Result<Option<UnixTimestamp>, Self::Error> {
            Ok(None)
        }
        async fn clear_cache(&self) {}
    }

    type TestState = NuwaRoutesState<InMemoryChannelRepository, InMemoryRAVRepository, InMemoryPendingSubRAVRepository, MockContract, NullResolver, AlwaysValid, FixedAuth, FixedRate>;

    async fn seeded_state(admins: HashSet<String>) -> (TestState, ChannelId) {
        let channel_repo = InMemoryChannelRepository::new();
        let rav_repo = InMemoryRAVRepository::new();
        let contract = MockContract::new(4);

        let channel_id = ChannelId::from_str(&format!("0x{}", "ef".repeat(32))).unwrap();
        channel_repo
            .set_channel_metadata(subrav_types::channel::ChannelInfo {
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

        let scheduler = ClaimScheduler::spawn(contract, rav_repo.clone(), channel_repo.clone(), FixedRate, SchedulerPolicy::default());
        let state = NuwaRoutesState {
            channel_repo,
            rav_repo,
            pending_repo: InMemoryPendingSubRAVRepository::new(),
            scheduler,
            resolver: NullResolver,
            verifier: AlwaysValid,
            auth: FixedAuth("did:example:payer"),
            admins,
            discovery: DiscoveryInfo {
                version: 1,
                service_id: "test".into(),
                service_did: "did:example:payee".into(),
                network: "test".into(),
                default_asset_id: "0xusdc".into(),
                default_price_pico_usd: None,
                base_path: "/".into(),
            },
        };
        (state, channel_id)
    }

    fn auth_headers(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION_HEADER, token.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn discover_returns_the_configured_info() {
        let (state, _) = seeded_state(HashSet::new()).await;
        let Json(info) = discover(State(Arc::new(state))).await;
        assert_eq!(info.service_did, "did:example:payee");
    }

    #[tokio::test]
    async fn health_is_always_healthy() {
        let Json(body) = health().await;
        assert!(body.healthy);
    }

    #[tokio::test]
    async fn recovery_without_a_token_is_unauthorized() {
        let (state, _) = seeded_state(HashSet::new()).await;
        let response = recovery(State(Arc::new(state)), HeaderMap::new()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn recovery_finds_the_authenticated_payer_channel() {
        let (state, channel_id) = seeded_state(HashSet::new()).await;
        let response = recovery(State(Arc::new(state)), auth_headers("good")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let recovered: RecoveryResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(recovered.channel.channel_id, channel_id);
    }

    #[tokio::test]
    async fn commit_persists_a_valid_signed_sub_rav() {
        let (state, channel_id) = seeded_state(HashSet::new()).await;
        let signed = SignedSubRAV {
            sub_rav: SubRAV {
                version: 1,
                chain_id: 4,
                channel_id,
                channel_epoch: ChannelEpoch(0),
                vm_id_fragment: VmIdFragment::from("k"),
                accumulated_amount: subrav_types::money::AssetAmount::from_u128(100),
                nonce: 1,
            },
            signature: b"valid".to_vec(),
        };
        let state = Arc::new(state);
        let response =
            commit(State(state.clone()), auth_headers("good"), Json(CommitRequest { signed_sub_rav: WireSignedSubRav::from(&signed) })).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(state.rav_repo.get_latest(channel_id, VmIdFragment::from("k")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn recovery_after_commit_reports_the_sub_channel_and_next_proposal() {
        let (state, channel_id) = seeded_state(HashSet::new()).await;
        let signed = SignedSubRAV {
            sub_rav: SubRAV {
                version: 1,
                chain_id: 4,
                channel_id,
                channel_epoch: ChannelEpoch(0),
                vm_id_fragment: VmIdFragment::from("k"),
                accumulated_amount: subrav_types::money::AssetAmount::from_u128(100),
                nonce: 1,
            },
            signature: b"valid".to_vec(),
        };
        let state = Arc::new(state);
        let commit_response =
            commit(State(state.clone()), auth_headers("good"), Json(CommitRequest { signed_sub_rav: WireSignedSubRav::from(&signed) })).await;
        assert_eq!(commit_response.status(), StatusCode::NO_CONTENT);

        let pending = subrav_types::subrav::PendingProposal {
            channel_id,
            vm_id_fragment: VmIdFragment::from("k"),
            nonce: 2,
            accumulated_amount: subrav_types::money::AssetAmount::from_u128(200),
            epoch: ChannelEpoch(0),
            created_at: UnixTimestamp::from_secs(0),
        };
        state.pending_repo.save(pending).await.unwrap();

        let response = recovery(State(state), auth_headers("good")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let recovered: RecoveryResponse = serde_json::from_slice(&body).unwrap();
        let sub_channel = recovered.sub_channel.expect("sub_channel should be populated after a commit");
        assert_eq!(sub_channel.vm_id_fragment, VmIdFragment::from("k"));
        let pending_sub_rav = recovered.pending_sub_rav.expect("pending_sub_rav should be populated");
        assert_eq!(pending_sub_rav.nonce, "2");
    }

    #[tokio::test]
    async fn admin_status_rejects_a_non_admin_payer() {
        let (state, _) = seeded_state(HashSet::new()).await;
        let response = admin_status(State(Arc::new(state)), auth_headers("good")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_status_succeeds_for_an_allow_listed_payer() {
        let (state, _) = seeded_state(HashSet::from(["did:example:payer".to_string()])).await;
        let response = admin_status(State(Arc::new(state)), auth_headers("good")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

