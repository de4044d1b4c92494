//! Steps A (`pre_process`), B (`settle`), and C (`persist`) of the payee
//! payment pipeline (spec §4.4). Grounded on the teacher's
//! `x402_axum::paygate::Paygate` three-phase request handling
//! (`crates/x402-axum/src/paygate.rs`: verify → call inner → settle),
//! generalized here into the deferred-billing handshake this protocol needs:
//! verification and settlement are split across two separate transport calls
//! rather than one request/response cycle.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use subrav_billing::{RateProvider, RequestMeta, RuleMatcher};
use subrav_codec::{DidResolver, SignatureVerifier};
use subrav_contract::PaymentChannelContract;
use subrav_storage::{ChannelRepository, PendingSubRAVRepository, RAVRepository, SubChannelKey, SubChannelPatch};
use subrav_types::billing::{BillingContext, BillingRule, UsageMeta};
use subrav_types::channel::{ChannelId, VmIdFragment};
use subrav_types::error::ProtocolError;
use subrav_types::money::{AssetAmount, PicoUsd, usd_to_asset_ceil};
use subrav_types::subrav::{PendingProposal, SubRAV};
use subrav_types::timestamp::UnixTimestamp;

use crate::scheduler::ClaimNotifier;

/// Static configuration the processor needs beyond its collaborators: the
/// admin DID allow-list `adminOnly` rules check against.
#[derive(Debug, Clone, Default)]
pub struct ProcessorConfig {
    pub admins: HashSet<String>,
}

/// The payee payment processor (spec §4.4). Generic over every collaborator
/// trait so an embedder can mix concrete storage/contract/crypto
/// implementations freely, the same shape as the teacher's
/// `Paygate<TPriceTag, TFacilitator>`.
pub struct PaymentProcessor<CR, RR, PR, CT, RT, DR, SV> {
    channel_repo: CR,
    rav_repo: RR,
    pending_repo: PR,
    contract: CT,
    rate: RT,
    resolver: DR,
    verifier: SV,
    config: ProcessorConfig,
    matcher: RuleMatcher,
    /// Per-sub-channel serialization for steps A→B→C (spec §4.4
    /// "Concurrency", §5): a fair mutex keyed by `(channelId, vmIdFragment)`.
    locks: DashMap<SubChannelKey, Arc<tokio::sync::Mutex<()>>>,
    notifier: Option<Arc<dyn ClaimNotifier>>,
}

impl<CR, RR, PR, CT, RT, DR, SV> PaymentProcessor<CR, RR, PR, CT, RT, DR, SV>
where
    CR: ChannelRepository,
    RR: RAVRepository,
    PR: PendingSubRAVRepository,
    CT: PaymentChannelContract,
    RT: RateProvider,
    DR: DidResolver,
    SV: SignatureVerifier,
{
    pub fn new(
        channel_repo: CR,
        rav_repo: RR,
        pending_repo: PR,
        contract: CT,
        rate: RT,
        resolver: DR,
        verifier: SV,
        config: ProcessorConfig,
    ) -> Self {
        PaymentProcessor {
            channel_repo,
            rav_repo,
            pending_repo,
            contract,
            rate,
            resolver,
            verifier,
            config,
            matcher: RuleMatcher::new(),
            locks: DashMap::new(),
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ClaimNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Acquires the per-sub-channel lock for the duration of steps A-C. Must
    /// be held by the caller across all three calls for one request (spec
    /// §4.4 "Concurrency", §5).
    pub async fn lock(&self, channel_id: ChannelId, vm_id_fragment: VmIdFragment) -> tokio::sync::OwnedMutexGuard<()> {
        let key = SubChannelKey::new(channel_id, vm_id_fragment);
        let mutex = self.locks.entry(key).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone();
        mutex.lock_owned().await
    }

    /// Step A (spec §4.4). Matches the rule, resolves channel/sub-channel
    /// identity, verifies any submitted `signedSubRav`, and enforces budget
    /// and auth constraints. Protocol-level rejections are recorded into
    /// `ctx.state.error` and this returns `Ok(())`; only infrastructure
    /// failures (a repository or contract call itself erroring) are
    /// propagated as `Err`.
    pub async fn pre_process(
        &self,
        ctx: &mut BillingContext,
        rules: &[BillingRule],
        request: &RequestMeta,
        host_channel_id: Option<ChannelId>,
    ) -> Result<(), ProtocolError> {
        let Some(rule) = self.matcher.match_rule(rules, request).cloned() else {
            ctx.rule = None;
            return Ok(());
        };
        ctx.rule = Some(rule.clone());

        let channel_id = ctx
            .signed_sub_rav
            .as_ref()
            .map(|s| s.sub_rav.channel_id)
            .or(ctx.channel_id)
            .or(host_channel_id);
        let Some(channel_id) = channel_id else {
            ctx.state.error = Some(ProtocolError::bad_request("no channel identity in request or host mapping"));
            return Ok(());
        };
        ctx.channel_id = Some(channel_id);

        let Some(channel_info) =
            self.channel_repo.get_channel_metadata(channel_id).await.map_err(|e| ProtocolError::internal(e.to_string()))?
        else {
            ctx.state.error = Some(ProtocolError::not_found("channel not found"));
            return Ok(());
        };
        if channel_info.status != subrav_types::channel::ChannelStatus::Active {
            ctx.state.error = Some(ProtocolError::bad_request("channel is not active"));
            ctx.state.channel_info = Some(channel_info);
            return Ok(());
        }
        if let Some(signed) = &ctx.signed_sub_rav
            && signed.sub_rav.chain_id != channel_info.chain_id
        {
            ctx.state.error = Some(ProtocolError::bad_request("chainId does not match channel"));
            ctx.state.channel_info = Some(channel_info);
            return Ok(());
        }
        if let Some(signed) = &ctx.signed_sub_rav
            && signed.sub_rav.channel_epoch != channel_info.epoch
        {
            ctx.state.error = Some(ProtocolError::bad_request("channelEpoch does not match channel"));
            ctx.state.channel_info = Some(channel_info);
            return Ok(());
        }
        if ctx.payer_did.is_none() {
            ctx.payer_did = Some(channel_info.payer_did.clone());
        }
        ctx.channel_epoch = Some(channel_info.epoch);
        ctx.state.channel_info = Some(channel_info.clone());

        let vm_id_fragment = ctx.signed_sub_rav.as_ref().map(|s| s.sub_rav.vm_id_fragment.clone()).or(ctx.vm_id_fragment.clone());
        let Some(vm_id_fragment) = vm_id_fragment else {
            ctx.state.error = Some(ProtocolError::bad_request("no vmIdFragment in request"));
            return Ok(());
        };
        ctx.vm_id_fragment = Some(vm_id_fragment.clone());

        let Some(sub_channel) = self
            .channel_repo
            .get_sub_channel_state(channel_id, vm_id_fragment.clone())
            .await
            .map_err(|e| ProtocolError::internal(e.to_string()))?
        else {
            ctx.state.error = Some(ProtocolError::not_found("sub-channel is not authorized"));
            return Ok(());
        };
        ctx.state.sub_channel_state = Some(sub_channel);

        let pending = self
            .pending_repo
            .find_latest_by_sub_channel(channel_id, vm_id_fragment.clone())
            .await
            .map_err(|e| ProtocolError::internal(e.to_string()))?;

        if rule.payment_required && pending.is_some() && ctx.signed_sub_rav.is_none() {
            ctx.state.pending_proposal = pending;
            ctx.state.error = Some(ProtocolError::payment_required("sign the pending proposal and retry"));
            return Ok(());
        }

        if let (Some(p), Some(signed)) = (&pending, &ctx.signed_sub_rav)
            && !p.matches(&signed.sub_rav)
        {
            ctx.state.pending_proposal = pending.clone();
            self.pending_repo
                .remove(channel_id, vm_id_fragment.clone())
                .await
                .map_err(|e| ProtocolError::internal(e.to_string()))?;
            ctx.state.error = Some(ProtocolError::rav_conflict("submitted SubRAV does not match the pending proposal"));
            return Ok(());
        }

        if let Some(signed) = &ctx.signed_sub_rav {
            if !signed.sub_rav.is_handshake() {
                let latest = self
                    .rav_repo
                    .get_latest(channel_id, vm_id_fragment.clone())
                    .await
                    .map_err(|e| ProtocolError::internal(e.to_string()))?;
                if let Some(latest) = &latest
                    && signed.sub_rav.nonce <= latest.sub_rav.nonce
                {
                    ctx.state.error = Some(ProtocolError::bad_request("nonce does not advance the stored SubRAV"));
                    return Ok(());
                }
            }

            let payer_did = ctx.payer_did.clone().expect("payer_did was set above");
            let verified = subrav_codec::verify(signed, &payer_did, &self.resolver, &self.verifier)
                .await
                .map_err(|e| ProtocolError::internal(e.to_string()))?;
            if !verified {
                ctx.state.error = Some(ProtocolError::bad_request("SubRAV signature verification failed"));
                return Ok(());
            }
            ctx.state.verified = true;
        }

        if rule.auth_required && !ctx.did_auth {
            ctx.state.error = Some(ProtocolError::unauthorized("this operation requires DID-auth"));
            return Ok(());
        }
        if rule.admin_only && !(ctx.did_auth && ctx.payer_did.as_deref().is_some_and(|did| self.config.admins.contains(did))) {
            ctx.state.error = Some(ProtocolError::forbidden("this operation is admin-only"));
            return Ok(());
        }

        if !rule.strategy.is_deferred() {
            let tentative_usd = subrav_billing::evaluate(&rule.strategy, &ctx.state.usage);
            if let Some(max_amount) = ctx.max_amount {
                let tentative_asset = self.convert_to_asset(&ctx.asset_id, tentative_usd).await?;
                if let Some(tentative_asset) = tentative_asset
                    && tentative_asset > max_amount
                {
                    ctx.state.error = Some(ProtocolError::bad_request("tentative cost exceeds maxAmount"));
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    /// Step B (spec §4.4). Computes the final cost from `usage`, builds the
    /// next unsigned proposal, and records it on `ctx.state` for the
    /// transport adapter to encode into the response envelope.
    pub async fn settle(&self, ctx: &mut BillingContext, usage: UsageMeta) -> Result<(), ProtocolError> {
        ctx.state.usage = usage;
        let rule = ctx.rule.clone().expect("settle called without a matched rule from pre_process");
        let channel_id = ctx.channel_id.expect("settle called without channel identity from pre_process");
        let vm_id_fragment = ctx.vm_id_fragment.clone().expect("settle called without vmIdFragment from pre_process");
        let epoch = ctx.channel_epoch.expect("settle called without channelEpoch from pre_process");

        let base = match &ctx.signed_sub_rav {
            Some(signed) => signed.sub_rav.clone(),
            None => self
                .rav_repo
                .get_latest(channel_id, vm_id_fragment.clone())
                .await
                .map_err(|e| ProtocolError::internal(e.to_string()))?
                .map(|s| s.sub_rav)
                .unwrap_or_else(|| SubRAV::handshake(ctx.state.channel_info.as_ref().map(|c| c.chain_id).unwrap_or_default(), channel_id, epoch, vm_id_fragment.clone())),
        };

        let is_liveness_only = ctx.signed_sub_rav.as_ref().is_some_and(|s| s.sub_rav.is_handshake());
        let cost_usd = if is_liveness_only { PicoUsd::ZERO } else { subrav_billing::evaluate(&rule.strategy, &ctx.state.usage) };
        let cost_asset = if cost_usd == PicoUsd::ZERO {
            AssetAmount::ZERO
        } else {
            self.convert_to_asset(&ctx.asset_id, cost_usd)
                .await?
                .ok_or_else(|| ProtocolError::service_unavailable("rate provider returned a zero price"))?
        };

        let next = base.next(cost_asset);
        ctx.state.cost = Some(cost_asset);
        ctx.state.cost_usd = Some(cost_usd);
        ctx.state.unsigned_sub_rav = Some(next.clone());
        ctx.state.pending_proposal = Some(PendingProposal::from_sub_rav(&next, UnixTimestamp::now()));
        Ok(())
    }

    /// Best-effort settlement run when the business handler failed after
    /// `pre_process` succeeded (spec §4.7: "any exception after preProcess
    /// succeeded still requires a best-effort settle with cost 0 and no
    /// proposal emission"). The prior pending proposal is left untouched.
    pub fn settle_after_handler_failure(&self, ctx: &mut BillingContext) {
        ctx.state.cost = Some(AssetAmount::ZERO);
        ctx.state.cost_usd = Some(PicoUsd::ZERO);
        ctx.state.unsigned_sub_rav = None;
    }

    /// Step C (spec §4.4). Persists the previously-submitted signed SubRAV,
    /// overwrites the pending proposal with the one `settle` emitted, and
    /// notifies the claim scheduler of the claimable delta. Ordering matches
    /// spec §5's transaction discipline: signed RAV first, then pending,
    /// then the scheduler notification.
    pub async fn persist(&self, ctx: &BillingContext) -> Result<(), ProtocolError> {
        if let Some(signed) = ctx.signed_sub_rav.clone() {
            self.rav_repo.save(signed).await.map_err(|e| ProtocolError::internal(e.to_string()))?;
        }
        if let Some(pending) = &ctx.state.pending_proposal
            && ctx.state.unsigned_sub_rav.is_some()
        {
            self.pending_repo.save(pending.clone()).await.map_err(|e| ProtocolError::internal(e.to_string()))?;
        }

        if let (Some(signed), Some(sub_channel)) = (&ctx.signed_sub_rav, &ctx.state.sub_channel_state) {
            let delta = if signed.sub_rav.accumulated_amount >= sub_channel.last_claimed_amount {
                signed.sub_rav.accumulated_amount - sub_channel.last_claimed_amount
            } else {
                AssetAmount::ZERO
            };
            if let Some(notifier) = &self.notifier {
                notifier.notify(signed.sub_rav.channel_id, signed.sub_rav.vm_id_fragment.clone(), delta);
            }
        }
        Ok(())
    }

    async fn convert_to_asset(&self, asset_id: &str, cost_usd: PicoUsd) -> Result<Option<AssetAmount>, ProtocolError> {
        let price = self.rate.get_price_pico_usd(asset_id).await.map_err(|e| ProtocolError::service_unavailable(e.to_string()))?;
        let info = self
            .rate
            .get_asset_info(asset_id)
            .await
            .map_err(|e| ProtocolError::service_unavailable(e.to_string()))?
            .ok_or_else(|| ProtocolError::service_unavailable("asset info unavailable"))?;
        Ok(usd_to_asset_ceil(cost_usd, price, info.decimals))
    }

    pub fn channel_repo(&self) -> &CR {
        &self.channel_repo
    }

    pub fn contract(&self) -> &CT {
        &self.contract
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use subrav_billing::AssetInfo;
    use subrav_codec::{KeyType, VerificationMethod};
    use subrav_contract::testing::MockContract;
    use subrav_storage::{InMemoryChannelRepository, InMemoryPendingSubRAVRepository, InMemoryRAVRepository};
    use subrav_types::billing::{RuleMatch, StrategyConfig};
    use subrav_types::channel::{ChannelEpoch, ChannelId, ChannelInfo, ChannelStatus};
    use subrav_types::subrav::{SignedSubRAV, SubRAV};

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
        async fn get_last_updated(&self, _asset_id: &str) -> Result<Option<UnixTimestamp>, Self::Error> {
            Ok(None)
        }
        async fn clear_cache(&self) {}
    }

    fn per_request_rule() -> BillingRule {
        BillingRule {
            id: "r1".into(),
            when: Some(RuleMatch { path: Some("/chat".into()), ..Default::default() }),
            default: false,
            strategy: StrategyConfig::PerRequest { price_pico_usd: PicoUsd(1_000_000_000) },
            auth_required: false,
            admin_only: false,
            payment_required: false,
        }
    }

    async fn seeded_processor() -> (
        PaymentProcessor<InMemoryChannelRepository, InMemoryRAVRepository, InMemoryPendingSubRAVRepository, MockContract, FixedRate, NullResolver, AlwaysValid>,
        ChannelId,
    ) {
        let channel_repo = InMemoryChannelRepository::new();
        let rav_repo = InMemoryRAVRepository::new();
        let pending_repo = InMemoryPendingSubRAVRepository::new();
        let contract = MockContract::new(4);

        let channel_id = ChannelId::from_str(&format!("0x{}", "ab".repeat(32))).unwrap();
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
        channel_repo
            .update_sub_channel_state(channel_id, VmIdFragment::from("k"), SubChannelPatch::default())
            .await
            .unwrap();

        let processor = PaymentProcessor::new(
            channel_repo,
            rav_repo,
            pending_repo,
            contract,
            FixedRate,
            NullResolver,
            AlwaysValid,
            ProcessorConfig::default(),
        );
        (processor, channel_id)
    }

    #[tokio::test]
    async fn handshake_submission_is_verified_but_not_charged() {
        let (processor, channel_id) = seeded_processor().await;
        let rules = vec![per_request_rule()];
        let request = RequestMeta { path: "/chat".into(), method: "POST".into(), extra: Default::default() };

        let mut ctx = BillingContext::new("svc", "0xusdc", "tx-1");
        ctx.signed_sub_rav = Some(SignedSubRAV {
            sub_rav: SubRAV::handshake(4, channel_id, ChannelEpoch(0), VmIdFragment::from("k")),
            signature: b"valid".to_vec(),
        });

        processor.pre_process(&mut ctx, &rules, &request, None).await.unwrap();
        assert!(ctx.state.error.is_none(), "{:?}", ctx.state.error);
        assert!(ctx.state.verified);

        processor.settle(&mut ctx, UsageMeta::default()).await.unwrap();
        assert_eq!(ctx.state.cost, Some(AssetAmount::ZERO));
        let next = ctx.state.unsigned_sub_rav.as_ref().unwrap();
        assert_eq!(next.nonce, 1);
        assert_eq!(next.accumulated_amount, AssetAmount::ZERO);
    }

    #[tokio::test]
    async fn per_request_billable_call_computes_cost_and_advances_nonce() {
        let (processor, channel_id) = seeded_processor().await;
        let rules = vec![per_request_rule()];
        let request = RequestMeta { path: "/chat".into(), method: "POST".into(), extra: Default::default() };

        let mut ctx = BillingContext::new("svc", "0xusdc", "tx-2");
        ctx.channel_id = Some(channel_id);
        ctx.vm_id_fragment = Some(VmIdFragment::from("k"));
        ctx.payer_did = Some("did:example:payer".into());

        processor.pre_process(&mut ctx, &rules, &request, None).await.unwrap();
        assert!(ctx.state.error.is_none(), "{:?}", ctx.state.error);

        processor.settle(&mut ctx, UsageMeta::default()).await.unwrap();
        // PerRequest price 10^9 pUSD at price 10^12 pUSD/unit, 8 decimals -> 100_000 (spec scenario 1).
        assert_eq!(ctx.state.cost, Some(AssetAmount::from_u128(100_000)));
        assert_eq!(ctx.state.unsigned_sub_rav.as_ref().unwrap().nonce, 1);

        processor.persist(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn tampered_accumulated_amount_is_rejected_as_conflict() {
        let (processor, channel_id) = seeded_processor().await;
        let rules = vec![per_request_rule()];
        let request = RequestMeta { path: "/chat".into(), method: "POST".into(), extra: Default::default() };

        processor
            .pending_repo
            .save(PendingProposal {
                channel_id,
                vm_id_fragment: VmIdFragment::from("k"),
                nonce: 1,
                accumulated_amount: AssetAmount::from_u128(100_000),
                epoch: ChannelEpoch(0),
                created_at: UnixTimestamp::from_secs(0),
            })
            .await
            .unwrap();

        let mut ctx = BillingContext::new("svc", "0xusdc", "tx-3");
        ctx.payer_did = Some("did:example:payer".into());
        ctx.signed_sub_rav = Some(SignedSubRAV {
            sub_rav: SubRAV {
                version: 1,
                chain_id: 4,
                channel_id,
                channel_epoch: ChannelEpoch(0),
                vm_id_fragment: VmIdFragment::from("k"),
                accumulated_amount: AssetAmount::from_u128(999_999),
                nonce: 1,
            },
            signature: b"valid".to_vec(),
        });

        processor.pre_process(&mut ctx, &rules, &request, None).await.unwrap();
        assert!(matches!(ctx.state.error.as_ref().map(|e| e.kind()), Some(subrav_types::error::ErrorKind::RavConflict)));
        assert!(processor.pending_repo.find_latest_by_sub_channel(channel_id, VmIdFragment::from("k")).await.unwrap().is_none());
    }
}
