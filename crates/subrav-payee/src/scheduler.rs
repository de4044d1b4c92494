//! The reactive claim scheduler (spec §4.5): one FIFO per sub-channel, a
//! global concurrency cap, and a cooperative background worker. Shutdown
//! discipline is grounded on the teacher's `SigDown`
//! (`src/sig_down.rs`): a `CancellationToken` the worker selects on
//! alongside its own wake conditions, paired with a `TaskTracker` so
//! `destroy` can close the task set without blocking on in-flight work.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use subrav_billing::RateProvider;
use subrav_contract::{ChannelReceipt, ClaimReceipt, PaymentChannelContract, SubChannelAuthorization};
use subrav_contract::hub_balance::HubBalanceProvider;
use subrav_storage::{ChannelRepository, RAVRepository, SubChannelPatch};
use subrav_types::channel::{ChannelId, VmIdFragment};
use subrav_types::money::{AssetAmount, PicoUsd, asset_to_usd_floor};
use tokio::sync::{Notify, Semaphore};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use subrav_types::proto::builtin::{SchedulerPolicySnapshot, SchedulerStatus};

/// A synchronous sink the payee pipeline notifies after Step C persists a
/// signed SubRAV (spec §4.4 step C, §4.5 `maybeQueue`). Plain (non-async)
/// so `PaymentProcessor` can hold it as `Arc<dyn ClaimNotifier>` — `async
/// fn` traits aren't dyn-compatible, and `maybeQueue`'s own work never
/// crosses an await point.
pub trait ClaimNotifier: Send + Sync {
    fn notify(&self, channel_id: ChannelId, vm_id_fragment: VmIdFragment, delta: AssetAmount);
}

/// Configurable scheduler policy (spec §4.5).
#[derive(Debug, Clone)]
pub struct SchedulerPolicy {
    pub min_claim_amount: PicoUsd,
    pub max_concurrent_claims: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub insufficient_funds_backoff_ms: u64,
    pub require_hub_balance: bool,
    pub count_insufficient_as_failure: bool,
    /// How often the worker loop wakes on its own, independent of
    /// `Notify`, to check for expired retry/backoff timers.
    pub poll_interval_ms: u64,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        SchedulerPolicy {
            min_claim_amount: PicoUsd::ZERO,
            max_concurrent_claims: 8,
            max_retries: 5,
            retry_delay_ms: 1_000,
            insufficient_funds_backoff_ms: 30_000,
            require_hub_balance: false,
            count_insufficient_as_failure: false,
            poll_interval_ms: 500,
        }
    }
}

impl SchedulerPolicy {
    fn snapshot(&self) -> SchedulerPolicySnapshot {
        SchedulerPolicySnapshot {
            min_claim_amount: self.min_claim_amount,
            max_concurrent_claims: self.max_concurrent_claims,
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay_ms,
            insufficient_funds_backoff_ms: self.insufficient_funds_backoff_ms,
            require_hub_balance: self.require_hub_balance,
            count_insufficient_as_failure: self.count_insufficient_as_failure,
        }
    }
}

type SubChannelKey = (ChannelId, VmIdFragment);

#[derive(Debug, Clone)]
struct ClaimTask {
    delta: AssetAmount,
    attempts: u32,
    ready_at: Instant,
    in_flight: bool,
}

#[derive(Default)]
struct SchedulerStats {
    success_count: AtomicU64,
    failed_count: AtomicU64,
    skipped_count: AtomicU64,
    insufficient_funds_count: AtomicU64,
    backoff_count: AtomicU64,
    processing_time_sum_ms: AtomicU64,
    processing_time_samples: AtomicU64,
}

impl SchedulerStats {
    fn record_processing_time(&self, elapsed: Duration) {
        self.processing_time_sum_ms.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.processing_time_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn avg_processing_time_ms(&self) -> f64 {
        let samples = self.processing_time_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0.0;
        }
        self.processing_time_sum_ms.load(Ordering::Relaxed) as f64 / samples as f64
    }
}

/// Adapts a contract with no real hub-balance integration so it can still
/// satisfy [`ClaimScheduler`]'s bound: reports an always-sufficient balance,
/// which is only ever consulted when `require_hub_balance` is `false`
/// anyway.
pub struct NoHubBalanceGate<CT>(pub CT);

impl<CT: PaymentChannelContract + Sync> PaymentChannelContract for NoHubBalanceGate<CT> {
    type Error = CT::Error;

    fn open_channel(
        &self,
        payer_did: &str,
        payee_did: &str,
        asset_id: &str,
    ) -> impl Future<Output = Result<ChannelReceipt, Self::Error>> + Send {
        self.0.open_channel(payer_did, payee_did, asset_id)
    }

    fn open_channel_with_sub_channel(
        &self,
        payer_did: &str,
        payee_did: &str,
        asset_id: &str,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<(ChannelReceipt, SubChannelAuthorization), Self::Error>> + Send {
        self.0.open_channel_with_sub_channel(payer_did, payee_did, asset_id, vm_id_fragment)
    }

    fn authorize_sub_channel(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<SubChannelAuthorization, Self::Error>> + Send {
        self.0.authorize_sub_channel(channel_id, vm_id_fragment)
    }

    fn close_channel(&self, channel_id: ChannelId) -> impl Future<Output = Result<ChannelReceipt, Self::Error>> + Send {
        self.0.close_channel(channel_id)
    }

    fn claim_from_channel(
        &self,
        signed: &subrav_types::subrav::SignedSubRAV,
    ) -> impl Future<Output = Result<ClaimReceipt, Self::Error>> + Send {
        self.0.claim_from_channel(signed)
    }

    fn get_channel_status(
        &self,
        channel_id: ChannelId,
    ) -> impl Future<Output = Result<Option<subrav_types::channel::ChannelInfo>, Self::Error>> + Send {
        self.0.get_channel_status(channel_id)
    }

    fn get_sub_channel(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<Option<subrav_types::channel::SubChannelInfo>, Self::Error>> + Send {
        self.0.get_sub_channel(channel_id, vm_id_fragment)
    }

    fn get_chain_id(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send {
        self.0.get_chain_id()
    }

    fn get_asset_info(
        &self,
        asset_id: &str,
    ) -> impl Future<Output = Result<Option<subrav_billing::AssetInfo>, Self::Error>> + Send {
        self.0.get_asset_info(asset_id)
    }

    fn get_asset_price(&self, asset_id: &str) -> impl Future<Output = Result<subrav_types::money::PicoUsd, Self::Error>> + Send {
        self.0.get_asset_price(asset_id)
    }
}

impl<CT: Send + Sync> HubBalanceProvider for NoHubBalanceGate<CT> {
    type Error = std::convert::Infallible;

    async fn get_hub_balance(&self, _asset_id: &str) -> Result<AssetAmount, Self::Error> {
        Ok(AssetAmount::from_u128(u128::MAX))
    }
}

/// The reactive claim scheduler (spec §4.5). One task per `(channelId,
/// vmIdFragment)`; a worker loop dispatches ready tasks up to
/// `maxConcurrentClaims` concurrently.
pub struct ClaimScheduler<CT, RR, CR, RP> {
    contract: CT,
    rav_repo: RR,
    channel_repo: CR,
    rate: RP,
    policy: SchedulerPolicy,
    tasks: DashMap<SubChannelKey, ClaimTask>,
    stats: SchedulerStats,
    cancel: CancellationToken,
    tracker: TaskTracker,
    wake: Arc<Notify>,
    permits: Arc<Semaphore>,
    self_ref: Weak<Self>,
}

impl<CT, RR, CR, RP> ClaimScheduler<CT, RR, CR, RP>
where
    CT: PaymentChannelContract + HubBalanceProvider + Send + Sync + 'static,
    RR: RAVRepository + Send + Sync + 'static,
    CR: ChannelRepository + Send + Sync + 'static,
    RP: RateProvider + Send + Sync + 'static,
{
    /// Builds the scheduler and spawns its worker loop. The returned `Arc`
    /// is what `maybe_queue`/`notify` callers and `destroy` share.
    pub fn spawn(contract: CT, rav_repo: RR, channel_repo: CR, rate: RP, policy: SchedulerPolicy) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(policy.max_concurrent_claims.max(1) as usize));
        let scheduler = Arc::new_cyclic(|self_ref| ClaimScheduler {
            contract,
            rav_repo,
            channel_repo,
            rate,
            policy,
            tasks: DashMap::new(),
            stats: SchedulerStats::default(),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            wake: Arc::new(Notify::new()),
            permits,
            self_ref: self_ref.clone(),
        });

        let worker = scheduler.clone();
        scheduler.tracker.spawn(async move { worker.run().await });
        scheduler.tracker.close();
        scheduler
    }

    /// Converts `delta` (asset units) into picoUSD via the channel's asset
    /// and the rate provider's current price (spec §4.5 scenario 4), so it
    /// can be compared against the picoUSD-denominated `minClaimAmount`.
    /// Unpriceable deltas (unknown channel, rate lookup failure) convert to
    /// zero, the conservative choice — they are skipped rather than risking
    /// an early claim.
    async fn delta_pico_usd(&self, channel_id: ChannelId, delta: AssetAmount) -> PicoUsd {
        let Ok(Some(info)) = self.channel_repo.get_channel_metadata(channel_id).await else {
            return PicoUsd::ZERO;
        };
        let Ok(price) = self.rate.get_price_pico_usd(&info.asset_id).await else {
            return PicoUsd::ZERO;
        };
        let Ok(Some(asset_info)) = self.rate.get_asset_info(&info.asset_id).await else {
            return PicoUsd::ZERO;
        };
        asset_to_usd_floor(delta, price, asset_info.decimals).unwrap_or(PicoUsd::ZERO)
    }

    /// Enqueues or raises the claimable delta for one sub-channel (spec
    /// §4.5 `maybeQueue`). A no-op below `minClaimAmount`; an existing task
    /// for the same key has its delta raised to the maximum rather than
    /// being duplicated. New keys beyond `maxConcurrentClaims` distinct
    /// queued tasks are rejected until a slot frees — the same cap also
    /// bounds concurrent in-flight submissions (a documented
    /// simplification: spec §4.5 only states the cap for in-flight claims,
    /// this reuses it as the total-queued-tasks bound too).
    pub async fn maybe_queue(&self, channel_id: ChannelId, vm_id_fragment: VmIdFragment, delta: AssetAmount) {
        if self.delta_pico_usd(channel_id, delta).await < self.policy.min_claim_amount {
            self.stats.skipped_count.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let key = (channel_id, vm_id_fragment);
        let mut woke = false;
        match self.tasks.entry(key) {
            Entry::Occupied(mut entry) => {
                if delta > entry.get().delta {
                    entry.get_mut().delta = delta;
                }
            }
            Entry::Vacant(entry) => {
                if self.tasks.len() as u32 >= self.policy.max_concurrent_claims {
                    let (channel_id, vm_id_fragment) = entry.key().clone();
                    tracing::warn!(%channel_id, %vm_id_fragment, "claim queue is at capacity, dropping");
                    return;
                }
                entry.insert(ClaimTask { delta, attempts: 0, ready_at: Instant::now(), in_flight: false });
                woke = true;
            }
        }
        if woke {
            self.wake.notify_one();
        }
    }

    /// Forces an immediate claim of every sub-channel in `channel_id` with
    /// an unclaimed signed RAV, ignoring `minClaimAmount` (spec §4.5
    /// `triggerClaim`).
    pub async fn trigger_claim(&self, channel_id: ChannelId) -> Result<(), String> {
        let unclaimed = self.rav_repo.get_unclaimed(channel_id).await.map_err(|e| e.to_string())?;
        for vm_id_fragment in unclaimed.into_keys() {
            self.submit_claim(channel_id, vm_id_fragment).await;
        }
        Ok(())
    }

    /// A snapshot of the scheduler's counters and policy (spec §4.5
    /// `getStatus`).
    pub fn get_status(&self) -> SchedulerStatus {
        let active = self.tasks.iter().filter(|e| e.in_flight).count() as u32;
        let queued = self.tasks.len() as u32 - active;
        SchedulerStatus {
            active,
            queued,
            success_count: self.stats.success_count.load(Ordering::Relaxed),
            failed_count: self.stats.failed_count.load(Ordering::Relaxed),
            skipped_count: self.stats.skipped_count.load(Ordering::Relaxed),
            insufficient_funds_count: self.stats.insufficient_funds_count.load(Ordering::Relaxed),
            backoff_count: self.stats.backoff_count.load(Ordering::Relaxed),
            avg_processing_time_ms: self.stats.avg_processing_time_ms(),
            policy: self.policy.snapshot(),
        }
    }

    /// Drains the worker loop's scheduled wake-ups. In-flight claim
    /// submissions are not cancelled (spec §4.5 `destroy`, §5 cancellation
    /// model) — this returns as soon as the loop observes cancellation, it
    /// does not wait for them.
    pub fn destroy(&self) {
        self.cancel.cancel();
        self.tracker.close();
    }

    async fn run(self: Arc<Self>) {
        let poll_interval = Duration::from_millis(self.policy.poll_interval_ms);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("claim scheduler worker loop shutting down");
                    return;
                }
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(poll_interval) => {}
            }
            self.dispatch_ready().await;
        }
    }

    async fn dispatch_ready(self: &Arc<Self>) {
        let now = Instant::now();
        let ready: Vec<SubChannelKey> = self
            .tasks
            .iter()
            .filter(|entry| !entry.in_flight && entry.ready_at <= now)
            .map(|entry| entry.key().clone())
            .collect();

        for key in ready {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else { continue };
            if let Some(mut entry) = self.tasks.get_mut(&key) {
                entry.in_flight = true;
            } else {
                continue;
            }
            let scheduler = self.clone();
            self.tracker.spawn(async move {
                let _permit = permit;
                scheduler.process_claim(key.0, key.1).await;
            });
        }
    }

    async fn process_claim(&self, channel_id: ChannelId, vm_id_fragment: VmIdFragment) {
        let started = Instant::now();
        let outcome = self.try_claim(channel_id, vm_id_fragment.clone()).await;
        self.stats.record_processing_time(started.elapsed());

        let key = (channel_id, vm_id_fragment);
        match outcome {
            ClaimOutcome::Success => {
                self.stats.success_count.fetch_add(1, Ordering::Relaxed);
                self.tasks.remove(&key);
            }
            ClaimOutcome::InsufficientFunds => {
                self.stats.insufficient_funds_count.fetch_add(1, Ordering::Relaxed);
                if self.policy.count_insufficient_as_failure {
                    self.fail_or_drop(key);
                } else {
                    self.stats.backoff_count.fetch_add(1, Ordering::Relaxed);
                    if let Some(mut entry) = self.tasks.get_mut(&key) {
                        entry.in_flight = false;
                        entry.ready_at = Instant::now() + Duration::from_millis(self.policy.insufficient_funds_backoff_ms);
                    }
                }
            }
            ClaimOutcome::Failed => self.fail_or_drop(key),
        }
    }

    fn fail_or_drop(&self, key: SubChannelKey) {
        let Some(mut entry) = self.tasks.get_mut(&key) else { return };
        entry.attempts += 1;
        if entry.attempts >= self.policy.max_retries {
            drop(entry);
            self.tasks.remove(&key);
            self.stats.failed_count.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(channel_id = %key.0, vm_id_fragment = %key.1, "claim dropped after exhausting retries");
        } else {
            let attempts = entry.attempts;
            entry.in_flight = false;
            entry.ready_at = Instant::now() + Duration::from_millis(self.policy.retry_delay_ms * attempts as u64);
        }
    }

    async fn try_claim(&self, channel_id: ChannelId, vm_id_fragment: VmIdFragment) -> ClaimOutcome {
        let Ok(Some(signed)) = self.rav_repo.get_latest(channel_id, vm_id_fragment.clone()).await else {
            return ClaimOutcome::Failed;
        };

        if self.policy.require_hub_balance {
            let info = self.channel_repo.get_channel_metadata(channel_id).await;
            if let Ok(Some(channel_info)) = info {
                match self.contract.get_hub_balance(&channel_info.asset_id).await {
                    Ok(balance) if balance < signed.sub_rav.accumulated_amount => return ClaimOutcome::InsufficientFunds,
                    Err(_) => return ClaimOutcome::Failed,
                    _ => {}
                }
            }
        }

        match self.contract.claim_from_channel(&signed).await {
            Ok(_receipt) => {
                let _ = self.rav_repo.mark_as_claimed(channel_id, vm_id_fragment.clone(), signed.sub_rav.nonce).await;
                let _ = self
                    .channel_repo
                    .update_sub_channel_state(
                        channel_id,
                        vm_id_fragment,
                        SubChannelPatch {
                            last_claimed_amount: Some(signed.sub_rav.accumulated_amount),
                            last_confirmed_nonce: Some(signed.sub_rav.nonce),
                            last_updated: Some(subrav_types::timestamp::UnixTimestamp::now()),
                        },
                    )
                    .await;
                ClaimOutcome::Success
            }
            Err(_) => ClaimOutcome::Failed,
        }
    }

    async fn submit_claim(&self, channel_id: ChannelId, vm_id_fragment: VmIdFragment) {
        match self.try_claim(channel_id, vm_id_fragment).await {
            ClaimOutcome::Success => {
                self.stats.success_count.fetch_add(1, Ordering::Relaxed);
            }
            ClaimOutcome::InsufficientFunds => {
                self.stats.insufficient_funds_count.fetch_add(1, Ordering::Relaxed);
            }
            ClaimOutcome::Failed => {
                self.stats.failed_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

impl<CT, RR, CR, RP> ClaimNotifier for ClaimScheduler<CT, RR, CR, RP>
where
    CT: PaymentChannelContract + HubBalanceProvider + Send + Sync + 'static,
    RR: RAVRepository + Send + Sync + 'static,
    CR: ChannelRepository + Send + Sync + 'static,
    RP: RateProvider + Send + Sync + 'static,
{
    /// `maybeQueue` itself needs channel/rate lookups, so `notify` (kept
    /// synchronous so `PaymentProcessor` can hold `Arc<dyn ClaimNotifier>`)
    /// hands the conversion off to a tracked background task.
    fn notify(&self, channel_id: ChannelId, vm_id_fragment: VmIdFragment, delta: AssetAmount) {
        let Some(scheduler) = self.self_ref.upgrade() else { return };
        self.tracker.spawn(async move {
            scheduler.maybe_queue(channel_id, vm_id_fragment, delta).await;
        });
    }
}

enum ClaimOutcome {
    Success,
    InsufficientFunds,
    Failed,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use subrav_billing::AssetInfo;
    use subrav_contract::testing::MockContract;
    use subrav_storage::{InMemoryChannelRepository, InMemoryRAVRepository};
    use subrav_types::channel::{ChannelEpoch, ChannelId, ChannelInfo, ChannelStatus};
    use subrav_types::error::ProtocolError;
    use subrav_types::subrav::{SignedSubRAV, SubRAV};
    use subrav_types::timestamp::UnixTimestamp;

    use super::*;

    fn sample_channel() -> ChannelId {
        ChannelId::from_str(&format!("0x{}", "99".repeat(32))).unwrap()
    }

    /// Price `10^12` pUSD per asset unit (decimals 0), matching the scenario-4
    /// worked example's numbers.
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

    async fn seeded_channel_repo(channel_id: ChannelId, vm: &VmIdFragment) -> InMemoryChannelRepository {
        let channel_repo = InMemoryChannelRepository::new();
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
        channel_repo.update_sub_channel_state(channel_id, vm.clone(), SubChannelPatch::default()).await.unwrap();
        channel_repo
    }

    #[tokio::test]
    async fn maybe_queue_below_threshold_is_a_no_op() {
        let contract = MockContract::new(4);
        let rav_repo = InMemoryRAVRepository::new();
        let channel_id = sample_channel();
        let vm = VmIdFragment::from("k");
        let channel_repo = seeded_channel_repo(channel_id, &vm).await;

        // 1 asset unit * 10^12 pUSD/unit = 10^12 pUSD, below a 10^13 threshold.
        let policy = SchedulerPolicy { min_claim_amount: PicoUsd(10_000_000_000_000), ..Default::default() };
        let scheduler = ClaimScheduler::spawn(contract, rav_repo, channel_repo, FixedRate, policy);

        scheduler.maybe_queue(channel_id, vm, AssetAmount::from_u128(1)).await;
        let status = scheduler.get_status();
        assert_eq!(status.queued, 0);
        assert_eq!(status.skipped_count, 1);
        scheduler.destroy();
    }

    #[tokio::test]
    async fn maybe_queue_raises_delta_instead_of_duplicating() {
        let contract = MockContract::new(4);
        let rav_repo = InMemoryRAVRepository::new();
        let channel_id = sample_channel();
        let vm = VmIdFragment::from("k");
        let channel_repo = seeded_channel_repo(channel_id, &vm).await;
        let scheduler = ClaimScheduler::spawn(contract, rav_repo, channel_repo, FixedRate, SchedulerPolicy::default());

        scheduler.maybe_queue(channel_id, vm.clone(), AssetAmount::from_u128(100)).await;
        scheduler.maybe_queue(channel_id, vm.clone(), AssetAmount::from_u128(50)).await;
        scheduler.maybe_queue(channel_id, vm, AssetAmount::from_u128(300)).await;

        assert_eq!(scheduler.tasks.len(), 1);
        assert_eq!(scheduler.tasks.iter().next().unwrap().delta, AssetAmount::from_u128(300));
        scheduler.destroy();
    }

    #[tokio::test]
    async fn queued_claim_is_submitted_and_marked_claimed() {
        let contract = MockContract::new(4);
        let rav_repo = InMemoryRAVRepository::new();
        let channel_repo = InMemoryChannelRepository::new();

        let channel_id = sample_channel();
        let vm = VmIdFragment::from("k");
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
        contract.authorize_sub_channel(channel_id, vm.clone()).await.unwrap();
        rav_repo
            .save(SignedSubRAV {
                sub_rav: SubRAV {
                    version: 1,
                    chain_id: 4,
                    channel_id,
                    channel_epoch: ChannelEpoch(0),
                    vm_id_fragment: vm.clone(),
                    accumulated_amount: AssetAmount::from_u128(5_000),
                    nonce: 1,
                },
                signature: vec![],
            })
            .await
            .unwrap();

        let policy = SchedulerPolicy { poll_interval_ms: 20, ..Default::default() };
        let scheduler = ClaimScheduler::spawn(contract, rav_repo, channel_repo, FixedRate, policy);
        scheduler.maybe_queue(channel_id, vm, AssetAmount::from_u128(5_000)).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = scheduler.get_status();
        assert_eq!(status.success_count, 1);
        assert_eq!(status.queued, 0);
        scheduler.destroy();
    }
}
