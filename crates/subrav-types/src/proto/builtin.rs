//! Built-in, rule-identified operations every payee exposes identically on
//! both transports (spec §6, §4.6 scenario 5).

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelInfo, VmIdFragment};
use crate::money::{AssetAmount, PicoUsd};
use crate::proto::envelope::WireSubRav;

/// Operation name constants, matched by the rule matcher before any
/// asset-specific rule (they are free and never deferred).
pub const DISCOVER: &str = "nuwa.discover";
pub const HEALTH: &str = "nuwa.health";
pub const RECOVERY: &str = "nuwa.recovery";
pub const COMMIT: &str = "nuwa.commit";
pub const ADMIN_STATUS: &str = "nuwa.admin.status";
pub const ADMIN_CLAIM_TRIGGER: &str = "nuwa.admin.claim-trigger";

/// `nuwa.health` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
}

/// The sub-channel summary embedded in a [`RecoveryResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubChannelSummary {
    pub vm_id_fragment: VmIdFragment,
    pub last_confirmed_nonce: u64,
    pub last_claimed_amount: AssetAmount,
}

/// `nuwa.recovery` response body: the payee's authoritative view of a
/// channel, used by the payer to reconcile its local cache after a restart
/// (spec §4.6, scenario 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResponse {
    pub channel: ChannelInfo,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sub_channel: Option<SubChannelSummary>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pending_sub_rav: Option<WireSubRav>,
}

/// `nuwa.commit` request body: a payer finalizing a pending proposal without
/// another billable call (spec §4.6: `commitSubRAV`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub signed_sub_rav: crate::proto::envelope::WireSignedSubRav,
}

/// A snapshot of the scheduler's configured policy, embedded in
/// [`SchedulerStatus`] (spec §4.5: `getStatus() -> {..., policy}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerPolicySnapshot {
    pub min_claim_amount: PicoUsd,
    pub max_concurrent_claims: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub insufficient_funds_backoff_ms: u64,
    pub require_hub_balance: bool,
    pub count_insufficient_as_failure: bool,
}

/// `nuwa.admin.status` response body: a snapshot of the claim scheduler
/// (spec §4.5: `getStatus`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub active: u32,
    pub queued: u32,
    pub success_count: u64,
    pub failed_count: u64,
    pub skipped_count: u64,
    pub insufficient_funds_count: u64,
    pub backoff_count: u64,
    pub avg_processing_time_ms: f64,
    pub policy: SchedulerPolicySnapshot,
}

/// `nuwa.admin.claim-trigger` request body: force an out-of-band claim for a
/// channel regardless of `minClaimAmount` (spec §4.5: `triggerClaim`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimTriggerRequest {
    pub channel_id: crate::channel::ChannelId,
}
