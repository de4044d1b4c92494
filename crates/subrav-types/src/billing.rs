//! Billing rules and the in-flight request context the payee pipeline
//! threads through steps A/B/C (spec §3, §4.3, §4.4).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelEpoch, ChannelId, ChannelInfo, SubChannelInfo, VmIdFragment};
use crate::error::ProtocolError;
use crate::money::{AssetAmount, PicoUsd};
use crate::subrav::{PendingProposal, SignedSubRAV, SubRAV};

/// Which request attributes a [`BillingRule`]'s `when` predicate constrains.
/// Every populated field must match for the rule to apply; an empty
/// predicate with no fields set never matches (use `default` instead).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path_regex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub method: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

/// The billing strategy a matched rule evaluates to compute cost (spec §4.3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StrategyConfig {
    /// Flat per-call price; never deferred.
    PerRequest { price_pico_usd: PicoUsd },
    /// Price per usage unit read from `meta.usage[usage_key]` after the
    /// handler runs; deferred.
    PerToken { unit_price_pico_usd: PicoUsd, usage_key: String },
    /// The handler writes the final USD cost directly; deferred.
    FinalCost,
}

impl StrategyConfig {
    /// Whether this strategy's cost can only be known after the handler runs.
    pub fn is_deferred(&self) -> bool {
        matches!(self, StrategyConfig::PerToken { .. } | StrategyConfig::FinalCost)
    }
}

/// One entry in the ordered rule list a service configures (spec §3).
/// Exactly one of `when` / `default` determines applicability: a rule with
/// `default: true` is only ever considered once no non-default rule matched,
/// regardless of its position in the configured list (P5).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingRule {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub when: Option<RuleMatch>,
    #[serde(default)]
    pub default: bool,
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub auth_required: bool,
    #[serde(default)]
    pub admin_only: bool,
    #[serde(default)]
    pub payment_required: bool,
}

/// Usage values a business handler records for a deferred strategy to read
/// during settlement (spec §4.3: `meta.usage[usageKey]`, `finalCostPicoUSD`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMeta {
    #[serde(flatten)]
    pub counters: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub final_cost_pico_usd: Option<PicoUsd>,
}

impl UsageMeta {
    pub fn get(&self, key: &str) -> Option<u64> {
        self.counters.get(key).copied()
    }
}

/// Mutable pipeline state populated as steps A/B/C progress (spec §3:
/// `BillingContext.state`).
#[derive(Debug, Clone, Default)]
pub struct BillingState {
    pub channel_info: Option<ChannelInfo>,
    pub sub_channel_state: Option<SubChannelInfo>,
    pub verified: bool,
    pub cost: Option<AssetAmount>,
    pub cost_usd: Option<PicoUsd>,
    pub unsigned_sub_rav: Option<SubRAV>,
    pub pending_proposal: Option<PendingProposal>,
    pub usage: UsageMeta,
    pub error: Option<ProtocolError>,
}

/// The in-flight, per-request billing context threaded through
/// `preProcess` / `settle` / `persist` (spec §3).
#[derive(Debug, Clone)]
pub struct BillingContext {
    pub service_id: String,
    pub asset_id: String,
    pub rule: Option<BillingRule>,
    /// Whether `payer_did` came from a verified DID-auth token on this
    /// request, as opposed to being derived from channel metadata as a
    /// fallback (spec §4.4 step A.2). `authRequired`/`adminOnly` rules check
    /// this, not merely whether `payer_did` is populated.
    pub did_auth: bool,
    pub payer_did: Option<String>,
    pub key_id: Option<String>,
    pub channel_id: Option<ChannelId>,
    pub channel_epoch: Option<ChannelEpoch>,
    pub vm_id_fragment: Option<VmIdFragment>,
    pub signed_sub_rav: Option<SignedSubRAV>,
    pub max_amount: Option<AssetAmount>,
    pub client_tx_ref: String,
    pub state: BillingState,
}

impl BillingContext {
    pub fn new(service_id: impl Into<String>, asset_id: impl Into<String>, client_tx_ref: impl Into<String>) -> Self {
        BillingContext {
            service_id: service_id.into(),
            asset_id: asset_id.into(),
            rule: None,
            did_auth: false,
            payer_did: None,
            key_id: None,
            channel_id: None,
            channel_epoch: None,
            vm_id_fragment: None,
            signed_sub_rav: None,
            max_amount: None,
            client_tx_ref: client_tx_ref.into(),
            state: BillingState::default(),
        }
    }
}
