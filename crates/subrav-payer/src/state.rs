//! Per-host payer state (spec §4.6) and its persistence boundary.

use std::sync::Arc;

use dashmap::DashMap;
use subrav_types::channel::{ChannelId, ChannelInfo, SubChannelInfo, VmIdFragment};
use subrav_types::proto::DiscoveryInfo;
use subrav_types::subrav::SubRAV;

/// Everything the payer client remembers about one payee host (spec §4.6:
/// "Per-host object"). `discovery` is an ambient cache addition — the spec
/// only says `discoverService` must "cache result", without naming a field.
#[derive(Debug, Clone)]
pub struct PayerClientState {
    pub host: String,
    pub base_url: String,
    pub payee_did: Option<String>,
    pub default_asset_id: String,
    pub key_id: String,
    pub vm_id_fragment: VmIdFragment,
    pub channel_id: Option<ChannelId>,
    pub channel_info: Option<ChannelInfo>,
    pub sub_channel_info: Option<SubChannelInfo>,
    pub pending_sub_rav: Option<SubRAV>,
    pub highest_observed_nonce: Option<u64>,
    pub discovery: Option<DiscoveryInfo>,
}

impl PayerClientState {
    pub fn new(
        host: impl Into<String>,
        base_url: impl Into<String>,
        default_asset_id: impl Into<String>,
        key_id: impl Into<String>,
        vm_id_fragment: VmIdFragment,
    ) -> Self {
        PayerClientState {
            host: host.into(),
            base_url: base_url.into(),
            payee_did: None,
            default_asset_id: default_asset_id.into(),
            key_id: key_id.into(),
            vm_id_fragment,
            channel_id: None,
            channel_info: None,
            sub_channel_info: None,
            pending_sub_rav: None,
            highest_observed_nonce: None,
            discovery: None,
        }
    }

    /// The payer's DID, derived from `keyId`'s `"<did>#<fragment>"` shape
    /// (spec §4.1). Falls back to the whole `keyId` if it carries no `#`.
    pub fn payer_did(&self) -> &str {
        self.key_id.split('#').next().unwrap_or(&self.key_id)
    }

    /// Whether a channel and an authorized sub-channel are both known, i.e.
    /// `ensureChannelReady` has nothing left to do.
    pub fn is_ready(&self) -> bool {
        self.channel_id.is_some() && self.sub_channel_info.is_some()
    }
}

/// Loads and saves a [`PayerClientState`] by host, so a payer process can
/// restart without losing its channel identity and pending proposal (spec
/// §4.6: "load persisted state"). The payer exclusively owns this cache; it
/// never shares storage with the payee's repositories (spec §3: "Ownership").
pub trait PayerStateRepository {
    type Error: std::fmt::Debug + std::fmt::Display;

    fn load(&self, host: &str) -> impl Future<Output = Result<Option<PayerClientState>, Self::Error>> + Send;

    fn save(&self, state: &PayerClientState) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

impl<T: PayerStateRepository + Sync> PayerStateRepository for Arc<T> {
    type Error = T::Error;

    fn load(&self, host: &str) -> impl Future<Output = Result<Option<PayerClientState>, Self::Error>> + Send {
        self.as_ref().load(host)
    }

    fn save(&self, state: &PayerClientState) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.as_ref().save(state)
    }
}

/// In-memory [`PayerStateRepository`], keyed by host. Reference
/// implementation and the one used by this crate's own tests.
#[derive(Debug, Default)]
pub struct InMemoryPayerStateRepository {
    states: DashMap<String, PayerClientState>,
}

impl InMemoryPayerStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayerStateRepository for InMemoryPayerStateRepository {
    type Error = std::convert::Infallible;

    async fn load(&self, host: &str) -> Result<Option<PayerClientState>, Self::Error> {
        Ok(self.states.get(host).map(|entry| entry.value().clone()))
    }

    async fn save(&self, state: &PayerClientState) -> Result<(), Self::Error> {
        self.states.insert(state.host.clone(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payer_did_splits_on_hash() {
        let state = PayerClientState::new("host", "https://host", "0x0", "did:example:abc#k1", VmIdFragment::from("k1"));
        assert_eq!(state.payer_did(), "did:example:abc");
    }

    #[tokio::test]
    async fn in_memory_repository_round_trips_by_host() {
        let repo = InMemoryPayerStateRepository::new();
        assert!(repo.load("host").await.unwrap().is_none());

        let state = PayerClientState::new("host", "https://host", "0x0", "did:example:abc#k1", VmIdFragment::from("k1"));
        repo.save(&state).await.unwrap();

        let loaded = repo.load("host").await.unwrap().unwrap();
        assert_eq!(loaded.host, "host");
        assert_eq!(loaded.payer_did(), "did:example:abc");
    }
}
