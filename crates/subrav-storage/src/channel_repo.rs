//! Channel and sub-channel metadata storage (spec §4.2: `ChannelRepository`).

use std::sync::Arc;

use dashmap::DashMap;
use subrav_types::channel::{ChannelId, ChannelInfo, ChannelStatus, SubChannelInfo, VmIdFragment};
use subrav_types::error::ProtocolError;
use subrav_types::money::AssetAmount;
use subrav_types::timestamp::UnixTimestamp;

use crate::SubChannelKey;

/// Narrows a `listChannelMetadata` call to channels matching every
/// populated field.
#[derive(Debug, Clone, Default)]
pub struct ChannelFilter {
    pub payee_did: Option<String>,
    pub status: Option<ChannelStatus>,
}

impl ChannelFilter {
    fn matches(&self, info: &ChannelInfo) -> bool {
        self.payee_did.as_deref().is_none_or(|did| did == info.payee_did)
            && self.status.is_none_or(|status| status == info.status)
    }
}

/// Pagination cursor for `listChannelMetadata`.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

/// A partial update to a [`SubChannelInfo`], applied in place.
#[derive(Debug, Clone, Default)]
pub struct SubChannelPatch {
    pub last_claimed_amount: Option<AssetAmount>,
    pub last_confirmed_nonce: Option<u64>,
    pub last_updated: Option<UnixTimestamp>,
}

/// Storage for on-chain-anchored channel and sub-channel metadata (spec §4.2).
pub trait ChannelRepository {
    type Error: std::fmt::Debug + std::fmt::Display;

    fn set_channel_metadata(&self, info: ChannelInfo) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn get_channel_metadata(
        &self,
        channel_id: ChannelId,
    ) -> impl Future<Output = Result<Option<ChannelInfo>, Self::Error>> + Send;

    fn list_channel_metadata(
        &self,
        filter: ChannelFilter,
        page: Page,
    ) -> impl Future<Output = Result<Vec<ChannelInfo>, Self::Error>> + Send;

    fn update_sub_channel_state(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
        patch: SubChannelPatch,
    ) -> impl Future<Output = Result<SubChannelInfo, Self::Error>> + Send;

    fn get_sub_channel_state(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<Option<SubChannelInfo>, Self::Error>> + Send;
}

impl<T: ChannelRepository + Sync> ChannelRepository for Arc<T> {
    type Error = T::Error;

    fn set_channel_metadata(&self, info: ChannelInfo) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.as_ref().set_channel_metadata(info)
    }

    fn get_channel_metadata(
        &self,
        channel_id: ChannelId,
    ) -> impl Future<Output = Result<Option<ChannelInfo>, Self::Error>> + Send {
        self.as_ref().get_channel_metadata(channel_id)
    }

    fn list_channel_metadata(
        &self,
        filter: ChannelFilter,
        page: Page,
    ) -> impl Future<Output = Result<Vec<ChannelInfo>, Self::Error>> + Send {
        self.as_ref().list_channel_metadata(filter, page)
    }

    fn update_sub_channel_state(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
        patch: SubChannelPatch,
    ) -> impl Future<Output = Result<SubChannelInfo, Self::Error>> + Send {
        self.as_ref().update_sub_channel_state(channel_id, vm_id_fragment, patch)
    }

    fn get_sub_channel_state(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<Option<SubChannelInfo>, Self::Error>> + Send {
        self.as_ref().get_sub_channel_state(channel_id, vm_id_fragment)
    }
}

/// An in-memory [`ChannelRepository`], keyed per channel and per sub-channel
/// so that concurrent writers to different sub-channels never contend.
#[derive(Debug, Default)]
pub struct InMemoryChannelRepository {
    channels: DashMap<ChannelId, ChannelInfo>,
    sub_channels: DashMap<SubChannelKey, SubChannelInfo>,
}

impl InMemoryChannelRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChannelRepository for InMemoryChannelRepository {
    type Error = ProtocolError;

    async fn set_channel_metadata(&self, info: ChannelInfo) -> Result<(), Self::Error> {
        self.channels.insert(info.channel_id, info);
        Ok(())
    }

    async fn get_channel_metadata(&self, channel_id: ChannelId) -> Result<Option<ChannelInfo>, Self::Error> {
        Ok(self.channels.get(&channel_id).map(|entry| entry.clone()))
    }

    async fn list_channel_metadata(&self, filter: ChannelFilter, page: Page) -> Result<Vec<ChannelInfo>, Self::Error> {
        let mut matched: Vec<ChannelInfo> = self
            .channels
            .iter()
            .map(|entry| entry.value().clone())
            .filter(|info| filter.matches(info))
            .collect();
        matched.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        Ok(matched.into_iter().skip(page.offset).take(page.limit).collect())
    }

    async fn update_sub_channel_state(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
        patch: SubChannelPatch,
    ) -> Result<SubChannelInfo, Self::Error> {
        let key = SubChannelKey::new(channel_id, vm_id_fragment.clone());
        let mut entry = self.sub_channels.entry(key).or_insert_with(|| SubChannelInfo {
            channel_id,
            vm_id_fragment,
            epoch: subrav_types::channel::ChannelEpoch(0),
            last_claimed_amount: AssetAmount::ZERO,
            last_confirmed_nonce: 0,
            public_key: None,
            method_type: None,
            last_updated: None,
        });
        if let Some(amount) = patch.last_claimed_amount {
            entry.last_claimed_amount = amount;
        }
        if let Some(nonce) = patch.last_confirmed_nonce {
            entry.last_confirmed_nonce = nonce;
        }
        if let Some(updated) = patch.last_updated {
            entry.last_updated = Some(updated);
        }
        Ok(entry.clone())
    }

    async fn get_sub_channel_state(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> Result<Option<SubChannelInfo>, Self::Error> {
        let key = SubChannelKey::new(channel_id, vm_id_fragment);
        Ok(self.sub_channels.get(&key).map(|entry| entry.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn channel_id() -> ChannelId {
        ChannelId::from_str(&format!("0x{}", "22".repeat(32))).unwrap()
    }

    #[tokio::test]
    async fn update_sub_channel_state_creates_then_patches() {
        let repo = InMemoryChannelRepository::new();
        let vm = VmIdFragment::from("k");

        let created = repo
            .update_sub_channel_state(channel_id(), vm.clone(), SubChannelPatch {
                last_confirmed_nonce: Some(5),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created.last_confirmed_nonce, 5);

        let patched = repo
            .update_sub_channel_state(channel_id(), vm.clone(), SubChannelPatch {
                last_claimed_amount: Some(AssetAmount::from_u128(500_000)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(patched.last_confirmed_nonce, 5);
        assert_eq!(patched.last_claimed_amount, AssetAmount::from_u128(500_000));
    }

    #[tokio::test]
    async fn list_channel_metadata_filters_by_status() {
        let repo = InMemoryChannelRepository::new();
        let mut active = ChannelInfo {
            channel_id: channel_id(),
            payer_did: "did:example:payer".into(),
            payee_did: "did:example:payee".into(),
            asset_id: "0xasset".into(),
            chain_id: 4,
            epoch: subrav_types::channel::ChannelEpoch(0),
            status: ChannelStatus::Active,
        };
        repo.set_channel_metadata(active.clone()).await.unwrap();
        active.status = ChannelStatus::Closed;
        active.channel_id = ChannelId::from_str(&format!("0x{}", "33".repeat(32))).unwrap();
        repo.set_channel_metadata(active).await.unwrap();

        let active_only = repo
            .list_channel_metadata(
                ChannelFilter { status: Some(ChannelStatus::Active), ..Default::default() },
                Page { offset: 0, limit: 10 },
            )
            .await
            .unwrap();
        assert_eq!(active_only.len(), 1);
    }
}
