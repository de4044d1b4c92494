//! Pending-proposal storage (spec §4.2: `PendingSubRAVRepository`).

use std::sync::Arc;

use dashmap::DashMap;
use subrav_types::channel::{ChannelId, VmIdFragment};
use subrav_types::error::ProtocolError;
use subrav_types::subrav::PendingProposal;
use subrav_types::timestamp::UnixTimestamp;

use crate::SubChannelKey;

/// Storage for unsigned proposals awaiting the payer's signature (spec §3,
/// §4.2). At most one proposal per sub-channel is ever live (I2/P3); `save`
/// overwrites whatever was there before.
pub trait PendingSubRAVRepository {
    type Error: std::fmt::Debug + std::fmt::Display;

    fn save(&self, pending: PendingProposal) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Looks up the pending proposal for `channel_id` with the given
    /// `nonce`, regardless of which sub-channel it belongs to.
    fn find(
        &self,
        channel_id: ChannelId,
        nonce: u64,
    ) -> impl Future<Output = Result<Option<PendingProposal>, Self::Error>> + Send;

    fn find_latest_by_sub_channel(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<Option<PendingProposal>, Self::Error>> + Send;

    fn remove(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Drops every pending proposal created at or before `older_than`,
    /// returning the number removed.
    fn cleanup(&self, older_than: UnixTimestamp) -> impl Future<Output = Result<usize, Self::Error>> + Send;
}

impl<T: PendingSubRAVRepository + Sync> PendingSubRAVRepository for Arc<T> {
    type Error = T::Error;

    fn save(&self, pending: PendingProposal) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.as_ref().save(pending)
    }

    fn find(
        &self,
        channel_id: ChannelId,
        nonce: u64,
    ) -> impl Future<Output = Result<Option<PendingProposal>, Self::Error>> + Send {
        self.as_ref().find(channel_id, nonce)
    }

    fn find_latest_by_sub_channel(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<Option<PendingProposal>, Self::Error>> + Send {
        self.as_ref().find_latest_by_sub_channel(channel_id, vm_id_fragment)
    }

    fn remove(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.as_ref().remove(channel_id, vm_id_fragment)
    }

    fn cleanup(&self, older_than: UnixTimestamp) -> impl Future<Output = Result<usize, Self::Error>> + Send {
        self.as_ref().cleanup(older_than)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPendingSubRAVRepository {
    pending: DashMap<SubChannelKey, PendingProposal>,
}

impl InMemoryPendingSubRAVRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingSubRAVRepository for InMemoryPendingSubRAVRepository {
    type Error = ProtocolError;

    async fn save(&self, pending: PendingProposal) -> Result<(), Self::Error> {
        let key = SubChannelKey::new(pending.channel_id, pending.vm_id_fragment.clone());
        self.pending.insert(key, pending);
        Ok(())
    }

    async fn find(&self, channel_id: ChannelId, nonce: u64) -> Result<Option<PendingProposal>, Self::Error> {
        Ok(self
            .pending
            .iter()
            .find(|entry| entry.key().channel_id == channel_id && entry.value().nonce == nonce)
            .map(|entry| entry.value().clone()))
    }

    async fn find_latest_by_sub_channel(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> Result<Option<PendingProposal>, Self::Error> {
        let key = SubChannelKey::new(channel_id, vm_id_fragment);
        Ok(self.pending.get(&key).map(|entry| entry.clone()))
    }

    async fn remove(&self, channel_id: ChannelId, vm_id_fragment: VmIdFragment) -> Result<(), Self::Error> {
        let key = SubChannelKey::new(channel_id, vm_id_fragment);
        self.pending.remove(&key);
        Ok(())
    }

    async fn cleanup(&self, older_than: UnixTimestamp) -> Result<usize, Self::Error> {
        let stale: Vec<SubChannelKey> = self
            .pending
            .iter()
            .filter(|entry| entry.value().created_at.as_secs() <= older_than.as_secs())
            .map(|entry| entry.key().clone())
            .collect();
        let count = stale.len();
        for key in stale {
            self.pending.remove(&key);
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subrav_types::channel::ChannelEpoch;
    use subrav_types::money::AssetAmount;
    use std::str::FromStr;

    fn pending(channel_id: ChannelId, vm: &str, nonce: u64, created_at: u64) -> PendingProposal {
        PendingProposal {
            channel_id,
            vm_id_fragment: VmIdFragment::from(vm),
            nonce,
            accumulated_amount: AssetAmount::from_u128(100),
            epoch: ChannelEpoch(0),
            created_at: UnixTimestamp::from_secs(created_at),
        }
    }

    #[tokio::test]
    async fn save_overwrites_the_single_pending_slot_per_sub_channel() {
        let repo = InMemoryPendingSubRAVRepository::new();
        let channel_id = ChannelId::from_str(&format!("0x{}", "66".repeat(32))).unwrap();

        repo.save(pending(channel_id, "k", 1, 0)).await.unwrap();
        repo.save(pending(channel_id, "k", 2, 1)).await.unwrap();

        let found = repo.find_latest_by_sub_channel(channel_id, VmIdFragment::from("k")).await.unwrap().unwrap();
        assert_eq!(found.nonce, 2);
    }

    #[tokio::test]
    async fn cleanup_drops_only_stale_entries() {
        let repo = InMemoryPendingSubRAVRepository::new();
        let channel_id = ChannelId::from_str(&format!("0x{}", "77".repeat(32))).unwrap();

        repo.save(pending(channel_id, "k1", 1, 10)).await.unwrap();
        repo.save(pending(channel_id, "k2", 1, 1000)).await.unwrap();

        let removed = repo.cleanup(UnixTimestamp::from_secs(100)).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.find_latest_by_sub_channel(channel_id, VmIdFragment::from("k1")).await.unwrap().is_none());
        assert!(repo.find_latest_by_sub_channel(channel_id, VmIdFragment::from("k2")).await.unwrap().is_some());
    }
}
