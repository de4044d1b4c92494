//! Signed-RAV storage and claim bookkeeping (spec §4.2: `RAVRepository`).

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use subrav_types::channel::{ChannelId, VmIdFragment};
use subrav_types::error::ProtocolError;
use subrav_types::subrav::SignedSubRAV;

use crate::SubChannelKey;

/// Storage for signed SubRAVs and the claimed-nonce watermark per
/// sub-channel (spec §4.2). Only the latest signed SubRAV per sub-channel is
/// retained — superseding receipts are what I1/P2 mean by "retired" — so
/// `save` is idempotent and `list` always yields at most one entry per
/// sub-channel.
pub trait RAVRepository {
    type Error: std::fmt::Debug + std::fmt::Display;

    /// Stores `signed`, idempotent under a repeated `(channelId,
    /// vmIdFragment, nonce)`. A `signed` with a nonce no higher than what is
    /// already stored is a no-op (monotonicity, I1/P2).
    fn save(&self, signed: SignedSubRAV) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn get_latest(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<Option<SignedSubRAV>, Self::Error>> + Send;

    fn list(&self, channel_id: ChannelId) -> impl Future<Output = Result<Vec<SignedSubRAV>, Self::Error>> + Send;

    /// Records that the contract has confirmed a claim up to and including
    /// `up_to_nonce` for one sub-channel. Replaying this with a
    /// `up_to_nonce` no higher than the current watermark is a no-op (P8).
    fn mark_as_claimed(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
        up_to_nonce: u64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn get_unclaimed(
        &self,
        channel_id: ChannelId,
    ) -> impl Future<Output = Result<BTreeMap<VmIdFragment, SignedSubRAV>, Self::Error>> + Send;
}

impl<T: RAVRepository + Sync> RAVRepository for Arc<T> {
    type Error = T::Error;

    fn save(&self, signed: SignedSubRAV) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.as_ref().save(signed)
    }

    fn get_latest(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<Option<SignedSubRAV>, Self::Error>> + Send {
        self.as_ref().get_latest(channel_id, vm_id_fragment)
    }

    fn list(&self, channel_id: ChannelId) -> impl Future<Output = Result<Vec<SignedSubRAV>, Self::Error>> + Send {
        self.as_ref().list(channel_id)
    }

    fn mark_as_claimed(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
        up_to_nonce: u64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        self.as_ref().mark_as_claimed(channel_id, vm_id_fragment, up_to_nonce)
    }

    fn get_unclaimed(
        &self,
        channel_id: ChannelId,
    ) -> impl Future<Output = Result<BTreeMap<VmIdFragment, SignedSubRAV>, Self::Error>> + Send {
        self.as_ref().get_unclaimed(channel_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRAVRepository {
    latest: DashMap<SubChannelKey, SignedSubRAV>,
    claimed_nonce: DashMap<SubChannelKey, u64>,
}

impl InMemoryRAVRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RAVRepository for InMemoryRAVRepository {
    type Error = ProtocolError;

    async fn save(&self, signed: SignedSubRAV) -> Result<(), Self::Error> {
        let key = SubChannelKey::new(signed.sub_rav.channel_id, signed.sub_rav.vm_id_fragment.clone());
        match self.latest.entry(key) {
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(signed);
            }
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if signed.sub_rav.nonce > entry.get().sub_rav.nonce {
                    entry.insert(signed);
                }
            }
        }
        Ok(())
    }

    async fn get_latest(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> Result<Option<SignedSubRAV>, Self::Error> {
        let key = SubChannelKey::new(channel_id, vm_id_fragment);
        Ok(self.latest.get(&key).map(|entry| entry.clone()))
    }

    async fn list(&self, channel_id: ChannelId) -> Result<Vec<SignedSubRAV>, Self::Error> {
        Ok(self
            .latest
            .iter()
            .filter(|entry| entry.key().channel_id == channel_id)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn mark_as_claimed(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
        up_to_nonce: u64,
    ) -> Result<(), Self::Error> {
        let key = SubChannelKey::new(channel_id, vm_id_fragment);
        let mut watermark = self.claimed_nonce.entry(key).or_insert(0);
        if up_to_nonce > *watermark {
            *watermark = up_to_nonce;
        }
        Ok(())
    }

    async fn get_unclaimed(&self, channel_id: ChannelId) -> Result<BTreeMap<VmIdFragment, SignedSubRAV>, Self::Error> {
        let mut unclaimed = BTreeMap::new();
        for entry in self.latest.iter() {
            if entry.key().channel_id != channel_id {
                continue;
            }
            let claimed = self.claimed_nonce.get(entry.key()).map(|n| *n).unwrap_or(0);
            if entry.value().sub_rav.nonce > claimed {
                unclaimed.insert(entry.key().vm_id_fragment.clone(), entry.value().clone());
            }
        }
        Ok(unclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subrav_types::channel::ChannelEpoch;
    use subrav_types::money::AssetAmount;
    use subrav_types::subrav::SubRAV;
    use std::str::FromStr;

    fn signed(channel_id: ChannelId, vm: &str, nonce: u64, amount: u128) -> SignedSubRAV {
        SignedSubRAV {
            sub_rav: SubRAV {
                version: 1,
                chain_id: 4,
                channel_id,
                channel_epoch: ChannelEpoch(0),
                vm_id_fragment: VmIdFragment::from(vm),
                accumulated_amount: AssetAmount::from_u128(amount),
                nonce,
            },
            signature: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn save_is_idempotent_and_monotonic() {
        let repo = InMemoryRAVRepository::new();
        let channel_id = ChannelId::from_str(&format!("0x{}", "44".repeat(32))).unwrap();

        repo.save(signed(channel_id, "k", 1, 100)).await.unwrap();
        repo.save(signed(channel_id, "k", 1, 100)).await.unwrap();
        repo.save(signed(channel_id, "k", 0, 0)).await.unwrap();

        let latest = repo.get_latest(channel_id, VmIdFragment::from("k")).await.unwrap().unwrap();
        assert_eq!(latest.sub_rav.nonce, 1);
    }

    #[tokio::test]
    async fn mark_as_claimed_makes_get_unclaimed_idempotent() {
        let repo = InMemoryRAVRepository::new();
        let channel_id = ChannelId::from_str(&format!("0x{}", "55".repeat(32))).unwrap();
        repo.save(signed(channel_id, "k", 3, 300)).await.unwrap();

        assert_eq!(repo.get_unclaimed(channel_id).await.unwrap().len(), 1);
        repo.mark_as_claimed(channel_id, VmIdFragment::from("k"), 3).await.unwrap();
        assert!(repo.get_unclaimed(channel_id).await.unwrap().is_empty());

        // Replaying the claim for nonce <= watermark stays a no-op (P8).
        repo.mark_as_claimed(channel_id, VmIdFragment::from("k"), 1).await.unwrap();
        assert!(repo.get_unclaimed(channel_id).await.unwrap().is_empty());
    }
}
