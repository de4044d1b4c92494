//! In-memory mocks for [`PaymentChannelContract`] and [`HubBalanceProvider`],
//! gated behind the `testing` feature so downstream crates can exercise the
//! payee pipeline and claim scheduler without a real chain.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use subrav_billing::AssetInfo;
use subrav_types::channel::{ChannelEpoch, ChannelId, ChannelInfo, ChannelStatus, SubChannelInfo, VmIdFragment};
use subrav_types::error::ProtocolError;
use subrav_types::money::{AssetAmount, PicoUsd};
use subrav_types::subrav::SignedSubRAV;

use crate::contract::{ChannelReceipt, ClaimReceipt, PaymentChannelContract, SubChannelAuthorization};
use crate::hub_balance::HubBalanceProvider;

/// A deterministic, in-process stand-in for an on-chain payment-channel
/// contract. Channel ids are derived from a counter, not a real hash.
#[derive(Debug)]
pub struct MockContract {
    chain_id: u64,
    channels: DashMap<ChannelId, ChannelInfo>,
    sub_channels: DashMap<(ChannelId, VmIdFragment), SubChannelInfo>,
    asset_prices: DashMap<String, PicoUsd>,
    asset_info: DashMap<String, AssetInfo>,
    hub_balance: DashMap<String, AssetAmount>,
    next_id: AtomicU64,
}

impl MockContract {
    pub fn new(chain_id: u64) -> Self {
        MockContract {
            chain_id,
            channels: DashMap::new(),
            sub_channels: DashMap::new(),
            asset_prices: DashMap::new(),
            asset_info: DashMap::new(),
            hub_balance: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn set_asset_price(&self, asset_id: &str, price: PicoUsd) {
        self.asset_prices.insert(asset_id.to_string(), price);
    }

    pub fn set_asset_info(&self, info: AssetInfo) {
        self.asset_info.insert(info.asset_id.clone(), info);
    }

    pub fn set_hub_balance(&self, asset_id: &str, balance: AssetAmount) {
        self.hub_balance.insert(asset_id.to_string(), balance);
    }

    fn next_channel_id(&self) -> ChannelId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let hex = format!("{n:064x}");
        ChannelId::from_str(&format!("0x{hex}")).expect("generated hex is always well-formed")
    }
}

impl PaymentChannelContract for MockContract {
    type Error = ProtocolError;

    async fn open_channel(&self, payer_did: &str, payee_did: &str, asset_id: &str) -> Result<ChannelReceipt, Self::Error> {
        let channel_id = self.next_channel_id();
        let info = ChannelInfo {
            channel_id,
            payer_did: payer_did.to_string(),
            payee_did: payee_did.to_string(),
            asset_id: asset_id.to_string(),
            chain_id: self.chain_id,
            epoch: ChannelEpoch(0),
            status: ChannelStatus::Active,
        };
        self.channels.insert(channel_id, info.clone());
        Ok(ChannelReceipt { tx_hash: format!("0xmock{channel_id}"), block_height: Some(1), events: vec![], channel: info })
    }

    async fn open_channel_with_sub_channel(
        &self,
        payer_did: &str,
        payee_did: &str,
        asset_id: &str,
        vm_id_fragment: VmIdFragment,
    ) -> Result<(ChannelReceipt, SubChannelAuthorization), Self::Error> {
        let receipt = self.open_channel(payer_did, payee_did, asset_id).await?;
        let auth = self.authorize_sub_channel(receipt.channel.channel_id, vm_id_fragment).await?;
        Ok((receipt, auth))
    }

    async fn authorize_sub_channel(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> Result<SubChannelAuthorization, Self::Error> {
        let sub_channel = SubChannelInfo {
            channel_id,
            vm_id_fragment: vm_id_fragment.clone(),
            epoch: ChannelEpoch(0),
            last_claimed_amount: AssetAmount::ZERO,
            last_confirmed_nonce: 0,
            public_key: None,
            method_type: None,
            last_updated: None,
        };
        self.sub_channels.insert((channel_id, vm_id_fragment), sub_channel.clone());
        Ok(SubChannelAuthorization { tx_hash: format!("0xmocksub{channel_id}"), block_height: Some(1), sub_channel })
    }

    async fn close_channel(&self, channel_id: ChannelId) -> Result<ChannelReceipt, Self::Error> {
        let mut info = self
            .channels
            .get(&channel_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| ProtocolError::not_found(format!("channel {channel_id} not found")))?;
        info.status = ChannelStatus::Closed;
        self.channels.insert(channel_id, info.clone());
        Ok(ChannelReceipt { tx_hash: format!("0xmockclose{channel_id}"), block_height: Some(2), events: vec![], channel: info })
    }

    async fn claim_from_channel(&self, signed: &SignedSubRAV) -> Result<ClaimReceipt, Self::Error> {
        let key = (signed.sub_rav.channel_id, signed.sub_rav.vm_id_fragment.clone());
        let mut sub_channel = self
            .sub_channels
            .get(&key)
            .map(|entry| entry.clone())
            .ok_or_else(|| ProtocolError::not_found("sub-channel not found"))?;

        if signed.sub_rav.nonce <= sub_channel.last_confirmed_nonce {
            return Ok(ClaimReceipt { tx_hash: "0xmocknoop".to_string(), claimed_amount: AssetAmount::ZERO });
        }

        let claimed_amount = signed.sub_rav.accumulated_amount - sub_channel.last_claimed_amount;
        sub_channel.last_claimed_amount = signed.sub_rav.accumulated_amount;
        sub_channel.last_confirmed_nonce = signed.sub_rav.nonce;
        self.sub_channels.insert(key, sub_channel);
        Ok(ClaimReceipt { tx_hash: format!("0xmockclaim{}", signed.sub_rav.nonce), claimed_amount })
    }

    async fn get_channel_status(&self, channel_id: ChannelId) -> Result<Option<ChannelInfo>, Self::Error> {
        Ok(self.channels.get(&channel_id).map(|entry| entry.clone()))
    }

    async fn get_sub_channel(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> Result<Option<SubChannelInfo>, Self::Error> {
        Ok(self.sub_channels.get(&(channel_id, vm_id_fragment)).map(|entry| entry.clone()))
    }

    async fn get_chain_id(&self) -> Result<u64, Self::Error> {
        Ok(self.chain_id)
    }

    async fn get_asset_info(&self, asset_id: &str) -> Result<Option<AssetInfo>, Self::Error> {
        Ok(self.asset_info.get(asset_id).map(|entry| entry.clone()))
    }

    async fn get_asset_price(&self, asset_id: &str) -> Result<PicoUsd, Self::Error> {
        Ok(self.asset_prices.get(asset_id).map(|entry| *entry).unwrap_or(PicoUsd::ZERO))
    }
}

impl HubBalanceProvider for MockContract {
    type Error = ProtocolError;

    async fn get_hub_balance(&self, asset_id: &str) -> Result<AssetAmount, Self::Error> {
        Ok(self.hub_balance.get(asset_id).map(|entry| *entry).unwrap_or(AssetAmount::ZERO))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subrav_types::subrav::SubRAV;

    #[tokio::test]
    async fn claim_from_channel_is_idempotent_past_last_confirmed_nonce() {
        let contract = MockContract::new(4);
        let (receipt, _auth) = contract
            .open_channel_with_sub_channel("did:example:payer", "did:example:payee", "0xasset", VmIdFragment::from("k"))
            .await
            .unwrap();
        let channel_id = receipt.channel.channel_id;

        let signed = SignedSubRAV {
            sub_rav: SubRAV {
                version: 1,
                chain_id: 4,
                channel_id,
                channel_epoch: ChannelEpoch(0),
                vm_id_fragment: VmIdFragment::from("k"),
                accumulated_amount: AssetAmount::from_u128(500),
                nonce: 3,
            },
            signature: vec![],
        };

        let first = contract.claim_from_channel(&signed).await.unwrap();
        assert_eq!(first.claimed_amount, AssetAmount::from_u128(500));

        let replay = contract.claim_from_channel(&signed).await.unwrap();
        assert_eq!(replay.claimed_amount, AssetAmount::ZERO);
    }
}
