//! The payment-channel contract trait (spec §4.8). Revenue and hub-balance
//! contracts are optional collaborators outside this trait; the scheduler
//! only additionally needs [`crate::hub_balance::HubBalanceProvider`].

use std::sync::Arc;

use subrav_billing::AssetInfo;
use subrav_types::channel::{ChannelId, ChannelInfo, SubChannelInfo, VmIdFragment};
use subrav_types::money::PicoUsd;
use subrav_types::subrav::SignedSubRAV;

/// The outcome of a state-changing contract call (spec §4.8:
/// `{txHash, blockHeight?, events?}`).
#[derive(Debug, Clone)]
pub struct ChannelReceipt {
    pub tx_hash: String,
    pub block_height: Option<u64>,
    pub events: Vec<String>,
    pub channel: ChannelInfo,
}

/// The outcome of `authorizeSubChannel` (spec §4.8).
#[derive(Debug, Clone)]
pub struct SubChannelAuthorization {
    pub tx_hash: String,
    pub block_height: Option<u64>,
    pub sub_channel: SubChannelInfo,
}

/// The outcome of `claimFromChannel` (spec §4.8). Idempotent: replaying a
/// claim at a nonce already confirmed succeeds with `claimed_amount = 0`
/// rather than erroring (P8).
#[derive(Debug, Clone)]
pub struct ClaimReceipt {
    pub tx_hash: String,
    pub claimed_amount: subrav_types::money::AssetAmount,
}

/// The fixed contract surface the payee pipeline and claim scheduler call
/// through (spec §4.8). Settlement, DID resolution, and signing never cross
/// this trait — only channel lifecycle, claims, and chain-anchored reads.
pub trait PaymentChannelContract {
    type Error: std::fmt::Debug + std::fmt::Display;

    fn open_channel(
        &self,
        payer_did: &str,
        payee_did: &str,
        asset_id: &str,
    ) -> impl Future<Output = Result<ChannelReceipt, Self::Error>> + Send;

    fn open_channel_with_sub_channel(
        &self,
        payer_did: &str,
        payee_did: &str,
        asset_id: &str,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<(ChannelReceipt, SubChannelAuthorization), Self::Error>> + Send;

    fn authorize_sub_channel(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<SubChannelAuthorization, Self::Error>> + Send;

    fn close_channel(
        &self,
        channel_id: ChannelId,
    ) -> impl Future<Output = Result<ChannelReceipt, Self::Error>> + Send;

    /// Submits a claim. Idempotent: a `signed` whose nonce is already
    /// confirmed on-chain succeeds with `claimed_amount = 0` (P8).
    fn claim_from_channel(
        &self,
        signed: &SignedSubRAV,
    ) -> impl Future<Output = Result<ClaimReceipt, Self::Error>> + Send;

    fn get_channel_status(
        &self,
        channel_id: ChannelId,
    ) -> impl Future<Output = Result<Option<ChannelInfo>, Self::Error>> + Send;

    fn get_sub_channel(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<Option<SubChannelInfo>, Self::Error>> + Send;

    fn get_chain_id(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send;

    fn get_asset_info(
        &self,
        asset_id: &str,
    ) -> impl Future<Output = Result<Option<AssetInfo>, Self::Error>> + Send;

    fn get_asset_price(&self, asset_id: &str) -> impl Future<Output = Result<PicoUsd, Self::Error>> + Send;
}

impl<T: PaymentChannelContract + Sync> PaymentChannelContract for Arc<T> {
    type Error = T::Error;

    fn open_channel(
        &self,
        payer_did: &str,
        payee_did: &str,
        asset_id: &str,
    ) -> impl Future<Output = Result<ChannelReceipt, Self::Error>> + Send {
        self.as_ref().open_channel(payer_did, payee_did, asset_id)
    }

    fn open_channel_with_sub_channel(
        &self,
        payer_did: &str,
        payee_did: &str,
        asset_id: &str,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<(ChannelReceipt, SubChannelAuthorization), Self::Error>> + Send {
        self.as_ref().open_channel_with_sub_channel(payer_did, payee_did, asset_id, vm_id_fragment)
    }

    fn authorize_sub_channel(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<SubChannelAuthorization, Self::Error>> + Send {
        self.as_ref().authorize_sub_channel(channel_id, vm_id_fragment)
    }

    fn close_channel(&self, channel_id: ChannelId) -> impl Future<Output = Result<ChannelReceipt, Self::Error>> + Send {
        self.as_ref().close_channel(channel_id)
    }

    fn claim_from_channel(
        &self,
        signed: &SignedSubRAV,
    ) -> impl Future<Output = Result<ClaimReceipt, Self::Error>> + Send {
        self.as_ref().claim_from_channel(signed)
    }

    fn get_channel_status(
        &self,
        channel_id: ChannelId,
    ) -> impl Future<Output = Result<Option<ChannelInfo>, Self::Error>> + Send {
        self.as_ref().get_channel_status(channel_id)
    }

    fn get_sub_channel(
        &self,
        channel_id: ChannelId,
        vm_id_fragment: VmIdFragment,
    ) -> impl Future<Output = Result<Option<SubChannelInfo>, Self::Error>> + Send {
        self.as_ref().get_sub_channel(channel_id, vm_id_fragment)
    }

    fn get_chain_id(&self) -> impl Future<Output = Result<u64, Self::Error>> + Send {
        self.as_ref().get_chain_id()
    }

    fn get_asset_info(&self, asset_id: &str) -> impl Future<Output = Result<Option<AssetInfo>, Self::Error>> + Send {
        self.as_ref().get_asset_info(asset_id)
    }

    fn get_asset_price(&self, asset_id: &str) -> impl Future<Output = Result<PicoUsd, Self::Error>> + Send {
        self.as_ref().get_asset_price(asset_id)
    }
}
