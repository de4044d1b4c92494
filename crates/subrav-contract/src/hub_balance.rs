//! The hub-balance gate the claim scheduler optionally consults (spec §4.5,
//! §4.8: "the scheduler only needs `getHubBalance` (optional gate)").

use std::sync::Arc;

use subrav_types::money::AssetAmount;

pub trait HubBalanceProvider {
    type Error: std::fmt::Debug + std::fmt::Display;

    fn get_hub_balance(&self, asset_id: &str) -> impl Future<Output = Result<AssetAmount, Self::Error>> + Send;
}

impl<T: HubBalanceProvider + Sync> HubBalanceProvider for Arc<T> {
    type Error = T::Error;

    fn get_hub_balance(&self, asset_id: &str) -> impl Future<Output = Result<AssetAmount, Self::Error>> + Send {
        self.as_ref().get_hub_balance(asset_id)
    }
}
