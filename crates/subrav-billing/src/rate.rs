//! The rate-provider boundary (spec §4.3, §4.8). Concrete price feeds are an
//! external collaborator; this crate only defines the trait the USD→asset
//! conversion in [`subrav_types::money::usd_to_asset_ceil`] needs.

use std::sync::Arc;

use subrav_types::money::PicoUsd;
use subrav_types::timestamp::UnixTimestamp;

/// Asset metadata needed for USD-to-asset-unit conversion (spec §4.8:
/// `getAssetInfo`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub asset_id: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Supplies USD-denominated asset prices to the billing pipeline (spec
/// §4.3, §4.8). Implementations may cache internally for up to ~30s (the
/// spec's reference figure); this crate imposes no caching policy itself.
pub trait RateProvider {
    type Error: std::fmt::Debug + std::fmt::Display;

    fn get_price_pico_usd(&self, asset_id: &str) -> impl Future<Output = Result<PicoUsd, Self::Error>> + Send;

    fn get_asset_info(
        &self,
        asset_id: &str,
    ) -> impl Future<Output = Result<Option<AssetInfo>, Self::Error>> + Send;

    fn get_last_updated(
        &self,
        asset_id: &str,
    ) -> impl Future<Output = Result<Option<UnixTimestamp>, Self::Error>> + Send;

    fn clear_cache(&self) -> impl Future<Output = ()> + Send;
}

impl<T: RateProvider + Sync> RateProvider for Arc<T> {
    type Error = T::Error;

    fn get_price_pico_usd(&self, asset_id: &str) -> impl Future<Output = Result<PicoUsd, Self::Error>> + Send {
        self.as_ref().get_price_pico_usd(asset_id)
    }

    fn get_asset_info(&self, asset_id: &str) -> impl Future<Output = Result<Option<AssetInfo>, Self::Error>> + Send {
        self.as_ref().get_asset_info(asset_id)
    }

    fn get_last_updated(
        &self,
        asset_id: &str,
    ) -> impl Future<Output = Result<Option<UnixTimestamp>, Self::Error>> + Send {
        self.as_ref().get_last_updated(asset_id)
    }

    fn clear_cache(&self) -> impl Future<Output = ()> + Send {
        self.as_ref().clear_cache()
    }
}
