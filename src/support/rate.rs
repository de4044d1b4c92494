//! A fixed-price [`RateProvider`] stand-in (spec §4.8) for the demo
//! binaries. A real deployment reads live prices from an oracle or exchange.

use subrav_billing::{AssetInfo, RateProvider};
use subrav_types::money::PicoUsd;
use subrav_types::timestamp::UnixTimestamp;

#[derive(Debug, Clone)]
pub struct DemoRate {
    asset_id: String,
    decimals: u8,
    price_pico_usd: PicoUsd,
}

impl DemoRate {
    pub fn new(asset_id: impl Into<String>, decimals: u8, price_pico_usd: PicoUsd) -> Self {
        DemoRate { asset_id: asset_id.into(), decimals, price_pico_usd }
    }
}

impl RateProvider for DemoRate {
    type Error = std::convert::Infallible;

    async fn get_price_pico_usd(&self, _asset_id: &str) -> Result<PicoUsd, Self::Error> {
        Ok(self.price_pico_usd)
    }

    async fn get_asset_info(&self, asset_id: &str) -> Result<Option<AssetInfo>, Self::Error> {
        Ok(Some(AssetInfo { asset_id: asset_id.to_string(), symbol: self.asset_id.clone(), decimals: self.decimals }))
    }

    async fn get_last_updated(&self, _asset_id: &str) -> Result<Option<UnixTimestamp>, Self::Error> {
        Ok(Some(UnixTimestamp::now()))
    }

    async fn clear_cache(&self) {}
}
