//! Well-known discovery document (spec §6: `GET /.well-known/nuwa-payment/info`).

use serde::{Deserialize, Serialize};

use crate::money::PicoUsd;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryInfo {
    pub version: u8,
    pub service_id: String,
    pub service_did: String,
    pub network: String,
    pub default_asset_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_price_pico_usd: Option<PicoUsd>,
    pub base_path: String,
}

impl DiscoveryInfo {
    /// The fallback base path a payer client assumes when discovery itself
    /// fails (spec §4.6: `discoverService`).
    pub const FALLBACK_BASE_PATH: &'static str = "/payment-channel";
}
