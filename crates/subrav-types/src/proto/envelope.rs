//! HTTP/MCP request and response envelope shapes (spec §6). Every numeric
//! field is carried as a decimal string on the wire, distinct from the
//! core [`crate::subrav::SubRAV`] type which uses native integers — the two
//! are bridged by `TryFrom`/`From` below.

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelEpoch, ChannelId, VmIdFragment};
use crate::money::AssetAmount;
use crate::subrav::{SignedSubRAV, SubRAV};

/// The wire shape of a [`SubRAV`]: all numeric fields as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSubRav {
    pub version: String,
    pub chain_id: String,
    pub channel_id: String,
    pub channel_epoch: String,
    pub vm_id_fragment: String,
    pub accumulated_amount: String,
    pub nonce: String,
}

/// Errors converting a wire-shape `SubRAV` into the core type.
#[derive(Debug, thiserror::Error)]
pub enum WireSubRavError {
    #[error("invalid version: {0}")]
    Version(std::num::ParseIntError),
    #[error("invalid chainId: {0}")]
    ChainId(std::num::ParseIntError),
    #[error("invalid channelId: {0}")]
    ChannelId(#[from] crate::channel::ChannelIdParseError),
    #[error("invalid channelEpoch: {0}")]
    ChannelEpoch(std::num::ParseIntError),
    #[error("invalid accumulatedAmount: {0}")]
    AccumulatedAmount(crate::money::AssetAmountParseError),
    #[error("invalid nonce: {0}")]
    Nonce(std::num::ParseIntError),
}

impl From<&SubRAV> for WireSubRav {
    fn from(sub_rav: &SubRAV) -> Self {
        WireSubRav {
            version: sub_rav.version.to_string(),
            chain_id: sub_rav.chain_id.to_string(),
            channel_id: sub_rav.channel_id.to_string(),
            channel_epoch: sub_rav.channel_epoch.0.to_string(),
            vm_id_fragment: sub_rav.vm_id_fragment.0.clone(),
            accumulated_amount: sub_rav.accumulated_amount.to_string(),
            nonce: sub_rav.nonce.to_string(),
        }
    }
}

impl TryFrom<&WireSubRav> for SubRAV {
    type Error = WireSubRavError;

    fn try_from(wire: &WireSubRav) -> Result<Self, Self::Error> {
        use std::str::FromStr;
        Ok(SubRAV {
            version: wire.version.parse().map_err(WireSubRavError::Version)?,
            chain_id: wire.chain_id.parse().map_err(WireSubRavError::ChainId)?,
            channel_id: ChannelId::from_str(&wire.channel_id)?,
            channel_epoch: ChannelEpoch(wire.channel_epoch.parse().map_err(WireSubRavError::ChannelEpoch)?),
            vm_id_fragment: VmIdFragment(wire.vm_id_fragment.clone()),
            accumulated_amount: AssetAmount::from_str(&wire.accumulated_amount)
                .map_err(WireSubRavError::AccumulatedAmount)?,
            nonce: wire.nonce.parse().map_err(WireSubRavError::Nonce)?,
        })
    }
}

/// The wire shape of a [`SignedSubRAV`]: `{ subRav: WireSubRav, signature }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSignedSubRav {
    pub sub_rav: WireSubRav,
    pub signature: String,
}

impl From<&SignedSubRAV> for WireSignedSubRav {
    fn from(signed: &SignedSubRAV) -> Self {
        use base64::Engine;
        WireSignedSubRav {
            sub_rav: WireSubRav::from(&signed.sub_rav),
            signature: base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&signed.signature),
        }
    }
}

impl TryFrom<&WireSignedSubRav> for SignedSubRAV {
    type Error = WireSubRavError;

    fn try_from(wire: &WireSignedSubRav) -> Result<Self, Self::Error> {
        use base64::Engine;
        let sub_rav = SubRAV::try_from(&wire.sub_rav)?;
        let signature = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&wire.signature)
            .unwrap_or_default();
        Ok(SignedSubRAV { sub_rav, signature })
    }
}

/// The request payload carried by `X-Payment-Channel-Data` (HTTP) or
/// `__nuwa_payment` (MCP) (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub version: u8,
    pub client_tx_ref: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signed_sub_rav: Option<WireSignedSubRav>,
}

/// A transport-agnostic error body, embedded in [`ResponseEnvelope::error`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message: Option<String>,
}

/// The response payload mirrored back over both transports (spec §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub version: u8,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub client_tx_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub service_tx_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sub_rav: Option<WireSubRav>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cost: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cost_usd: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ErrorBody>,
}

impl ResponseEnvelope {
    pub fn header_value(&self) -> Result<String, serde_json::Error> {
        use base64::Engine;
        let json = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::PicoUsd;
    use std::str::FromStr;

    fn sample_sub_rav() -> SubRAV {
        SubRAV {
            version: 1,
            chain_id: 4,
            channel_id: ChannelId::from_str(&format!("0x{}", "ab".repeat(32))).unwrap(),
            channel_epoch: ChannelEpoch(0),
            vm_id_fragment: VmIdFragment::from("k"),
            accumulated_amount: AssetAmount::from_u128(100_000),
            nonce: 1,
        }
    }

    #[test]
    fn wire_sub_rav_round_trips() {
        let sub_rav = sample_sub_rav();
        let wire = WireSubRav::from(&sub_rav);
        let back = SubRAV::try_from(&wire).unwrap();
        assert_eq!(back, sub_rav);
    }

    #[test]
    fn response_envelope_matches_scenario_1_shape() {
        let mut response = ResponseEnvelope {
            version: 1,
            ..Default::default()
        };
        response.sub_rav = Some(WireSubRav::from(&sample_sub_rav()));
        response.cost = Some("100000".to_string());
        response.cost_usd = Some(PicoUsd(1_000_000_000).to_string());
        let header = response.header_value().unwrap();
        assert!(!header.contains('='));
    }
}
