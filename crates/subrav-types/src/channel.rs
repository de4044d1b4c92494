//! Channel and sub-channel metadata (spec §3: `ChannelInfo`, `SubChannelInfo`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::money::AssetAmount;
use crate::timestamp::UnixTimestamp;

/// A 256-bit channel identifier, carried internally as raw bytes and on the
/// wire as a `0x`-prefixed lowercase hex string (I6).
///
/// Open Question resolution (spec §9): the source material is not uniform on
/// whether `channelId` is a hex string or raw bytes end-to-end. This crate
/// picks raw bytes as the canonical in-memory representation and enforces the
/// 66-char lowercase-hex wire form at parse time, never at encode time (an
/// encoder can always produce a well-formed string from 32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub [u8; 32]);

/// Errors returned when parsing a [`ChannelId`] from its wire representation.
#[derive(Debug, thiserror::Error)]
pub enum ChannelIdParseError {
    #[error("channelId must start with '0x'")]
    MissingPrefix,
    #[error("channelId must be 66 characters (0x + 64 hex digits), got {0}")]
    WrongLength(usize),
    #[error("channelId must be lowercase hex")]
    NotLowercase,
    #[error("channelId is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl ChannelId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for ChannelId {
    type Err = ChannelIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s
            .strip_prefix("0x")
            .ok_or(ChannelIdParseError::MissingPrefix)?;
        if s.len() != 66 {
            return Err(ChannelIdParseError::WrongLength(s.len()));
        }
        if stripped.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(ChannelIdParseError::NotLowercase);
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(stripped, &mut bytes)?;
        Ok(ChannelId(bytes))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({self})")
    }
}

impl Serialize for ChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ChannelId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// The verification-method fragment naming one of the payer's DID keys
/// (e.g. `"k"` in `did:example:abcd#k`). Together with `ChannelId` this
/// identifies a sub-channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VmIdFragment(pub String);

impl fmt::Display for VmIdFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VmIdFragment {
    fn from(value: &str) -> Self {
        VmIdFragment(value.to_string())
    }
}

impl From<String> for VmIdFragment {
    fn from(value: String) -> Self {
        VmIdFragment(value)
    }
}

/// Monotonic epoch counter for a channel. Bumped by the contract whenever a
/// channel is re-opened or its sub-channel set is renegotiated; a SubRAV
/// whose `channelEpoch` doesn't match the channel's current epoch is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelEpoch(pub u64);

/// Lifecycle status of a channel, as reported by the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Active,
    Closing,
    Closed,
}

/// Channel metadata as reported by the on-chain contract (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub channel_id: ChannelId,
    pub payer_did: String,
    pub payee_did: String,
    pub asset_id: String,
    pub chain_id: u64,
    pub epoch: ChannelEpoch,
    pub status: ChannelStatus,
}

/// The last on-chain-confirmed state of one payer key inside one channel
/// (spec §3: `SubChannelInfo`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubChannelInfo {
    pub channel_id: ChannelId,
    pub vm_id_fragment: VmIdFragment,
    pub epoch: ChannelEpoch,
    pub last_claimed_amount: AssetAmount,
    pub last_confirmed_nonce: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub public_key: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub method_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_updated: Option<UnixTimestamp>,
}
