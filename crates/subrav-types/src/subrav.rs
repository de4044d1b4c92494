//! `SubRAV`, `SignedSubRAV`, and `PendingProposal` (spec §3).

use serde::{Deserialize, Serialize};

use crate::channel::{ChannelEpoch, ChannelId, VmIdFragment};
use crate::money::AssetAmount;
use crate::timestamp::UnixTimestamp;

/// Protocol versions this workspace accepts when decoding a `SubRAV` (I5).
///
/// Encoding an unsupported version is permitted (forward-compatible
/// proposers negotiate by having their peer reject it); decoding is where
/// the gate is enforced, in `subrav-codec`.
pub const SUPPORTED_VERSIONS: &[u8] = &[1];

/// A Sub-channel Receipt And Voucher: an immutable, cumulative-balance
/// receipt for one sub-channel at one nonce (spec §3).
///
/// Constructed once and never mutated; superseding state is represented by
/// constructing a new `SubRAV` via [`SubRAV::next`], never by mutating this
/// one in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRAV {
    pub version: u8,
    pub chain_id: u64,
    pub channel_id: ChannelId,
    pub channel_epoch: ChannelEpoch,
    pub vm_id_fragment: VmIdFragment,
    pub accumulated_amount: AssetAmount,
    pub nonce: u64,
}

impl SubRAV {
    /// Builds the nonce-0, amount-0 handshake `SubRAV` a payer signs on its
    /// very first call over a newly opened sub-channel (spec §4.4).
    pub fn handshake(
        chain_id: u64,
        channel_id: ChannelId,
        channel_epoch: ChannelEpoch,
        vm_id_fragment: VmIdFragment,
    ) -> Self {
        SubRAV {
            version: 1,
            chain_id,
            channel_id,
            channel_epoch,
            vm_id_fragment,
            accumulated_amount: AssetAmount::ZERO,
            nonce: 0,
        }
    }

    /// Returns `true` for the nonce-0, amount-0 handshake receipt, which the
    /// payee treats as a liveness proof rather than a billable event.
    pub fn is_handshake(&self) -> bool {
        self.nonce == 0 && self.accumulated_amount == AssetAmount::ZERO
    }

    /// Builds the next proposal in sequence: same channel identity, nonce
    /// incremented by one, accumulated amount increased by `cost` (I2).
    pub fn next(&self, cost: AssetAmount) -> Self {
        SubRAV {
            version: self.version,
            chain_id: self.chain_id,
            channel_id: self.channel_id,
            channel_epoch: self.channel_epoch,
            vm_id_fragment: self.vm_id_fragment.clone(),
            accumulated_amount: self.accumulated_amount + cost,
            nonce: self.nonce + 1,
        }
    }
}

/// A [`SubRAV`] together with the payer's signature over its canonical
/// encoding (produced by `subrav-codec::sign`, verified by
/// `subrav-codec::verify`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedSubRAV {
    pub sub_rav: SubRAV,
    #[serde(with = "crate::util::b64url_bytes")]
    pub signature: Vec<u8>,
}

/// A payee-emitted, unsigned next `SubRAV` awaiting the payer's signature on
/// the next request (spec §3). At most one per `(channelId, vmIdFragment)`
/// (I2/P3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingProposal {
    pub channel_id: ChannelId,
    pub vm_id_fragment: VmIdFragment,
    pub nonce: u64,
    pub accumulated_amount: AssetAmount,
    pub epoch: ChannelEpoch,
    pub created_at: UnixTimestamp,
}

impl PendingProposal {
    /// Builds the pending proposal that corresponds to an emitted unsigned
    /// `next_sub_rav`.
    pub fn from_sub_rav(sub_rav: &SubRAV, created_at: UnixTimestamp) -> Self {
        PendingProposal {
            channel_id: sub_rav.channel_id,
            vm_id_fragment: sub_rav.vm_id_fragment.clone(),
            nonce: sub_rav.nonce,
            accumulated_amount: sub_rav.accumulated_amount,
            epoch: sub_rav.channel_epoch,
            created_at,
        }
    }

    /// Whether a submitted signed `SubRAV` matches this pending proposal
    /// exactly on the fields that must agree (spec §4.4 step A).
    pub fn matches(&self, sub_rav: &SubRAV) -> bool {
        self.channel_id == sub_rav.channel_id
            && self.vm_id_fragment == sub_rav.vm_id_fragment
            && self.nonce == sub_rav.nonce
            && self.accumulated_amount == sub_rav.accumulated_amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_channel_id() -> ChannelId {
        "0x".to_string()
            .chars()
            .chain("aa".repeat(32).chars())
            .collect::<String>()
            .parse()
            .unwrap()
    }

    #[test]
    fn handshake_is_recognized_and_next_increments_nonce_and_amount() {
        let channel_id = sample_channel_id();
        let handshake = SubRAV::handshake(4, channel_id, ChannelEpoch(0), VmIdFragment::from("k"));
        assert!(handshake.is_handshake());

        let next = handshake.next(AssetAmount::from_u128(100_000));
        assert_eq!(next.nonce, 1);
        assert_eq!(next.accumulated_amount, AssetAmount::from_u128(100_000));
        assert_eq!(next.channel_id, handshake.channel_id);
        assert!(!next.is_handshake());
    }

    #[test]
    fn pending_proposal_matches_exact_nonce_and_amount() {
        let channel_id = sample_channel_id();
        let sub_rav = SubRAV {
            version: 1,
            chain_id: 4,
            channel_id,
            channel_epoch: ChannelEpoch(0),
            vm_id_fragment: VmIdFragment::from("k"),
            accumulated_amount: AssetAmount::from_u128(100_000),
            nonce: 1,
        };
        let pending = PendingProposal::from_sub_rav(&sub_rav, UnixTimestamp::from_secs(0));
        assert!(pending.matches(&sub_rav));

        let tampered = SubRAV {
            accumulated_amount: AssetAmount::from_u128(99_999),
            ..sub_rav
        };
        assert!(!pending.matches(&tampered));
    }
}
