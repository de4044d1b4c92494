//! The canonical binary encoding of a [`SubRAV`] (spec §6): big-endian
//! fixed-width integers and length-prefixed strings, in declared field
//! order. Two encoders must produce byte-identical output for equal
//! structs (I4); the only variable-width field is `vmIdFragment`.

use subrav_types::channel::{ChannelEpoch, ChannelId, VmIdFragment};
use subrav_types::money::AssetAmount;
use subrav_types::subrav::{SUPPORTED_VERSIONS, SubRAV};

use crate::error::DecodeError;

/// Serializes `sub_rav` to its canonical byte layout.
///
/// Encoding an unsupported version is permitted (spec §4.1: forward-compatible
/// proposers negotiate by having their peer reject it on decode); the gate
/// lives entirely in [`decode`].
pub fn encode(sub_rav: &SubRAV) -> Vec<u8> {
    let vm_id_bytes = sub_rav.vm_id_fragment.0.as_bytes();
    let mut out = Vec::with_capacity(1 + 8 + 32 + 8 + 4 + vm_id_bytes.len() + 32 + 8);

    out.push(sub_rav.version);
    out.extend_from_slice(&sub_rav.chain_id.to_be_bytes());
    out.extend_from_slice(sub_rav.channel_id.as_bytes());
    out.extend_from_slice(&sub_rav.channel_epoch.0.to_be_bytes());
    out.extend_from_slice(&(vm_id_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(vm_id_bytes);
    out.extend_from_slice(&sub_rav.accumulated_amount.0.to_be_bytes::<32>());
    out.extend_from_slice(&sub_rav.nonce.to_be_bytes());

    out
}

/// Parses `bytes` into a [`SubRAV`], enforcing the version gate (I5/P7)
/// before any other field is interpreted.
pub fn decode(bytes: &[u8]) -> Result<SubRAV, DecodeError> {
    let mut cursor = Cursor::new(bytes);

    let version = cursor.read_u8()?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let chain_id = cursor.read_u64()?;
    let channel_id = ChannelId::from_bytes(cursor.read_array::<32>()?);
    let channel_epoch = ChannelEpoch(cursor.read_u64()?);

    let vm_id_len = cursor.read_u32()? as usize;
    let vm_id_bytes = cursor.read_slice(vm_id_len)?;
    let vm_id_fragment = VmIdFragment(
        String::from_utf8(vm_id_bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8)?,
    );

    let accumulated_amount = AssetAmount(alloy_primitives::U256::from_be_bytes(cursor.read_array::<32>()?));
    let nonce = cursor.read_u64()?;

    if !cursor.is_empty() {
        return Err(DecodeError::TrailingBytes);
    }

    Ok(SubRAV {
        version,
        chain_id,
        channel_id,
        channel_epoch,
        vm_id_fragment,
        accumulated_amount,
        nonce,
    })
}

/// A minimal read cursor over a byte slice, tracking position and failing
/// with [`DecodeError::Truncated`] on short reads.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.bytes.len() - self.pos;
        if remaining < len {
            return Err(DecodeError::Truncated { needed: len, got: remaining });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let slice = self.read_slice(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_array::<1>()?[0])
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_be_bytes(self.read_array::<4>()?))
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.read_array::<8>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample() -> SubRAV {
        SubRAV {
            version: 1,
            chain_id: 4,
            channel_id: ChannelId::from_str(&format!("0x{}", "cd".repeat(32))).unwrap(),
            channel_epoch: ChannelEpoch(3),
            vm_id_fragment: VmIdFragment::from("account-key"),
            accumulated_amount: AssetAmount::from_u128(100_000),
            nonce: 7,
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let sub_rav = sample();
        let bytes = encode(&sub_rav);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, sub_rav);
    }

    #[test]
    fn channel_id_is_always_32_bytes_in_the_wire_layout() {
        let bytes = encode(&sample());
        // version(1) + chainId(8) + channelId(32) + epoch(8) = 49 before the
        // length-prefixed vmIdFragment begins.
        assert_eq!(&bytes[9..41].len(), &32);
    }

    #[test]
    fn decode_rejects_unsupported_version_before_anything_else() {
        let mut bytes = encode(&sample());
        bytes[0] = 99;
        assert!(matches!(decode(&bytes), Err(DecodeError::UnsupportedVersion(99))));
    }

    #[test]
    fn decode_rejects_truncated_payload() {
        let bytes = encode(&sample());
        assert!(matches!(decode(&bytes[..10]), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let mut bytes = encode(&sample());
        bytes.push(0);
        assert!(matches!(decode(&bytes), Err(DecodeError::TrailingBytes)));
    }
}
