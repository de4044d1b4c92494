//! Base64url helpers shared by the HTTP/MCP envelope codec and the wire
//! representation of signature bytes.
//!
//! Grounded on the teacher's `x402_types::util::b64::Base64Bytes`, but using
//! the unpadded URL-safe alphabet the spec's envelope requires (§6:
//! `base64url(...)`, no padding) instead of standard base64.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as b64url;
use std::borrow::Cow;
use std::fmt::Display;

/// A wrapper for base64url-encoded (no padding) byte data, used for the
/// whole-envelope `X-Payment-Channel-Data` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64UrlBytes<'a>(pub Cow<'a, [u8]>);

impl Base64UrlBytes<'_> {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64url.decode(&self.0)
    }

    pub fn encode<T: AsRef<[u8]>>(input: T) -> Base64UrlBytes<'static> {
        let encoded = b64url.encode(input.as_ref());
        Base64UrlBytes(Cow::Owned(encoded.into_bytes()))
    }
}

impl AsRef<[u8]> for Base64UrlBytes<'_> {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Display for Base64UrlBytes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.0.as_ref()))
    }
}

/// `serde(with = "...")` helper that serializes a `Vec<u8>` field (such as a
/// signature) as a base64url string, matching the spec's
/// `"signature": "<base64url>"` wire shape.
pub mod b64url_bytes {
    use super::b64url;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&b64url.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        b64url.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64url_round_trips_without_padding() {
        let encoded = Base64UrlBytes::encode(b"hello world");
        assert!(!encoded.to_string().contains('='));
        let decoded = encoded.decode().unwrap();
        assert_eq!(decoded, b"hello world");
    }
}
