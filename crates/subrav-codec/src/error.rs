//! Decode-time errors (spec §4.1, §6, I4/I5/I6).

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("payload too short: need at least {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),
    #[error("vmIdFragment is not valid utf8")]
    InvalidUtf8,
    #[error("trailing bytes after decoding a complete SubRAV")]
    TrailingBytes,
}
