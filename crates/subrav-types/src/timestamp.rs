//! Unix timestamp type used for `PendingProposal::createdAt` and similar
//! bookkeeping fields.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::ops::Add;
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch. Serializes as a stringified integer so that
/// JSON consumers that represent numbers as `f64` (e.g. JavaScript) never
/// lose precision on far-future timestamps.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Ord, Eq)]
pub struct UnixTimestamp(pub u64);

impl UnixTimestamp {
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs();
        UnixTimestamp(secs)
    }

    pub fn from_secs(secs: u64) -> Self {
        UnixTimestamp(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }
}

impl Add<u64> for UnixTimestamp {
    type Output = UnixTimestamp;
    fn add(self, rhs: u64) -> UnixTimestamp {
        UnixTimestamp(self.0 + rhs)
    }
}

impl Display for UnixTimestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for UnixTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for UnixTimestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let ts = s.parse::<u64>().map_err(serde::de::Error::custom)?;
        Ok(UnixTimestamp(ts))
    }
}
