use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{KoineError, KoineResult};

/// An instant truncated to whole seconds since the Unix epoch.
///
/// Memento datetimes carry second precision, so every instant entering the
/// index is truncated before storage and compared as a plain integer. The
/// sentinels below take part in equality joins and must stay bit-stable.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// End instant of rows that are still asserted: 9999-12-31T23:59:59Z.
    pub const NO_END: Timestamp = Timestamp(253_402_300_799);

    /// Start instant meaning "the beginning of time": 1000-01-01T00:00:00Z.
    pub const NO_START: Timestamp = Timestamp(-30_610_224_000);

    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        Self(secs)
    }

    pub fn from_secs(value: i64) -> Self {
        Self(value)
    }

    pub fn as_secs(self) -> i64 {
        self.0
    }

    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        Self(value.timestamp())
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.0, 0).unwrap_or_default()
    }

    pub fn parse_rfc3339(value: &str) -> KoineResult<Self> {
        let parsed = DateTime::parse_from_rfc3339(value)
            .map_err(|err| KoineError::invalid(format!("invalid instant '{value}': {err}")))?;
        Ok(Self(parsed.timestamp()))
    }

    pub fn to_rfc3339(self) -> String {
        self.to_datetime().format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Ok(Timestamp(value))
    }
}
