//! Serde adapters for the JSON snapshot format.

/// `Pubkey` as a base58 string.
pub mod pubkey_str {
    use std::str::FromStr;

    use anchor_lang::prelude::Pubkey;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(key)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Pubkey::from_str(&raw).map_err(|e| de::Error::custom(format!("{raw}: {e}")))
    }
}

/// Unix milliseconds as an ISO-8601 string; date-only input is accepted.
pub mod iso_millis {
    use serde::{de, ser, Deserialize, Deserializer, Serializer};

    use crate::utils::time;

    pub fn serialize<S: Serializer>(ts_ms: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        let text = time::format_iso8601(*ts_ms)
            .map_err(|e| ser::Error::custom(format!("{ts_ms}: {e}")))?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        time::parse_timestamp(&raw).map_err(|e| de::Error::custom(format!("{raw}: {e}")))
    }
}
