//! 交易服务在不同版本中把数值字段编码为字符串或数字，这里统一兼容两种形式。

use std::str::FromStr;

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, de};

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Str(String),
    Num(u64),
}

pub mod u256_flexible {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<StringOrNumber>::deserialize(deserializer)? {
            None => Ok(U256::ZERO),
            Some(StringOrNumber::Num(value)) => Ok(U256::from(value)),
            Some(StringOrNumber::Str(raw)) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Ok(U256::ZERO);
                }
                U256::from_str(trimmed)
                    .map_err(|err| de::Error::custom(format!("invalid uint256 {raw:?}: {err}")))
            }
        }
    }
}

pub mod u64_flexible {
    use super::*;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match StringOrNumber::deserialize(deserializer)? {
            StringOrNumber::Num(value) => Ok(value),
            StringOrNumber::Str(raw) => raw
                .trim()
                .parse()
                .map_err(|err| de::Error::custom(format!("invalid integer {raw:?}: {err}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, with = "u256_flexible")]
        value: U256,
        #[serde(with = "u64_flexible")]
        nonce: u64,
    }

    #[test]
    fn accepts_strings_numbers_and_null() {
        let sample: Sample =
            serde_json::from_str(r#"{"value": "1000000000000000000", "nonce": 7}"#).expect("json");
        assert_eq!(sample.value, U256::from(1_000_000_000_000_000_000u64));
        assert_eq!(sample.nonce, 7);

        let sample: Sample = serde_json::from_str(r#"{"value": 5, "nonce": "12"}"#).expect("json");
        assert_eq!(sample.value, U256::from(5));
        assert_eq!(sample.nonce, 12);

        let sample: Sample = serde_json::from_str(r#"{"value": null, "nonce": 0}"#).expect("json");
        assert_eq!(sample.value, U256::ZERO);
    }

    #[test]
    fn rejects_garbage() {
        assert!(serde_json::from_str::<Sample>(r#"{"value": "abc", "nonce": 1}"#).is_err());
        assert!(serde_json::from_str::<Sample>(r#"{"value": "1", "nonce": "x"}"#).is_err());
    }
}
