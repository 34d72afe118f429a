//! Hex serde helpers for byte fields on JSON wire messages.
//!
//! Wire messages carry nonces, keys, signatures, and proofs as lowercase
//! hex strings rather than JSON byte arrays.

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&hex::encode(bytes))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    hex::decode(&s).map_err(serde::de::Error::custom)
}

/// Same encoding for `Option<Vec<u8>>` fields.
pub mod opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(b) => serializer.serialize_some(&hex::encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) => hex::decode(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        data: Vec<u8>,
        #[serde(with = "super::opt", default, skip_serializing_if = "Option::is_none")]
        maybe: Option<Vec<u8>>,
    }

    #[test]
    fn encodes_as_hex_string() {
        let w = Wrapper {
            data: vec![0xde, 0xad],
            maybe: None,
        };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, r#"{"data":"dead"}"#);
    }

    #[test]
    fn decodes_optional_field() {
        let w: Wrapper = serde_json::from_str(r#"{"data":"00ff","maybe":"0102"}"#).unwrap();
        assert_eq!(w.data, vec![0x00, 0xff]);
        assert_eq!(w.maybe, Some(vec![0x01, 0x02]));
    }

    #[test]
    fn rejects_bad_hex() {
        let result: Result<Wrapper, _> = serde_json::from_str(r#"{"data":"zz"}"#);
        assert!(result.is_err());
    }
}
