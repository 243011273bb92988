use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serializer};

/// Cosmos gRPC-gateway JSON encodes 64-bit integers as strings; accept both forms.
#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Str(String),
    Num(u64),
}

impl StringOrNumber {
    fn into_u64<E: DeError>(self) -> Result<u64, E> {
        match self {
            StringOrNumber::Num(n) => Ok(n),
            StringOrNumber::Str(s) if s.is_empty() => Ok(0),
            StringOrNumber::Str(s) => s.parse::<u64>().map_err(E::custom),
        }
    }
}

/// -------- u64 as decimal string (Cosmos JSON convention) --------
pub mod serde_u64_string {
    use super::*;
    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        StringOrNumber::deserialize(d)?.into_u64()
    }
}
