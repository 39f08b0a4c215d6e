use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Payload encoding for tag samples carried over Zenoh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON (human-readable, the default).
    #[default]
    Json,

    /// CBOR (compact binary).
    Cbor,
}

impl Format {
    /// Guess the format of a payload: JSON documents start with `{` or `[`.
    pub fn detect(data: &[u8]) -> Format {
        match data.first() {
            Some(b'{') | Some(b'[') => Format::Json,
            _ => Format::Cbor,
        }
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Format::Json => Ok(serde_json::to_vec(value)?),
            Format::Cbor => {
                let mut buf = Vec::new();
                ciborium::into_writer(value, &mut buf)?;
                Ok(buf)
            }
        }
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T> {
        match self {
            Format::Json => Ok(serde_json::from_slice(data)?),
            Format::Cbor => ciborium::from_reader(data).map_err(|e| Error::Cbor(e.to_string())),
        }
    }
}

/// Encode a value with the given format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    format.encode(value)
}

/// Decode a payload whose format is detected from its first byte.
pub fn decode_auto<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    Format::detect(data).decode(data)
}
