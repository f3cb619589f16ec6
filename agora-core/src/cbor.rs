// SPDX-License-Identifier: MIT OR Apache-2.0

//! [CBOR] encoding of command payloads, stored rows and pairing messages.
//!
//! Every encoded value stands on its own: a log entry payload, a row or a message is exactly one
//! CBOR item. Decoding consumes the whole input and fails when bytes are left after the item.
//!
//! [CBOR]: https://cbor.io/
use std::io::ErrorKind;

use ciborium::de::Error as DeserializeError;
use ciborium::ser::Error as SerializeError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Encode a single value.
pub fn encode_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)?;
    Ok(bytes)
}

/// Decode exactly one value from `bytes`.
pub fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, DecodeError> {
    let mut remaining = bytes;
    let value = ciborium::de::from_reader(&mut remaining)?;
    if !remaining.is_empty() {
        return Err(DecodeError::TrailingBytes(remaining.len()));
    }
    Ok(value)
}

/// A value could not be encoded.
///
/// Writing into memory never fails, this is always a value serde refused to serialize.
#[derive(Debug, Error)]
#[error("failed encoding value: {0}")]
pub struct EncodeError(String);

impl From<SerializeError<std::io::Error>> for EncodeError {
    fn from(value: SerializeError<std::io::Error>) -> Self {
        match value {
            SerializeError::Io(err) => Self(err.to_string()),
            SerializeError::Value(description) => Self(description),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("input ended in the middle of a value")]
    Truncated,

    #[error("malformed item at byte {0}")]
    Syntax(usize),

    /// Well-formed CBOR which does not match the expected type.
    #[error("unexpected value at byte {0:?}: {1}")]
    Semantic(Option<usize>, String),

    #[error("value is nested too deeply")]
    RecursionLimitExceeded,

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error(transparent)]
    Io(std::io::Error),
}

impl From<DeserializeError<std::io::Error>> for DecodeError {
    fn from(value: DeserializeError<std::io::Error>) -> Self {
        match value {
            DeserializeError::Io(err) if err.kind() == ErrorKind::UnexpectedEof => Self::Truncated,
            DeserializeError::Io(err) => Self::Io(err),
            DeserializeError::Syntax(offset) => Self::Syntax(offset),
            DeserializeError::Semantic(offset, description) => Self::Semantic(offset, description),
            DeserializeError::RecursionLimitExceeded => Self::RecursionLimitExceeded,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde::{Deserialize, Serialize};

    use super::{DecodeError, decode_cbor, encode_cbor};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Channel {
        id: String,
        position: u32,
    }

    fn general() -> Channel {
        Channel {
            id: "general".into(),
            position: 3,
        }
    }

    #[test]
    fn decodes_single_values() {
        let bytes = encode_cbor(&general()).unwrap();
        assert_eq!(decode_cbor::<Channel>(&bytes).unwrap(), general());
    }

    #[test]
    fn rejects_trailing_bytes() {
        // Two payloads written back to back are not one entry.
        let mut bytes = encode_cbor(&general()).unwrap();
        bytes.extend(encode_cbor(&7u8).unwrap());
        assert_matches!(
            decode_cbor::<Channel>(&bytes),
            Err(DecodeError::TrailingBytes(1))
        );
    }

    #[test]
    fn reports_truncated_and_mistyped_input() {
        let bytes = encode_cbor(&general()).unwrap();
        assert_matches!(
            decode_cbor::<Channel>(&bytes[..bytes.len() - 2]),
            Err(DecodeError::Truncated)
        );
        assert_matches!(decode_cbor::<Channel>(&[]), Err(DecodeError::Truncated));
        assert_matches!(
            decode_cbor::<Channel>(&encode_cbor("general").unwrap()),
            Err(DecodeError::Semantic(..))
        );
    }
}
