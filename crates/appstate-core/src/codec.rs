//! Value codec.
//!
//! Values are stored as opaque byte blobs; the codec turns application values
//! into those blobs and back. Content hashes are computed over the encoded
//! bytes, so a codec must be deterministic: equal logical values must encode
//! to equal bytes. Use ordered collections (`BTreeMap`, `Vec`) rather than
//! `HashMap` in values shared through the store.

use appstate_proto::ContentHash;
use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

/// Codec failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Value could not be encoded.
    #[error("failed to encode value: {0}")]
    Encode(String),

    /// Bytes could not be decoded as the requested type.
    #[error("failed to decode value: {0}")]
    Decode(String),
}

/// Serializes application values to stored bytes.
pub trait Codec: Clone + Send + Sync + 'static {
    /// Encode a value.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, CodecError>;

    /// Decode a value.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;

    /// Content hash of a value's encoding.
    fn hash_value<T: Serialize>(&self, value: &T) -> Result<ContentHash, CodecError> {
        Ok(ContentHash::of(&self.encode(value)?))
    }
}

/// CBOR codec backed by `ciborium`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl Codec for CborCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, CodecError> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(value, &mut buf).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(Bytes::from(buf))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        ciborium::de::from_reader(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
