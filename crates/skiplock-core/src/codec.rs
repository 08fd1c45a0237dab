//! Opaque payload encoding.
//!
//! `arguments` and `result` are stored as opaque bytes; a
//! [`PayloadCodec`] is the decode hook producers and workers use to get a
//! typed view without the store itself needing to know about user types.

use crate::error::StoreError;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes/decodes the opaque `arguments`/`result` byte columns.
///
/// Generic methods keep this off the object-safety boundary on purpose —
/// callers reach for a concrete codec (usually [`JsonCodec`]) rather than a
/// trait object, since a `Box<dyn PayloadCodec>` couldn't offer `encode<T>`.
pub trait PayloadCodec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StoreError>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError>;

    /// Encode a type-erased value. Workers return `Box<dyn erased_serde::Serialize>`
    /// (see [`crate::job::JobOutput`]) since their result type varies per
    /// queue; this is the hook that turns one into opaque bytes without the
    /// handler ever naming a concrete `T`.
    fn encode_erased(&self, value: &dyn erased_serde::Serialize) -> Result<Vec<u8>, StoreError> {
        let mut buf = Vec::new();
        let mut ser = serde_json::Serializer::new(&mut buf);
        erased_serde::serialize(value, &mut ser).map_err(|e| StoreError::Encode(e.to_string()))?;
        Ok(buf)
    }
}

/// Default codec: plain JSON via `serde_json`, matching the opaque
/// `JSONB`/`json::RawMessage` payload columns the store persists.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(value).map_err(|e| StoreError::Encode(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Decode(e.to_string()))
    }
}
