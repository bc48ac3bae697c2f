//! Binary encoding of entities.
//!
//! Entities encode to CBOR together with their lifecycle entry, so a decoded
//! instance reports exactly the state flags it was encoded with.

use super::instance::Entity;
use crate::error::{CoreError, CoreResult};

impl Entity {
    /// Encodes the entity, including lifecycle and security state, as CBOR.
    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| CoreError::codec(format!("encode {}: {e}", self.identity())))?;
        Ok(buf)
    }

    /// Decodes an entity produced by [`Entity::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        ciborium::de::from_reader(bytes).map_err(|e| CoreError::codec(format!("decode: {e}")))
    }
}
