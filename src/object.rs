//! Small-object metadata stored as data file values.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity and size of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object identifier
    pub object_id: u64,
    /// Object size in bytes
    pub size: u64,
}

impl ObjectMeta {
    /// Create a new ObjectMeta
    pub fn new(object_id: u64, size: u64) -> Self {
        Self { object_id, size }
    }

    /// Encode with bincode.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a value produced by `encode`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

impl fmt::Display for ObjectMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object id: {}, size: {}", self.object_id, self.size)
    }
}
