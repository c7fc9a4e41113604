//! Block identifiers delivered by the block source.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// 32-byte opaque block identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// All-zero hash, used as the parent of a synthetic genesis block
    pub const ZERO: Self = Self([0u8; 32]);

    /// Wrap raw hash bytes
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a 64-character hex string
    pub fn from_hex(s: &str) -> Result<Self, ContractError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| ContractError::Other(format!("invalid block hash '{s}': {e}")))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({self})")
    }
}

impl From<[u8; 32]> for BlockHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// New-block notification: height plus block identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEpoch {
    pub height: u32,
    pub hash: BlockHash,
}

impl BlockEpoch {
    pub fn new(height: u32, hash: BlockHash) -> Self {
        Self { height, hash }
    }
}
