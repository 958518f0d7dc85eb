//! RecordHash: BLAKE3 of a record's bytes, truncated to 128 bits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Hex length of a record hash.
pub const HASH_HEX_LEN: usize = 32;

/// Address of a stored record: 16 bytes of BLAKE3, lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordHash(String);

#[derive(Debug, Error, PartialEq)]
pub enum HashError {
    #[error("invalid record hash length: expected {HASH_HEX_LEN} hex chars, got {0}")]
    InvalidLength(usize),

    #[error("invalid hex character in record hash")]
    InvalidHex,
}

impl RecordHash {
    pub fn of(data: &[u8]) -> Self {
        let digest = blake3::hash(data);
        Self(hex::encode(&digest.as_bytes()[..HASH_HEX_LEN / 2]))
    }

    pub fn parse(s: &str) -> Result<Self, HashError> {
        if s.len() != HASH_HEX_LEN {
            return Err(HashError::InvalidLength(s.len()));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Shard directory name.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }

    /// File name within the shard.
    pub fn leaf(&self) -> &str {
        &self.0[2..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
