//! Content fingerprints for compiled trees and fixture plans

use sha2::{Sha256, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// SHA256 fingerprint of serialized content
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Compute checksum from a string
    pub fn from_str(content: &str) -> Self {
        Self::from_bytes(content.as_bytes())
    }

    /// Fingerprint any serializable value.
    ///
    /// The value goes through `serde_json::Value` first, whose maps are
    /// key-sorted, so field order never changes the result.
    pub fn of<T: Serialize>(value: &T) -> Result<Self> {
        let canonical = serde_json::to_value(value)?;
        Ok(Self::from_bytes(&serde_json::to_vec(&canonical)?))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for log lines and CLI output
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }

    /// Verify that a value still hashes to this checksum
    pub fn verify<T: Serialize>(&self, value: &T) -> Result<bool> {
        Ok(Self::of(value)? == *self)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}
