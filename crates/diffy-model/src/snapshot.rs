//! Configuration snapshot identifiers
//!
//! Provides [`SnapshotId`], a 32-byte BLAKE3 digest identifying the exact set of
//! noise rules and transformations an analysis ran with.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Content hash of a configuration snapshot
///
/// Two snapshots built from identical rules share the same id, so a stored
/// result can be reproduced given the id of the configuration it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId([u8; 32]);

impl SnapshotId {
    /// Create from raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Id of the empty configuration (no rules, no transformations)
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::compute(b"")
    }

    /// Raw digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hash arbitrary bytes
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash the JSON encoding of a serializable value
    ///
    /// # Errors
    /// Returns error if the value cannot be encoded as JSON
    pub fn compute_serializable<T>(value: &T) -> Result<Self, SnapshotIdError>
    where
        T: serde::Serialize + ?Sized,
    {
        let json = serde_json::to_vec(value)?;
        Ok(Self::compute(&json))
    }

    /// First 16 hex chars, for logs
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for SnapshotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for SnapshotId {
    type Err = SnapshotIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SnapshotIdError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }
}

impl serde::Serialize for SnapshotId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for SnapshotId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors when computing or parsing a [`SnapshotId`]
#[derive(Debug, thiserror::Error)]
pub enum SnapshotIdError {
    /// Decoded digest is not 32 bytes
    #[error("invalid snapshot id length: expected 32 bytes, got {0}")]
    InvalidLength(usize),

    /// Not valid hex
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),

    /// Value could not be encoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_id_deterministic() {
        let a = SnapshotId::compute_serializable(&vec!["ts", "items[*].id"]).unwrap();
        let b = SnapshotId::compute_serializable(&vec!["ts", "items[*].id"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn snapshot_id_differs_with_content() {
        let a = SnapshotId::compute(b"rules-1");
        let b = SnapshotId::compute(b"rules-2");
        assert_ne!(a, b);
    }

    #[test]
    fn snapshot_id_display_and_parse() {
        let id = SnapshotId::compute(b"rules");
        let parsed: SnapshotId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn snapshot_id_rejects_short_hex() {
        let result: Result<SnapshotId, _> = "abcd".parse();
        assert!(matches!(result, Err(SnapshotIdError::InvalidLength(2))));
    }

    #[test]
    fn snapshot_id_short_is_prefix() {
        let id = SnapshotId::compute(b"rules");
        assert_eq!(id.short().len(), 16);
        assert!(id.to_string().starts_with(&id.short()));
    }

    #[test]
    fn snapshot_id_serde_as_hex_string() {
        let id = SnapshotId::empty();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json.len(), 66);
        let decoded: SnapshotId = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, id);
    }
}
