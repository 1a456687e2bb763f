use std::fmt;
use std::str::FromStr;

use blake2::digest::consts::U20;
use blake2::{Blake2b, Digest};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ParseIdError;

type Blake2b160 = Blake2b<U20>;

/// A 20-byte chunk identifier computed as BLAKE2b-160 over the chunk bytes.
///
/// Rendered as 40 lowercase hex characters on every wire and storage surface.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId(pub [u8; 20]);

impl ChunkId {
    /// Compute the id of a chunk from its (decoded) content bytes.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Blake2b160::new();
        hasher.update(data);
        let mut out = [0u8; 20];
        out.copy_from_slice(&hasher.finalize());
        ChunkId(out)
    }

    /// Hex-encode the full chunk id for use as a storage key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First byte as a two-char hex string, used for the shard directory
    /// in the `objects/<2>/<38>` layout.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }
}

impl FromStr for ChunkId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::decode_hex_id("chunk", s).map(ChunkId)
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ChunkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChunkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HexVisitor;

        impl Visitor<'_> for HexVisitor {
            type Value = ChunkId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 40-character hex chunk id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_deterministic() {
        let id1 = ChunkId::compute(b"hello world");
        let id2 = ChunkId::compute(b"hello world");
        assert_eq!(id1, id2);
    }

    #[test]
    fn compute_different_data_different_id() {
        assert_ne!(ChunkId::compute(b"hello"), ChunkId::compute(b"world"));
    }

    #[test]
    fn to_hex_length() {
        assert_eq!(ChunkId::compute(b"test").to_hex().len(), 40);
    }

    #[test]
    fn shard_prefix_is_first_byte() {
        let id = ChunkId([0xAB; 20]);
        assert_eq!(id.shard_prefix(), "ab");
    }

    #[test]
    fn parse_roundtrip() {
        let id = ChunkId::compute(b"roundtrip");
        let parsed: ChunkId = id.to_hex().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!("zz".parse::<ChunkId>().is_err());
        assert!("abcd".parse::<ChunkId>().is_err());
        assert!("g".repeat(40).parse::<ChunkId>().is_err());
    }

    #[test]
    fn serde_uses_hex_strings() {
        let id = ChunkId::compute(b"wire");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_hex()));
        let back: ChunkId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
