use std::fmt;
use std::str::FromStr;

use blake2::digest::consts::U20;
use blake2::{Blake2b, Digest};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ParseIdError;

type Blake2b160 = Blake2b<U20>;

/// A 20-byte snapshot identifier: BLAKE2b-160 over the snapshot's canonical
/// header (parent, creation time, memo, file-id lists). 40 hex chars on disk;
/// refs store exactly this textual form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId(pub [u8; 20]);

impl SnapshotId {
    /// Compute a snapshot id from a caller-assembled canonical byte buffer.
    pub fn compute(canonical: &[u8]) -> Self {
        let mut hasher = Blake2b160::new();
        hasher.update(canonical);
        let mut out = [0u8; 20];
        out.copy_from_slice(&hasher.finalize());
        SnapshotId(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for SnapshotId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::decode_hex_id("snapshot", s).map(SnapshotId)
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for SnapshotId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SnapshotId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HexVisitor;

        impl Visitor<'_> for HexVisitor {
            type Value = SnapshotId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 40-character hex snapshot id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}
