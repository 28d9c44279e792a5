use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::DocumentError;

/// SHA-256 of the empty string, the hash of the "no block yet" cursor.
pub const EMPTY_HASH: &str = "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855";

/// A (height, hash) pair identifying a block. Used as the reconciliation cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockUid {
    pub number: u64,
    pub hash: String,
}

impl BlockUid {
    pub fn new(number: u64, hash: impl Into<String>) -> Self {
        Self {
            number,
            hash: hash.into(),
        }
    }

    /// Cursor of a chain with no current block.
    pub fn empty() -> Self {
        Self::new(0, EMPTY_HASH)
    }

    pub fn is_empty(&self) -> bool {
        self.number == 0 && self.hash == EMPTY_HASH
    }
}

impl Default for BlockUid {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialOrd for BlockUid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BlockUid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl fmt::Display for BlockUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.number, self.hash)
    }
}

impl FromStr for BlockUid {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DocumentError::InvalidField {
            field: "BlockUID",
            value: s.to_string(),
        };
        let (number, hash) = s.split_once('-').ok_or_else(invalid)?;
        let number = number.parse::<u64>().map_err(|_| invalid())?;
        if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        Ok(Self::new(number, hash.to_ascii_uppercase()))
    }
}

// Stored and exchanged in its textual "number-HASH" form.
impl Serialize for BlockUid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlockUid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
