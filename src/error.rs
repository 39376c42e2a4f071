use std::fmt;

/// Typed errors for failed insertions.
///
/// Lookups, removals and iteration never fail; a missing key is an
/// ordinary `None`. Insertion is the only fallible operation because the
/// map never grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// Every hash function in the probe family mapped the key to an
    /// occupied slot. Probabilistic and rare: below 2^-50 per insertion at
    /// load factor 0.5 with the default family of 50 hashes.
    ProbesExhausted,
    /// The map already holds its configured maximum number of live
    /// entries. Overwrites of existing keys still succeed.
    CapacityReached,
}

impl fmt::Display for InsertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertError::ProbesExhausted => {
                write!(f, "every probe position for the key is occupied")
            }
            InsertError::CapacityReached => {
                write!(f, "the map is at maximum capacity")
            }
        }
    }
}

impl std::error::Error for InsertError {}
