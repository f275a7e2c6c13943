//! Strongly-typed identifiers for Strata entities.
//!
//! All identifiers in Strata are:
//! - **Strongly typed**: Prevents mixing up different ID types at compile time
//! - **Lexicographically sortable**: ULIDs encode creation time and sort naturally
//! - **Globally unique**: No coordination required for generation
//!
//! The string form carries a stable prefix (`utid-`, `doc-`) so that a raw
//! evidence file remains self-describing to an operator reading it with
//! nothing but a pager.
//!
//! # Example
//!
//! ```rust
//! use strata_core::id::{DocId, Utid};
//!
//! let utid = Utid::generate();
//! assert!(utid.to_string().starts_with("utid-"));
//!
//! let doc = DocId::generate();
//! assert!(doc.to_string().starts_with("doc-"));
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Error, Result};

/// A Unified Trace Identifier.
///
/// One UTID is minted per execution attempt (including replays) and is the
/// primary key of exactly one evidence record. UTIDs are born in the
/// orchestrator and never regenerated downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Utid(Ulid);

impl Utid {
    /// String prefix used in the serialized form.
    pub const PREFIX: &'static str = "utid-";

    /// Generates a new unique trace ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a trace ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Returns the creation timestamp encoded in the ID.
    #[must_use]
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        let ms = self.0.timestamp_ms();
        chrono::DateTime::from_timestamp_millis(i64::try_from(ms).unwrap_or_default())
            .unwrap_or_else(chrono::Utc::now)
    }
}

impl fmt::Display for Utid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl FromStr for Utid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid trace ID '{s}': {e}"),
            })
    }
}

impl Serialize for Utid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Utid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// A source document identifier.
///
/// Minted once when a source artifact enters the raw zone, then inherited
/// downstream (facts, semantic projections, retrieval outputs) to prove
/// provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocId(Ulid);

impl DocId {
    /// String prefix used in the serialized form.
    pub const PREFIX: &'static str = "doc-";

    /// Generates a new unique document ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a document ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", Self::PREFIX, self.0)
    }
}

impl FromStr for DocId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.strip_prefix(Self::PREFIX).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid document ID '{s}': {e}"),
            })
    }
}

impl Serialize for DocId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DocId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utid_roundtrip_with_prefix() {
        let id = Utid::generate();
        let s = id.to_string();
        assert!(s.starts_with("utid-"));
        let parsed: Utid = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn utid_parses_bare_ulid() {
        let id = Utid::generate();
        let bare = id.as_ulid().to_string();
        let parsed: Utid = bare.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn utids_are_unique() {
        assert_ne!(Utid::generate(), Utid::generate());
    }

    #[test]
    fn doc_id_roundtrip() {
        let id = DocId::generate();
        let parsed: DocId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn invalid_id_returns_error() {
        let result: Result<Utid> = "utid-not-a-ulid".parse();
        assert!(result.is_err());
    }

    #[test]
    fn serde_uses_prefixed_string() {
        let id = Utid::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert!(json.contains("utid-"));
        let back: Utid = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
