//! Content hashing for staleness detection.
//!
//! Hashes are change detectors, not a security boundary. XXH3 runs per
//! declaration on every compile.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs::Metadata;
use std::str::FromStr;
use std::time::UNIX_EPOCH;

/// A 64-bit XXH3 content hash.
///
/// Displayed and serialized as 16 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash(u64);

impl ContentHash {
    /// Hash a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(xxhash_rust::xxh3::xxh3_64(data))
    }

    /// Raw hash value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Combine two hashes into one, order-sensitive.
    pub fn combine(self, other: ContentHash) -> Self {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&self.0.to_le_bytes());
        buf[8..].copy_from_slice(&other.0.to_le_bytes());
        Self::from_bytes(&buf)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:016x})", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s, 16).map(Self)
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Hash whole-file text (raw bytes, no normalization).
pub fn hash_text(text: &str) -> ContentHash {
    ContentHash::from_bytes(text.as_bytes())
}

/// Hash the source text of one declaration.
///
/// Only `\r\n` line endings are folded to `\n`, which is what JavaScript
/// does inside template literals too. Every other byte counts, so a
/// whitespace edit inside a string or template changes the hash.
pub fn hash_declaration(declaration_text: &str) -> ContentHash {
    if !declaration_text.contains("\r\n") {
        return ContentHash::from_bytes(declaration_text.as_bytes());
    }
    let normalized = declaration_text.replace("\r\n", "\n");
    ContentHash::from_bytes(normalized.as_bytes())
}

/// Cheap staleness gate: file size plus modification time.
///
/// A content hash is only recomputed when the fingerprint moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint {
    pub size: u64,
    pub mtime_ns: u128,
}

impl Fingerprint {
    pub fn new(size: u64, mtime_ns: u128) -> Self {
        Self { size, mtime_ns }
    }

    /// Build a fingerprint from filesystem metadata.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let mtime_ns = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Self {
            size: metadata.len(),
            mtime_ns,
        }
    }

    /// Stat a path. Returns `None` when the path does not exist.
    pub fn of_path(path: &std::path::Path) -> Option<Self> {
        std::fs::metadata(path).ok().map(|m| Self::from_metadata(&m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(hash_text("hello world"), hash_text("hello world"));
        assert_ne!(hash_text("hello"), hash_text("world"));
    }

    #[test]
    fn display_is_sixteen_hex_chars() {
        let s = hash_text("test").to_string();
        assert_eq!(s.len(), 16);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn parse_display_roundtrip() {
        let h = hash_text("abc");
        let parsed: ContentHash = h.to_string().parse().unwrap();
        assert_eq!(h, parsed);
    }

    #[test]
    fn declaration_hash_folds_crlf() {
        let unix = "class A {\n  x = 1;\n}";
        let dos = "class A {\r\n  x = 1;\r\n}";
        assert_eq!(hash_declaration(unix), hash_declaration(dos));
    }

    #[test]
    fn declaration_hash_sees_trailing_space_in_templates() {
        let a = "m() { return `line\nnext`; }";
        let b = "m() { return `line   \nnext`; }";
        assert_ne!(hash_declaration(a), hash_declaration(b));
    }

    #[test]
    fn declaration_hash_keeps_interior_whitespace() {
        let a = "class A { s = \"a  b\"; }";
        let b = "class A { s = \"a b\"; }";
        assert_ne!(hash_declaration(a), hash_declaration(b));
    }

    #[test]
    fn combine_is_order_sensitive() {
        let a = hash_text("a");
        let b = hash_text("b");
        assert_ne!(a.combine(b), b.combine(a));
    }

    #[test]
    fn fingerprint_of_missing_path_is_none() {
        assert!(Fingerprint::of_path(std::path::Path::new("/nonexistent/file.ts")).is_none());
    }
}
