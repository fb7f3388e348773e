//! Object identity: the 20-byte SHA-1 hash used throughout the engine, and
//! ambiguity-safe hex-prefix resolution over it.
//!
//! Grounded on `examples/yuja-jj/lib/src/object_id.rs`'s `id_type!`/`HexPrefix`/
//! `PrefixResolution` pattern, specialized to this engine's single closed hash
//! type (there is no multi-backend abstraction here, so a newtype-per-object-kind
//! macro would be pure ceremony; `Oid` alone suffices).

use std::fmt;

use sha1::{Digest, Sha1};

pub const OID_LEN: usize = 20;

/// A 20-byte SHA-1 object id, displayed and parsed as 40 lowercase hex digits.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Oid([u8; OID_LEN]);

impl Oid {
    pub const ZERO: Oid = Oid([0u8; OID_LEN]);

    pub fn from_bytes(bytes: [u8; OID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != OID_LEN {
            return None;
        }
        let mut buf = [0u8; OID_LEN];
        buf.copy_from_slice(bytes);
        Some(Self(buf))
    }

    pub fn from_hex(hex_str: &str) -> Option<Self> {
        if hex_str.len() != OID_LEN * 2 {
            return None;
        }
        let mut buf = [0u8; OID_LEN];
        hex::decode_to_slice(hex_str, &mut buf).ok()?;
        Some(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8; OID_LEN] {
        &self.0
    }

    pub fn hex(&self) -> String {
        hex::encode(self.0)
    }

    /// SHA-1 of arbitrary bytes, used both for object hashing and for the
    /// trailing-checksum convention shared by the index, pack and idx formats.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut buf = [0u8; OID_LEN];
        buf.copy_from_slice(&digest);
        Self(buf)
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", self.hex())
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

/// A validated hex prefix of at least `MIN_PREFIX_LEN` characters, used for
/// abbreviated object references (`rev-parse`, loose-bucket prefix scans).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HexPrefix {
    hex: String,
    min_bytes: Vec<u8>,
    has_odd_byte: bool,
}

pub const MIN_PREFIX_LEN: usize = 4;

impl HexPrefix {
    pub fn new(hex_str: &str) -> Option<Self> {
        if hex_str.len() < MIN_PREFIX_LEN || hex_str.len() > OID_LEN * 2 {
            return None;
        }
        if !hex_str.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let lower = hex_str.to_ascii_lowercase();
        let even_len = lower.len() - (lower.len() % 2);
        let mut min_bytes = vec![0u8; even_len / 2];
        if even_len > 0 {
            hex::decode_to_slice(&lower[..even_len], &mut min_bytes).ok()?;
        }
        let has_odd_byte = lower.len() % 2 == 1;
        if has_odd_byte {
            let last_digit = u8::from_str_radix(&lower[lower.len() - 1..], 16).ok()?;
            min_bytes.push(last_digit << 4);
        }
        Some(Self {
            hex: lower,
            min_bytes,
            has_odd_byte,
        })
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn len(&self) -> usize {
        self.hex.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hex.is_empty()
    }

    /// Whether `id` begins with this prefix.
    pub fn matches(&self, id: &Oid) -> bool {
        let full_bytes = self.min_bytes.len() - usize::from(self.has_odd_byte);
        if id.as_bytes()[..full_bytes] != self.min_bytes[..full_bytes] {
            return false;
        }
        if self.has_odd_byte {
            let last = id.as_bytes()[full_bytes];
            let want = self.min_bytes[full_bytes];
            return (last & 0xf0) == want;
        }
        true
    }
}

/// Outcome of resolving a prefix against a set of candidates. Mirrors the
/// three-way outcome `examples/yuja-jj/lib/src/object_id.rs` models for its
/// `PrefixResolution` enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefixResolution<T> {
    NoMatch,
    SingleMatch(T),
    AmbiguousMatch,
}

impl<T> PrefixResolution<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PrefixResolution<U> {
        match self {
            Self::NoMatch => PrefixResolution::NoMatch,
            Self::SingleMatch(t) => PrefixResolution::SingleMatch(f(t)),
            Self::AmbiguousMatch => PrefixResolution::AmbiguousMatch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_hex_roundtrip() {
        let oid = Oid::of(b"hello");
        let hex_str = oid.hex();
        assert_eq!(Oid::from_hex(&hex_str), Some(oid));
    }

    #[test]
    fn blob_hash_matches_git_empty_blob() {
        let header = b"blob 0\0";
        let oid = Oid::of(header);
        assert_eq!(oid.hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn hex_prefix_matches_even_and_odd() {
        let oid = Oid::from_hex("abcdef0123456789abcdef0123456789abcdef01").unwrap();
        assert!(HexPrefix::new("abcd").unwrap().matches(&oid));
        assert!(HexPrefix::new("abcde").unwrap().matches(&oid));
        assert!(!HexPrefix::new("abce").unwrap().matches(&oid));
    }

    #[test]
    fn hex_prefix_rejects_short() {
        assert!(HexPrefix::new("abc").is_none());
    }
}
