//! The capability fetch/push/clone code would be built on: listing a
//! remote's refs and pulling its objects. No implementation lives in this
//! crate — a dumb-HTTP or smart-protocol client would each implement this
//! trait and plug into the (also out-of-scope) fetch/push walk described in
//! spec.md §4.13.
//!
//! Grounded on `examples/original_source/pygit/transport.py`'s
//! `Transport` protocol.

use crate::error::Result;
use crate::hash::Oid;

/// A remote repository's object and ref surface, as seen over the wire.
pub trait Transport {
    /// Every ref the remote advertises, as `(refname, commit hash)` pairs.
    fn list_refs(&self) -> Result<Vec<(String, Oid)>>;

    /// Fetch one object's raw (type-tagged, uncompressed) bytes by hash.
    fn get_object_raw(&self, hash: Oid) -> Result<Vec<u8>>;

    /// Whether the remote has `hash`, without transferring it.
    fn has_object(&self, hash: Oid) -> Result<bool>;
}
