//! Deterministic, delta-free pack writer.
//!
//! Grounded on `examples/original_source/pygit/pack.py::write_pack` and
//! `idx.py::write_idx`. Per spec.md §4.4 and the Non-goals list, no delta
//! compression is ever emitted on write.

use std::path::Path;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;

use crate::error::Result;
use crate::fs_util;
use crate::hash::Oid;
use crate::object::{Kind, Object};
use crate::odb::idx;

const SIGNATURE: &[u8; 4] = b"PACK";

fn type_num(kind: Kind) -> u8 {
    match kind {
        Kind::Commit => 1,
        Kind::Tree => 2,
        Kind::Blob => 3,
        Kind::Tag => 4,
    }
}

fn encode_type_size(type_num: u8, mut size: u64) -> Vec<u8> {
    let mut first = (type_num << 4) | (size & 0x0F) as u8;
    size >>= 4;
    let mut cont = Vec::new();
    if size > 0 {
        first |= 0x80;
    }
    while size > 0 {
        cont.push((size & 0x7F) as u8);
        size >>= 7;
    }
    let last = cont.len().saturating_sub(1);
    for (i, byte) in cont.iter_mut().enumerate() {
        if i != last {
            *byte |= 0x80;
        }
    }
    let mut out = vec![first];
    out.extend(cont);
    out
}

/// Write `pack-<sha>.pack` and `pack-<sha>.idx` under `pack_dir` containing
/// exactly `objects`. Returns the pack's trailer hash (also its filename
/// stem). Objects are written in ascending hash order with no deltas.
pub fn write_pack(pack_dir: &Path, objects: &[Object]) -> Result<Oid> {
    let mut sorted: Vec<&Object> = objects.iter().collect();
    sorted.sort_by_key(|o| o.hash());

    let mut body = Vec::new();
    body.extend_from_slice(SIGNATURE);
    body.extend_from_slice(&2u32.to_be_bytes());
    body.extend_from_slice(&(sorted.len() as u32).to_be_bytes());

    let mut idx_entries = Vec::with_capacity(sorted.len());
    for object in &sorted {
        let offset = body.len() as u64;
        let oid = object.hash();
        let content = object.content();
        body.extend(encode_type_size(type_num(object.kind()), content.len() as u64));

        let canonical = object.canonical_bytes();
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&canonical)?;
        body.extend(encoder.finish()?);

        idx_entries.push((oid, offset));
    }

    let pack_sha = Oid::of(&body);
    body.extend_from_slice(pack_sha.as_bytes());

    let pack_path = pack_dir.join(format!("pack-{}.pack", pack_sha.hex()));
    let idx_path = pack_dir.join(format!("pack-{}.idx", pack_sha.hex()));
    fs_util::write_atomic(&pack_path, &body)?;
    idx::write_idx(&idx_path, pack_sha, idx_entries)?;
    Ok(pack_sha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::odb::pack::Pack;

    #[test]
    fn write_then_read_back_all_objects() {
        let dir = tempfile::tempdir().unwrap();
        let objects = vec![
            Object::Blob(b"a".to_vec()),
            Object::Blob(b"b".to_vec()),
            Object::Blob(b"quite a bit longer content to compress".to_vec()),
        ];
        let pack_sha = write_pack(dir.path(), &objects).unwrap();
        let pack_path = dir.path().join(format!("pack-{}.pack", pack_sha.hex()));
        let idx_path = dir.path().join(format!("pack-{}.idx", pack_sha.hex()));
        let pack = Pack::open(&pack_path, &idx_path).unwrap();
        for object in &objects {
            let oid = object.hash();
            assert!(pack.contains(&oid));
            let raw = pack.resolve(&oid, &|_| unreachable!()).unwrap();
            assert_eq!(raw, object.canonical_bytes());
        }
    }
}
