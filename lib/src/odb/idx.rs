//! Pack index v2: sorted-name lookup table mapping object hashes to their
//! offset within a sibling `.pack` file.
//!
//! Grounded on `examples/original_source/pygit/idx.py`.

use std::path::Path;

use crate::error::{Error, Result};
use crate::fs_util;
use crate::hash::{HexPrefix, Oid, OID_LEN};

const SIGNATURE: &[u8; 4] = b"\xfftOc";
const VERSION: u32 = 2;
const FANOUT_COUNT: usize = 256;
const FANOUT_BYTES: usize = FANOUT_COUNT * 4;
const TRAILER_LEN: usize = OID_LEN * 2;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

pub struct PackIndex {
    fanout: [u32; FANOUT_COUNT],
    names: Vec<Oid>,
    offsets: Vec<u64>,
    pack_sha: Oid,
}

impl PackIndex {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 8 + FANOUT_BYTES {
            return Err(Error::Idx("idx file too short".into()));
        }
        if &data[..4] != SIGNATURE {
            return Err(Error::Idx("invalid idx signature".into()));
        }
        let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
        if version != VERSION {
            return Err(Error::Idx(format!("unsupported idx version {version}")));
        }
        let mut fanout = [0u32; FANOUT_COUNT];
        for (i, chunk) in data[8..8 + FANOUT_BYTES].chunks_exact(4).enumerate() {
            fanout[i] = u32::from_be_bytes(chunk.try_into().unwrap());
        }
        let n = fanout[255] as usize;
        if n == 0 {
            return Err(Error::Idx("idx file has no objects".into()));
        }

        let names_start = 8 + FANOUT_BYTES;
        let names_end = names_start + n * OID_LEN;
        let crc_end = names_end + n * 4;
        let offsets_end = crc_end + n * 4;
        if data.len() < offsets_end + TRAILER_LEN {
            return Err(Error::Idx("idx truncated at names/crc/offsets".into()));
        }

        let mut names = Vec::with_capacity(n);
        for chunk in data[names_start..names_end].chunks_exact(OID_LEN) {
            names.push(Oid::from_slice(chunk).expect("chunk length is OID_LEN"));
        }

        let mut offsets32 = Vec::with_capacity(n);
        for chunk in data[crc_end..offsets_end].chunks_exact(4) {
            offsets32.push(u32::from_be_bytes(chunk.try_into().unwrap()));
        }

        let trailer_start = data.len() - TRAILER_LEN;
        let pack_sha = Oid::from_slice(&data[trailer_start..trailer_start + OID_LEN])
            .expect("trailer slice length is OID_LEN");

        let large_count = offsets32.iter().filter(|&&o| o & LARGE_OFFSET_FLAG != 0).count();
        let mut offsets = vec![0u64; n];
        let mut pos = offsets_end;
        let mut large_table = Vec::with_capacity(large_count);
        if large_count > 0 {
            if pos + large_count * 8 > trailer_start {
                return Err(Error::Idx("idx truncated at large offsets".into()));
            }
            for _ in 0..large_count {
                large_table.push(u64::from_be_bytes(data[pos..pos + 8].try_into().unwrap()));
                pos += 8;
            }
        }
        let mut large_idx = 0usize;
        for (i, &raw) in offsets32.iter().enumerate() {
            offsets[i] = if raw & LARGE_OFFSET_FLAG != 0 {
                let v = large_table[large_idx];
                large_idx += 1;
                v
            } else {
                raw as u64
            };
        }

        Ok(Self { fanout, names, offsets, pack_sha })
    }

    pub fn pack_sha(&self) -> Oid {
        self.pack_sha
    }

    pub fn object_count(&self) -> usize {
        self.names.len()
    }

    pub fn lookup(&self, oid: &Oid) -> Option<u64> {
        let first_byte = oid.as_bytes()[0] as usize;
        let mut lo = if first_byte > 0 { self.fanout[first_byte - 1] as usize } else { 0 };
        let mut hi = self.fanout[first_byte] as usize;
        while lo < hi {
            let mid = (lo + hi) / 2;
            match self.names[mid].cmp(oid) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(self.offsets[mid]),
            }
        }
        None
    }

    pub fn iter_names(&self) -> impl Iterator<Item = &Oid> {
        self.names.iter()
    }

    pub fn prefix_lookup(&self, prefix: &HexPrefix) -> Vec<Oid> {
        self.names.iter().filter(|oid| prefix.matches(oid)).copied().collect()
    }
}

/// Write a v2 index atomically. `entries` need not be pre-sorted.
pub fn write_idx(path: &Path, pack_sha: Oid, mut entries: Vec<(Oid, u64)>) -> Result<Oid> {
    entries.sort_by_key(|(oid, _)| *oid);
    let n = entries.len();

    let mut fanout = [0u32; FANOUT_COUNT];
    for (oid, _) in &entries {
        fanout[oid.as_bytes()[0] as usize] += 1;
    }
    for i in 1..FANOUT_COUNT {
        fanout[i] += fanout[i - 1];
    }

    let mut body = Vec::new();
    body.extend_from_slice(SIGNATURE);
    body.extend_from_slice(&VERSION.to_be_bytes());
    for count in fanout {
        body.extend_from_slice(&count.to_be_bytes());
    }
    for (oid, _) in &entries {
        body.extend_from_slice(oid.as_bytes());
    }
    // CRC32 is not computed by this writer; readers must tolerate zeroes (§4.4).
    body.extend(std::iter::repeat_n(0u8, n * 4));

    let mut offsets32 = Vec::with_capacity(n);
    let mut large_offsets = Vec::new();
    for (_, offset) in &entries {
        if *offset < LARGE_OFFSET_FLAG as u64 {
            offsets32.push(*offset as u32);
        } else {
            let idx = large_offsets.len() as u32;
            large_offsets.push(*offset);
            offsets32.push(LARGE_OFFSET_FLAG | idx);
        }
    }
    for o in &offsets32 {
        body.extend_from_slice(&o.to_be_bytes());
    }
    for lo in &large_offsets {
        body.extend_from_slice(&lo.to_be_bytes());
    }

    body.extend_from_slice(pack_sha.as_bytes());
    let idx_sha = Oid::of(&body);
    body.extend_from_slice(idx_sha.as_bytes());

    fs_util::write_atomic(path, &body)?;
    Ok(idx_sha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_parse_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.idx");
        let oids: Vec<Oid> = (0..5u8).map(|i| Oid::of(&[i])).collect();
        let pack_sha = Oid::of(b"pack-body");
        let entries: Vec<(Oid, u64)> =
            oids.iter().enumerate().map(|(i, oid)| (*oid, (i * 37) as u64)).collect();
        write_idx(&path, pack_sha, entries.clone()).unwrap();

        let data = std::fs::read(&path).unwrap();
        let idx = PackIndex::parse(&data).unwrap();
        assert_eq!(idx.object_count(), 5);
        assert_eq!(idx.pack_sha(), pack_sha);
        for (oid, offset) in &entries {
            assert_eq!(idx.lookup(oid), Some(*offset));
        }
        assert_eq!(idx.lookup(&Oid::of(b"absent")), None);
    }

    #[test]
    fn large_offset_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pack.idx");
        let oid = Oid::of(b"big-offset-object");
        let big_offset = 1u64 << 33;
        write_idx(&path, Oid::of(b"pack"), vec![(oid, big_offset)]).unwrap();
        let data = std::fs::read(&path).unwrap();
        let idx = PackIndex::parse(&data).unwrap();
        assert_eq!(idx.lookup(&oid), Some(big_offset));
    }
}
