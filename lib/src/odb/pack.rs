//! Pack v2 reader: entry header decoding, REF/OFS delta application, and a
//! whole-pack resolved-object cache.
//!
//! Grounded on `examples/original_source/pygit/pack.py`.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;

use crate::error::{Error, Result};
use crate::hash::{Oid, OID_LEN};
use crate::odb::idx::PackIndex;

const SIGNATURE: &[u8; 4] = b"PACK";
const HEADER_LEN: usize = 12;
const TRAILER_LEN: usize = OID_LEN;

const TYPE_COMMIT: u8 = 1;
const TYPE_TREE: u8 = 2;
const TYPE_BLOB: u8 = 3;
const TYPE_TAG: u8 = 4;
const TYPE_OFS_DELTA: u8 = 6;
const TYPE_REF_DELTA: u8 = 7;

fn type_name(t: u8) -> Option<&'static str> {
    match t {
        TYPE_COMMIT => Some("commit"),
        TYPE_TREE => Some("tree"),
        TYPE_BLOB => Some("blob"),
        TYPE_TAG => Some("tag"),
        _ => None,
    }
}

struct RawEntry {
    entry_start: usize,
    obj_type: u8,
    header_len: usize,
    base_sha: Option<Oid>,
    base_distance: Option<u64>,
    next_offset: usize,
}

fn read_size_varint(data: &[u8], start: usize) -> Result<(u64, usize)> {
    if start >= data.len() {
        return Err(Error::Pack("size encoding truncated".into()));
    }
    let mut pos = start;
    let mut byte = data[pos];
    let mut value = (byte & 0x7F) as u64;
    let mut shift = 7;
    let mut n = 1;
    while byte & 0x80 != 0 {
        pos += 1;
        if pos >= data.len() {
            return Err(Error::Pack("size encoding truncated".into()));
        }
        byte = data[pos];
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        n += 1;
    }
    Ok((value, n))
}

/// Decode one entry header. Returns (type, header_len, base_sha, base_distance).
fn decode_entry_header(data: &[u8], offset: usize) -> Result<(u8, usize, Option<Oid>, Option<u64>)> {
    if offset >= data.len() {
        return Err(Error::Pack("entry header truncated".into()));
    }
    let mut first = data[offset];
    let obj_type = (first >> 4) & 0x07;
    let mut pos = offset + 1;
    let mut shift = 4;
    while first & 0x80 != 0 {
        if pos >= data.len() {
            return Err(Error::Pack("size encoding truncated".into()));
        }
        first = data[pos];
        pos += 1;
        shift += 7;
    }
    let _ = shift;
    let mut header_len = pos - offset;

    let mut base_sha = None;
    let mut base_distance = None;
    if obj_type == TYPE_REF_DELTA {
        if pos + OID_LEN > data.len() {
            return Err(Error::Pack("ref-delta base id truncated".into()));
        }
        base_sha = Oid::from_slice(&data[pos..pos + OID_LEN]);
        header_len += OID_LEN;
    } else if obj_type == TYPE_OFS_DELTA {
        let (distance, n) = read_size_varint(data, pos)?;
        base_distance = Some(distance);
        header_len += n;
    }
    Ok((obj_type, header_len, base_sha, base_distance))
}

/// Apply a git delta instruction stream to `base` and return the result.
pub fn apply_delta(base: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    if delta.len() < 2 {
        return Err(Error::Pack("delta too short".into()));
    }
    let mut pos = 0usize;
    let mut read_varint = |delta: &[u8]| -> Result<u64> {
        let mut value = (delta[pos] & 0x7F) as u64;
        let mut shift = 7;
        while delta[pos] & 0x80 != 0 {
            pos += 1;
            if pos >= delta.len() {
                return Err(Error::Pack("delta varint truncated".into()));
            }
            value |= ((delta[pos] & 0x7F) as u64) << shift;
            shift += 7;
        }
        pos += 1;
        Ok(value)
    };
    let base_size = read_varint(delta)?;
    let result_size = read_varint(delta)?;
    if base_size as usize != base.len() {
        return Err(Error::Pack(format!(
            "delta base size mismatch: expected {base_size}, got {}",
            base.len()
        )));
    }

    let mut result = Vec::with_capacity(result_size as usize);
    while pos < delta.len() {
        let cmd = delta[pos];
        pos += 1;
        if cmd & 0x80 != 0 {
            let mut offset: u64 = 0;
            let mut size: u64 = 0;
            let offset_len = cmd & 0x0F;
            let size_len = (cmd >> 4) & 0x07;
            for i in 0..offset_len {
                if pos >= delta.len() {
                    return Err(Error::Pack("delta copy offset truncated".into()));
                }
                offset |= (delta[pos] as u64) << (8 * i);
                pos += 1;
            }
            for i in 0..size_len {
                if pos >= delta.len() {
                    return Err(Error::Pack("delta copy size truncated".into()));
                }
                size |= (delta[pos] as u64) << (8 * i);
                pos += 1;
            }
            if size == 0 {
                size = 0x10000;
            }
            let start = offset as usize;
            let end = start + size as usize;
            if end > base.len() {
                return Err(Error::Pack("delta copy out of bounds".into()));
            }
            result.extend_from_slice(&base[start..end]);
        } else {
            if cmd == 0 {
                return Err(Error::Pack("delta insert size 0".into()));
            }
            let count = cmd as usize;
            if pos + count > delta.len() {
                return Err(Error::Pack("delta insert truncated".into()));
            }
            result.extend_from_slice(&delta[pos..pos + count]);
            pos += count;
        }
    }
    if result.len() as u64 != result_size {
        return Err(Error::Pack(format!(
            "delta result size mismatch: expected {result_size}, got {}",
            result.len()
        )));
    }
    Ok(result)
}

fn split_raw(raw: &[u8]) -> Result<(&str, &[u8])> {
    let nul = raw
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::Pack("invalid base object: no NUL".into()))?;
    let header_str = std::str::from_utf8(&raw[..nul])
        .map_err(|_| Error::Pack("invalid base object header".into()))?;
    let type_str = header_str
        .split(' ')
        .next()
        .ok_or_else(|| Error::Pack("invalid base object header".into()))?;
    Ok((type_str, &raw[nul + 1..]))
}

fn decompress_at(data: &[u8], start: usize) -> Result<(Vec<u8>, usize)> {
    let mut decoder = ZlibDecoder::new(&data[start..]);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Pack(format!("zlib decompress failed: {e}")))?;
    let consumed = decoder.total_in() as usize;
    Ok((out, start + consumed))
}

/// A parsed `.pack` file paired with its `.idx`, capable of resolving any
/// object whose hash is present in the index to raw canonical bytes,
/// resolving REF_DELTA bases via a caller-supplied fallback (the unified
/// store, which may pull from another pack or loose storage).
pub struct Pack {
    path: PathBuf,
    data: Vec<u8>,
    pub index: PackIndex,
    entries: HashMap<usize, RawEntry>,
    resolved_by_offset: std::cell::RefCell<HashMap<usize, Vec<u8>>>,
}

impl Pack {
    pub fn open(pack_path: &Path, idx_path: &Path) -> Result<Self> {
        let data = std::fs::read(pack_path)?;
        if data.len() < HEADER_LEN + TRAILER_LEN {
            return Err(Error::Pack("pack file too short".into()));
        }
        if &data[..4] != SIGNATURE {
            return Err(Error::Pack("invalid pack signature".into()));
        }
        let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
        if version != 2 && version != 3 {
            return Err(Error::Pack(format!("unsupported pack version {version}")));
        }
        let num_objects = u32::from_be_bytes(data[8..12].try_into().unwrap()) as usize;

        let mut entries = HashMap::with_capacity(num_objects);
        let mut offset = HEADER_LEN;
        let end = data.len() - TRAILER_LEN;
        for _ in 0..num_objects {
            if offset >= end {
                return Err(Error::Pack("pack truncated".into()));
            }
            let (obj_type, header_len, base_sha, base_distance) = decode_entry_header(&data, offset)?;
            let data_start = offset + header_len;
            let (_, next_offset) = decompress_at(&data, data_start)?;
            entries.insert(
                offset,
                RawEntry {
                    entry_start: offset,
                    obj_type,
                    header_len,
                    base_sha,
                    base_distance,
                    next_offset,
                },
            );
            offset = next_offset;
        }

        let idx_data = std::fs::read(idx_path)?;
        let index = PackIndex::parse(&idx_data)?;

        Ok(Self {
            path: pack_path.to_path_buf(),
            data,
            index,
            entries,
            resolved_by_offset: std::cell::RefCell::new(HashMap::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.index.lookup(oid).is_some()
    }

    /// Resolve `oid` to raw canonical bytes (`"<kind> <len>\0content"`).
    /// `resolve_ref_base` is invoked for REF_DELTA bases that aren't already
    /// within this pack's resolved cache — it should consult the unified
    /// store (possibly another pack, possibly loose).
    pub fn resolve(&self, oid: &Oid, resolve_ref_base: &dyn Fn(&Oid) -> Result<Vec<u8>>) -> Result<Vec<u8>> {
        let offset = self
            .index
            .lookup(oid)
            .ok_or_else(|| Error::object_not_found(oid.hex()))?;
        self.resolve_offset(offset as usize, resolve_ref_base, &mut Vec::new())
    }

    fn resolve_offset(
        &self,
        offset: usize,
        resolve_ref_base: &dyn Fn(&Oid) -> Result<Vec<u8>>,
        in_progress: &mut Vec<usize>,
    ) -> Result<Vec<u8>> {
        if let Some(cached) = self.resolved_by_offset.borrow().get(&offset) {
            return Ok(cached.clone());
        }
        if in_progress.contains(&offset) {
            return Err(Error::Pack("cyclic delta chain".into()));
        }
        in_progress.push(offset);

        let entry = self
            .entries
            .get(&offset)
            .ok_or_else(|| Error::Pack(format!("no entry at offset {offset}")))?;
        let data_start = entry.entry_start + entry.header_len;
        let compressed_len = entry.next_offset - data_start;
        let (payload, _) = decompress_bounded(&self.data, data_start, compressed_len)?;

        let raw = if let Some(name) = type_name(entry.obj_type) {
            let mut out = format!("{name} {}\0", payload.len()).into_bytes();
            out.extend_from_slice(&payload);
            out
        } else if entry.obj_type == TYPE_REF_DELTA {
            let base_sha = entry.base_sha.ok_or_else(|| Error::Pack("ref-delta missing base".into()))?;
            let base_raw = resolve_ref_base(&base_sha)?;
            build_delta_result(&base_raw, &payload)?
        } else if entry.obj_type == TYPE_OFS_DELTA {
            let distance = entry
                .base_distance
                .ok_or_else(|| Error::Pack("ofs-delta missing offset".into()))?;
            let base_offset = entry
                .entry_start
                .checked_sub(distance as usize)
                .ok_or_else(|| Error::Pack("ofs-delta offset underflow".into()))?;
            let base_raw = self.resolve_offset(base_offset, resolve_ref_base, in_progress)?;
            build_delta_result(&base_raw, &payload)?
        } else {
            return Err(Error::Pack(format!("unsupported object type {}", entry.obj_type)));
        };

        in_progress.pop();
        self.resolved_by_offset.borrow_mut().insert(offset, raw.clone());
        Ok(raw)
    }
}

fn build_delta_result(base_raw: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let (type_str, base_content) = split_raw(base_raw)?;
    let result_content = apply_delta(base_content, delta)?;
    let mut out = format!("{type_str} {}\0", result_content.len()).into_bytes();
    out.extend_from_slice(&result_content);
    Ok(out)
}

fn decompress_bounded(data: &[u8], start: usize, compressed_len: usize) -> Result<(Vec<u8>, usize)> {
    let mut decoder = ZlibDecoder::new(&data[start..start + compressed_len]);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Pack(format!("zlib decompress failed: {e}")))?;
    Ok((out, compressed_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_copy_and_insert() {
        let base = b"The quick brown fox".to_vec();
        // base_size=20, result_size=24; copy [0,9) then insert "slow " then copy [10,20)
        let mut delta = vec![20u8, 24u8];
        delta.push(0x80 | 0x01 | (0x01 << 4)); // copy: offset_len=1, size_len=1
        delta.push(0); // offset=0
        delta.push(9); // size=9
        delta.push(5); // insert 5 bytes
        delta.extend_from_slice(b"slow ");
        delta.push(0x80 | 0x01 | (0x01 << 4));
        delta.push(10); // offset=10
        delta.push(10); // size=10
        let result = apply_delta(&base, &delta).unwrap();
        assert_eq!(result, b"The quick slow brown fox".to_vec());
    }

    #[test]
    fn delta_base_size_mismatch_errors() {
        let base = b"short".to_vec();
        let delta = vec![99u8, 0u8];
        assert!(apply_delta(&base, &delta).is_err());
    }
}
