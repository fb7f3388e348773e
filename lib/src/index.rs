//! The staging index: a binary DIRC v2 file with a trailing SHA-1 checksum,
//! strictly sorted entries, and a stat-cache shortcut for skipping rehashes.
//!
//! Grounded on `examples/original_source/pygit/index.py`.

use std::path::Path;

use crate::error::{Error, Result};
use crate::fs_util;
use crate::hash::{Oid, OID_LEN};
use crate::object::Mode;

const DIRC_SIGNATURE: &[u8; 4] = b"DIRC";
const VERSION: u32 = 2;
const CHECKSUM_LEN: usize = OID_LEN;
const MAX_NAME_IN_FLAGS: u16 = 0xFFF;
const PARANOID_ENV: &str = "COREVCS_PARANOID";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    pub path: String,
    pub oid: Oid,
    pub mode: Mode,
    pub size: u32,
    pub mtime_ns: u64,
    pub ctime_ns: u64,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
}

impl IndexEntry {
    pub fn new(path: String, oid: Oid, mode: Mode, size: u32, mtime_ns: u64, ctime_ns: u64) -> Self {
        Self { path, oid, mode, size, mtime_ns, ctime_ns, dev: 0, ino: 0, uid: 0, gid: 0 }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Index {
    entries: Vec<IndexEntry>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.binary_search_by(|e| e.path.as_str().cmp(path)).ok().map(|i| &self.entries[i])
    }

    /// Insert or replace the entry for `entry.path`, keeping entries sorted.
    pub fn upsert(&mut self, entry: IndexEntry) {
        match self.entries.binary_search_by(|e| e.path.cmp(&entry.path)) {
            Ok(i) => self.entries[i] = entry,
            Err(i) => self.entries.insert(i, entry),
        }
    }

    pub fn remove(&mut self, path: &str) -> bool {
        match self.entries.binary_search_by(|e| e.path.as_str().cmp(path)) {
            Ok(i) => {
                self.entries.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let data = std::fs::read(path)?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Ok(Self::default());
        }
        if &data[..4] != DIRC_SIGNATURE {
            return Ok(Self::default());
        }
        let body = if data.len() >= 32 {
            let split = data.len() - CHECKSUM_LEN;
            let (body, stored) = data.split_at(split);
            if Oid::of(body).as_bytes() != stored {
                return Err(Error::IndexChecksum);
            }
            body
        } else {
            data
        };
        let version = u32::from_be_bytes(body[4..8].try_into().unwrap());
        if version != VERSION {
            return Ok(Self::default());
        }
        let count = u32::from_be_bytes(body[8..12].try_into().unwrap()) as usize;

        let mut entries = Vec::with_capacity(count);
        let mut pos = 12usize;
        for _ in 0..count {
            if pos + 62 > body.len() {
                return Err(Error::IndexCorrupt("index truncated or corrupt".into()));
            }
            let entry_start = pos;
            let ctime_s = u32::from_be_bytes(body[pos..pos + 4].try_into().unwrap());
            let ctime_nsec = u32::from_be_bytes(body[pos + 4..pos + 8].try_into().unwrap());
            pos += 8;
            let mtime_s = u32::from_be_bytes(body[pos..pos + 4].try_into().unwrap());
            let mtime_nsec = u32::from_be_bytes(body[pos + 4..pos + 8].try_into().unwrap());
            pos += 8;
            let dev = u32::from_be_bytes(body[pos..pos + 4].try_into().unwrap());
            let ino = u32::from_be_bytes(body[pos + 4..pos + 8].try_into().unwrap());
            pos += 8;
            let mode_raw = u32::from_be_bytes(body[pos..pos + 4].try_into().unwrap());
            let uid = u32::from_be_bytes(body[pos + 4..pos + 8].try_into().unwrap());
            let gid = u32::from_be_bytes(body[pos + 8..pos + 12].try_into().unwrap());
            pos += 12;
            let size = u32::from_be_bytes(body[pos..pos + 4].try_into().unwrap());
            pos += 4;
            let oid = Oid::from_slice(&body[pos..pos + OID_LEN]).expect("slice is OID_LEN");
            pos += OID_LEN;
            let flags = u16::from_be_bytes(body[pos..pos + 2].try_into().unwrap());
            pos += 2;
            let name_len = flags & 0x0FFF;
            let path_str = if name_len == MAX_NAME_IN_FLAGS {
                let nul = body[pos..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| Error::IndexCorrupt("index truncated or corrupt".into()))?
                    + pos;
                let s = std::str::from_utf8(&body[pos..nul])
                    .map_err(|source| Error::InvalidUtf8 { context: "index path", source })?
                    .to_string();
                pos = nul + 1;
                s
            } else {
                let end = pos + name_len as usize;
                if end > body.len() {
                    return Err(Error::IndexCorrupt("index truncated or corrupt".into()));
                }
                let s = std::str::from_utf8(&body[pos..end])
                    .map_err(|source| Error::InvalidUtf8 { context: "index path", source })?
                    .to_string();
                pos = end + 1; // NUL terminator
                s
            };
            let mode = mode_from_u32(mode_raw)?;
            entries.push(IndexEntry {
                path: path_str,
                oid,
                mode,
                size,
                mtime_ns: mtime_s as u64 * 1_000_000_000 + mtime_nsec as u64,
                ctime_ns: ctime_s as u64 * 1_000_000_000 + ctime_nsec as u64,
                dev,
                ino,
                uid,
                gid,
            });
            let consumed = pos - entry_start;
            pos = entry_start + consumed.div_ceil(8) * 8;
        }

        for window in entries.windows(2) {
            if window[0].path >= window[1].path {
                return Err(Error::IndexCorrupt("index entries not sorted by path".into()));
            }
        }
        Ok(Self { entries })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(DIRC_SIGNATURE);
        body.extend_from_slice(&VERSION.to_be_bytes());
        body.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for entry in &self.entries {
            let entry_start = body.len();
            let (ctime_s, ctime_nsec) = (entry.ctime_ns / 1_000_000_000, entry.ctime_ns % 1_000_000_000);
            let (mtime_s, mtime_nsec) = (entry.mtime_ns / 1_000_000_000, entry.mtime_ns % 1_000_000_000);
            body.extend_from_slice(&(ctime_s as u32).to_be_bytes());
            body.extend_from_slice(&(ctime_nsec as u32).to_be_bytes());
            body.extend_from_slice(&(mtime_s as u32).to_be_bytes());
            body.extend_from_slice(&(mtime_nsec as u32).to_be_bytes());
            body.extend_from_slice(&entry.dev.to_be_bytes());
            body.extend_from_slice(&entry.ino.to_be_bytes());
            body.extend_from_slice(&mode_to_u32(entry.mode).to_be_bytes());
            body.extend_from_slice(&entry.uid.to_be_bytes());
            body.extend_from_slice(&entry.gid.to_be_bytes());
            body.extend_from_slice(&entry.size.to_be_bytes());
            body.extend_from_slice(entry.oid.as_bytes());
            let path_bytes = entry.path.as_bytes();
            let name_len = (path_bytes.len() as u16).min(MAX_NAME_IN_FLAGS);
            body.extend_from_slice(&name_len.to_be_bytes());
            body.extend_from_slice(path_bytes);
            body.push(0);
            while (body.len() - entry_start) % 8 != 0 {
                body.push(0);
            }
        }
        let checksum = Oid::of(&body);
        body.extend_from_slice(checksum.as_bytes());
        body
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs_util::write_atomic(path, &self.serialize())
    }
}

fn mode_to_u32(mode: Mode) -> u32 {
    u32::from_str_radix(mode.as_str(), 8).expect("Mode::as_str is always octal digits")
}

fn mode_from_u32(raw: u32) -> Result<Mode> {
    if raw == 0 {
        return Ok(Mode::File);
    }
    let octal = format!("{raw:o}");
    let normalized = if octal.len() == 5 && octal.starts_with('4') {
        format!("0{octal}")
    } else {
        octal
    };
    Mode::parse(&normalized)
}

/// Returns whether the on-disk file at `full_path` still matches `entry`
/// using only metadata (size + mtime), without reading file contents.
/// A [`PARANOID_ENV`] environment switch forces this to always return
/// `false`, disabling the shortcut for integrity testing.
pub fn unchanged(full_path: &Path, entry: &IndexEntry) -> bool {
    if std::env::var(PARANOID_ENV).as_deref() == Ok("1") {
        return false;
    }
    let Ok(metadata) = std::fs::metadata(full_path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    metadata.len() as u32 == entry.size && mtime_ns(&metadata) == entry.mtime_ns
}

#[cfg(unix)]
pub fn stat_times(metadata: &std::fs::Metadata) -> (u64, u64) {
    use std::os::unix::fs::MetadataExt;
    (metadata.ctime() as u64 * 1_000_000_000 + metadata.ctime_nsec() as u64,
     metadata.mtime() as u64 * 1_000_000_000 + metadata.mtime_nsec() as u64)
}

#[cfg(not(unix))]
pub fn stat_times(metadata: &std::fs::Metadata) -> (u64, u64) {
    let to_ns = |t: std::time::SystemTime| {
        t.duration_since(std::time::UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
    };
    let mtime = metadata.modified().map(to_ns).unwrap_or(0);
    let ctime = metadata.created().map(to_ns).unwrap_or(mtime);
    (ctime, mtime)
}

fn mtime_ns(metadata: &std::fs::Metadata) -> u64 {
    stat_times(metadata).1
}
