//! Loose object storage: one zlib-compressed file per object under a
//! two-level hex fanout directory.
//!
//! Grounded on `examples/original_source/pygit/odb.py`.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::error::{Error, Result};
use crate::fs_util;
use crate::hash::{HexPrefix, Oid, MIN_PREFIX_LEN};
use crate::object::Object;

pub struct LooseObjectDb {
    root: PathBuf,
}

impl LooseObjectDb {
    pub fn new(objects_dir: impl Into<PathBuf>) -> Self {
        Self { root: objects_dir.into() }
    }

    fn object_path(&self, oid: &Oid) -> PathBuf {
        let hex = oid.hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }

    pub fn exists(&self, oid: &Oid) -> bool {
        self.object_path(oid).is_file()
    }

    /// Idempotent by hash: if the object is already present, the existing
    /// file is left untouched and no write occurs.
    pub fn store(&self, object: &Object) -> Result<Oid> {
        let oid = object.hash();
        let path = self.object_path(&oid);
        if path.is_file() {
            return Ok(oid);
        }
        let compressed = compress(&object.canonical_bytes())?;
        fs_util::write_atomic_no_clobber(&path, &compressed)?;
        Ok(oid)
    }

    pub fn read_raw(&self, oid: &Oid) -> Result<Vec<u8>> {
        let path = self.object_path(oid);
        let compressed = std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::object_not_found(oid.hex())
            } else {
                Error::Io(e)
            }
        })?;
        decompress(&compressed)
    }

    pub fn read(&self, oid: &Oid) -> Result<Object> {
        Object::parse_canonical(&self.read_raw(oid)?)
    }

    /// List all full hashes in the two-level fanout whose hex begins with
    /// `prefix` (at least [`MIN_PREFIX_LEN`] characters).
    pub fn prefix_lookup(&self, prefix: &HexPrefix) -> Vec<Oid> {
        debug_assert!(prefix.len() >= MIN_PREFIX_LEN);
        let bucket = &prefix.hex()[..2];
        let bucket_dir = self.root.join(bucket);
        let Ok(entries) = std::fs::read_dir(&bucket_dir) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let full_hex = format!("{bucket}{name}");
            let Some(oid) = Oid::from_hex(&full_hex) else {
                continue;
            };
            if prefix.matches(&oid) {
                out.push(oid);
            }
        }
        out
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

pub(crate) fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Other(format!("zlib decompress failed: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;

    #[test]
    fn store_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let db = LooseObjectDb::new(dir.path());
        let obj = Object::Blob(b"hello\n".to_vec());
        let oid = db.store(&obj).unwrap();
        assert!(db.exists(&oid));
        assert_eq!(db.read(&oid).unwrap(), obj);
    }

    #[test]
    fn store_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = LooseObjectDb::new(dir.path());
        let obj = Object::Blob(b"x".to_vec());
        let first = db.store(&obj).unwrap();
        let second = db.store(&obj).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn prefix_lookup_finds_stored_object() {
        let dir = tempfile::tempdir().unwrap();
        let db = LooseObjectDb::new(dir.path());
        let obj = Object::Blob(b"prefix test".to_vec());
        let oid = db.store(&obj).unwrap();
        let prefix = HexPrefix::new(&oid.hex()[..6]).unwrap();
        assert_eq!(db.prefix_lookup(&prefix), vec![oid]);
    }

    #[test]
    fn missing_object_is_object_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let db = LooseObjectDb::new(dir.path());
        let oid = Oid::of(b"nope");
        assert!(matches!(db.read(&oid), Err(Error::ObjectNotFound(_))));
    }
}
