//! HEAD and ref management: symbolic/detached HEAD, loose refs under
//! `refs/heads|tags|remotes/`, and a `packed-refs` fallback.
//!
//! Grounded on `examples/original_source/pygit/refs.py`.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::fs_util;
use crate::hash::Oid;

const HEAD_FILE: &str = "HEAD";
const REF_HEADS_PREFIX: &str = "refs/heads/";
const REF_TAGS_PREFIX: &str = "refs/tags/";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadState {
    /// HEAD points at a branch, e.g. `refs/heads/main`.
    Symbolic(String),
    /// HEAD points directly at a commit.
    Detached(Oid),
}

pub struct RefStore {
    git_dir: PathBuf,
}

impl RefStore {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self { git_dir: git_dir.into() }
    }

    fn head_path(&self) -> PathBuf {
        self.git_dir.join(HEAD_FILE)
    }

    fn ref_path(&self, refname: &str) -> PathBuf {
        self.git_dir.join(refname)
    }

    pub fn read_head(&self) -> Result<Option<HeadState>> {
        let Some(raw) = read_text(&self.head_path())? else {
            return Ok(None);
        };
        let raw = raw.trim();
        if let Some(refname) = raw.strip_prefix("ref: ") {
            return Ok(Some(HeadState::Symbolic(refname.trim().to_string())));
        }
        Ok(Oid::from_hex(raw).map(HeadState::Detached))
    }

    pub fn write_head_ref(&self, refname: &str) -> Result<()> {
        if !refname.starts_with(REF_HEADS_PREFIX) {
            return Err(Error::InvalidRef(format!(
                "symbolic ref must be refs/heads/... (got {refname})"
            )));
        }
        fs_util::write_atomic(&self.head_path(), format!("ref: {refname}\n").as_bytes())
    }

    pub fn write_head_detached(&self, oid: Oid) -> Result<()> {
        fs_util::write_atomic(&self.head_path(), format!("{}\n", oid.hex()).as_bytes())
    }

    fn read_packed_refs(&self) -> Vec<(String, Oid)> {
        let Ok(raw) = std::fs::read_to_string(self.git_dir.join("packed-refs")) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
                continue;
            }
            let Some((sha, refname)) = line.split_once(char::is_whitespace) else {
                continue;
            };
            if let Some(oid) = Oid::from_hex(sha) {
                out.push((refname.trim().to_string(), oid));
            }
        }
        out
    }

    /// Resolve `refname` to a commit hash, following loose refs first, then
    /// `packed-refs`, recursing through symbolic indirection. Returns `None`
    /// if the ref does not exist or does not resolve.
    pub fn resolve_ref(&self, refname: &str) -> Result<Option<Oid>> {
        self.resolve_ref_inner(refname, 0)
    }

    fn resolve_ref_inner(&self, refname: &str, depth: u32) -> Result<Option<Oid>> {
        if depth > 10 {
            return Err(Error::InvalidRef(format!("ref resolution too deep: {refname}")));
        }
        let Some(content) = read_text(&self.ref_path(refname))? else {
            let packed = self.read_packed_refs();
            return Ok(packed.into_iter().find(|(name, _)| name == refname).map(|(_, oid)| oid));
        };
        let content = content.trim();
        if let Some(oid) = Oid::from_hex(content) {
            return Ok(Some(oid));
        }
        self.resolve_ref_inner(content, depth + 1)
    }

    pub fn update_ref(&self, refname: &str, new_oid: Oid) -> Result<()> {
        let path = self.ref_path(refname);
        fs_util::write_atomic(&path, format!("{}\n", new_oid.hex()).as_bytes())
    }

    /// Compare-and-swap ref update via a `.lock` sibling, per spec.md §8
    /// invariant 4 (no torn writes visible to a concurrent reader).
    pub fn update_ref_verify(&self, refname: &str, new_oid: Oid, old_oid: Option<Oid>) -> Result<()> {
        if let Some(expected) = old_oid {
            let current = self.resolve_ref(refname)?;
            if current != Some(expected) {
                return Err(Error::InvalidRef(format!(
                    "ref {refname} is not at expected value (expected {})",
                    expected.hex()
                )));
            }
        }
        let path = self.ref_path(refname);
        let lock_path = path.with_extension("lock");
        fs_util::write_atomic(&lock_path, format!("{}\n", new_oid.hex()).as_bytes())?;
        std::fs::rename(&lock_path, &path)?;
        Ok(())
    }

    pub fn current_branch_name(&self) -> Result<Option<String>> {
        match self.read_head()? {
            Some(HeadState::Symbolic(refname)) => {
                Ok(refname.strip_prefix(REF_HEADS_PREFIX).map(str::to_string))
            }
            _ => Ok(None),
        }
    }

    pub fn head_commit(&self) -> Result<Option<Oid>> {
        match self.read_head()? {
            None => Ok(None),
            Some(HeadState::Detached(oid)) => Ok(Some(oid)),
            Some(HeadState::Symbolic(refname)) => self.resolve_ref(&refname),
        }
    }

    pub fn list_branches(&self) -> Result<Vec<String>> {
        list_loose_names(&self.git_dir.join("refs").join("heads"))
    }

    pub fn list_tags(&self) -> Result<Vec<String>> {
        list_loose_names(&self.git_dir.join("refs").join("tags"))
    }

    /// Full ref names (e.g. `refs/heads/main`) under `prefix`, merged from
    /// loose refs and `packed-refs`.
    pub fn list_ref_names_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        let dir = self.git_dir.join(prefix.trim_end_matches('/'));
        for name in list_loose_names(&dir)? {
            names.push(format!("{prefix}{name}"));
        }
        for (refname, _) in self.read_packed_refs() {
            if refname.starts_with(prefix) && !names.contains(&refname) {
                names.push(refname);
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

fn list_loose_names(dir: &Path) -> Result<Vec<String>> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Ok(Vec::new());
    };
    let mut names = Vec::new();
    for entry in entries.flatten() {
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

const TAG_FORBIDDEN: &[char] = &[' ', '~', '^', ':', '?', '*', '[', ']', '\\'];

/// Git refname rules for tags: no leading/trailing `/`, no `..` or `//`, no
/// leading `.`, and none of the characters reserved by git's ref grammar.
pub fn validate_tag_name(name: &str) -> Result<()> {
    let bad = |name: &str| Error::InvalidRef(format!("invalid tag name: {name:?}"));
    if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
        return Err(bad(name));
    }
    if name.contains("..") || name.contains("//") {
        return Err(bad(name));
    }
    if name.chars().any(|c| TAG_FORBIDDEN.contains(&c)) {
        return Err(bad(name));
    }
    if name.starts_with('.') {
        return Err(bad(name));
    }
    Ok(())
}

pub fn tag_ref_name(name: &str) -> String {
    format!("{REF_TAGS_PREFIX}{name}")
}

pub fn branch_ref_name(name: &str) -> String {
    format!("{REF_HEADS_PREFIX}{name}")
}

fn read_text(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> RefStore {
        std::fs::create_dir_all(dir.join("refs/heads")).unwrap();
        RefStore::new(dir)
    }

    #[test]
    fn head_roundtrip_symbolic_and_detached() {
        let dir = tempfile::tempdir().unwrap();
        let refs = store(dir.path());
        refs.write_head_ref("refs/heads/main").unwrap();
        assert_eq!(
            refs.read_head().unwrap(),
            Some(HeadState::Symbolic("refs/heads/main".into()))
        );
        let oid = Oid::of(b"commit");
        refs.write_head_detached(oid).unwrap();
        assert_eq!(refs.read_head().unwrap(), Some(HeadState::Detached(oid)));
    }

    #[test]
    fn resolve_ref_follows_loose_then_packed() {
        let dir = tempfile::tempdir().unwrap();
        let refs = store(dir.path());
        let oid = Oid::of(b"loose commit");
        refs.update_ref("refs/heads/main", oid).unwrap();
        assert_eq!(refs.resolve_ref("refs/heads/main").unwrap(), Some(oid));

        let packed_oid = Oid::of(b"packed commit");
        std::fs::write(
            dir.path().join("packed-refs"),
            format!("{} refs/heads/packed-only\n", packed_oid.hex()),
        )
        .unwrap();
        assert_eq!(refs.resolve_ref("refs/heads/packed-only").unwrap(), Some(packed_oid));
        assert_eq!(refs.resolve_ref("refs/heads/missing").unwrap(), None);
    }

    #[test]
    fn update_ref_verify_rejects_stale_expectation() {
        let dir = tempfile::tempdir().unwrap();
        let refs = store(dir.path());
        let first = Oid::of(b"first");
        let second = Oid::of(b"second");
        refs.update_ref("refs/heads/main", first).unwrap();
        assert!(refs
            .update_ref_verify("refs/heads/main", second, Some(Oid::of(b"wrong")))
            .is_err());
        refs.update_ref_verify("refs/heads/main", second, Some(first)).unwrap();
        assert_eq!(refs.resolve_ref("refs/heads/main").unwrap(), Some(second));
    }

    #[test]
    fn validate_tag_name_rejects_reserved_characters() {
        assert!(validate_tag_name("v1.0").is_ok());
        assert!(validate_tag_name("v1.0 beta").is_err());
        assert!(validate_tag_name("/leading").is_err());
        assert!(validate_tag_name(".hidden").is_err());
        assert!(validate_tag_name("a..b").is_err());
    }
}
