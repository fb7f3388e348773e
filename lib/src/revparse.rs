//! Revision expression parsing: `HEAD`, branch/tag names, full `refs/...`
//! paths, 40-hex object ids, hex prefixes, and the `~n`/`^n`/`^{}` suffixes.
//!
//! Grounded on `examples/original_source/pygit/plumbing.py::rev_parse`.

use crate::error::{Error, Result};
use crate::graph::commit_parents;
use crate::hash::Oid;
use crate::object::{Kind, Object};
use crate::odb::Store;
use crate::refs::RefStore;

/// Resolve `expr` against `refs`/`store` to a single object id. `peel`
/// forces tag objects to be dereferenced to their target even when `expr`
/// doesn't end in `^{}` — callers that need a commit (e.g. the `~`/`^`
/// suffixes, which walk commit parents) always pass `true`.
pub fn rev_parse(store: &Store, refs: &RefStore, expr: &str, peel: bool) -> Result<Oid> {
    let name = expr.trim();
    let invalid = || Error::InvalidRef(format!("invalid ref or object: {expr}"));

    if let Some(base) = name.strip_suffix("^{}") {
        return peel_to_non_tag(store, rev_parse(store, refs, base.trim(), true)?);
    }

    // `rev^n` / `rev^`: n-th parent (1-based), applied right-to-left so
    // `HEAD~1^2` parses as `(HEAD~1)^2`.
    if let Some(caret_idx) = name.rfind('^') {
        let base = name[..caret_idx].trim();
        let num_str = name[caret_idx + 1..].trim();
        if base.is_empty() {
            return Err(invalid());
        }
        if num_str.is_empty() || num_str.chars().all(|c| c.is_ascii_digit()) {
            let parent_idx: usize = if num_str.is_empty() { 1 } else { num_str.parse().map_err(|_| invalid())? };
            if parent_idx < 1 {
                return Err(invalid());
            }
            let sha = rev_parse(store, refs, base, true)?;
            let parents = commit_parents(store, &sha)?;
            return parents.get(parent_idx - 1).copied().ok_or_else(invalid);
        }
    }

    // `rev~n` / `rev~`: walk n first-parents.
    if let Some(tilde_idx) = name.rfind('~') {
        let base = name[..tilde_idx].trim();
        let n_str = name[tilde_idx + 1..].trim();
        if base.is_empty() {
            return Err(invalid());
        }
        let n: u32 = if n_str.is_empty() { 1 } else { n_str.parse().map_err(|_| invalid())? };
        let mut sha = rev_parse(store, refs, base, true)?;
        for _ in 0..n {
            let parents = commit_parents(store, &sha)?;
            sha = *parents.first().ok_or_else(invalid)?;
        }
        return Ok(sha);
    }

    let mut sha = resolve_simple(store, refs, name)?;
    if peel {
        sha = peel_to_non_tag(store, sha)?;
    }
    Ok(sha)
}

fn resolve_simple(store: &Store, refs: &RefStore, name: &str) -> Result<Oid> {
    if name == "HEAD" {
        return refs
            .head_commit()?
            .ok_or_else(|| Error::InvalidRef("HEAD does not resolve to a commit".into()));
    }
    if !name.starts_with("refs/") {
        if let Some(oid) = refs.resolve_ref(&format!("refs/heads/{name}"))? {
            return Ok(oid);
        }
        if let Some(oid) = refs.resolve_ref(&format!("refs/tags/{name}"))? {
            return Ok(oid);
        }
    } else if let Some(oid) = refs.resolve_ref(name)? {
        return Ok(oid);
    }
    store.resolve_prefix(name)
}

fn peel_to_non_tag(store: &Store, mut oid: Oid) -> Result<Oid> {
    loop {
        match store.load(&oid)? {
            Object::Tag(tag) => oid = tag.target,
            _ => return Ok(oid),
        }
    }
}

/// Object kind after peeling tags, used by `cat-file -t`-style callers.
pub fn resolved_kind(store: &Store, oid: Oid) -> Result<Kind> {
    Ok(store.load(&oid)?.kind())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Commit;

    fn setup() -> (tempfile::TempDir, Store, RefStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        let store = Store::open(dir.path().join("objects"));
        let refs = RefStore::new(dir.path());
        (dir, store, refs)
    }

    fn commit(store: &Store, parents: Vec<Oid>, message: &str) -> Oid {
        let tree = Oid::of(b"tree stub");
        let c = Commit::new(
            tree,
            parents,
            "A <a@example.com>".into(),
            1000,
            "+0000".into(),
            "A <a@example.com>".into(),
            1000,
            "+0000".into(),
            message.into(),
        );
        store.store(&Object::Commit(c)).unwrap()
    }

    #[test]
    fn resolves_head_and_branch_names() {
        let (_dir, store, refs) = setup();
        let c1 = commit(&store, vec![], "root");
        refs.update_ref("refs/heads/main", c1).unwrap();
        refs.write_head_ref("refs/heads/main").unwrap();
        assert_eq!(rev_parse(&store, &refs, "HEAD", false).unwrap(), c1);
        assert_eq!(rev_parse(&store, &refs, "main", false).unwrap(), c1);
    }

    #[test]
    fn tilde_and_caret_suffixes_walk_parents() {
        let (_dir, store, refs) = setup();
        let c1 = commit(&store, vec![], "root");
        let c2 = commit(&store, vec![c1], "second");
        let c3 = commit(&store, vec![c2], "third");
        refs.update_ref("refs/heads/main", c3).unwrap();
        refs.write_head_ref("refs/heads/main").unwrap();
        assert_eq!(rev_parse(&store, &refs, "HEAD~1", false).unwrap(), c2);
        assert_eq!(rev_parse(&store, &refs, "HEAD~2", false).unwrap(), c1);
        assert_eq!(rev_parse(&store, &refs, "HEAD^1", false).unwrap(), c2);
        assert_eq!(rev_parse(&store, &refs, "HEAD~1^1", false).unwrap(), c1);
    }

    #[test]
    fn hex_prefix_resolves_via_store() {
        let (_dir, store, refs) = setup();
        let c1 = commit(&store, vec![], "root");
        let short = &c1.hex()[..8];
        assert_eq!(rev_parse(&store, &refs, short, false).unwrap(), c1);
    }
}
