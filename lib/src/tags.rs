//! Lightweight and annotated tags.
//!
//! Grounded on `examples/original_source/pygit/porcelain.py`'s
//! `tag_list`/`tag_create_lightweight`/`tag_create_annotated`/`tag_delete`.

use crate::error::{Error, Result};
use crate::hash::Oid;
use crate::identity::{resolve_signature, IdentitySource};
use crate::object::{Object, Tag};
use crate::refs::{tag_ref_name, validate_tag_name};
use crate::repository::Repository;
use crate::revparse;

pub fn tag_list(repo: &Repository) -> Result<Vec<String>> {
    let mut names = repo.refs().list_tags()?;
    names.sort();
    Ok(names)
}

/// Create `refs/tags/<name>` pointing directly at `target` (peeled to a
/// non-tag object), refusing to overwrite an existing tag unless `force`.
pub fn tag_create_lightweight(repo: &Repository, name: &str, target: &str, force: bool) -> Result<Oid> {
    validate_tag_name(name)?;
    let refname = tag_ref_name(name);
    if repo.git_dir().join(&refname).is_file() && !force {
        return Err(Error::other(format!("tag '{name}' already exists")));
    }
    let refs = repo.refs();
    let sha = revparse::rev_parse(repo.store(), &refs, target, true)?;
    refs.update_ref_verify(&refname, sha, None)?;
    Ok(sha)
}

/// Create an annotated tag: a [`Tag`] object in the store, with
/// `refs/tags/<name>` pointing at the tag object (not its target directly).
pub fn tag_create_annotated(
    repo: &Repository,
    name: &str,
    target: &str,
    message: &str,
    force: bool,
    identity: &dyn IdentitySource,
) -> Result<Oid> {
    validate_tag_name(name)?;
    let refname = tag_ref_name(name);
    if repo.git_dir().join(&refname).is_file() && !force {
        return Err(Error::other(format!("tag '{name}' already exists")));
    }
    let refs = repo.refs();
    let sha = revparse::rev_parse(repo.store(), &refs, target, false)?;
    let target_kind = repo.store().load(&sha)?.kind();
    let tagger = resolve_signature(identity, "TAGGER");
    let tag = Tag::new(sha, target_kind, name.to_string(), tagger.identity_line(), tagger.timestamp, tagger.tz_offset, message.to_string());
    let tag_oid = repo.store().store(&Object::Tag(tag))?;
    refs.update_ref_verify(&refname, tag_oid, None)?;
    Ok(tag_oid)
}

pub fn tag_delete(repo: &Repository, name: &str) -> Result<()> {
    validate_tag_name(name)?;
    let refname = tag_ref_name(name);
    let path = repo.git_dir().join(&refname);
    if !path.is_file() {
        return Err(Error::other(format!("tag '{name}' not found")));
    }
    std::fs::remove_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::identity::SystemIdentitySource;
    use crate::index::IndexEntry;
    use crate::object::{Kind, Mode};
    use crate::porcelain;

    fn write_and_stage(repo: &Repository, path: &str, content: &[u8]) {
        let full = repo.work_dir().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(&full, content).unwrap();
        let oid = repo.store().store(&Object::Blob(content.to_vec())).unwrap();
        let mut index = repo.read_index().unwrap();
        index.upsert(IndexEntry::new(path.to_string(), oid, Mode::File, content.len() as u32, 0, 0));
        repo.write_index(&index).unwrap();
    }

    #[test]
    fn lightweight_and_annotated_tags_resolve_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let config = Config::default();
        let source = SystemIdentitySource { config: Some(&config) };

        write_and_stage(&repo, "a.txt", b"a\n");
        let a = porcelain::commit(&repo, "A", &source).unwrap().unwrap();
        tag_create_lightweight(&repo, "t1", "HEAD", false).unwrap();

        write_and_stage(&repo, "b.txt", b"b\n");
        let b = porcelain::commit(&repo, "B", &source).unwrap().unwrap();
        let tag_oid = tag_create_annotated(&repo, "t2", "HEAD", "annotated t2", false, &source).unwrap();

        assert_eq!(repo.refs().resolve_ref("refs/tags/t1").unwrap(), Some(a));
        let Object::Tag(tag) = repo.store().load(&tag_oid).unwrap() else { panic!("expected a tag object") };
        assert_eq!(tag.target, b);
        assert_eq!(tag.target_kind, Kind::Commit);
        assert_eq!(tag_list(&repo).unwrap(), vec!["t1".to_string(), "t2".to_string()]);
    }
}
