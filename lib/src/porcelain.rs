//! Status, commit, reset, and restore: the porcelain layer built on top of
//! the object store, refs, and staging index.
//!
//! Grounded on `examples/original_source/pygit/porcelain.py`'s
//! `commit`/`status`/`reset_soft`/`reset_mixed`/`reset_hard`/`restore`.

use std::collections::BTreeSet;

use tracing::info;

use crate::error::{Error, Result};
use crate::hash::Oid;
use crate::identity::{IdentitySource, Signature};
use crate::index::Index;
use crate::object::{Commit, Object};
use crate::reflog;
use crate::repository::{Repository, DEFAULT_BRANCH};
use crate::revparse;
use crate::tree_builder;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusReport {
    pub branch: Option<String>,
    pub head: Option<Oid>,
    pub staged_new: Vec<String>,
    pub staged_modified: Vec<String>,
    pub unstaged_modified: Vec<String>,
    pub untracked: Vec<String>,
    pub deleted: Vec<String>,
}

impl StatusReport {
    pub fn is_clean(&self) -> bool {
        self.staged_new.is_empty()
            && self.staged_modified.is_empty()
            && self.unstaged_modified.is_empty()
            && self.untracked.is_empty()
            && self.deleted.is_empty()
    }
}

/// Every file path reachable from HEAD's tree, recursively. Used by
/// checkout/reset to know which working-tree files belong to the commit
/// being left behind.
pub fn tracked_paths(repo: &Repository) -> Result<Vec<String>> {
    let Some(head) = repo.refs().head_commit()? else {
        return Ok(Vec::new());
    };
    let Object::Commit(commit) = repo.store().load(&head)? else {
        return Ok(Vec::new());
    };
    let index = tree_builder::index_from_tree(repo.store(), commit.tree)?;
    Ok(index.entries().iter().map(|e| e.path.clone()).collect())
}

fn head_index(repo: &Repository) -> Result<Index> {
    let Some(head) = repo.refs().head_commit()? else {
        return Ok(Index::new());
    };
    let Object::Commit(commit) = repo.store().load(&head)? else {
        return Ok(Index::new());
    };
    tree_builder::index_from_tree(repo.store(), commit.tree)
}

fn working_tree_files(repo: &Repository) -> Result<Vec<String>> {
    let mut out = Vec::new();
    collect_files(repo.work_dir(), repo.work_dir(), &mut out)?;
    Ok(out)
}

fn collect_files(root: &std::path::Path, dir: &std::path::Path, out: &mut Vec<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()) == Some(crate::repository::CONTROL_DIR) {
            continue;
        }
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            if let Some(rel) = rel.to_str() {
                out.push(rel.replace('\\', "/"));
            }
        }
    }
    Ok(())
}

pub fn status(repo: &Repository) -> Result<StatusReport> {
    let branch = repo.refs().current_branch_name()?;
    let head = repo.refs().head_commit()?;
    let index = repo.read_index()?;
    let head_idx = head_index(repo)?;

    let working_paths = working_tree_files(repo)?;
    let mut working_hashes = std::collections::HashMap::new();
    for path in &working_paths {
        if let Ok(content) = std::fs::read(repo.work_dir().join(path)) {
            working_hashes.insert(path.clone(), Object::Blob(content).hash());
        }
    }

    let indexed: BTreeSet<String> = index.entries().iter().map(|e| e.path.clone()).collect();
    let committed: BTreeSet<String> = head_idx.entries().iter().map(|e| e.path.clone()).collect();

    let mut staged_new = Vec::new();
    let mut staged_modified = Vec::new();
    for path in indexed.union(&committed) {
        let idx_oid = index.get(path).map(|e| e.oid);
        let head_oid = head_idx.get(path).map(|e| e.oid);
        match (idx_oid, head_oid) {
            (Some(_), None) => staged_new.push(path.clone()),
            (Some(i), Some(h)) if i != h => staged_modified.push(path.clone()),
            _ => {}
        }
    }

    let mut unstaged_modified = Vec::new();
    for (path, hash) in &working_hashes {
        if let Some(entry) = index.get(path) {
            if &entry.oid != hash {
                unstaged_modified.push(path.clone());
            }
        }
    }

    let mut untracked = Vec::new();
    for path in working_hashes.keys() {
        if !indexed.contains(path) && !committed.contains(path) {
            untracked.push(path.clone());
        }
    }

    let mut deleted = Vec::new();
    for path in &indexed {
        if !working_hashes.contains_key(path) {
            deleted.push(path.clone());
        }
    }

    staged_new.sort();
    staged_modified.sort();
    unstaged_modified.sort();
    untracked.sort();
    deleted.sort();

    Ok(StatusReport {
        branch,
        head,
        staged_new,
        staged_modified,
        unstaged_modified,
        untracked,
        deleted,
    })
}

/// Create a commit from the current index. Returns `Ok(None)` without
/// creating anything if the index is empty or its tree is unchanged from
/// HEAD's, matching `commit()`'s "nothing to commit" short-circuit.
pub fn commit(repo: &Repository, message: &str, identity: &dyn IdentitySource) -> Result<Option<Oid>> {
    let index = repo.read_index()?;
    if index.entries().is_empty() {
        return Ok(None);
    }
    let tree = tree_builder::tree_from_index(repo.store(), &index)?;
    let refs = repo.refs();
    let branch = refs.current_branch_name()?.unwrap_or_else(|| DEFAULT_BRANCH.to_string());
    let parent = refs.head_commit()?;

    if let Some(parent_oid) = parent {
        if let Object::Commit(parent_commit) = repo.store().load(&parent_oid)? {
            if parent_commit.tree == tree {
                return Ok(None);
            }
        }
    }

    let author = crate::identity::resolve_signature(identity, "AUTHOR");
    let committer = crate::identity::resolve_signature(identity, "COMMITTER");
    let commit_obj = Commit::new(
        tree,
        parent.into_iter().collect(),
        author.identity_line(),
        author.timestamp,
        author.tz_offset.clone(),
        committer.identity_line(),
        committer.timestamp,
        committer.tz_offset.clone(),
        message.to_string(),
    );
    let commit_oid = repo.store().store(&Object::Commit(commit_obj))?;

    let refname = crate::refs::branch_ref_name(&branch);
    let old_head = parent.unwrap_or(Oid::ZERO);
    refs.update_ref(&refname, commit_oid)?;
    let first_line = message.lines().next().unwrap_or_default();
    let log_message = format!("commit: {first_line}");
    reflog::append(repo.git_dir(), "HEAD", old_head, commit_oid, &committer, &log_message);
    reflog::append(repo.git_dir(), &refname, old_head, commit_oid, &committer, &log_message);
    info!(commit = %commit_oid.hex(), %branch, "created commit");
    Ok(Some(commit_oid))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetMode {
    Soft,
    Mixed,
    Hard,
}

/// Move HEAD (and the current branch, if any) to `commit_ish`. `Mixed` also
/// resets the index to match; `Hard` additionally overwrites the working
/// tree. `Soft` touches neither.
pub fn reset(repo: &Repository, mode: ResetMode, commit_ish: &str, signature: &Signature) -> Result<Oid> {
    let refs = repo.refs();
    let sha = revparse::rev_parse(repo.store(), &refs, commit_ish, true)?;
    let branch = refs.current_branch_name()?;
    let old_head = refs.head_commit()?.unwrap_or(Oid::ZERO);
    let message = format!("reset: moving to {}", &sha.hex()[..7]);

    if let Some(branch) = &branch {
        let refname = crate::refs::branch_ref_name(branch);
        refs.update_ref(&refname, sha)?;
        reflog::append(repo.git_dir(), "HEAD", old_head, sha, signature, &message);
        reflog::append(repo.git_dir(), &refname, old_head, sha, signature, &message);
    } else {
        refs.write_head_detached(sha)?;
        reflog::append(repo.git_dir(), "HEAD", old_head, sha, signature, &message);
    }

    if mode == ResetMode::Soft {
        return Ok(sha);
    }

    let Object::Commit(commit) = repo.store().load(&sha)? else {
        return Err(Error::Other(format!("{} is not a commit", sha.hex())));
    };
    let new_index = tree_builder::index_from_tree(repo.store(), commit.tree)?;

    if mode == ResetMode::Hard {
        for path in working_tree_files(repo)? {
            let _ = std::fs::remove_file(repo.work_dir().join(path));
        }
        tree_builder::checkout_tree(repo.store(), commit.tree, repo.work_dir())?;
    }

    repo.write_index(&new_index)?;
    Ok(sha)
}

/// `restore --staged`: reset index entries for `paths` to match `source`
/// (defaulting to HEAD), without touching the working tree.
pub fn restore_staged(repo: &Repository, paths: &[String], source: Option<&str>) -> Result<()> {
    let mut index = repo.read_index()?;
    let source_tree = source_tree(repo, source)?;
    for path in paths {
        match source_tree.as_ref().and_then(|idx| idx.get(path)).cloned() {
            Some(entry) => index.upsert(entry),
            None => {
                index.remove(path);
            }
        }
    }
    repo.write_index(&index)
}

/// `restore <paths>`: overwrite working-tree files from the index (or
/// `source` if the path isn't staged), leaving the index untouched.
pub fn restore_worktree(repo: &Repository, paths: &[String], source: Option<&str>) -> Result<()> {
    let index = repo.read_index()?;
    let source_tree = source_tree(repo, source)?;
    for path in paths {
        let full = repo.safe_path(path)?;
        if full.is_dir() {
            continue;
        }
        let oid = index
            .get(path)
            .map(|e| e.oid)
            .or_else(|| source_tree.as_ref().and_then(|idx| idx.get(path)).map(|e| e.oid));
        let Some(oid) = oid else { continue };
        if let Object::Blob(content) = repo.store().load(&oid)? {
            crate::fs_util::write_atomic(&full, &content)?;
        }
    }
    Ok(())
}

fn source_tree(repo: &Repository, source: Option<&str>) -> Result<Option<Index>> {
    let refs = repo.refs();
    let oid = match source {
        Some(expr) => Some(revparse::rev_parse(repo.store(), &refs, expr, true)?),
        None => refs.head_commit()?,
    };
    let Some(oid) = oid else { return Ok(None) };
    let Object::Commit(commit) = repo.store().load(&oid)? else { return Ok(None) };
    Ok(Some(tree_builder::index_from_tree(repo.store(), commit.tree)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::identity::SystemIdentitySource;
    use crate::index::IndexEntry;
    use crate::object::Mode;

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
    fn commit_then_status_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        write_and_stage(&repo, "a.txt", b"hello");
        let config = Config::default();
        let identity = SystemIdentitySource { config: Some(&config) };
        let oid = commit(&repo, "first commit", &identity).unwrap().unwrap();
        assert_eq!(repo.refs().head_commit().unwrap(), Some(oid));

        let report = status(&repo).unwrap();
        assert!(report.is_clean(), "{report:?}");
    }

    #[test]
    fn empty_index_yields_no_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let config = Config::default();
        let identity = SystemIdentitySource { config: Some(&config) };
        assert_eq!(commit(&repo, "nothing", &identity).unwrap(), None);
    }

    #[test]
    fn reset_hard_rewrites_working_tree() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        write_and_stage(&repo, "a.txt", b"v1");
        let config = Config::default();
        let identity = SystemIdentitySource { config: Some(&config) };
        let first = commit(&repo, "v1", &identity).unwrap().unwrap();
        write_and_stage(&repo, "a.txt", b"v2");
        commit(&repo, "v2", &identity).unwrap().unwrap();

        let signature = crate::identity::resolve_signature(&identity, "COMMITTER");
        reset(&repo, ResetMode::Hard, &first.hex(), &signature).unwrap();
        assert_eq!(std::fs::read(repo.work_dir().join("a.txt")).unwrap(), b"v1");
    }
}
