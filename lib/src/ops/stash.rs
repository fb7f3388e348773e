//! Stash: shelve working-tree and index changes onto `refs/stash` and
//! restore HEAD to a clean state, for later re-application.
//!
//! Grounded on `examples/original_source/pygit/stash.py`. A stash entry is
//! a commit with two parents: the original HEAD, and a throwaway commit
//! holding the staged (index) snapshot; the stash commit's own tree holds
//! the working-tree snapshot.

use crate::error::{Error, Result};
use crate::hash::Oid;
use crate::identity::{resolve_signature, IdentitySource};
use crate::object::{Commit, Object};
use crate::porcelain::{self, ResetMode};
use crate::reflog;
use crate::repository::Repository;
use crate::tree_builder;

pub const STASH_REF: &str = "refs/stash";

fn branch_label(repo: &Repository) -> Result<String> {
    Ok(repo.refs().current_branch_name()?.unwrap_or_else(|| "detached HEAD".to_string()))
}

/// Snapshot the index and working tree onto `refs/stash`, then hard-reset
/// the working tree back to HEAD. Errors if there is no HEAD commit.
pub fn save(repo: &Repository, message: Option<&str>, identity: &dyn IdentitySource) -> Result<Oid> {
    let refs = repo.refs();
    let head = refs.head_commit()?.ok_or_else(|| Error::other("cannot stash: no HEAD commit"))?;
    let branch = branch_label(repo)?;

    let index = repo.read_index()?;
    let index_tree = tree_builder::tree_from_index(repo.store(), &index)?;
    let worktree_tree = tree_builder::tree_from_working_dir(repo.store(), repo.work_dir())?;

    let author = resolve_signature(identity, "AUTHOR");
    let committer = resolve_signature(identity, "COMMITTER");
    let subject = match message {
        Some(m) => m.to_string(),
        None => format!("WIP on {branch}"),
    };
    let index_msg = format!("index on {branch}: {subject}");

    let index_commit = Commit::new(
        index_tree,
        vec![head],
        author.identity_line(),
        author.timestamp,
        author.tz_offset.clone(),
        committer.identity_line(),
        committer.timestamp,
        committer.tz_offset.clone(),
        index_msg,
    );
    let index_commit_oid = repo.store().store(&Object::Commit(index_commit))?;

    let stash_commit = Commit::new(
        worktree_tree,
        vec![head, index_commit_oid],
        author.identity_line(),
        author.timestamp,
        author.tz_offset,
        committer.identity_line(),
        committer.timestamp,
        committer.tz_offset.clone(),
        subject.clone(),
    );
    let stash_oid = repo.store().store(&Object::Commit(stash_commit))?;

    let old_stash = refs.resolve_ref(STASH_REF)?.unwrap_or(Oid::ZERO);
    refs.update_ref(STASH_REF, stash_oid)?;
    reflog::append(repo.git_dir(), STASH_REF, old_stash, stash_oid, &committer, &subject);

    porcelain::reset(repo, ResetMode::Hard, &head.hex(), &committer)?;
    Ok(stash_oid)
}

/// `(stash@{n}, message)` pairs, newest first.
pub fn list(repo: &Repository) -> Result<Vec<(String, String)>> {
    let entries = reflog::read(repo.git_dir(), STASH_REF)?;
    Ok(entries
        .into_iter()
        .rev()
        .enumerate()
        .map(|(i, entry)| (format!("stash@{{{i}}}"), entry.message))
        .collect())
}

fn resolve_stash_ref(repo: &Repository, reference: &str) -> Result<Option<Oid>> {
    if reference == "stash" || reference == "stash@{}" {
        return repo.refs().resolve_ref(STASH_REF);
    }
    let Some(n_str) = reference.strip_prefix("stash@{").and_then(|s| s.strip_suffix('}')) else {
        return Err(Error::other(format!("invalid stash reference: {reference}")));
    };
    let n: usize = n_str.parse().map_err(|_| Error::other(format!("invalid stash reference: {reference}")))?;
    let entries = reflog::read(repo.git_dir(), STASH_REF)?;
    if n + 1 > entries.len() {
        return Ok(None);
    }
    Ok(Some(entries[entries.len() - 1 - n].new))
}

fn restore_from(repo: &Repository, stash_oid: Oid) -> Result<()> {
    let Object::Commit(commit) = repo.store().load(&stash_oid)? else {
        return Err(Error::other(format!("{} is not a commit", stash_oid.hex())));
    };
    if commit.parents.len() < 2 {
        return Err(Error::other("invalid stash entry (expected 2 parents)"));
    }
    let index_commit_oid = commit.parents[1];
    let Object::Commit(index_commit) = repo.store().load(&index_commit_oid)? else {
        return Err(Error::other(format!("{} is not a commit", index_commit_oid.hex())));
    };

    let index = tree_builder::index_from_tree(repo.store(), index_commit.tree)?;
    repo.write_index(&index)?;
    for path in porcelain::tracked_paths(repo)? {
        let _ = std::fs::remove_file(repo.work_dir().join(path));
    }
    tree_builder::checkout_tree(repo.store(), commit.tree, repo.work_dir())
}

/// Apply `reference` (default `stash@{0}`) without removing it.
pub fn apply(repo: &Repository, reference: Option<&str>) -> Result<()> {
    let reference = reference.unwrap_or("stash@{0}");
    let stash_oid = resolve_stash_ref(repo, reference)?.ok_or_else(|| Error::other("stash not found"))?;
    restore_from(repo, stash_oid)
}

/// Apply `reference` (default `stash@{0}`), then drop it. Only `stash@{0}`
/// can be dropped; any other index raises an error, matching the original
/// tool's limitation.
pub fn pop(repo: &Repository, reference: Option<&str>) -> Result<()> {
    let reference = reference.unwrap_or("stash@{0}");
    let stash_oid = resolve_stash_ref(repo, reference)?.ok_or_else(|| Error::other("stash not found"))?;
    restore_from(repo, stash_oid)?;
    drop_entry(repo, reference)
}

fn drop_entry(repo: &Repository, reference: &str) -> Result<()> {
    let is_top = reference == "stash" || reference == "stash@{}" || reference == "stash@{0}";
    if !is_top {
        return Err(Error::other("stash pop only supports stash@{0} for now"));
    }

    let path = reflog_path(repo);
    let content = std::fs::read_to_string(&path).unwrap_or_default();
    let mut lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Ok(());
    }
    lines.pop();

    if lines.is_empty() {
        let _ = std::fs::remove_file(repo.git_dir().join(STASH_REF));
        let _ = std::fs::remove_file(&path);
        return Ok(());
    }

    let entries = reflog::read(repo.git_dir(), STASH_REF)?;
    let new_top = entries[entries.len() - 2].new;
    repo.refs().update_ref(STASH_REF, new_top)?;

    let mut rewritten = lines.join("\n");
    rewritten.push('\n');
    std::fs::write(&path, rewritten)?;
    Ok(())
}

fn reflog_path(repo: &Repository) -> std::path::PathBuf {
    repo.git_dir().join("logs").join(STASH_REF)
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
    fn save_then_pop_restores_working_tree() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let config = Config::default();
        let source = SystemIdentitySource { config: Some(&config) };

        write_and_stage(&repo, "a.txt", b"committed");
        porcelain::commit(&repo, "base", &source).unwrap();

        write_and_stage(&repo, "a.txt", b"staged edit");
        std::fs::write(repo.work_dir().join("b.txt"), b"untracked-ish worktree file").unwrap();

        save(&repo, Some("wip"), &source).unwrap();
        assert_eq!(std::fs::read(repo.work_dir().join("a.txt")).unwrap(), b"committed");
        assert!(porcelain::status(&repo).unwrap().is_clean());

        let listed = list(&repo).unwrap();
        assert_eq!(listed[0].0, "stash@{0}");
        assert_eq!(listed[0].1, "wip");

        pop(&repo, None).unwrap();
        assert_eq!(std::fs::read(repo.work_dir().join("a.txt")).unwrap(), b"staged edit");
        assert_eq!(std::fs::read(repo.work_dir().join("b.txt")).unwrap(), b"untracked-ish worktree file");
        assert!(list(&repo).unwrap().is_empty());
    }
}
