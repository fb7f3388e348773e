//! Three-way merge: per-path content classification, text conflict markers,
//! binary conflict handling, and the `merge` porcelain (fast-forward
//! detection, merge-commit synthesis, `--no-ff`/`--ff-only`/`--force`).
//!
//! Grounded on `examples/original_source/pygit/porcelain.py`'s
//! `_merge_file_content`/`three_way_apply`/`merge`.

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{Error, Result};
use crate::fs_util;
use crate::graph;
use crate::hash::Oid;
use crate::identity::{resolve_signature, IdentitySource, Signature};
use crate::index::{Index, IndexEntry};
use crate::object::{Commit, Mode, Object};
use crate::odb::Store;
use crate::porcelain;
use crate::reflog;
use crate::refs::branch_ref_name;
use crate::repository::Repository;
use crate::revparse;
use crate::tree_builder;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub conflicts: Vec<String>,
    pub binary_conflicts: Vec<String>,
    pub updated_paths: Vec<String>,
    pub deleted_paths: Vec<String>,
}

/// Classify the merge of one file's three variants. Returns the resulting
/// content (`None` means delete) and whether the path is in conflict.
/// `base`/`ours`/`theirs` are `None` when the path doesn't exist on that
/// side. Mirrors `_merge_file_content`'s case table exactly, including its
/// asymmetry (a path added identically on both sides with no base is not a
/// conflict; added differently on both sides with no base is).
pub fn merge_file_content(
    base: Option<&[u8]>,
    ours: Option<&[u8]>,
    theirs: Option<&[u8]>,
) -> (Option<Vec<u8>>, bool) {
    if ours == theirs {
        return (ours.map(<[u8]>::to_vec), false);
    }
    if base == ours && base != theirs {
        return (theirs.map(<[u8]>::to_vec), false);
    }
    if base == theirs && base != ours {
        return (ours.map(<[u8]>::to_vec), false);
    }
    if base.is_none() {
        return match (ours, theirs) {
            (None, Some(t)) => (Some(t.to_vec()), false),
            (Some(o), None) => (Some(o.to_vec()), false),
            (Some(o), Some(t)) if o != t => (None, true),
            _ => (ours.map(<[u8]>::to_vec), false),
        };
    }
    if ours.is_none() && theirs == base {
        return (None, false);
    }
    if theirs.is_none() && ours == base {
        return (None, false);
    }
    (None, true)
}

fn list_tree_paths(store: &Store, tree: Oid) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    collect_paths(store, tree, "", &mut out)?;
    Ok(out)
}

fn collect_paths(store: &Store, tree: Oid, prefix: &str, out: &mut BTreeSet<String>) -> Result<()> {
    let Object::Tree(tree) = store.load(&tree)? else { return Ok(()) };
    for entry in &tree.entries {
        let path = if prefix.is_empty() { entry.name.clone() } else { format!("{prefix}/{}", entry.name) };
        if entry.mode.is_tree() {
            collect_paths(store, entry.oid, &path, out)?;
        } else {
            out.insert(path);
        }
    }
    Ok(())
}

fn read_blob_at_path(store: &Store, tree: Oid, rel_path: &str) -> Result<Option<Vec<u8>>> {
    let mut current = tree;
    let parts: Vec<&str> = rel_path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        return Ok(None);
    }
    for (i, part) in parts.iter().enumerate() {
        let Object::Tree(tree) = store.load(&current)? else { return Ok(None) };
        let Some(found) = tree.entries.iter().find(|e| &e.name == part) else { return Ok(None) };
        if i == parts.len() - 1 {
            return if found.mode.is_tree() {
                Ok(None)
            } else if let Object::Blob(content) = store.load(&found.oid)? {
                Ok(Some(content))
            } else {
                Ok(None)
            };
        }
        if !found.mode.is_tree() {
            return Ok(None);
        }
        current = found.oid;
    }
    Ok(None)
}

#[allow(clippy::too_many_arguments)]
pub fn three_way_merge(
    store: &Store,
    work_dir: &Path,
    index: &mut Index,
    base_tree: Option<Oid>,
    ours_tree: Option<Oid>,
    theirs_tree: Option<Oid>,
    label_ours: &str,
    label_theirs: &str,
) -> Result<MergeOutcome> {
    let paths_base = base_tree.map(|t| list_tree_paths(store, t)).transpose()?.unwrap_or_default();
    let paths_ours = ours_tree.map(|t| list_tree_paths(store, t)).transpose()?.unwrap_or_default();
    let paths_theirs = theirs_tree.map(|t| list_tree_paths(store, t)).transpose()?.unwrap_or_default();
    let all_paths: BTreeSet<String> =
        paths_base.into_iter().chain(paths_ours).chain(paths_theirs).collect();

    let mut outcome = MergeOutcome::default();

    for path in all_paths {
        let base_c = base_tree.map(|t| read_blob_at_path(store, t, &path)).transpose()?.flatten();
        let ours_c = ours_tree.map(|t| read_blob_at_path(store, t, &path)).transpose()?.flatten();
        let theirs_c = theirs_tree.map(|t| read_blob_at_path(store, t, &path)).transpose()?.flatten();

        let (content, conflict) =
            merge_file_content(base_c.as_deref(), ours_c.as_deref(), theirs_c.as_deref());

        if conflict {
            let ours_bin = ours_c.as_deref().is_some_and(fs_util::is_binary);
            let theirs_bin = theirs_c.as_deref().is_some_and(fs_util::is_binary);
            if ours_bin || theirs_bin {
                outcome.binary_conflicts.push(path.clone());
                let write_content = ours_c.unwrap_or_else(|| theirs_c.unwrap_or_default());
                write_file(store, work_dir, index, &path, &write_content)?;
            } else {
                outcome.conflicts.push(path.clone());
                let ours_text = String::from_utf8_lossy(ours_c.as_deref().unwrap_or_default());
                let theirs_text = String::from_utf8_lossy(theirs_c.as_deref().unwrap_or_default());
                let marker = format!(
                    "<<<<<<< {label_ours}\n{ours_text}=======\n{theirs_text}>>>>>>> {label_theirs}\n"
                );
                write_file(store, work_dir, index, &path, marker.as_bytes())?;
            }
            continue;
        }

        match content {
            None => {
                outcome.deleted_paths.push(path.clone());
                let full = work_dir.join(&path);
                let _ = std::fs::remove_file(&full);
                index.remove(&path);
            }
            Some(content) => {
                outcome.updated_paths.push(path.clone());
                write_file(store, work_dir, index, &path, &content)?;
            }
        }
    }

    Ok(outcome)
}

fn write_file(store: &Store, work_dir: &Path, index: &mut Index, path: &str, content: &[u8]) -> Result<()> {
    let full = work_dir.join(path);
    fs_util::write_atomic(&full, content)?;
    let oid = store.store(&Object::Blob(content.to_vec()))?;
    index.upsert(IndexEntry::new(path.to_string(), oid, Mode::File, content.len() as u32, 0, 0));
    Ok(())
}

/// Options controlling [`merge`]'s fast-forward and commit behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOptions {
    /// Always create a merge commit, even when a fast-forward is possible.
    pub no_ff: bool,
    /// Refuse to merge unless it is a fast-forward.
    pub ff_only: bool,
    /// Merge despite a dirty working tree.
    pub force: bool,
}

/// Outcome of [`merge`]. `Conflict` leaves HEAD unchanged; the working tree
/// and index already carry conflict markers for the caller to resolve.
#[derive(Debug)]
pub enum MergeResult {
    AlreadyUpToDate,
    FastForward(Oid),
    Merged(Oid),
    Conflict(MergeOutcome),
}

/// Merge `theirs` (a branch name or any revision) into HEAD. Fast-forwards
/// when possible unless `opts.no_ff`; otherwise synthesizes a merge commit
/// with parents `[HEAD, theirs]` via [`three_way_merge`]. Refuses a dirty
/// working tree unless `opts.force`. Mirrors `porcelain.py::merge`.
pub fn merge(repo: &Repository, theirs: &str, opts: MergeOptions, identity: &dyn IdentitySource) -> Result<MergeResult> {
    if opts.no_ff && opts.ff_only {
        return Err(Error::other("--no-ff and --ff-only are mutually exclusive"));
    }
    if !opts.force && !porcelain::status(repo)?.is_clean() {
        return Err(Error::other("cannot merge: you have local changes"));
    }

    let refs = repo.refs();
    let theirs_tip = revparse::rev_parse(repo.store(), &refs, theirs, true)?;
    let head = refs.head_commit()?.ok_or_else(|| Error::other("cannot merge: no HEAD commit"))?;

    if head == theirs_tip {
        return Ok(MergeResult::AlreadyUpToDate);
    }

    let can_ff = graph::is_ancestor(repo.store(), head, theirs_tip);
    if can_ff && !opts.no_ff {
        let committer = resolve_signature(identity, "COMMITTER");
        return fast_forward(repo, head, theirs_tip, theirs, &committer);
    }
    if opts.ff_only {
        return Err(Error::other("non-fast-forward merge refused (--ff-only)"));
    }

    let base = graph::merge_base(repo.store(), head, theirs_tip);
    let base_tree = match base {
        Some(oid) => tree_of(repo, oid)?,
        None => None,
    };
    let head_tree = tree_of(repo, head)?.ok_or_else(|| Error::other(format!("{} is not a commit", head.hex())))?;
    let theirs_tree =
        tree_of(repo, theirs_tip)?.ok_or_else(|| Error::other(format!("{} is not a commit", theirs_tip.hex())))?;

    let mut index = repo.read_index()?;
    let outcome = three_way_merge(
        repo.store(),
        repo.work_dir(),
        &mut index,
        base_tree,
        Some(head_tree),
        Some(theirs_tree),
        "HEAD",
        theirs,
    )?;
    repo.write_index(&index)?;

    if !outcome.conflicts.is_empty() || !outcome.binary_conflicts.is_empty() {
        return Ok(MergeResult::Conflict(outcome));
    }

    let tree = tree_builder::tree_from_index(repo.store(), &index)?;
    let branch = refs.current_branch_name()?;
    let message = match &branch {
        Some(branch) => format!("Merge {theirs} into {branch}"),
        None => format!("Merge {theirs}"),
    };
    let author = resolve_signature(identity, "AUTHOR");
    let committer = resolve_signature(identity, "COMMITTER");
    let commit = Commit::new(
        tree,
        vec![head, theirs_tip],
        author.identity_line(),
        author.timestamp,
        author.tz_offset.clone(),
        committer.identity_line(),
        committer.timestamp,
        committer.tz_offset.clone(),
        message,
    );
    let commit_oid = repo.store().store(&Object::Commit(commit))?;
    let reflog_message = format!("merge {theirs}: Merge made by the 'recursive' strategy.");
    advance_head(repo, head, commit_oid, &reflog_message, &committer)?;
    Ok(MergeResult::Merged(commit_oid))
}

pub(crate) fn tree_of(repo: &Repository, commit: Oid) -> Result<Option<Oid>> {
    match repo.store().load(&commit)? {
        Object::Commit(c) => Ok(Some(c.tree)),
        _ => Ok(None),
    }
}

fn fast_forward(repo: &Repository, old_head: Oid, new_head: Oid, theirs: &str, committer: &Signature) -> Result<MergeResult> {
    let Some(tree) = tree_of(repo, new_head)? else {
        return Err(Error::other(format!("{} is not a commit", new_head.hex())));
    };
    for path in porcelain::tracked_paths(repo)? {
        let _ = std::fs::remove_file(repo.work_dir().join(path));
    }
    tree_builder::checkout_tree(repo.store(), tree, repo.work_dir())?;
    let index = tree_builder::index_from_tree(repo.store(), tree)?;
    repo.write_index(&index)?;
    let reflog_message = format!("merge {theirs}: Fast-forward");
    advance_head(repo, old_head, new_head, &reflog_message, committer)?;
    Ok(MergeResult::FastForward(new_head))
}

pub(crate) fn advance_head(repo: &Repository, old_head: Oid, new_head: Oid, message: &str, committer: &Signature) -> Result<()> {
    let refs = repo.refs();
    match refs.current_branch_name()? {
        Some(branch) => {
            let refname = branch_ref_name(&branch);
            refs.update_ref(&refname, new_head)?;
            reflog::append(repo.git_dir(), "HEAD", old_head, new_head, committer, message);
            reflog::append(repo.git_dir(), &refname, old_head, new_head, committer, message);
        }
        None => {
            refs.write_head_detached(new_head)?;
            reflog::append(repo.git_dir(), "HEAD", old_head, new_head, committer, message);
        }
    }
    Ok(())
}
