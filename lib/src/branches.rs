//! Staging (`add`) and branch/checkout porcelain.
//!
//! Grounded on `examples/original_source/pygit/porcelain.py`'s
//! `add_path`/`_add_file`/`_add_directory` and
//! `branch_list`/`branch_create`/`branch_delete`/`checkout_branch`.
//! Ignore-pattern matching is out of scope (SPEC_FULL.md "OUT OF SCOPE");
//! `add` here stages every regular file under the given path.

use tracing::info;

use crate::error::{Error, Result};
use crate::hash::Oid;
use crate::identity::Signature;
use crate::index::IndexEntry;
use crate::object::{Mode, Object};
use crate::reflog;
use crate::refs::branch_ref_name;
use crate::repository::Repository;
use crate::tree_builder;

fn mode_for(path: &std::path::Path) -> Mode {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.permissions().mode() & 0o111 != 0 {
                return Mode::Executable;
            }
        }
    }
    Mode::File
}

fn stage_file(repo: &Repository, rel_path: &str) -> Result<()> {
    let full = repo.safe_path(rel_path)?;
    let content = std::fs::read(&full)?;
    let mode = mode_for(&full);
    let oid = repo.store().store(&Object::Blob(content.clone()))?;
    let mut index = repo.read_index()?;
    index.upsert(IndexEntry::new(rel_path.to_string(), oid, mode, content.len() as u32, 0, 0));
    repo.write_index(&index)
}

/// Stage `path`: a single file, or every regular file under a directory
/// (skipping the control directory). Returns the number of files staged.
pub fn add_path(repo: &Repository, path: &str) -> Result<usize> {
    let full = repo.safe_path(path)?;
    if full.is_file() {
        stage_file(repo, path)?;
        return Ok(1);
    }
    if !full.is_dir() {
        return Err(Error::other(format!("path {path} not found")));
    }
    let mut count = 0;
    add_directory(repo, &full, &mut count)?;
    Ok(count)
}

fn add_directory(repo: &Repository, dir: &std::path::Path, count: &mut usize) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()) == Some(crate::repository::CONTROL_DIR) {
            continue;
        }
        if path.is_dir() {
            add_directory(repo, &path, count)?;
        } else if let Ok(rel) = path.strip_prefix(repo.work_dir()) {
            if let Some(rel) = rel.to_str() {
                stage_file(repo, &rel.replace('\\', "/"))?;
                *count += 1;
            }
        }
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchListing {
    pub current: Option<String>,
    pub names: Vec<String>,
}

pub fn branch_list(repo: &Repository) -> Result<BranchListing> {
    let refs = repo.refs();
    let mut names = refs.list_branches()?;
    names.sort();
    Ok(BranchListing { current: refs.current_branch_name()?, names })
}

/// Create `name` at the current HEAD. Errors if there is no commit yet.
pub fn branch_create(repo: &Repository, name: &str) -> Result<Oid> {
    let refs = repo.refs();
    let head = refs
        .head_commit()?
        .ok_or_else(|| Error::other("no commits yet, cannot create a branch"))?;
    refs.update_ref(&branch_ref_name(name), head)?;
    Ok(head)
}

/// Delete branch `name`. Refuses to delete the currently checked-out branch.
pub fn branch_delete(repo: &Repository, name: &str) -> Result<()> {
    let refs = repo.refs();
    if refs.current_branch_name()?.as_deref() == Some(name) {
        return Err(Error::other(format!("cannot delete current branch {name}")));
    }
    let path = repo.git_dir().join(branch_ref_name(name));
    if !path.is_file() {
        return Err(Error::other(format!("branch {name} not found")));
    }
    std::fs::remove_file(path)?;
    Ok(())
}

fn restore_working_to_commit(repo: &Repository, commit: Oid) -> Result<()> {
    let Object::Commit(commit) = repo.store().load(&commit)? else {
        return Err(Error::other(format!("{} is not a commit", commit.hex())));
    };
    for path in crate::porcelain::tracked_paths(repo)? {
        let full = repo.work_dir().join(&path);
        let _ = std::fs::remove_file(&full);
        if let Some(mut dir) = full.parent().map(std::path::Path::to_path_buf) {
            while dir != repo.work_dir() && dir.is_dir() {
                if std::fs::read_dir(&dir).map(|mut d| d.next().is_none()).unwrap_or(false) {
                    if std::fs::remove_dir(&dir).is_err() {
                        break;
                    }
                    dir = match dir.parent() {
                        Some(p) => p.to_path_buf(),
                        None => break,
                    };
                } else {
                    break;
                }
            }
        }
    }
    tree_builder::checkout_tree(repo.store(), commit.tree, repo.work_dir())?;
    let index = tree_builder::index_from_tree(repo.store(), commit.tree)?;
    repo.write_index(&index)
}

/// Checkout an existing branch, create-and-checkout a new one (`create`),
/// or detach HEAD at a 40-hex commit id.
pub fn checkout_branch(repo: &Repository, target: &str, create: bool, signature: &Signature) -> Result<()> {
    let refs = repo.refs();
    let old_commit = refs.head_commit()?;
    let from_desc = refs
        .current_branch_name()?
        .unwrap_or_else(|| old_commit.map(|o| o.hex()[..7].to_string()).unwrap_or_else(|| "xxx".into()));

    if target.len() == 40 && target.bytes().all(|b| b.is_ascii_hexdigit()) {
        let oid = Oid::from_hex(target).ok_or_else(|| Error::other(format!("commit {target} not found")))?;
        if !repo.store().exists(&oid) {
            return Err(Error::other(format!("commit {target} not found")));
        }
        refs.write_head_detached(oid)?;
        let message = format!("checkout: moving from {from_desc} to {}", &oid.hex()[..7]);
        reflog::append(repo.git_dir(), "HEAD", old_commit.unwrap_or(Oid::ZERO), oid, signature, &message);
        restore_working_to_commit(repo, oid)?;
        return Ok(());
    }

    let refname = branch_ref_name(target);
    let ref_path = repo.git_dir().join(&refname);
    if !ref_path.is_file() {
        if !create {
            return Err(Error::other(format!("branch '{target}' not found")));
        }
        let head = refs
            .head_commit()?
            .ok_or_else(|| Error::other("no commits yet, cannot create a branch"))?;
        refs.update_ref(&refname, head)?;
        refs.write_head_ref(&refname)?;
        let message = format!("checkout: moving from {from_desc} to {target}");
        reflog::append(repo.git_dir(), "HEAD", old_commit.unwrap_or(Oid::ZERO), head, signature, &message);
        restore_working_to_commit(repo, head)?;
        info!(branch = %target, "created and switched branch");
        return Ok(());
    }

    refs.write_head_ref(&refname)?;
    let new_head = refs.head_commit()?;
    let message = format!("checkout: moving from {from_desc} to {target}");
    reflog::append(
        repo.git_dir(),
        "HEAD",
        old_commit.unwrap_or(Oid::ZERO),
        new_head.unwrap_or(Oid::ZERO),
        signature,
        &message,
    );
    if let Some(head) = new_head {
        restore_working_to_commit(repo, head)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{resolve_signature, SystemIdentitySource};

    fn signature() -> Signature {
        let config = crate::config::Config::default();
        let source = SystemIdentitySource { config: Some(&config) };
        resolve_signature(&source, "COMMITTER")
    }

    #[test]
    fn add_path_stages_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(repo.work_dir().join("a.txt"), b"hi").unwrap();
        assert_eq!(add_path(&repo, "a.txt").unwrap(), 1);
        assert!(repo.read_index().unwrap().get("a.txt").is_some());
    }

    #[test]
    fn add_path_stages_directory_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::create_dir_all(repo.work_dir().join("sub")).unwrap();
        std::fs::write(repo.work_dir().join("sub/a.txt"), b"a").unwrap();
        std::fs::write(repo.work_dir().join("sub/b.txt"), b"b").unwrap();
        assert_eq!(add_path(&repo, "sub").unwrap(), 2);
    }

    #[test]
    fn branch_create_then_checkout() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        std::fs::write(repo.work_dir().join("a.txt"), b"v1").unwrap();
        add_path(&repo, "a.txt").unwrap();
        let config = crate::config::Config::default();
        let source = SystemIdentitySource { config: Some(&config) };
        crate::porcelain::commit(&repo, "first", &source).unwrap();

        let head = repo.refs().head_commit().unwrap().unwrap();
        let created = branch_create(&repo, "feature").unwrap();
        assert_eq!(created, head);

        checkout_branch(&repo, "feature", false, &signature()).unwrap();
        assert_eq!(repo.refs().current_branch_name().unwrap().as_deref(), Some("feature"));
    }

    #[test]
    fn branch_delete_refuses_current_branch() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        assert!(branch_delete(&repo, "main").is_err());
    }
}
