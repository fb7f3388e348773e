//! Cherry-pick: apply a single commit's change on top of HEAD as a new,
//! single-parent commit, with a conflict-suspend/`--continue`/`--abort`
//! state machine for when the three-way apply doesn't resolve cleanly.
//!
//! Grounded on `examples/original_source/pygit/porcelain.py`'s cherry-pick
//! section (`cherry_pick`/`cherry_pick_continue`/`cherry_pick_abort`).

use crate::error::{Error, Result};
use crate::hash::Oid;
use crate::identity::{resolve_signature, IdentitySource};
use crate::merge::{self, MergeOutcome};
use crate::object::{Commit, Object};
use crate::porcelain::{self, ResetMode};
use crate::reflog;
use crate::repository::Repository;
use crate::revparse;
use crate::tree_builder;

const HEAD_FILE: &str = "CHERRY_PICK_HEAD";
const ORIG_HEAD_FILE: &str = "CHERRY_PICK_ORIG_HEAD";
const MSG_FILE: &str = "CHERRY_PICK_MSG";
const CONFLICTS_FILE: &str = "CHERRY_PICK_CONFLICTS";

struct State {
    pick: Oid,
    orig_head: Oid,
    message: String,
}

/// Outcome of a clean or suspended cherry-pick.
#[derive(Debug)]
pub enum CherryPickOutcome {
    Picked(Oid),
    Conflict(MergeOutcome),
}

pub fn in_progress(repo: &Repository) -> bool {
    super::state_dir(repo.git_dir()).join(HEAD_FILE).is_file()
}

fn read_state(repo: &Repository) -> Result<Option<State>> {
    let dir = super::state_dir(repo.git_dir());
    let Ok(pick_raw) = std::fs::read_to_string(dir.join(HEAD_FILE)) else {
        return Ok(None);
    };
    let pick = Oid::from_hex(pick_raw.trim()).ok_or_else(|| Error::other("corrupt CHERRY_PICK_HEAD"))?;
    let orig_raw = std::fs::read_to_string(dir.join(ORIG_HEAD_FILE)).unwrap_or_default();
    let orig_head = Oid::from_hex(orig_raw.trim()).unwrap_or(Oid::ZERO);
    let message = std::fs::read_to_string(dir.join(MSG_FILE)).unwrap_or_default();
    Ok(Some(State { pick, orig_head, message }))
}

fn write_state(repo: &Repository, state: &State, conflicts: Option<&[String]>) -> Result<()> {
    let dir = super::state_dir(repo.git_dir());
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join(HEAD_FILE), format!("{}\n", state.pick.hex()))?;
    std::fs::write(dir.join(ORIG_HEAD_FILE), format!("{}\n", state.orig_head.hex()))?;
    std::fs::write(dir.join(MSG_FILE), &state.message)?;
    match conflicts {
        Some(paths) => std::fs::write(dir.join(CONFLICTS_FILE), format!("{}\n", paths.join("\n")))?,
        None => {
            let _ = std::fs::remove_file(dir.join(CONFLICTS_FILE));
        }
    }
    Ok(())
}

/// Clear any in-progress cherry-pick state. `pub(crate)` so rebase's abort
/// can defensively clear it too: rebase replays commits via cherry-pick
/// internally, and a conflict mid-replay leaves this state behind.
pub(crate) fn clear_state(repo: &Repository) -> Result<()> {
    let dir = super::state_dir(repo.git_dir());
    for file in [HEAD_FILE, ORIG_HEAD_FILE, MSG_FILE, CONFLICTS_FILE] {
        let _ = std::fs::remove_file(dir.join(file));
    }
    Ok(())
}

/// Apply `rev`'s changes on top of HEAD. Errors if a cherry-pick is already
/// in progress or the working tree is dirty. On conflict, leaves the index
/// and working tree with conflict markers and suspends the operation for
/// [`continue_`] or [`abort`].
pub fn cherry_pick(repo: &Repository, rev: &str, identity: &dyn IdentitySource) -> Result<CherryPickOutcome> {
    if in_progress(repo) {
        return Err(Error::other("a cherry-pick is already in progress"));
    }
    if !porcelain::status(repo)?.is_clean() {
        return Err(Error::other("cannot cherry-pick: you have local changes"));
    }

    let refs = repo.refs();
    let pick_hash = revparse::rev_parse(repo.store(), &refs, rev, true)?;
    let Object::Commit(pick_commit) = repo.store().load(&pick_hash)? else {
        return Err(Error::other(format!("{} is not a commit", pick_hash.hex())));
    };
    let parent_hash = pick_commit.parents.first().copied();
    let head = refs.head_commit()?;

    let ours_tree = match head {
        Some(h) => merge::tree_of(repo, h)?,
        None => None,
    };
    let base_tree = match parent_hash {
        Some(p) => merge::tree_of(repo, p)?,
        None => None,
    };
    let theirs_tree = merge::tree_of(repo, pick_hash)?;

    let state = State {
        pick: pick_hash,
        orig_head: head.unwrap_or(Oid::ZERO),
        message: pick_commit.message.trim().to_string(),
    };
    write_state(repo, &state, None)?;

    let mut index = repo.read_index()?;
    let label_theirs = format!("{}... {}", &pick_hash.hex()[..7], state.message.lines().next().unwrap_or_default());
    let outcome = merge::three_way_merge(
        repo.store(),
        repo.work_dir(),
        &mut index,
        base_tree,
        ours_tree,
        theirs_tree,
        "HEAD",
        &label_theirs,
    )?;
    repo.write_index(&index)?;

    if !outcome.conflicts.is_empty() || !outcome.binary_conflicts.is_empty() {
        let mut conflicted: Vec<String> =
            outcome.conflicts.iter().chain(&outcome.binary_conflicts).cloned().collect();
        conflicted.sort();
        write_state(repo, &state, Some(&conflicted))?;
        return Ok(CherryPickOutcome::Conflict(outcome));
    }

    finish(repo, &state, head, identity)
}

fn finish(repo: &Repository, state: &State, head: Option<Oid>, identity: &dyn IdentitySource) -> Result<CherryPickOutcome> {
    let index = repo.read_index()?;
    let tree = tree_builder::tree_from_index(repo.store(), &index)?;
    let parents: Vec<Oid> = head.into_iter().collect();
    let author = resolve_signature(identity, "AUTHOR");
    let committer = resolve_signature(identity, "COMMITTER");
    let commit = Commit::new(
        tree,
        parents,
        author.identity_line(),
        author.timestamp,
        author.tz_offset.clone(),
        committer.identity_line(),
        committer.timestamp,
        committer.tz_offset.clone(),
        state.message.clone(),
    );
    let commit_oid = repo.store().store(&Object::Commit(commit))?;
    let subject = state.message.lines().next().unwrap_or_default();
    let reflog_message = format!("cherry-pick: {subject}");
    let old_head = head.unwrap_or(Oid::ZERO);
    merge::advance_head(repo, old_head, commit_oid, &reflog_message, &committer)?;
    clear_state(repo)?;
    Ok(CherryPickOutcome::Picked(commit_oid))
}

/// Finish a cherry-pick whose conflicts the caller has resolved and staged.
pub fn continue_(repo: &Repository, identity: &dyn IdentitySource) -> Result<Oid> {
    let state = read_state(repo)?.ok_or_else(|| Error::other("no cherry-pick in progress"))?;
    if repo.read_index()?.entries().is_empty() {
        return Err(Error::other("nothing to commit, working tree clean (cannot continue cherry-pick)"));
    }
    let head = repo.refs().head_commit()?;
    match finish(repo, &state, head, identity)? {
        CherryPickOutcome::Picked(oid) => Ok(oid),
        CherryPickOutcome::Conflict(_) => unreachable!("finish never re-enters conflict"),
    }
}

/// Abandon an in-progress cherry-pick, resetting back to `ORIG_HEAD`.
pub fn abort(repo: &Repository, identity: &dyn IdentitySource) -> Result<()> {
    let state = read_state(repo)?.ok_or_else(|| Error::other("no cherry-pick in progress"))?;
    if state.orig_head == Oid::ZERO {
        return Err(Error::other("Cannot abort: ORIG_HEAD is missing."));
    }
    let pre_head = repo.refs().head_commit()?.unwrap_or(Oid::ZERO);
    let committer = resolve_signature(identity, "COMMITTER");
    porcelain::reset(repo, ResetMode::Hard, &state.orig_head.hex(), &committer)?;
    clear_state(repo)?;
    reflog::append(repo.git_dir(), "HEAD", pre_head, state.orig_head, &committer, "cherry-pick: abort");
    Ok(())
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
    fn clean_cherry_pick_creates_single_parent_commit() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let config = Config::default();
        let source = SystemIdentitySource { config: Some(&config) };
        let signature = resolve_signature(&source, "COMMITTER");

        write_and_stage(&repo, "a.txt", b"v1");
        porcelain::commit(&repo, "base", &source).unwrap();
        let base = repo.refs().head_commit().unwrap().unwrap();

        crate::branches::checkout_branch(&repo, "topic", true, &signature).unwrap();
        write_and_stage(&repo, "b.txt", b"new file");
        porcelain::commit(&repo, "add b", &source).unwrap();
        let topic_tip = repo.refs().head_commit().unwrap().unwrap();

        crate::branches::checkout_branch(&repo, "main", false, &signature).unwrap();
        assert_eq!(repo.refs().head_commit().unwrap(), Some(base));

        let outcome = cherry_pick(&repo, &topic_tip.hex(), &source).unwrap();
        let CherryPickOutcome::Picked(new_oid) = outcome else { panic!("expected a clean pick") };
        let Object::Commit(c) = repo.store().load(&new_oid).unwrap() else { panic!() };
        assert_eq!(c.parents, vec![base]);
        assert_eq!(c.message, "add b");
        assert!(!in_progress(&repo));
    }

    #[test]
    fn conflicting_cherry_pick_suspends_then_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let config = Config::default();
        let source = SystemIdentitySource { config: Some(&config) };
        let signature = resolve_signature(&source, "COMMITTER");

        write_and_stage(&repo, "a.txt", b"base");
        porcelain::commit(&repo, "base", &source).unwrap();
        let base = repo.refs().head_commit().unwrap().unwrap();

        crate::branches::checkout_branch(&repo, "topic", true, &signature).unwrap();
        write_and_stage(&repo, "a.txt", b"topic change");
        porcelain::commit(&repo, "on topic", &source).unwrap();
        let topic_tip = repo.refs().head_commit().unwrap().unwrap();

        crate::branches::checkout_branch(&repo, "main", false, &signature).unwrap();
        write_and_stage(&repo, "a.txt", b"main change");
        porcelain::commit(&repo, "on main", &source).unwrap();
        let head_before = repo.refs().head_commit().unwrap().unwrap();

        let outcome = cherry_pick(&repo, &topic_tip.hex(), &source).unwrap();
        assert!(matches!(outcome, CherryPickOutcome::Conflict(_)));
        assert!(in_progress(&repo));
        assert_eq!(repo.refs().head_commit().unwrap(), Some(head_before));

        abort(&repo, &source).unwrap();
        assert!(!in_progress(&repo));
        assert_eq!(repo.refs().head_commit().unwrap(), Some(head_before));
        assert_eq!(std::fs::read(repo.work_dir().join("a.txt")).unwrap(), b"main change");
        let _ = base;
    }
}
