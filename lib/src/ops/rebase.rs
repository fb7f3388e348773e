//! Rebase: replay HEAD's commits since their merge-base with `upstream` on
//! top of `upstream`, one cherry-pick per commit, with the same
//! conflict-suspend/`--continue`/`--abort` shape as cherry-pick (which this
//! module uses internally to do the replay).
//!
//! Grounded on `examples/original_source/pygit/rebase.py`.

use crate::error::{Error, Result};
use crate::graph;
use crate::hash::Oid;
use crate::identity::{resolve_signature, IdentitySource};
use crate::ops::cherry_pick::{self, CherryPickOutcome};
use crate::porcelain::{self, ResetMode};
use crate::reflog;
use crate::refs::branch_ref_name;
use crate::repository::Repository;
use crate::revparse;

const ORIG_HEAD_FILE: &str = "REBASE_ORIG_HEAD";
const UPSTREAM_FILE: &str = "REBASE_UPSTREAM";
const BRANCH_FILE: &str = "REBASE_BRANCH";
const TODO_FILE: &str = "REBASE_TODO";

/// A top-level `ORIG_HEAD` pointer, written directly in `git_dir` (not the
/// shared `state/` directory cherry-pick and rebase's own bookkeeping use) —
/// a distinct, git-compatible convention for "where HEAD was before the last
/// history-rewriting operation".
fn top_level_orig_head_path(repo: &Repository) -> std::path::PathBuf {
    repo.git_dir().join("ORIG_HEAD")
}

struct State {
    orig_head: Oid,
    upstream: Oid,
    branch: Option<String>,
    todo: Vec<Oid>,
}

pub fn in_progress(repo: &Repository) -> bool {
    super::state_dir(repo.git_dir()).join(TODO_FILE).is_file()
}

fn read_state(repo: &Repository) -> Result<Option<State>> {
    let dir = super::state_dir(repo.git_dir());
    let Ok(todo_raw) = std::fs::read_to_string(dir.join(TODO_FILE)) else {
        return Ok(None);
    };
    let orig_head = Oid::from_hex(std::fs::read_to_string(dir.join(ORIG_HEAD_FILE)).unwrap_or_default().trim())
        .ok_or_else(|| Error::other("corrupt REBASE_ORIG_HEAD"))?;
    let upstream = Oid::from_hex(std::fs::read_to_string(dir.join(UPSTREAM_FILE)).unwrap_or_default().trim())
        .ok_or_else(|| Error::other("corrupt REBASE_UPSTREAM"))?;
    let branch = std::fs::read_to_string(dir.join(BRANCH_FILE)).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let todo = todo_raw.lines().filter_map(Oid::from_hex).collect();
    Ok(Some(State { orig_head, upstream, branch, todo }))
}

fn write_state(repo: &Repository, state: &State) -> Result<()> {
    let dir = super::state_dir(repo.git_dir());
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join(ORIG_HEAD_FILE), format!("{}\n", state.orig_head.hex()))?;
    std::fs::write(dir.join(UPSTREAM_FILE), format!("{}\n", state.upstream.hex()))?;
    match &state.branch {
        Some(branch) => std::fs::write(dir.join(BRANCH_FILE), format!("{branch}\n"))?,
        None => {
            let _ = std::fs::remove_file(dir.join(BRANCH_FILE));
        }
    }
    let todo_text: String = state.todo.iter().map(|oid| format!("{}\n", oid.hex())).collect();
    std::fs::write(dir.join(TODO_FILE), todo_text)?;
    Ok(())
}

fn clear_state(repo: &Repository) -> Result<()> {
    let dir = super::state_dir(repo.git_dir());
    for file in [ORIG_HEAD_FILE, UPSTREAM_FILE, BRANCH_FILE, TODO_FILE] {
        let _ = std::fs::remove_file(dir.join(file));
    }
    let _ = std::fs::remove_file(top_level_orig_head_path(repo));
    Ok(())
}

/// Commits to replay onto `upstream`, oldest first: `head`'s first-parent
/// ancestors down to (but not including) the first one that is `upstream` or
/// one of its ancestors. Empty if `head` is already at or ahead of
/// `upstream`.
fn commits_to_replay(repo: &Repository, head: Oid, upstream: Oid) -> Result<Vec<Oid>> {
    if head == upstream || graph::is_ancestor(repo.store(), head, upstream) {
        return Ok(Vec::new());
    }
    let mut replay = Vec::new();
    let mut cur = head;
    loop {
        if cur == upstream || graph::is_ancestor(repo.store(), cur, upstream) {
            break;
        }
        replay.push(cur);
        let parents = graph::commit_parents(repo.store(), &cur)?;
        match parents.first() {
            Some(parent) => cur = *parent,
            None => break,
        }
    }
    replay.reverse();
    Ok(replay)
}

/// Result of a rebase that ran to completion (as opposed to suspending on a
/// conflict, which surfaces as an `Err`).
#[derive(Debug, PartialEq, Eq)]
pub enum RebaseOutcome {
    AlreadyUpToDate,
    Complete(Oid),
}

/// Replay HEAD's commits since their merge-base with `upstream` on top of
/// `upstream`. Errors if a rebase is already in progress, the working tree
/// is dirty, or HEAD is detached.
pub fn rebase(repo: &Repository, upstream: &str, identity: &dyn IdentitySource) -> Result<RebaseOutcome> {
    if in_progress(repo) {
        return Err(Error::other("a rebase is already in progress"));
    }
    if !porcelain::status(repo)?.is_clean() {
        return Err(Error::other("cannot rebase: you have local changes"));
    }
    let refs = repo.refs();
    let branch = refs.current_branch_name()?.ok_or_else(|| Error::other("cannot rebase: HEAD is detached"))?;
    let head = refs.head_commit()?.ok_or_else(|| Error::other("cannot rebase: no HEAD commit"))?;
    let upstream_sha = revparse::rev_parse(repo.store(), &refs, upstream, true)?;

    if graph::merge_base(repo.store(), head, upstream_sha).is_none() {
        return Err(Error::other("no common ancestor with upstream"));
    }
    let todo = commits_to_replay(repo, head, upstream_sha)?;
    if todo.is_empty() {
        return Ok(RebaseOutcome::AlreadyUpToDate);
    }

    let committer = resolve_signature(identity, "COMMITTER");
    std::fs::write(top_level_orig_head_path(repo), format!("{}\n", head.hex()))?;
    let start_message = format!("rebase: start onto {}", &upstream_sha.hex()[..7]);
    reflog::append(repo.git_dir(), "HEAD", head, upstream_sha, &committer, &start_message);

    refs.write_head_detached(upstream_sha)?;
    porcelain::reset(repo, ResetMode::Hard, &upstream_sha.hex(), &committer)?;

    let state = State { orig_head: head, upstream: upstream_sha, branch: Some(branch), todo };
    write_state(repo, &state)?;
    replay_loop(repo, identity)
}

fn replay_loop(repo: &Repository, identity: &dyn IdentitySource) -> Result<RebaseOutcome> {
    loop {
        let Some(mut state) = read_state(repo)? else {
            return Err(Error::other("no rebase in progress"));
        };
        let Some(next) = state.todo.first().copied() else {
            return finish(repo, &state, true, identity);
        };
        state.todo.remove(0);
        write_state(repo, &state)?;
        match cherry_pick::cherry_pick(repo, &next.hex(), identity) {
            Ok(CherryPickOutcome::Picked(_)) => continue,
            Ok(CherryPickOutcome::Conflict(outcome)) => {
                return Err(Error::other(format!(
                    "rebase stopped: conflict applying {} ({} path(s))",
                    &next.hex()[..7],
                    outcome.conflicts.len() + outcome.binary_conflicts.len()
                )))
            }
            Err(e) => return Err(e),
        }
    }
}

fn finish(repo: &Repository, state: &State, reflog_on_head: bool, identity: &dyn IdentitySource) -> Result<RebaseOutcome> {
    let new_head = repo.refs().head_commit()?.ok_or_else(|| Error::other("rebase finished with no HEAD"))?;
    let committer = resolve_signature(identity, "COMMITTER");
    let message = "rebase: complete";
    if let Some(branch) = &state.branch {
        let refname = branch_ref_name(branch);
        let refs = repo.refs();
        refs.update_ref(&refname, new_head)?;
        if reflog_on_head {
            reflog::append(repo.git_dir(), "HEAD", state.upstream, new_head, &committer, message);
        }
        reflog::append(repo.git_dir(), &refname, state.upstream, new_head, &committer, message);
        refs.write_head_ref(&refname)?;
    }
    clear_state(repo)?;
    Ok(RebaseOutcome::Complete(new_head))
}

/// Finish the cherry-pick in progress, then continue replaying the
/// remaining todo list.
pub fn continue_(repo: &Repository, identity: &dyn IdentitySource) -> Result<RebaseOutcome> {
    if read_state(repo)?.is_none() {
        return Err(Error::other("no rebase in progress"));
    }
    cherry_pick::continue_(repo, identity)?;
    replay_loop_after_continue(repo, identity)
}

fn replay_loop_after_continue(repo: &Repository, identity: &dyn IdentitySource) -> Result<RebaseOutcome> {
    loop {
        let Some(mut state) = read_state(repo)? else {
            return Err(Error::other("no rebase in progress"));
        };
        let Some(next) = state.todo.first().copied() else {
            return finish(repo, &state, false, identity);
        };
        state.todo.remove(0);
        write_state(repo, &state)?;
        match cherry_pick::cherry_pick(repo, &next.hex(), identity) {
            Ok(CherryPickOutcome::Picked(_)) => continue,
            Ok(CherryPickOutcome::Conflict(outcome)) => {
                return Err(Error::other(format!(
                    "rebase stopped: conflict applying {} ({} path(s))",
                    &next.hex()[..7],
                    outcome.conflicts.len() + outcome.binary_conflicts.len()
                )))
            }
            Err(e) => return Err(e),
        }
    }
}

/// Abandon an in-progress rebase, restoring the original branch and HEAD.
pub fn abort(repo: &Repository, identity: &dyn IdentitySource) -> Result<()> {
    let state = read_state(repo)?.ok_or_else(|| Error::other("no rebase in progress"))?;
    if state.orig_head == Oid::ZERO {
        return Err(Error::other("Cannot abort: ORIG_HEAD is missing."));
    }
    cherry_pick::clear_state(repo)?;
    let pre_head = repo.refs().head_commit()?.unwrap_or(Oid::ZERO);
    let committer = resolve_signature(identity, "COMMITTER");
    porcelain::reset(repo, ResetMode::Hard, &state.orig_head.hex(), &committer)?;
    let refs = repo.refs();
    if let Some(branch) = &state.branch {
        let refname = branch_ref_name(branch);
        refs.update_ref(&refname, state.orig_head)?;
        refs.write_head_ref(&refname)?;
    }
    reflog::append(repo.git_dir(), "HEAD", pre_head, state.orig_head, &committer, "rebase: abort");
    clear_state(repo)
}
