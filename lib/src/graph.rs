//! Commit graph algorithms: parent lookup, ancestor walks, merge-base.
//!
//! Grounded on `examples/original_source/pygit/graph.py` and the
//! `merge_base`/`rev_list` traversal logic in
//! `examples/original_source/pygit/plumbing.py`.

use std::collections::{HashSet, VecDeque};

use crate::error::{Error, Result};
use crate::hash::Oid;
use crate::object::Object;
use crate::odb::Store;

pub fn commit_parents(store: &Store, oid: &Oid) -> Result<Vec<Oid>> {
    match store.load(oid)? {
        Object::Commit(commit) => Ok(commit.parents),
        _ => Err(Error::Other(format!("object {} is not a commit", oid.hex()))),
    }
}

/// Walk commits reachable from `start`. When `first_parent_only`, follows
/// only each commit's first parent; otherwise visits every parent, each
/// commit exactly once. Order matches `graph.py::iter_commits`: `start`
/// first, then a stack-based (LIFO) walk pushing parents in reverse so
/// earlier-listed parents are visited first among siblings.
pub fn iter_commits(store: &Store, start: Oid, first_parent_only: bool) -> Result<Vec<Oid>> {
    if !matches!(store.load(&start)?, Object::Commit(_)) {
        return Err(Error::Other(format!("object {} is not a commit", start.hex())));
    }
    let mut out = vec![start];
    let mut seen: HashSet<Oid> = HashSet::from([start]);
    let mut parents = commit_parents(store, &start)?;
    if first_parent_only {
        parents.truncate(1);
    }
    let mut stack: Vec<Oid> = parents;
    while let Some(oid) = stack.pop() {
        if seen.contains(&oid) {
            continue;
        }
        seen.insert(oid);
        let Ok(Object::Commit(_)) = store.load(&oid) else { continue };
        out.push(oid);
        let mut parents = commit_parents(store, &oid)?;
        if first_parent_only {
            parents.truncate(1);
        }
        for parent in parents.into_iter().rev() {
            if !seen.contains(&parent) {
                stack.push(parent);
            }
        }
    }
    Ok(out)
}

/// Whether `ancestor` is reachable from `descendant` by following parent
/// links (including `ancestor == descendant`).
pub fn is_ancestor(store: &Store, ancestor: Oid, descendant: Oid) -> bool {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([descendant]);
    while let Some(oid) = queue.pop_front() {
        if !visited.insert(oid) {
            continue;
        }
        if oid == ancestor {
            return true;
        }
        if let Ok(parents) = commit_parents(store, &oid) {
            for parent in parents {
                if !visited.contains(&parent) {
                    queue.push_back(parent);
                }
            }
        }
    }
    false
}

fn ancestors_bfs(store: &Store, start: Oid) -> HashSet<Oid> {
    let mut result = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(oid) = queue.pop_front() {
        if !result.insert(oid) {
            continue;
        }
        if let Ok(parents) = commit_parents(store, &oid) {
            for parent in parents {
                if !result.contains(&parent) {
                    queue.push_back(parent);
                }
            }
        }
    }
    result
}

/// First common ancestor of `a` and `b` found by breadth-first search from
/// `b` against the full ancestor set of `a`. Like git's own history, a merge
/// commit can have more than one lowest common ancestor; this returns
/// whichever one BFS from `b` reaches first, not a canonical "best" LCA —
/// preserved from the original tool's behavior rather than reimplemented as
/// full multi-way LCA computation.
pub fn merge_base(store: &Store, a: Oid, b: Oid) -> Option<Oid> {
    let ancestors_a = ancestors_bfs(store, a);
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([b]);
    while let Some(oid) = queue.pop_front() {
        if !seen.insert(oid) {
            continue;
        }
        if ancestors_a.contains(&oid) {
            return Some(oid);
        }
        if let Ok(parents) = commit_parents(store, &oid) {
            for parent in parents {
                if !seen.contains(&parent) {
                    queue.push_back(parent);
                }
            }
        }
    }
    None
}

/// All commits reachable from any of `tips`, each visited once, via DFS with
/// parents pushed in reverse order (so within a commit's parent list the
/// first parent is popped — and thus visited — first).
pub fn rev_list(store: &Store, tips: Vec<Oid>) -> Vec<Oid> {
    let mut seen = HashSet::new();
    let mut stack = tips;
    let mut out = Vec::new();
    while let Some(oid) = stack.pop() {
        if !seen.insert(oid) {
            continue;
        }
        let Ok(Object::Commit(commit)) = store.load(&oid) else { continue };
        for parent in commit.parents.iter().rev() {
            if !seen.contains(parent) {
                stack.push(*parent);
            }
        }
        out.push(oid);
    }
    out
}
