//! End-to-end scenario coverage (spec.md §8's literal scenarios S1-S7),
//! exercised through the public porcelain surface rather than individual
//! unit-level primitives.

use corevcs::identity::{resolve_signature, SystemIdentitySource};
use corevcs::merge::{self, MergeOptions, MergeResult};
use corevcs::object::Object;
use corevcs::ops::cherry_pick::{self, CherryPickOutcome};
use corevcs::porcelain::{self, ResetMode};
use corevcs::repository::Repository;
use corevcs::{graph, reflog, tags, Config};

fn write(repo: &Repository, path: &str, content: &[u8]) {
    let full = repo.work_dir().join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&full, content).unwrap();
}

fn add(repo: &Repository, path: &str) {
    corevcs::branches::add_path(repo, path).unwrap();
}

#[test]
fn s1_linear_commits() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let config = Config::default();
    let identity = SystemIdentitySource { config: Some(&config) };

    write(&repo, "a", b"a\n");
    add(&repo, "a");
    porcelain::commit(&repo, "first", &identity).unwrap().unwrap();

    write(&repo, "b", b"b\n");
    add(&repo, "b");
    porcelain::commit(&repo, "second", &identity).unwrap().unwrap();

    write(&repo, "c", b"c\n");
    add(&repo, "c");
    let third = porcelain::commit(&repo, "third", &identity).unwrap().unwrap();

    assert_eq!(repo.refs().head_commit().unwrap(), Some(third));
    let history = graph::iter_commits(repo.store(), third, true).unwrap();
    assert_eq!(history.len(), 3);

    let report = porcelain::status(&repo).unwrap();
    assert!(report.is_clean());

    let Object::Commit(commit) = repo.store().load(&third).unwrap() else { panic!() };
    let index = corevcs::tree_builder::index_from_tree(repo.store(), commit.tree).unwrap();
    for (name, content) in [("a", b"a\n".as_slice()), ("b", b"b\n"), ("c", b"c\n")] {
        let expected = Object::Blob(content.to_vec()).hash();
        assert_eq!(index.get(name).unwrap().oid, expected);
    }
}

#[test]
fn s2_branch_and_fast_forward_merge() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let config = Config::default();
    let identity = SystemIdentitySource { config: Some(&config) };
    let signature = resolve_signature(&identity, "COMMITTER");

    write(&repo, "a", b"a\n");
    add(&repo, "a");
    porcelain::commit(&repo, "A", &identity).unwrap().unwrap();

    corevcs::branches::checkout_branch(&repo, "b1", true, &signature).unwrap();
    write(&repo, "b", b"b\n");
    add(&repo, "b");
    let commit_b = porcelain::commit(&repo, "B", &identity).unwrap().unwrap();

    corevcs::branches::checkout_branch(&repo, "main", false, &signature).unwrap();
    let result = merge::merge(&repo, "b1", MergeOptions::default(), &identity).unwrap();
    assert!(matches!(result, MergeResult::FastForward(oid) if oid == commit_b));

    assert_eq!(repo.refs().resolve_ref("refs/heads/main").unwrap(), Some(commit_b));
    assert_eq!(repo.refs().head_commit().unwrap(), Some(commit_b));
    assert_eq!(std::fs::read(repo.work_dir().join("a")).unwrap(), b"a\n");
    assert_eq!(std::fs::read(repo.work_dir().join("b")).unwrap(), b"b\n");

    let entries = reflog::read(repo.git_dir(), "HEAD").unwrap();
    assert!(entries.iter().any(|e| e.message.starts_with("merge b1: Fast-forward")));
}

#[test]
fn s3_lightweight_and_annotated_tags() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let config = Config::default();
    let identity = SystemIdentitySource { config: Some(&config) };

    write(&repo, "a", b"a\n");
    add(&repo, "a");
    let commit_a = porcelain::commit(&repo, "A", &identity).unwrap().unwrap();
    tags::tag_create_lightweight(&repo, "t1", "HEAD", false).unwrap();

    write(&repo, "b", b"b\n");
    add(&repo, "b");
    let commit_b = porcelain::commit(&repo, "B", &identity).unwrap().unwrap();
    let tag_oid = tags::tag_create_annotated(&repo, "t2", "HEAD", "annotated t2", false, &identity).unwrap();

    assert_eq!(repo.refs().resolve_ref("refs/tags/t1").unwrap(), Some(commit_a));
    let Object::Tag(tag) = repo.store().load(&tag_oid).unwrap() else { panic!("expected a tag object") };
    assert_eq!(tag.target, commit_b);
    assert_eq!(tags::tag_list(&repo).unwrap(), vec!["t1".to_string(), "t2".to_string()]);
}

#[test]
fn s4_reset_modes() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let config = Config::default();
    let identity = SystemIdentitySource { config: Some(&config) };
    let signature = resolve_signature(&identity, "COMMITTER");

    write(&repo, "a", b"a v1\n");
    add(&repo, "a");
    porcelain::commit(&repo, "a v1", &identity).unwrap().unwrap();
    write(&repo, "a", b"a v2\n");
    add(&repo, "a");
    let head = porcelain::commit(&repo, "a v2", &identity).unwrap().unwrap();

    write(&repo, "b", b"new file\n");
    add(&repo, "b");

    porcelain::reset(&repo, ResetMode::Mixed, "HEAD", &signature).unwrap();
    assert_eq!(repo.refs().head_commit().unwrap(), Some(head));
    assert!(repo.read_index().unwrap().get("b").is_none());
    assert!(repo.work_dir().join("b").is_file());

    porcelain::reset(&repo, ResetMode::Hard, "HEAD", &signature).unwrap();
    assert_eq!(repo.refs().head_commit().unwrap(), Some(head));
    assert!(repo.read_index().unwrap().get("b").is_none());
    assert!(!repo.work_dir().join("b").exists());
}

#[test]
fn s5_restore_worktree_from_index() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let config = Config::default();
    let identity = SystemIdentitySource { config: Some(&config) };

    write(&repo, "a", b"a\n");
    add(&repo, "a");
    porcelain::commit(&repo, "A", &identity).unwrap().unwrap();
    let before = repo.read_index().unwrap();

    write(&repo, "a", b"a modified\n");
    porcelain::restore_worktree(&repo, &["a".to_string()], None).unwrap();

    assert_eq!(std::fs::read(repo.work_dir().join("a")).unwrap(), b"a\n");
    assert_eq!(repo.read_index().unwrap().entries(), before.entries());
}

#[test]
fn s6_three_way_text_conflict_leaves_head_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let config = Config::default();
    let identity = SystemIdentitySource { config: Some(&config) };
    let signature = resolve_signature(&identity, "COMMITTER");

    write(&repo, "conflict.txt", b"base\n");
    add(&repo, "conflict.txt");
    porcelain::commit(&repo, "A", &identity).unwrap().unwrap();

    corevcs::branches::checkout_branch(&repo, "feature", true, &signature).unwrap();
    write(&repo, "conflict.txt", b"theirs\n");
    add(&repo, "conflict.txt");
    porcelain::commit(&repo, "B", &identity).unwrap().unwrap();

    corevcs::branches::checkout_branch(&repo, "main", false, &signature).unwrap();
    write(&repo, "conflict.txt", b"ours\n");
    add(&repo, "conflict.txt");
    let commit_m = porcelain::commit(&repo, "M", &identity).unwrap().unwrap();

    let result = merge::merge(&repo, "feature", MergeOptions::default(), &identity).unwrap();
    assert!(matches!(result, MergeResult::Conflict(_)));

    let markers = std::fs::read_to_string(repo.work_dir().join("conflict.txt")).unwrap();
    let lines: Vec<&str> = markers.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("<<<<<<<"));
    assert_eq!(lines[1], "ours");
    assert_eq!(lines[2], "=======");
    assert_eq!(lines[3], "theirs");
    assert!(lines[4].starts_with(">>>>>>>"));

    assert!(!cherry_pick::in_progress(&repo));
    assert_eq!(repo.refs().head_commit().unwrap(), Some(commit_m));
}

#[test]
fn s7_cherry_pick_conflict_then_abort() {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let config = Config::default();
    let identity = SystemIdentitySource { config: Some(&config) };
    let signature = resolve_signature(&identity, "COMMITTER");

    write(&repo, "conflict.txt", b"base\n");
    add(&repo, "conflict.txt");
    porcelain::commit(&repo, "A", &identity).unwrap().unwrap();

    corevcs::branches::checkout_branch(&repo, "feature", true, &signature).unwrap();
    write(&repo, "conflict.txt", b"theirs\n");
    add(&repo, "conflict.txt");
    let commit_b = porcelain::commit(&repo, "B", &identity).unwrap().unwrap();

    corevcs::branches::checkout_branch(&repo, "main", false, &signature).unwrap();
    write(&repo, "conflict.txt", b"ours\n");
    add(&repo, "conflict.txt");
    let commit_m = porcelain::commit(&repo, "M", &identity).unwrap().unwrap();

    let outcome = cherry_pick::cherry_pick(&repo, &commit_b.hex(), &identity).unwrap();
    assert!(matches!(outcome, CherryPickOutcome::Conflict(_)));
    assert_eq!(repo.refs().head_commit().unwrap(), Some(commit_m));

    let state_dir = repo.git_dir().join("state");
    assert!(state_dir.join("CHERRY_PICK_HEAD").is_file());
    assert!(state_dir.join("CHERRY_PICK_ORIG_HEAD").is_file());
    assert!(state_dir.join("CHERRY_PICK_MSG").is_file());

    cherry_pick::abort(&repo, &identity).unwrap();

    assert_eq!(repo.refs().head_commit().unwrap(), Some(commit_m));
    assert_eq!(std::fs::read(repo.work_dir().join("conflict.txt")).unwrap(), b"ours\n");
    assert!(!state_dir.join("CHERRY_PICK_HEAD").is_file());
    assert!(!state_dir.join("CHERRY_PICK_ORIG_HEAD").is_file());
    assert!(!state_dir.join("CHERRY_PICK_MSG").is_file());
    assert!(!state_dir.join("CHERRY_PICK_CONFLICTS").is_file());

    let entries = reflog::read(repo.git_dir(), "HEAD").unwrap();
    assert!(entries.iter().any(|e| e.message == "cherry-pick: abort"));
}
