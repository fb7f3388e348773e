//! Multi-step operations: cherry-pick, rebase, stash. Each keeps its
//! progress on disk under [`STATE_DIR`] so a conflict can suspend the
//! operation and `--continue`/`--abort` can resume or unwind it later.
//!
//! Grounded on `examples/original_source/pygit/porcelain.py`'s cherry-pick
//! section, `rebase.py`, and `stash.py`. Those name their state directory
//! after the tool itself; here it is just `state`.

pub mod cherry_pick;
pub mod rebase;
pub mod stash;

use std::path::{Path, PathBuf};

pub(crate) const STATE_DIR: &str = "state";

pub(crate) fn state_dir(git_dir: &Path) -> PathBuf {
    git_dir.join(STATE_DIR)
}
