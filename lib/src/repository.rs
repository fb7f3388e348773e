//! `Repository`: ties the working directory, `.{vcs}` control directory,
//! object store, refs, and staging index together.
//!
//! Grounded on `examples/original_source/pygit/repo.py`. The on-disk layout
//! (`objects/`, `refs/heads`, `refs/tags`, `HEAD`, `index`, `config`) is
//! unchanged from spec.md §3; only the control-directory name is a
//! project-level choice, fixed here as `.vcs` (see SPEC_FULL.md "ADDED —
//! repository format").
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fs_util;
use crate::index::Index;
use crate::odb::Store;
use crate::refs::RefStore;

pub const CONTROL_DIR: &str = ".vcs";
pub const DEFAULT_BRANCH: &str = "main";

pub struct Repository {
    work_dir: PathBuf,
    git_dir: PathBuf,
    store: Store,
}

impl Repository {
    /// Create a new repository at `work_dir`, returning `Ok(false)` without
    /// touching anything if one already exists there.
    pub fn init(work_dir: impl Into<PathBuf>) -> Result<Self> {
        let work_dir = std::fs::canonicalize(work_dir.into()).map_err(Error::Io)?;
        let git_dir = work_dir.join(CONTROL_DIR);
        if git_dir.is_dir() {
            return Self::open(work_dir);
        }
        std::fs::create_dir_all(git_dir.join("objects"))?;
        std::fs::create_dir_all(git_dir.join("refs/heads"))?;
        std::fs::create_dir_all(git_dir.join("refs/tags"))?;

        let refs = RefStore::new(&git_dir);
        refs.write_head_ref(&format!("refs/heads/{DEFAULT_BRANCH}"))?;
        Index::new().write(&git_dir.join("index"))?;

        let mut config = Config::default();
        config.set("core.repositoryformatversion", "0")?;
        config.set("core.filemode", "true")?;
        config.set("core.bare", "false")?;
        config.write(&git_dir)?;

        let store = Store::open(git_dir.join("objects"));
        Ok(Self { work_dir, git_dir, store })
    }

    pub fn open(work_dir: impl Into<PathBuf>) -> Result<Self> {
        let work_dir = std::fs::canonicalize(work_dir.into()).map_err(Error::Io)?;
        let git_dir = work_dir.join(CONTROL_DIR);
        if !git_dir.is_dir() {
            return Err(Error::NotARepository { path: work_dir });
        }
        let store = Store::open(git_dir.join("objects"));
        Ok(Self { work_dir, git_dir, store })
    }

    /// Walk upward from `start` looking for a `.vcs` directory, the way
    /// `git`/`jj` discover the repo root from a subdirectory.
    pub fn discover(start: impl Into<PathBuf>) -> Result<Self> {
        let mut dir = std::fs::canonicalize(start.into()).map_err(Error::Io)?;
        loop {
            if dir.join(CONTROL_DIR).is_dir() {
                return Self::open(dir);
            }
            if !dir.pop() {
                return Err(Error::NotARepository { path: dir });
            }
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn refs(&self) -> RefStore {
        RefStore::new(&self.git_dir)
    }

    pub fn config(&self) -> Config {
        Config::read(&self.git_dir)
    }

    pub fn index_path(&self) -> PathBuf {
        self.git_dir.join("index")
    }

    pub fn read_index(&self) -> Result<Index> {
        Index::read(&self.index_path())
    }

    pub fn write_index(&self, index: &Index) -> Result<()> {
        index.write(&self.index_path())
    }

    /// Resolve `relative` against the working directory, rejecting attempts
    /// to escape it.
    pub fn safe_path(&self, relative: &str) -> Result<PathBuf> {
        fs_util::normalize_path(&self.work_dir, relative)
    }
}
