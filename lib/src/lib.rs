//! A content-addressed version-control engine: git's object model, pack
//! format, and staging index, implemented from scratch.

pub mod branches;
pub mod config;
pub mod error;
pub mod fs_util;
pub mod graph;
pub mod hash;
pub mod identity;
pub mod index;
pub mod merge;
pub mod object;
pub mod odb;
pub mod ops;
pub mod porcelain;
pub mod reflog;
pub mod refs;
pub mod repository;
pub mod revparse;
pub mod tags;
pub mod transport;
pub mod tree_builder;

pub use config::Config;
pub use error::{Error, Result};
pub use hash::{HexPrefix, Oid, PrefixResolution};
pub use identity::Signature;
pub use object::{Commit, Kind, Mode, Object, Tag, Tree, TreeEntry};
pub use odb::Store;
pub use refs::{HeadState, RefStore};
pub use repository::Repository;
