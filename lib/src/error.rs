//! Error taxonomy for the core engine.
//!
//! Every fallible operation in this crate returns [`Error`]. Variants map
//! directly onto the failure kinds the rest of the crate is organized around
//! rather than onto individual call sites, so callers can match on kind
//! without caring which module raised it.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not a repository: {path}")]
    NotARepository { path: PathBuf },

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("ambiguous prefix {prefix}: matches {count} objects")]
    AmbiguousRef { prefix: String, count: usize },

    #[error("invalid ref: {0}")]
    InvalidRef(String),

    #[error("path escapes repository: {0}")]
    PathOutsideRepo(String),

    #[error("invalid config key: {0:?} (expected section.option)")]
    InvalidConfigKey(String),

    #[error("pack error: {0}")]
    Pack(String),

    #[error("idx error: {0}")]
    Idx(String),

    #[error("index checksum mismatch")]
    IndexChecksum,

    #[error("index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("invalid utf-8 in {context}")]
    InvalidUtf8 {
        context: &'static str,
        #[source]
        source: std::str::Utf8Error,
    },
}

impl Error {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    pub fn object_not_found(hash: impl Into<String>) -> Self {
        Self::ObjectNotFound(hash.into())
    }
}
