//! Reflog: append-only per-ref history under `<git_dir>/logs/`.
//!
//! Grounded on `examples/original_source/pygit/reflog.py`. One line per
//! update: `old new who timestamp tz\tmessage`.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::hash::Oid;
use crate::identity::Signature;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReflogEntry {
    pub old: Oid,
    pub new: Oid,
    pub who: String,
    pub timestamp: i64,
    pub tz_offset: String,
    pub message: String,
}

fn reflog_path(git_dir: &Path, refname: &str) -> PathBuf {
    git_dir.join("logs").join(refname)
}

/// Append one line to the reflog for `refname`, creating `logs/` parents as
/// needed. A failure to open the log file is swallowed, matching
/// `reflog.py::append_reflog`'s best-effort semantics — a reflog write is an
/// audit trail, not the source of truth for the ref itself.
pub fn append(git_dir: &Path, refname: &str, old: Oid, new: Oid, signature: &Signature, message: &str) {
    let path = reflog_path(git_dir, refname);
    let Some(parent) = path.parent() else { return };
    if std::fs::create_dir_all(parent).is_err() {
        return;
    }
    let who = signature.identity_line();
    let clean_message = message.replace(['\n', '\r'], " ");
    let line = format!(
        "{} {} {} {} {}\t{}\n",
        old.hex(),
        new.hex(),
        who,
        signature.timestamp,
        signature.tz_offset,
        clean_message.trim()
    );
    let file = std::fs::OpenOptions::new().create(true).append(true).open(&path);
    if let Ok(mut file) = file {
        let _ = file.write_all(line.as_bytes());
    }
}

/// Read all entries for `refname`, oldest first. Malformed lines are
/// skipped rather than treated as corruption — a reflog is advisory.
pub fn read(git_dir: &Path, refname: &str) -> Result<Vec<ReflogEntry>> {
    let path = reflog_path(git_dir, refname);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut entries = Vec::new();
    for line in content.lines() {
        let Some((head, message)) = line.split_once('\t') else { continue };
        let parts: Vec<&str> = head.split_whitespace().collect();
        if parts.len() < 5 {
            continue;
        }
        let Some(old) = Oid::from_hex(parts[0]) else { continue };
        let Some(new) = Oid::from_hex(parts[1]) else { continue };
        let Ok(timestamp) = parts[parts.len() - 2].parse::<i64>() else { continue };
        let tz_offset = parts[parts.len() - 1].to_string();
        let who = parts[2..parts.len() - 2].join(" ");
        entries.push(ReflogEntry {
            old,
            new,
            who,
            timestamp,
            tz_offset,
            message: message.to_string(),
        });
    }
    Ok(entries)
}
