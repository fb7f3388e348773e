//! Git-style repository configuration: an INI-like `section.option = value`
//! file at `<git_dir>/config`.
//!
//! Grounded on `examples/original_source/pygit/config.py`. Unlike
//! `configparser`, sections here are single-level (`user`, `core`, ...) with
//! no subsections, which is all spec.md §4.15 requires.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::fs_util;

const CONFIG_FILENAME: &str = "config";

/// In-memory view of a config file, preserving section/key insertion order
/// so rewriting a file a human edited doesn't reorder their entries.
#[derive(Clone, Debug, Default)]
pub struct Config {
    sections: IndexMap<String, IndexMap<String, String>>,
}

fn parse_key(key: &str) -> Result<(&str, &str)> {
    let mut parts = key.splitn(2, '.');
    let section = parts.next().unwrap_or("");
    let option = parts.next().unwrap_or("");
    if section.trim().is_empty() || option.trim().is_empty() || key.matches('.').count() != 1 {
        return Err(Error::InvalidConfigKey(key.to_string()));
    }
    Ok((section.trim(), option.trim()))
}

impl Config {
    fn config_path(git_dir: &Path) -> PathBuf {
        git_dir.join(CONFIG_FILENAME)
    }

    /// Read `<git_dir>/config`. A missing or unparsable file yields an empty
    /// config rather than an error, matching `config.py::read_config`.
    pub fn read(git_dir: &Path) -> Self {
        let Ok(content) = std::fs::read_to_string(Self::config_path(git_dir)) else {
            return Self::default();
        };
        Self::parse(&content)
    }

    fn parse(content: &str) -> Self {
        let mut sections = IndexMap::new();
        let mut current: Option<String> = None;
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                sections.entry(name.trim().to_string()).or_insert_with(IndexMap::new);
                current = Some(name.trim().to_string());
                continue;
            }
            let Some(section) = &current else { continue };
            let Some((key, value)) = line.split_once('=') else { continue };
            sections
                .entry(section.clone())
                .or_insert_with(IndexMap::new)
                .insert(key.trim().to_string(), value.trim().to_string());
        }
        Self { sections }
    }

    pub fn write(&self, git_dir: &Path) -> Result<()> {
        let mut out = String::new();
        for (section, options) in &self.sections {
            out.push_str(&format!("[{section}]\n"));
            for (key, value) in options {
                out.push_str(&format!("\t{key} = {value}\n"));
            }
        }
        fs_util::write_atomic(&Self::config_path(git_dir), out.as_bytes())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let (section, option) = parse_key(key)?;
        Ok(self.sections.get(section).and_then(|s| s.get(option)).cloned())
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let (section, option) = parse_key(key)?;
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(option.to_string(), value.to_string());
        Ok(())
    }

    /// Remove `key`, dropping the section entirely if it becomes empty.
    /// Returns whether anything was removed.
    pub fn unset(&mut self, key: &str) -> Result<bool> {
        let (section, option) = parse_key(key)?;
        let Some(options) = self.sections.get_mut(section) else {
            return Ok(false);
        };
        let removed = options.shift_remove(option).is_some();
        if removed && options.is_empty() {
            self.sections.shift_remove(section);
        }
        Ok(removed)
    }

    /// All `(key, value)` pairs, sorted by key.
    pub fn list(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self
            .sections
            .iter()
            .flat_map(|(section, options)| {
                options.iter().map(move |(option, value)| (format!("{section}.{option}"), value.clone()))
            })
            .collect();
        out.sort();
        out
    }

    /// `"Name <email>"` from `user.name`/`user.email`, if both are set.
    pub fn user_identity(&self) -> Option<String> {
        let name = self.get("user.name").ok().flatten()?;
        let email = self.get("user.email").ok().flatten()?;
        Some(format!("{name} <{email}>"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::read(dir.path());
        assert_eq!(cfg.list(), Vec::new());
    }

    #[test]
    fn set_write_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.set("user.name", "Ada Lovelace").unwrap();
        cfg.set("user.email", "ada@example.com").unwrap();
        cfg.write(dir.path()).unwrap();

        let reloaded = Config::read(dir.path());
        assert_eq!(reloaded.get("user.name").unwrap().as_deref(), Some("Ada Lovelace"));
        assert_eq!(
            reloaded.user_identity().as_deref(),
            Some("Ada Lovelace <ada@example.com>")
        );
    }

    #[test]
    fn invalid_key_format_is_rejected() {
        let cfg = Config::default();
        assert!(matches!(cfg.get("noSectionDot"), Err(Error::InvalidConfigKey(_))));
        assert!(matches!(cfg.get("a.b.c"), Err(Error::InvalidConfigKey(_))));
    }

    #[test]
    fn unset_drops_empty_section() {
        let mut cfg = Config::default();
        cfg.set("user.name", "Ada").unwrap();
        assert!(cfg.unset("user.name").unwrap());
        assert_eq!(cfg.list(), Vec::new());
        assert!(!cfg.unset("user.name").unwrap());
    }
}
