//! Conversion between the flat staging [`Index`] and nested [`Tree`]
//! objects, plus commit checkout (tree -> working dir and tree -> index).
//!
//! Grounded on `examples/original_source/pygit/repo.py`'s
//! `create_tree_from_index`/`restore_tree`/`restore_index_from_tree`.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::hash::Oid;
use crate::index::{Index, IndexEntry};
use crate::object::{Mode, Object, Tree, TreeEntry};
use crate::odb::Store;

enum Node {
    Blob { mode: Mode, oid: Oid },
    Dir(BTreeMap<String, Node>),
}

/// Build a nested [`Tree`] (and every subtree it contains) from the flat,
/// `/`-separated paths in `index`, writing each tree object to `store`.
/// Returns the root tree's id. An empty index yields the hash of an empty
/// tree, matching `create_tree_from_index`'s special case.
pub fn tree_from_index(store: &Store, index: &Index) -> Result<Oid> {
    let mut root: BTreeMap<String, Node> = BTreeMap::new();
    for entry in index.entries() {
        insert_path(&mut root, &entry.path, entry.mode, entry.oid);
    }
    write_tree(store, &root)
}

fn insert_path(root: &mut BTreeMap<String, Node>, path: &str, mode: Mode, oid: Oid) {
    let parts: Vec<&str> = path.split('/').collect();
    let mut current = root;
    for part in &parts[..parts.len() - 1] {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Node::Dir(BTreeMap::new()));
        current = match entry {
            Node::Dir(map) => map,
            Node::Blob { .. } => unreachable!("path component collides with a file entry"),
        };
    }
    current.insert(parts[parts.len() - 1].to_string(), Node::Blob { mode, oid });
}

fn write_tree(store: &Store, nodes: &BTreeMap<String, Node>) -> Result<Oid> {
    let mut entries = Vec::with_capacity(nodes.len());
    for (name, node) in nodes {
        let (mode, oid) = match node {
            Node::Blob { mode, oid } => (*mode, *oid),
            Node::Dir(children) => (Mode::Tree, write_tree(store, children)?),
        };
        entries.push(TreeEntry { mode, name: name.clone(), oid });
    }
    store.store(&Object::Tree(Tree::new(entries)))
}

/// Materialize `tree` into the filesystem under `base`, writing every blob
/// and creating every directory it names. Existing files at those paths are
/// overwritten.
pub fn checkout_tree(store: &Store, tree: Oid, base: &Path) -> Result<()> {
    let Object::Tree(tree) = store.load(&tree)? else {
        return Err(Error::Other(format!("{} is not a tree", tree.hex())));
    };
    for entry in &tree.entries {
        let path = base.join(&entry.name);
        if entry.mode.is_tree() {
            std::fs::create_dir_all(&path)?;
            checkout_tree(store, entry.oid, &path)?;
        } else {
            let Object::Blob(content) = store.load(&entry.oid)? else {
                return Err(Error::Other(format!("{} is not a blob", entry.oid.hex())));
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            crate::fs_util::write_atomic(&path, &content)?;
            set_executable(&path, entry.mode)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path, mode: Mode) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if mode == Mode::Executable {
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o111);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _mode: Mode) -> Result<()> {
    Ok(())
}

/// Populate `index` to exactly match the files named in `tree`, recursively,
/// with `mtime_ns`/`ctime_ns` zeroed (there is no working-tree file backing
/// these entries yet, so the stat-cache shortcut in [`crate::index::unchanged`]
/// will correctly treat them as needing a rehash on first comparison).
pub fn index_from_tree(store: &Store, tree: Oid) -> Result<Index> {
    let mut index = Index::new();
    collect_entries(store, tree, "", &mut index)?;
    Ok(index)
}

fn collect_entries(store: &Store, tree: Oid, prefix: &str, index: &mut Index) -> Result<()> {
    let Object::Tree(tree) = store.load(&tree)? else {
        return Err(Error::Other(format!("{} is not a tree", tree.hex())));
    };
    for entry in &tree.entries {
        let path = if prefix.is_empty() { entry.name.clone() } else { format!("{prefix}/{}", entry.name) };
        if entry.mode.is_tree() {
            collect_entries(store, entry.oid, &path, index)?;
        } else {
            let Object::Blob(content) = store.load(&entry.oid)? else {
                return Err(Error::Other(format!("{} is not a blob", entry.oid.hex())));
            };
            index.upsert(IndexEntry::new(path, entry.oid, entry.mode, content.len() as u32, 0, 0));
        }
    }
    Ok(())
}

/// Snapshot the working directory under `work_dir` directly into a [`Tree`],
/// bypassing the index entirely. Used by stash, which needs to capture
/// uncommitted working-tree edits that were never staged.
pub fn tree_from_working_dir(store: &Store, work_dir: &Path) -> Result<Oid> {
    let mut root: BTreeMap<String, Node> = BTreeMap::new();
    collect_working_dir(store, work_dir, work_dir, &mut root)?;
    write_tree(store, &root)
}

fn collect_working_dir(store: &Store, base: &Path, dir: &Path, root: &mut BTreeMap<String, Node>) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()) == Some(crate::repository::CONTROL_DIR) && path.parent() == Some(base)
        {
            continue;
        }
        if path.is_dir() {
            collect_working_dir(store, base, &path, root)?;
        } else {
            let rel = path.strip_prefix(base).map_err(|_| Error::Other(format!("{} escapes working dir", path.display())))?;
            let Some(rel) = rel.to_str() else { continue };
            let content = std::fs::read(&path)?;
            let mode = {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if std::fs::metadata(&path)?.permissions().mode() & 0o111 != 0 { Mode::Executable } else { Mode::File }
                }
                #[cfg(not(unix))]
                {
                    Mode::File
                }
            };
            let oid = store.store(&Object::Blob(content))?;
            insert_path(root, &rel.replace('\\', "/"), mode, oid);
        }
    }
    Ok(())
}
