//! The four immutable content-addressed object kinds and their canonical
//! byte encoding.
//!
//! Grounded on `examples/original_source/pygit/objects.py`. Every `parse`
//! retains the exact input bytes as `raw_content` so re-serializing a parsed
//! object is the identity on canonical bytes, satisfying invariant 1 in
//! spec.md §8 even for inputs this engine wouldn't itself construct (unusual
//! tree sort orders, `gpgsig`/PGP blocks).

use crate::error::{Error, Result};
use crate::hash::Oid;

/// A tree entry's file mode. The three values the spec recognizes; anything
/// else is a parse error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    File,
    Executable,
    Tree,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "100644",
            Self::Executable => "100755",
            Self::Tree => "040000",
        }
    }

    pub fn is_tree(self) -> bool {
        matches!(self, Self::Tree)
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "100644" => Ok(Self::File),
            "100755" => Ok(Self::Executable),
            "040000" | "40000" => Ok(Self::Tree),
            other => Err(Error::Other(format!("invalid tree entry mode: {other:?}"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            other => Err(Error::Other(format!("unknown object type: {other:?}"))),
        }
    }
}

/// `"<kind> <len>\0"`, prepended to an object's content before hashing or
/// loose-storing it.
pub fn header(kind: Kind, content_len: usize) -> Vec<u8> {
    format!("{} {}\0", kind.as_str(), content_len).into_bytes()
}

/// One entry of a [`Tree`]: mode, name, and the hash of the blob or subtree
/// it points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: Mode,
    pub name: String,
    pub oid: Oid,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
    /// Bytes this tree was parsed from, if any; re-serialization of a parsed
    /// tree emits these verbatim rather than recomputing entry order, so
    /// byte-for-byte round trip holds even for trees this engine didn't build.
    raw: Option<Vec<u8>>,
}

impl Tree {
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        // Git sorts tree entries as if a subtree's name carried a trailing
        // '/', so e.g. "foo" (blob) sorts before "foo.txt" but a subtree
        // named "foo" sorts after a blob named "foo-bar".
        entries.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        Self {
            entries,
            raw: None,
        }
    }

    pub fn content(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.as_str().as_bytes());
            out.push(b' ');
            out.extend_from_slice(entry.name.as_bytes());
            out.push(0);
            out.extend_from_slice(entry.oid.as_bytes());
        }
        out
    }

    pub fn parse(content: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut i = 0usize;
        while i < content.len() {
            let nul = content[i..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| Error::Other("tree entry missing NUL terminator".into()))?
                + i;
            let mode_name = std::str::from_utf8(&content[i..nul])
                .map_err(|source| Error::InvalidUtf8 { context: "tree entry mode/name", source })?;
            let sp = mode_name
                .find(' ')
                .ok_or_else(|| Error::Other("tree entry missing mode/name separator".into()))?;
            let mode = Mode::parse(&mode_name[..sp])?;
            let name = mode_name[sp + 1..].to_string();
            if name.is_empty() || name.contains('/') {
                return Err(Error::Other(format!("invalid tree entry name: {name:?}")));
            }
            let sha_start = nul + 1;
            let sha_end = sha_start + 20;
            if sha_end > content.len() {
                return Err(Error::Other("truncated tree entry sha".into()));
            }
            let oid = Oid::from_slice(&content[sha_start..sha_end])
                .expect("slice length checked above");
            entries.push(TreeEntry { mode, name, oid });
            i = sha_end;
        }
        Ok(Self {
            entries,
            raw: Some(content.to_vec()),
        })
    }
}

fn sort_key(entry: &TreeEntry) -> Vec<u8> {
    let mut key = entry.name.clone().into_bytes();
    if entry.mode.is_tree() {
        key.push(b'/');
    }
    key
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: String,
    pub author_timestamp: i64,
    pub author_tz: String,
    pub committer: String,
    pub committer_timestamp: i64,
    pub committer_tz: String,
    pub gpgsig: Option<String>,
    pub message: String,
    raw: Option<Vec<u8>>,
}

impl Commit {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tree: Oid,
        parents: Vec<Oid>,
        author: String,
        author_timestamp: i64,
        author_tz: String,
        committer: String,
        committer_timestamp: i64,
        committer_tz: String,
        message: String,
    ) -> Self {
        Self {
            tree,
            parents,
            author,
            author_timestamp,
            author_tz,
            committer,
            committer_timestamp,
            committer_tz,
            gpgsig: None,
            message,
            raw: None,
        }
    }

    pub fn content(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let mut lines = vec![format!("tree {}", self.tree.hex())];
        for parent in &self.parents {
            lines.push(format!("parent {}", parent.hex()));
        }
        lines.push(format!(
            "author {} {} {}",
            self.author, self.author_timestamp, self.author_tz
        ));
        lines.push(format!(
            "committer {} {} {}",
            self.committer, self.committer_timestamp, self.committer_tz
        ));
        if let Some(sig) = &self.gpgsig {
            let mut sig_lines = sig.split('\n');
            lines.push(format!("gpgsig {}", sig_lines.next().unwrap_or_default()));
            for rest in sig_lines {
                lines.push(format!(" {rest}"));
            }
        }
        lines.push(String::new());
        let message = if self.message.ends_with('\n') {
            self.message.clone()
        } else {
            format!("{}\n", self.message)
        };
        lines.push(message);
        lines.join("\n").into_bytes()
    }

    pub fn parse(content: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(content)
            .map_err(|source| Error::InvalidUtf8 { context: "commit", source })?;
        let lines: Vec<&str> = text.split('\n').collect();
        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = String::new();
        let mut author_ts = 0i64;
        let mut author_tz = "+0000".to_string();
        let mut committer = String::new();
        let mut committer_ts = 0i64;
        let mut committer_tz = "+0000".to_string();
        let mut gpgsig = None;
        let mut message_start = lines.len();
        let mut i = 0usize;
        while i < lines.len() {
            let line = lines[i];
            if let Some(rest) = line.strip_prefix("tree ") {
                tree = Oid::from_hex(rest);
            } else if let Some(rest) = line.strip_prefix("parent ") {
                let oid = Oid::from_hex(rest)
                    .ok_or_else(|| Error::Other(format!("invalid parent hash: {rest:?}")))?;
                parents.push(oid);
            } else if let Some(rest) = line.strip_prefix("author ") {
                let (name, ts, tz) = split_identity_line(rest)?;
                author = name;
                author_ts = ts;
                author_tz = tz;
            } else if let Some(rest) = line.strip_prefix("committer ") {
                let (name, ts, tz) = split_identity_line(rest)?;
                committer = name;
                committer_ts = ts;
                committer_tz = tz;
            } else if let Some(rest) = line.strip_prefix("gpgsig ") {
                let mut sig_lines = vec![rest.to_string()];
                i += 1;
                while i < lines.len() && lines[i].starts_with(' ') {
                    sig_lines.push(lines[i][1..].to_string());
                    i += 1;
                }
                gpgsig = Some(sig_lines.join("\n"));
                continue;
            } else if line.is_empty() {
                message_start = i + 1;
                break;
            }
            i += 1;
        }
        let mut message = lines[message_start.min(lines.len())..].join("\n");
        if message.ends_with('\n') {
            message.pop();
        }
        Ok(Self {
            tree: tree.ok_or_else(|| Error::Other("commit missing tree header".into()))?,
            parents,
            author,
            author_timestamp: author_ts,
            author_tz,
            committer,
            committer_timestamp: committer_ts,
            committer_tz,
            gpgsig,
            message,
            raw: Some(content.to_vec()),
        })
    }
}

fn split_identity_line(rest: &str) -> Result<(String, i64, String)> {
    let mut split = rest.rsplitn(3, ' ');
    let tz = split.next();
    let ts = split.next();
    let name = split.next();
    match (name, ts, tz) {
        (Some(name), Some(ts), Some(tz)) => {
            let ts: i64 = ts
                .parse()
                .map_err(|_| Error::Other(format!("invalid timestamp: {ts:?}")))?;
            Ok((name.to_string(), ts, tz.to_string()))
        }
        _ => Err(Error::Other(format!("malformed identity line: {rest:?}"))),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tag {
    pub target: Oid,
    pub target_kind: Kind,
    pub name: String,
    pub tagger: String,
    pub tagger_timestamp: i64,
    pub tagger_tz: String,
    pub message: String,
    /// Raw trailing PGP armor block, if present, preserved byte-for-byte.
    pub pgp_signature: Option<Vec<u8>>,
    raw: Option<Vec<u8>>,
}

const PGP_BEGIN: &[u8] = b"-----BEGIN PGP SIGNATURE-----";

impl Tag {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        target: Oid,
        target_kind: Kind,
        name: String,
        tagger: String,
        tagger_timestamp: i64,
        tagger_tz: String,
        message: String,
    ) -> Self {
        Self {
            target,
            target_kind,
            name,
            tagger,
            tagger_timestamp,
            tagger_tz,
            message,
            pgp_signature: None,
            raw: None,
        }
    }

    pub fn content(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let lines = [
            format!("object {}", self.target.hex()),
            format!("type {}", self.target_kind.as_str()),
            format!("tag {}", self.name),
            format!(
                "tagger {} {} {}",
                self.tagger, self.tagger_timestamp, self.tagger_tz
            ),
            String::new(),
            self.message.clone(),
        ];
        let mut out = lines.join("\n").into_bytes();
        if let Some(sig) = &self.pgp_signature {
            out.push(b'\n');
            out.extend_from_slice(sig);
        }
        out
    }

    pub fn parse(content: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(content)
            .map_err(|source| Error::InvalidUtf8 { context: "tag", source })?;
        let lines: Vec<&str> = text.split('\n').collect();
        let mut target = None;
        let mut target_kind = None;
        let mut name = String::new();
        let mut tagger = String::new();
        let mut ts = 0i64;
        let mut tz = "+0000".to_string();
        let mut message_start = lines.len();
        for (i, line) in lines.iter().enumerate() {
            if let Some(rest) = line.strip_prefix("object ") {
                target = Oid::from_hex(rest);
            } else if let Some(rest) = line.strip_prefix("type ") {
                target_kind = Kind::parse(rest).ok();
            } else if let Some(rest) = line.strip_prefix("tag ") {
                name = rest.to_string();
            } else if let Some(rest) = line.strip_prefix("tagger ") {
                let (n, t, z) = split_identity_line(rest)?;
                tagger = n;
                ts = t;
                tz = z;
            } else if line.is_empty() {
                message_start = i + 1;
                break;
            }
        }
        let rest_text = lines[message_start.min(lines.len())..].join("\n");
        let mut message = rest_text.clone();
        let mut pgp_signature = None;
        if let Some(blank_idx) = find_subslice(content, b"\n\n") {
            let msg_part = &content[blank_idx + 2..];
            if let Some(sig_idx) = find_subslice(msg_part, PGP_BEGIN) {
                let msg_bytes = &msg_part[..sig_idx];
                message = std::str::from_utf8(msg_bytes)
                    .map_err(|source| Error::InvalidUtf8 { context: "tag message", source })?
                    .trim_end_matches('\n')
                    .to_string();
                pgp_signature = Some(msg_part[sig_idx..].to_vec());
            }
        }
        Ok(Self {
            target: target.ok_or_else(|| Error::Other("tag missing object header".into()))?,
            target_kind: target_kind.ok_or_else(|| Error::Other("tag missing type header".into()))?,
            name,
            tagger,
            tagger_timestamp: ts,
            tagger_tz: tz,
            message,
            pgp_signature,
            raw: Some(content.to_vec()),
        })
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// The closed sum type of the four object kinds, keyed by hash value (not by
/// pointer) so the commit/tree graphs never form an in-memory cycle even
/// though the on-disk graph can reference arbitrarily.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Object {
    Blob(Vec<u8>),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Blob(_) => Kind::Blob,
            Self::Tree(_) => Kind::Tree,
            Self::Commit(_) => Kind::Commit,
            Self::Tag(_) => Kind::Tag,
        }
    }

    pub fn content(&self) -> Vec<u8> {
        match self {
            Self::Blob(bytes) => bytes.clone(),
            Self::Tree(tree) => tree.content(),
            Self::Commit(commit) => commit.content(),
            Self::Tag(tag) => tag.content(),
        }
    }

    /// Canonical bytes: `"<kind> <len>\0" || content`. This is what gets
    /// hashed and, for loose storage, zlib-compressed.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let content = self.content();
        let mut out = header(self.kind(), content.len());
        out.extend_from_slice(&content);
        out
    }

    pub fn hash(&self) -> Oid {
        Oid::of(&self.canonical_bytes())
    }

    /// Parse canonical bytes (`"<kind> <len>\0content"`) into an [`Object`].
    pub fn parse_canonical(bytes: &[u8]) -> Result<Self> {
        let nul = bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::Other("invalid object: no NUL byte in header".into()))?;
        let header_str = std::str::from_utf8(&bytes[..nul])
            .map_err(|source| Error::InvalidUtf8 { context: "object header", source })?;
        let mut parts = header_str.splitn(2, ' ');
        let kind_str = parts
            .next()
            .ok_or_else(|| Error::Other("invalid object header".into()))?;
        let len_str = parts
            .next()
            .ok_or_else(|| Error::Other("invalid object header".into()))?;
        let declared_len: usize = len_str
            .parse()
            .map_err(|_| Error::Other(format!("invalid object length: {len_str:?}")))?;
        let content = &bytes[nul + 1..];
        if content.len() != declared_len {
            return Err(Error::Other(format!(
                "object length mismatch: header says {declared_len}, got {}",
                content.len()
            )));
        }
        let kind = Kind::parse(kind_str)?;
        Ok(match kind {
            Kind::Blob => Self::Blob(content.to_vec()),
            Kind::Tree => Self::Tree(Tree::parse(content)?),
            Kind::Commit => Self::Commit(Commit::parse(content)?),
            Kind::Tag => Self::Tag(Tag::parse(content)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let obj = Object::Blob(b"hello\n".to_vec());
        let canon = obj.canonical_bytes();
        let parsed = Object::parse_canonical(&canon).unwrap();
        assert_eq!(parsed.hash(), obj.hash());
        assert_eq!(parsed, obj);
    }

    #[test]
    fn tree_sorts_subtrees_as_if_slash_suffixed() {
        let blob_oid = Oid::of(b"blob 0\0");
        let tree = Tree::new(vec![
            TreeEntry { mode: Mode::Tree, name: "foo".into(), oid: blob_oid },
            TreeEntry { mode: Mode::File, name: "foo.txt".into(), oid: blob_oid },
        ]);
        // "foo.txt" < "foo/" because '.' (0x2e) < '/' (0x2f)
        assert_eq!(tree.entries[0].name, "foo.txt");
        assert_eq!(tree.entries[1].name, "foo");
    }

    #[test]
    fn tree_parse_preserves_raw_bytes_on_reserialize() {
        let blob_oid = Oid::of(b"blob 0\0");
        let tree = Tree::new(vec![TreeEntry { mode: Mode::File, name: "a".into(), oid: blob_oid }]);
        let content = tree.content();
        let parsed = Tree::parse(&content).unwrap();
        assert_eq!(parsed.content(), content);
    }

    #[test]
    fn commit_roundtrip_with_gpgsig() {
        let commit = Commit {
            tree: Oid::of(b"tree 0\0"),
            parents: vec![],
            author: "A <a@example.com>".into(),
            author_timestamp: 1000,
            author_tz: "+0000".into(),
            committer: "A <a@example.com>".into(),
            committer_timestamp: 1000,
            committer_tz: "+0000".into(),
            gpgsig: Some("line1\nline2".into()),
            message: "msg".into(),
            raw: None,
        };
        let content = commit.content();
        let parsed = Commit::parse(&content).unwrap();
        assert_eq!(parsed.gpgsig.as_deref(), Some("line1\nline2"));
        assert_eq!(parsed.content(), content);
    }
}
