use thiserror::Error;

use crate::codec::Oid;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("bad object header: {0}")]
    BadHeader(String),

    #[error("bad tree entry: {0}")]
    BadTree(String),

    #[error("bad commit object: {0}")]
    BadCommit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Result<Self, FormatError> {
        match s {
            "blob" => Ok(ObjectKind::Blob),
            "tree" => Ok(ObjectKind::Tree),
            "commit" => Ok(ObjectKind::Commit),
            "tag" => Ok(ObjectKind::Tag),
            other => Err(FormatError::BadHeader(format!("unknown object type '{other}'"))),
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Frame `payload` as `"<kind> <len>\0" || payload`.
pub fn serialize(kind: ObjectKind, payload: &[u8]) -> Vec<u8> {
    let mut out = format!("{} {}\0", kind, payload.len()).into_bytes();
    out.extend_from_slice(payload);
    out
}

/// Split a framed object back into its kind and payload.
pub fn parse_framed(bytes: &[u8]) -> Result<(ObjectKind, &[u8]), FormatError> {
    let nul = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| FormatError::BadHeader("missing NUL terminator".into()))?;

    let header = std::str::from_utf8(&bytes[..nul])
        .map_err(|_| FormatError::BadHeader("header is not valid UTF-8".into()))?;

    let (kind_str, len_str) = header
        .split_once(' ')
        .ok_or_else(|| FormatError::BadHeader(format!("missing space in header '{header}'")))?;

    let kind = ObjectKind::parse(kind_str)?;
    let declared_len: usize = len_str
        .parse()
        .map_err(|_| FormatError::BadHeader(format!("non-decimal length '{len_str}'")))?;

    let payload = &bytes[nul + 1..];
    if payload.len() != declared_len {
        return Err(FormatError::BadHeader(format!(
            "declared length {declared_len} does not match payload length {}",
            payload.len()
        )));
    }

    Ok((kind, payload))
}

/// Tree entry file mode. `Directory` always serializes as `40000` — never
/// `040000` — since the leading zero would change the hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    RegularFile,
    Executable,
    Symlink,
    Directory,
}

impl Mode {
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            Mode::RegularFile => b"100644",
            Mode::Executable => b"100755",
            Mode::Symlink => b"120000",
            Mode::Directory => b"40000",
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Mode::Directory)
    }

    /// Parse an ASCII decimal mode. Accepts both `40000` and `040000` for
    /// directories on read; always canonicalizes to `40000` internally.
    pub fn parse(s: &str) -> Result<Self, FormatError> {
        match s {
            "100644" => Ok(Mode::RegularFile),
            "100755" => Ok(Mode::Executable),
            "120000" => Ok(Mode::Symlink),
            "40000" | "040000" => Ok(Mode::Directory),
            other => Err(FormatError::BadTree(format!("unrecognized mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: Mode,
    /// File name as raw file-system bytes; not guaranteed valid UTF-8.
    pub name: Vec<u8>,
    pub id: Oid,
}

impl TreeEntry {
    /// Sort key per the canonical Git rule: directory names compare as if
    /// a trailing `/` were appended, so a file `ab` sorts before a
    /// directory `ab`.
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.clone();
        if self.mode.is_dir() {
            key.push(b'/');
        }
        key
    }
}

/// Parse a tree object's payload into its entries.
pub fn parse_tree(payload: &[u8]) -> Result<Vec<TreeEntry>, FormatError> {
    let mut entries = Vec::new();
    let mut cursor = payload;

    while !cursor.is_empty() {
        let space = cursor
            .iter()
            .position(|&b| b == b' ')
            .ok_or_else(|| FormatError::BadTree("missing space after mode".into()))?;
        let mode_str = std::str::from_utf8(&cursor[..space])
            .map_err(|_| FormatError::BadTree("mode is not valid UTF-8".into()))?;
        let mode = Mode::parse(mode_str)?;

        let rest = &cursor[space + 1..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| FormatError::BadTree("missing NUL after name".into()))?;
        let name = &rest[..nul];
        if name.contains(&0) || name.contains(&b'/') {
            return Err(FormatError::BadTree(
                "entry name contains NUL or '/'".into(),
            ));
        }

        let after_name = &rest[nul + 1..];
        if after_name.len() < 20 {
            return Err(FormatError::BadTree("truncated entry id".into()));
        }
        let mut id_bytes = [0u8; 20];
        id_bytes.copy_from_slice(&after_name[..20]);

        entries.push(TreeEntry {
            mode,
            name: name.to_vec(),
            id: Oid::from_bytes(id_bytes),
        });

        cursor = &after_name[20..];
    }

    Ok(entries)
}

/// Encode tree entries in canonical order: `"<mode> <name>\0" || sha20`,
/// concatenated with no separator, sorted per [`TreeEntry::sort_key`].
pub fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut sorted: Vec<&TreeEntry> = entries.iter().collect();
    sorted.sort_by_key(|entry| entry.sort_key());

    let mut out = Vec::new();
    for entry in sorted {
        out.extend_from_slice(entry.mode.as_bytes());
        out.push(b' ');
        out.extend_from_slice(&entry.name);
        out.push(0);
        out.extend_from_slice(entry.id.as_bytes());
    }
    out
}

#[derive(Debug, Clone)]
pub struct Commit {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: String,
    pub committer: String,
    /// Everything after the blank line, verbatim (may contain embedded
    /// blank lines).
    pub message: Vec<u8>,
}

/// Parse a commit object's payload. Headers terminate at the first blank
/// line; the remainder is the message verbatim.
pub fn parse_commit(payload: &[u8]) -> Result<Commit, FormatError> {
    let blank = find_blank_line(payload)
        .ok_or_else(|| FormatError::BadCommit("missing blank line before message".into()))?;

    let header_text = std::str::from_utf8(&payload[..blank])
        .map_err(|_| FormatError::BadCommit("headers are not valid UTF-8".into()))?;
    let message = payload[blank + 1..].to_vec();

    let mut tree = None;
    let mut parents = Vec::new();
    let mut author = None;
    let mut committer = None;

    for line in header_text.lines() {
        if let Some(value) = line.strip_prefix("tree ") {
            tree = Some(Oid::from_hex(value).map_err(|e| FormatError::BadCommit(e.to_string()))?);
        } else if let Some(value) = line.strip_prefix("parent ") {
            parents.push(Oid::from_hex(value).map_err(|e| FormatError::BadCommit(e.to_string()))?);
        } else if let Some(value) = line.strip_prefix("author ") {
            author = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("committer ") {
            committer = Some(value.to_string());
        } else if !line.is_empty() {
            return Err(FormatError::BadCommit(format!("unrecognized header line '{line}'")));
        }
    }

    Ok(Commit {
        tree: tree.ok_or_else(|| FormatError::BadCommit("missing tree header".into()))?,
        parents,
        author: author.ok_or_else(|| FormatError::BadCommit("missing author header".into()))?,
        committer: committer
            .ok_or_else(|| FormatError::BadCommit("missing committer header".into()))?,
        message,
    })
}

/// Serialize a commit back to its canonical ASCII text form.
pub fn encode_commit(commit: &Commit) -> Vec<u8> {
    let mut out = format!("tree {}\n", commit.tree).into_bytes();
    for parent in &commit.parents {
        out.extend_from_slice(format!("parent {parent}\n").as_bytes());
    }
    out.extend_from_slice(format!("author {}\n", commit.author).as_bytes());
    out.extend_from_slice(format!("committer {}\n", commit.committer).as_bytes());
    out.push(b'\n');
    out.extend_from_slice(&commit.message);
    out
}

fn find_blank_line(payload: &[u8]) -> Option<usize> {
    payload.windows(2).position(|w| w == b"\n\n").map(|i| i + 1)
}
