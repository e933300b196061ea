use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::codec::{self, CodecError, Oid};
use crate::object::{self, FormatError, ObjectKind};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("object {0} not found")]
    NotFound(Oid),

    #[error(".git directory already initialized")]
    AlreadyInitialized,

    #[error("object {0} failed hash verification")]
    Corrupt(Oid),
}

/// A content-addressed loose object store rooted at `<git_dir>/objects`.
pub struct LooseStore {
    git_dir: PathBuf,
}

impl LooseStore {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Create `<git_dir>` with its `objects`/`refs` skeleton and a `HEAD`
    /// symbolic ref to `refs/heads/main`. Fails if `<git_dir>` already
    /// exists and is non-empty.
    pub fn init(git_dir: &Path) -> Result<Self, StoreError> {
        if git_dir.exists() && fs::read_dir(git_dir)?.next().is_some() {
            return Err(StoreError::AlreadyInitialized);
        }

        fs::create_dir_all(git_dir.join("objects"))?;
        fs::create_dir_all(git_dir.join("refs/heads"))?;
        fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n")?;

        Ok(Self::new(git_dir.to_path_buf()))
    }

    fn object_path(&self, id: &Oid) -> PathBuf {
        let hex = id.to_hex();
        self.git_dir.join("objects").join(&hex[..2]).join(&hex[2..])
    }

    pub fn exists(&self, id: &Oid) -> bool {
        self.object_path(id).is_file()
    }

    /// Compute `id`, then write the compressed frame only if it is not
    /// already present (write-if-absent keeps writes idempotent and
    /// race-safe across processes).
    pub fn write(&self, kind: ObjectKind, payload: &[u8]) -> Result<Oid, StoreError> {
        let framed = object::serialize(kind, payload);
        let id = Oid::from_bytes(codec::sha1(&framed));
        let path = self.object_path(&id);

        if path.is_file() {
            return Ok(id);
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let compressed = codec::deflate(&framed);

        // write-if-absent via O_CREAT|O_EXCL: a concurrent writer racing us
        // to the same id is writing identical bytes, so losing the race is
        // harmless.
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut f) => {
                f.write_all(&compressed)?;
                Ok(id)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(id),
            Err(e) => Err(e.into()),
        }
    }

    /// Read and inflate the object at `id`. When `verify` is set, also
    /// checks `sha1(frame) == id`.
    pub fn read(&self, id: &Oid, verify: bool) -> Result<(ObjectKind, Vec<u8>), StoreError> {
        let path = self.object_path(id);
        let compressed = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(*id)
            } else {
                StoreError::Io(e)
            }
        })?;

        let (framed, _) = codec::inflate(&compressed)?;

        if verify && Oid::from_bytes(codec::sha1(&framed)) != *id {
            return Err(StoreError::Corrupt(*id));
        }

        let (kind, payload) = object::parse_framed(&framed)?;
        Ok((kind, payload.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_creates_skeleton_and_head() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        LooseStore::init(&git_dir).unwrap();

        assert!(git_dir.join("objects").is_dir());
        assert!(git_dir.join("refs/heads").is_dir());
        assert_eq!(
            fs::read_to_string(git_dir.join("HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
    }

    #[test]
    fn init_twice_fails_without_mutating() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        LooseStore::init(&git_dir).unwrap();
        fs::write(git_dir.join("marker"), "x").unwrap();

        assert!(LooseStore::init(&git_dir).is_err());
        assert!(git_dir.join("marker").is_file());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        let store = LooseStore::init(&git_dir).unwrap();

        let id = store.write(ObjectKind::Blob, b"hello world\n").unwrap();
        assert_eq!(id.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
        assert!(store.exists(&id));

        let (kind, payload) = store.read(&id, true).unwrap();
        assert_eq!(kind, ObjectKind::Blob);
        assert_eq!(payload, b"hello world\n");
    }

    #[test]
    fn write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        let store = LooseStore::init(&git_dir).unwrap();

        let id1 = store.write(ObjectKind::Blob, b"same content").unwrap();
        let id2 = store.write(ObjectKind::Blob, b"same content").unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn read_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let git_dir = dir.path().join(".git");
        let store = LooseStore::init(&git_dir).unwrap();
        let id = Oid::from_bytes([0xab; 20]);
        assert!(matches!(store.read(&id, false), Err(StoreError::NotFound(_))));
    }
}
