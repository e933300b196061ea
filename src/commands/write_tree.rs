use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::codec::Oid;
use crate::object::{Mode, ObjectKind, TreeEntry};
use crate::store::LooseStore;

/// git write-tree command
pub fn invoke() -> anyhow::Result<()> {
    let store = LooseStore::new(".git");
    let Some(id) = write_tree_for(&store, Path::new(".")).context("constructing root tree object")?
    else {
        anyhow::bail!("asked to make tree object for empty tree");
    };

    println!("{id}");
    Ok(())
}

fn write_tree_for(store: &LooseStore, path: &Path) -> anyhow::Result<Option<Oid>> {
    let mut raw_entries = Vec::new();
    let dir = fs::read_dir(path).context("opening a directory")?;

    for entry in dir {
        let entry = entry.with_context(|| format!("bad directory entry in {}", path.display()))?;
        let file_name = entry.file_name();
        let metadata = entry.metadata().context("metadata for directory entry")?;

        if file_name == ".git" || file_name == "target" {
            continue;
        }

        raw_entries.push((entry, file_name, metadata));
    }

    raw_entries.sort_unstable_by(|a, b| {
        let mut aname = a.1.as_encoded_bytes().to_vec();
        let mut bname = b.1.as_encoded_bytes().to_vec();
        if a.2.is_dir() {
            aname.push(b'/');
        }
        if b.2.is_dir() {
            bname.push(b'/');
        }
        aname.cmp(&bname)
    });

    let mut entries = Vec::new();
    for (entry, file_name, metadata) in raw_entries {
        let mode = if metadata.is_dir() {
            Mode::Directory
        } else if metadata.is_symlink() {
            Mode::Symlink
        } else if is_executable(&metadata) {
            Mode::Executable
        } else {
            Mode::RegularFile
        };

        let id = if metadata.is_dir() {
            match write_tree_for(store, &entry.path())? {
                Some(id) => id,
                None => continue,
            }
        } else {
            let content = fs::read(entry.path())
                .with_context(|| format!("reading {}", entry.path().display()))?;
            store.write(ObjectKind::Blob, &content)?
        };

        entries.push(TreeEntry {
            mode,
            name: file_name.as_encoded_bytes().to_vec(),
            id,
        });
    }

    if entries.is_empty() {
        return Ok(None);
    }

    let encoded = crate::object::encode_tree(&entries);
    Ok(Some(store.write(ObjectKind::Tree, &encoded)?))
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}
