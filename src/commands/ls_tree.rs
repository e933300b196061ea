use anyhow::Context;

use crate::codec::Oid;
use crate::object::{self, ObjectKind};
use crate::store::LooseStore;

/// git ls-tree command
pub fn invoke(hash: &str, name_only: bool) -> anyhow::Result<()> {
    let id = Oid::from_hex(hash).context("parsing tree hash")?;
    let store = LooseStore::new(".git");
    let (kind, payload) = store.read(&id, false)?;
    anyhow::ensure!(kind == ObjectKind::Tree, "incorrect object type '{kind}'");

    for entry in object::parse_tree(&payload)? {
        let name = String::from_utf8_lossy(&entry.name);
        if name_only {
            println!("{name}");
        } else {
            let entry_kind = if entry.mode.is_dir() {
                ObjectKind::Tree
            } else {
                ObjectKind::Blob
            };
            println!(
                "{} {} {}\t{}",
                String::from_utf8_lossy(entry.mode.as_bytes()),
                entry_kind,
                entry.id,
                name
            );
        }
    }

    Ok(())
}
