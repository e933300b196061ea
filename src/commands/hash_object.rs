use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::codec::{self, Oid};
use crate::object::{self, ObjectKind};
use crate::store::LooseStore;

/// git hash-object command
pub fn invoke(path: impl AsRef<Path>, write: bool) -> anyhow::Result<Oid> {
    let path = path.as_ref();
    let content = fs::read(path).with_context(|| format!("reading {}", path.display()))?;

    if write {
        let store = LooseStore::new(".git");
        let id = store.write(ObjectKind::Blob, &content)?;
        println!("{id}");
        return Ok(id);
    }

    let framed = object::serialize(ObjectKind::Blob, &content);
    let id = Oid::from_bytes(codec::sha1(&framed));
    println!("{id}");
    Ok(id)
}
