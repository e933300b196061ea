use anyhow::Context;

use crate::codec::Oid;
use crate::object::{self, Commit, ObjectKind};
use crate::store::LooseStore;

/// git commit-tree command
pub fn invoke(
    tree_hash: &str,
    message: &str,
    parent_hash: Option<String>,
) -> anyhow::Result<Oid> {
    let tree = Oid::from_hex(tree_hash).context("parsing tree hash")?;
    let store = LooseStore::new(".git");
    anyhow::ensure!(store.exists(&tree), "tree object {tree} does not exist");

    let parents = parent_hash
        .map(|p| Oid::from_hex(&p).context("parsing parent hash"))
        .transpose()?
        .into_iter()
        .collect();

    let time = std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .context("current system time is before UNIX epoch")?;

    let name = std::env::var("MINIGIT_AUTHOR_NAME").unwrap_or_else(|_| "crywolf".to_string());
    let email =
        std::env::var("MINIGIT_AUTHOR_EMAIL").unwrap_or_else(|_| "cry.wolf@centrum.cz".to_string());
    let identity = format!("{name} <{email}> {} +0000", time.as_secs());

    let commit = Commit {
        tree,
        parents,
        author: identity.clone(),
        committer: identity,
        message: format!("{message}\n").into_bytes(),
    };

    let encoded = object::encode_commit(&commit);
    let id = store.write(ObjectKind::Commit, &encoded)?;
    println!("{id}");
    Ok(id)
}
