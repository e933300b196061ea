use std::io::Write;

use anyhow::Context;

use crate::codec::Oid;
use crate::store::LooseStore;

/// git cat-file command
pub fn invoke(hash: &str, type_only: bool, size_only: bool) -> anyhow::Result<()> {
    let id = Oid::from_hex(hash).context("parsing object hash")?;
    let store = LooseStore::new(".git");
    let (kind, payload) = store.read(&id, false)?;

    if type_only {
        println!("{kind}");
        return Ok(());
    }

    if size_only {
        println!("{}", payload.len());
        return Ok(());
    }

    std::io::stdout()
        .write_all(&payload)
        .context("writing object content to stdout")?;

    Ok(())
}
