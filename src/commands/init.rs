use std::path::Path;

use anyhow::Context;

use crate::store::LooseStore;

/// `git init`
pub fn invoke() -> anyhow::Result<()> {
    LooseStore::init(Path::new(".git")).context("creating git directories")?;
    println!("Initialized git directory");
    Ok(())
}
