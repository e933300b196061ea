use std::path::PathBuf;

use anyhow::Context;

/// git clone command
pub fn invoke(url: &str, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let trimmed = url.trim_end_matches('/');

    let dir = match dir {
        Some(dir) => dir,
        None => {
            let mut repo_name = trimmed
                .rsplit('/')
                .next()
                .ok_or_else(|| anyhow::anyhow!("could not determine output directory"))?
                .to_string();
            if repo_name.ends_with(".git") {
                repo_name.truncate(repo_name.len() - 4);
            }
            PathBuf::from(repo_name)
        }
    };

    println!("Cloning into '{}'...", dir.display());

    crate::clone::clone(trimmed, &dir)
        .with_context(|| format!("cloning {url} into {}", dir.display()))?;

    Ok(())
}
