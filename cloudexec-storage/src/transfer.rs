use crate::store::ObjectStore;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Upload every file under `dir` to `prefix` plus its path relative to
/// `dir`. A directory that does not exist uploads nothing; callers invoke
/// this repeatedly for incremental output, so absence is not an error.
/// Returns the number of files uploaded.
pub async fn upload_tree(store: &dyn ObjectStore, dir: &Path, prefix: &str) -> Result<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut pending = vec![dir.to_path_buf()];
    let mut uploaded = 0;

    while let Some(current) = pending.pop() {
        let entries =
            fs::read_dir(&current).with_context(|| format!("failed to read {:?}", current))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(dir)
                .context("walked outside the upload root")?;
            let key = format!("{}{}", prefix, relative.to_string_lossy());
            let body =
                fs::read(&path).with_context(|| format!("failed to read file {:?}", path))?;
            store.put(&key, body).await?;
            uploaded += 1;
        }
    }

    Ok(uploaded)
}
