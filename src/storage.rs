//! Local files written for downloads and exports.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// `validation_{id}.json` inside `dir`. Path separators in the id are replaced.
pub fn download_path(dir: &Path, id: &str) -> PathBuf {
    let safe: String = id
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    dir.join(format!("validation_{safe}.json"))
}

/// `drs_validation_results_{date}.csv` inside `dir`.
pub fn export_path(dir: &Path, date: &str) -> PathBuf {
    dir.join(format!("drs_validation_results_{date}.csv"))
}

pub async fn save_bytes(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create {}", parent.display()))?;
    }
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("write {}", path.display()))
}
