use crate::error::ProbeError;
use crate::model::{ProbeConfig, Target};
use crate::util::ProbeId;
use std::path::{Path, PathBuf};
use tracing::info;

/// Which HTTP status codes get their response written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavePolicy {
    pub on_200: bool,
    pub on_30x: bool,
}

impl SavePolicy {
    pub fn from_config(cfg: &ProbeConfig) -> Self {
        Self {
            on_200: cfg.save_on_200,
            on_30x: cfg.save_on_30x,
        }
    }

    /// Non-numeric codes never match, so a hostile status line cannot steer
    /// the output path.
    pub fn matches(&self, status_code: &str) -> bool {
        if status_code.is_empty() || !status_code.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        (self.on_200 && status_code == "200") || (self.on_30x && status_code.starts_with('3'))
    }
}

pub fn file_name(target: &Target) -> String {
    format!("{}_{}.txt", target.address.replace(':', "."), target.port)
}

/// `<base>/<status>/<address>_<port>.txt`
pub fn response_path(base: &Path, status_code: &str, target: &Target) -> PathBuf {
    base.join(status_code).join(file_name(target))
}

/// Writes `response` to its final path through a sibling `.part` file, so the
/// final path only ever holds a complete response. A cancelled probe can
/// leave a `.part` file behind but never a truncated `.txt`.
pub async fn persist(
    base: &Path,
    status_code: &str,
    target: &Target,
    response: &str,
    id: &ProbeId,
) -> Result<PathBuf, ProbeError> {
    let dir = base.join(status_code);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|source| ProbeError::Persistence {
            path: dir.clone(),
            source,
        })?;

    let path = dir.join(file_name(target));
    let part = partial_path(&path, id);
    info!("Response will be written to {}", path.display());
    if let Err(source) = tokio::fs::write(&part, response.as_bytes()).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(ProbeError::Persistence { path: part, source });
    }
    if let Err(source) = tokio::fs::rename(&part, &path).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(ProbeError::Persistence {
            path: path.clone(),
            source,
        });
    }
    info!("Saved response");
    Ok(path)
}

fn partial_path(path: &Path, id: &ProbeId) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{id}.part"));
    path.with_file_name(name)
}
