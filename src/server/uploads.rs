use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const MAX_NAME_LEN: usize = 64;

/// Directory uploaded clips are written to before extraction.
pub struct UploadStore {
    root: PathBuf,
    keep_uploads: bool,
}

impl UploadStore {
    /// Open the store, creating `root` if it does not exist yet.
    pub fn open(root: &Path, keep_uploads: bool) -> Result<Self> {
        std::fs::create_dir_all(root)
            .with_context(|| format!("Failed to create uploads dir: {}", root.display()))?;
        log::info!("Uploads directory: {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
            keep_uploads,
        })
    }

    /// Write `bytes` under a collision-free name derived from `original_name`.
    pub async fn save(&self, original_name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let path = self.root.join(unique_name(original_name));
        tokio::fs::write(&path, bytes).await?;
        log::debug!("Saved {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Remove a saved upload unless the store is configured to keep them.
    pub async fn discard(&self, path: &Path) {
        if self.keep_uploads {
            return;
        }
        if let Err(err) = tokio::fs::remove_file(path).await {
            log::warn!("Failed to remove upload {}: {}", path.display(), err);
        }
    }
}

/// `<timestamp>-<random>-<sanitised name>`, keeping the extension so the
/// decoder can use it as a format hint.
pub fn unique_name(original_name: &str) -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", stamp, &suffix[..8], sanitize(original_name))
}

fn sanitize(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        return "upload".into();
    }
    // Keep the tail so the extension survives truncation
    let start = cleaned.len().saturating_sub(MAX_NAME_LEN);
    cleaned[start..].to_string()
}
