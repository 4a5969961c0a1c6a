use crate::platforms::DocumentEngine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The points in a run where a capture may be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    FormPopulated,
    FeeResolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub checkpoint: Checkpoint,
    pub path: PathBuf,
    /// Set when the capture could not be taken or written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Capture the viewport to `path`. Failures are recorded, never raised.
pub async fn capture(engine: &dyn DocumentEngine, checkpoint: Checkpoint, path: &Path) -> Artifact {
    let error = match write_capture(engine, path).await {
        Ok(bytes) => {
            info!(?checkpoint, path = %path.display(), bytes, "Saved screenshot");
            None
        }
        Err(e) => {
            warn!(?checkpoint, path = %path.display(), "Screenshot failed: {}", e);
            Some(e)
        }
    };
    Artifact {
        checkpoint,
        path: path.to_path_buf(),
        error,
    }
}

async fn write_capture(engine: &dyn DocumentEngine, path: &Path) -> Result<usize, String> {
    let png = engine
        .capture_screenshot()
        .await
        .map_err(|e| e.to_string())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("create {}: {e}", parent.display()))?;
    }
    tokio::fs::write(path, &png)
        .await
        .map_err(|e| format!("write {}: {e}", path.display()))?;
    Ok(png.len())
}
