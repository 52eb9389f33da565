//! Local image storage.

use std::path::PathBuf;

use async_trait::async_trait;
use time::macros::format_description;
use tracing::{debug, info};

use super::capture::{CaptureError, Frame, ImageStore};

/// Writes frames as `image_<YYYY-MM-DD_HH-MM-SS>.jpg` into one directory,
/// creating it when missing.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File name for a frame, derived from its capture time.
    pub fn file_name(frame: &Frame) -> String {
        let stamp = frame
            .captured_at
            .format(format_description!(
                "[year]-[month]-[day]_[hour]-[minute]-[second]"
            ))
            .unwrap_or_default();
        format!("image_{}.jpg", stamp)
    }
}

#[async_trait]
impl ImageStore for DirectoryStore {
    async fn save(&self, frame: &Frame) -> Result<String, CaptureError> {
        if !tokio::fs::try_exists(&self.dir).await? {
            info!("Creating image directory {}", self.dir.display());
            tokio::fs::create_dir_all(&self.dir).await?;
        }

        let name = Self::file_name(frame);
        let path = self.dir.join(&name);
        tokio::fs::write(&path, &frame.data).await?;
        debug!("Stored {} bytes at {}", frame.data.len(), path.display());
        Ok(name)
    }
}
