//! Capture, store, upload and report.
//!
//! A `CaptureCycle` wires four collaborators together. Only the cycle's
//! sequencing lives here; acquisition, storage and hosting sit behind the
//! `Camera`, `ImageStore` and `Uploader` traits.

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use camlink_iot::{IotHandle, TransferError};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Reported instead of a URL when no URL could be produced.
pub const UPLOAD_FAILED: &str = "error";

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera returned an empty frame")]
    EmptyFrame,

    #[error("Report failed: {0}")]
    Report(#[from] TransferError),
}

/// One captured image. The bytes are never interpreted.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub captured_at: OffsetDateTime,
}

impl Frame {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            captured_at: OffsetDateTime::now_utc(),
        }
    }
}

#[async_trait]
pub trait Camera: Send + Sync {
    async fn capture(&self) -> Result<Frame, CaptureError>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persists the frame and returns the stored name.
    async fn save(&self, frame: &Frame) -> Result<String, CaptureError>;
}

#[async_trait]
pub trait Uploader: Send + Sync {
    /// Returns the public URL, or an empty string on failure.
    async fn upload(&self, name: &str, data: &[u8]) -> String;
}

/// Sink for the property carrying the upload result.
#[async_trait]
pub trait PropertyReporter: Send + Sync {
    async fn report(&self, key: &str, value: String) -> Result<(), TransferError>;
}

#[async_trait]
impl PropertyReporter for IotHandle {
    async fn report(&self, key: &str, value: String) -> Result<(), TransferError> {
        self.send_property(key, value).await
    }
}

/// Reads the latest frame a camera driver keeps writing to a file.
#[derive(Debug, Clone)]
pub struct FileCamera {
    path: PathBuf,
}

impl FileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Camera for FileCamera {
    async fn capture(&self) -> Result<Frame, CaptureError> {
        let data = tokio::fs::read(&self.path).await?;
        if data.is_empty() {
            return Err(CaptureError::EmptyFrame);
        }
        debug!("Captured {} bytes from {}", data.len(), self.path.display());
        Ok(Frame::new(data))
    }
}

/// Maps a stored name onto a public base URL. The bytes are expected to be
/// synced to that location out of band.
#[derive(Debug, Clone)]
pub struct LinkUploader {
    base: String,
}

impl LinkUploader {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Uploader for LinkUploader {
    async fn upload(&self, name: &str, _data: &[u8]) -> String {
        if name.is_empty() {
            return String::new();
        }
        format!("{}/{}", self.base, name.trim_start_matches('/'))
    }
}

/// What a single cycle ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Saved locally; no uploader configured, nothing reported.
    Stored(String),
    /// The reported property value (URL or `"error"`).
    Reported(String),
}

pub struct CaptureCycle {
    camera: Arc<dyn Camera>,
    store: Arc<dyn ImageStore>,
    uploader: Option<Arc<dyn Uploader>>,
    reporter: Arc<dyn PropertyReporter>,
    property_key: String,
}

impl CaptureCycle {
    pub fn new(
        camera: Arc<dyn Camera>,
        store: Arc<dyn ImageStore>,
        uploader: Option<Arc<dyn Uploader>>,
        reporter: Arc<dyn PropertyReporter>,
        property_key: impl Into<String>,
    ) -> Self {
        Self {
            camera,
            store,
            uploader,
            reporter,
            property_key: property_key.into(),
        }
    }

    /// Runs capture, save, upload and report once.
    ///
    /// A failed save does not stop the cycle: the upload gets an empty name
    /// and the property is reported as `"error"`.
    ///
    /// # Errors
    ///
    /// Fails when the camera yields nothing or the report cannot be queued.
    pub async fn run_once(&self) -> Result<CycleOutcome, CaptureError> {
        let frame = self.camera.capture().await?;

        let name = match self.store.save(&frame).await {
            Ok(name) => name,
            Err(e) => {
                warn!("Failed to store frame: {}", e);
                String::new()
            }
        };

        let Some(uploader) = &self.uploader else {
            debug!("No uploader configured, keeping '{}' local", name);
            return Ok(CycleOutcome::Stored(name));
        };

        let url = uploader.upload(&name, &frame.data).await;
        let value = if url.is_empty() {
            warn!("Upload of '{}' failed", name);
            UPLOAD_FAILED.to_string()
        } else {
            info!("Uploaded {}", url);
            url
        };

        self.reporter
            .report(&self.property_key, value.clone())
            .await?;
        Ok(CycleOutcome::Reported(value))
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::sync::Mutex;

    use super::*;

    pub struct StaticCamera(pub Vec<u8>);

    #[async_trait]
    impl Camera for StaticCamera {
        async fn capture(&self) -> Result<Frame, CaptureError> {
            if self.0.is_empty() {
                return Err(CaptureError::EmptyFrame);
            }
            Ok(Frame::new(self.0.clone()))
        }
    }

    pub struct FailingStore;

    #[async_trait]
    impl ImageStore for FailingStore {
        async fn save(&self, _frame: &Frame) -> Result<String, CaptureError> {
            Err(std::io::Error::other("card removed").into())
        }
    }

    pub struct NamedStore(pub &'static str);

    #[async_trait]
    impl ImageStore for NamedStore {
        async fn save(&self, _frame: &Frame) -> Result<String, CaptureError> {
            Ok(self.0.to_string())
        }
    }

    #[derive(Default)]
    pub struct RecordingReporter {
        pub reports: Mutex<Vec<(String, String)>>,
    }

    impl RecordingReporter {
        pub fn reports(&self) -> Vec<(String, String)> {
            self.reports.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PropertyReporter for RecordingReporter {
        async fn report(&self, key: &str, value: String) -> Result<(), TransferError> {
            self.reports.lock().unwrap().push((key.to_string(), value));
            Ok(())
        }
    }
}
