//! Live screen capture handle.

use async_trait::async_trait;

use crate::gateway::ImagePayload;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("capture session has ended")]
    Ended,

    #[error("frame unavailable: {0}")]
    FrameUnavailable(String),
}

/// A live screen stream that can produce still frames on demand.
///
/// Holders must tolerate the session ending between being read and being used;
/// `grab_frame` reports that as [`CaptureError::Ended`].
#[async_trait]
pub trait CaptureSession: Send + Sync {
    async fn grab_frame(&self) -> Result<ImagePayload, CaptureError>;

    /// Release the underlying stream. Later grabs fail with `Ended`.
    fn stop(&self) {}
}
