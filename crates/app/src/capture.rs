//! Screen capture backed by an external tool.
//!
//! A frame is either the stdout of a command (`grim -`, `screencapture -x
//! /dev/stdout`, ...) or the current contents of an image file. Whatever
//! comes back is normalized to JPEG before it is sent to the model.

use async_trait::async_trait;
use shared::capture::{CaptureError, CaptureSession};
use shared::gateway::ImagePayload;
use shared::settings::CaptureSource;
use std::io::Cursor;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::utils::expand_user_path;

const JPEG_QUALITY: u8 = 80;
const GRAB_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ScreenCapture {
    source: CaptureSource,
    ended: AtomicBool,
}

impl ScreenCapture {
    pub fn new(source: CaptureSource) -> Self {
        info!(?source, "screen capture session opened");
        Self {
            source,
            ended: AtomicBool::new(false),
        }
    }

    async fn read_source(&self) -> Result<Vec<u8>, CaptureError> {
        match &self.source {
            CaptureSource::Command(command) => run_capture_command(command).await,
            CaptureSource::File(path) => tokio::fs::read(expand_user_path(path))
                .await
                .map_err(|e| CaptureError::FrameUnavailable(format!("{}: {}", path, e))),
        }
    }
}

async fn run_capture_command(command: &str) -> Result<Vec<u8>, CaptureError> {
    let output = tokio::time::timeout(
        GRAB_TIMEOUT,
        Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| CaptureError::FrameUnavailable("capture command timed out".into()))?
    .map_err(|e| CaptureError::FrameUnavailable(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CaptureError::FrameUnavailable(format!(
            "capture command exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(output.stdout)
}

fn is_jpeg(bytes: &[u8]) -> bool {
    bytes.starts_with(&[0xFF, 0xD8, 0xFF])
}

/// Re-encode any decodable image as JPEG
pub fn normalize_to_jpeg(bytes: Vec<u8>) -> Result<Vec<u8>, CaptureError> {
    if bytes.is_empty() {
        return Err(CaptureError::FrameUnavailable("empty frame".into()));
    }
    if is_jpeg(&bytes) {
        return Ok(bytes);
    }
    let image = image::load_from_memory(&bytes)
        .map_err(|e| CaptureError::FrameUnavailable(format!("undecodable frame: {}", e)))?;
    let rgb = image::DynamicImage::ImageRgb8(image.to_rgb8());

    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, image::ImageOutputFormat::Jpeg(JPEG_QUALITY))
        .map_err(|e| CaptureError::FrameUnavailable(format!("jpeg encoding failed: {}", e)))?;
    Ok(out.into_inner())
}

#[async_trait]
impl CaptureSession for ScreenCapture {
    async fn grab_frame(&self) -> Result<ImagePayload, CaptureError> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(CaptureError::Ended);
        }
        let raw = self.read_source().await?;
        let jpeg = tokio::task::spawn_blocking(move || normalize_to_jpeg(raw))
            .await
            .map_err(|e| CaptureError::FrameUnavailable(e.to_string()))??;
        debug!(bytes = jpeg.len(), "frame captured");
        Ok(ImagePayload::jpeg(jpeg))
    }

    fn stop(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            info!("screen capture session closed");
        }
    }
}
