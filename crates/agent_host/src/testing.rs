//! Test doubles for the gateway and capture seams.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::capture::{CaptureError, CaptureSession};
use shared::gateway::{AssistanceGateway, GatewayError, ImagePayload};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub had_image: bool,
}

/// Replies from a queue, then with a fixed fallback
pub struct ScriptedGateway {
    queue: Mutex<VecDeque<Result<String, GatewayError>>>,
    fallback: String,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
    call_count: AtomicUsize,
}

impl ScriptedGateway {
    pub fn replying(fallback: impl Into<String>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback: fallback.into(),
            delay: None,
            calls: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Sleep this long (on the tokio clock) before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, reply: Result<String, GatewayError>) {
        self.queue.lock().push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AssistanceGateway for ScriptedGateway {
    async fn request(
        &self,
        prompt: &str,
        image: Option<&ImagePayload>,
    ) -> Result<String, GatewayError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(RecordedCall {
            prompt: prompt.to_string(),
            had_image: image.is_some(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.queue.lock().pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Capture session that hands out a tiny JPEG header
#[derive(Default)]
pub struct FakeCapture {
    failing: AtomicBool,
    ended: AtomicBool,
    frames: AtomicUsize,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn frames_taken(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureSession for FakeCapture {
    async fn grab_frame(&self) -> Result<ImagePayload, CaptureError> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(CaptureError::Ended);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CaptureError::FrameUnavailable("no frame yet".into()));
        }
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(ImagePayload::jpeg(vec![0xFF, 0xD8, 0xFF]))
    }

    fn stop(&self) {
        self.end();
    }
}
