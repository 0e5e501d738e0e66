//! The seam between session logic and the hosted model.

use async_trait::async_trait;

/// Encoded still image attached to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// MIME type, e.g. "image/jpeg"
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl ImagePayload {
    pub fn jpeg(data: Vec<u8>) -> Self {
        Self {
            mime_type: "image/jpeg".to_string(),
            data,
        }
    }
}

/// Failures talking to the model
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{provider} is not configured: {reason}")]
    NotConfigured { provider: String, reason: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("{provider} error: {status}{}", status_detail(.body))]
    Status {
        provider: String,
        status: u16,
        body: Option<String>,
    },

    #[error("model error: {0}")]
    Model(String),
}

fn status_detail(body: &Option<String>) -> String {
    body.as_deref()
        .map(|body| format!(" ({})", body))
        .unwrap_or_default()
}

/// Anything that can turn a prompt (plus optional image) into a completion.
#[async_trait]
pub trait AssistanceGateway: Send + Sync {
    async fn request(
        &self,
        prompt: &str,
        image: Option<&ImagePayload>,
    ) -> Result<String, GatewayError>;
}
