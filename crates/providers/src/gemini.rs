use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::gateway::{AssistanceGateway, GatewayError, ImagePayload};
use shared::settings::ModelProvider;
use std::env;
use std::time::Duration;
use tracing::debug;

const PROVIDER: &str = "gemini";
const MAX_ERROR_BODY: usize = 800;

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiCandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiCandidatePart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

pub struct GeminiClient {
    http: Client,
    auth_token: String,
    model: String,
    system_instruction: Option<String>,
}

impl GeminiClient {
    pub fn from_settings(settings: &ModelProvider) -> Result<Self> {
        let auth_token = match &settings.gemini_auth.api_key {
            Some(api_key) if !api_key.trim().is_empty() => api_key.clone(),
            // Try environment variables as fallback
            _ => api_key_from_env().ok_or_else(|| anyhow!("No Gemini authentication configured"))?,
        };

        Ok(Self {
            http: Client::builder()
                .timeout(Duration::from_secs(settings.request_timeout_secs))
                .build()?,
            auth_token,
            model: settings.gemini_model.clone(),
            system_instruction: None,
        })
    }

    /// Instruction sent as `system_instruction` with every request
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, prompt: &str, image: Option<&ImagePayload>) -> GeminiRequest {
        let mut parts = Vec::with_capacity(2);
        // Image goes first, then the prompt text
        if let Some(image) = image {
            parts.push(GeminiPart {
                inline_data: Some(GeminiInlineData {
                    mime_type: image.mime_type.clone(),
                    data: BASE64.encode(&image.data),
                }),
                ..Default::default()
            });
        }
        parts.push(GeminiPart {
            text: Some(prompt.to_string()),
            ..Default::default()
        });

        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts,
            }],
            system_instruction: self.system_instruction.as_ref().map(|text| GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: Some(text.clone()),
                    ..Default::default()
                }],
            }),
        }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        image: Option<&ImagePayload>,
    ) -> Result<String, GatewayError> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.auth_token
        );
        let req = self.build_request(prompt, image);
        debug!(
            model = %self.model,
            with_image = image.is_some(),
            "sending gemini request"
        );

        let resp = self
            .http
            .post(url)
            .json(&req)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.without_url().to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                provider: PROVIDER.to_string(),
                status,
                body: truncate_body(&body),
            });
        }

        let body: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| GatewayError::Model(format!("unreadable response: {}", e)))?;
        extract_text(body)
    }
}

#[async_trait]
impl AssistanceGateway for GeminiClient {
    async fn request(
        &self,
        prompt: &str,
        image: Option<&ImagePayload>,
    ) -> Result<String, GatewayError> {
        self.generate(prompt, image).await
    }
}

fn api_key_from_env() -> Option<String> {
    env::var("GEMINI_API_KEY")
        .or_else(|_| env::var("API_KEY"))
        .ok()
        .filter(|k| !k.trim().is_empty())
}

/// Concatenate the text parts of the first candidate
fn extract_text(body: GeminiResponse) -> Result<String, GatewayError> {
    let content = body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| GatewayError::Model("response contained no candidates".to_string()))?;

    Ok(content
        .parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join(""))
}

fn truncate_body(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if body.chars().count() > MAX_ERROR_BODY {
        Some(format!("{}...", body.chars().take(MAX_ERROR_BODY).collect::<String>()))
    } else {
        Some(body.to_string())
    }
}
