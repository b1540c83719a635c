//! Vision analysis client
//!
//! Sends one image plus a fixed prompt to a generative model and turns the
//! free-form reply into an [`ItemAnalysis`]. No retries: a failure is final
//! for that image.

use async_trait::async_trait;
use axum::body::Bytes;
use base64::Engine;
use governor::{Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::ItemAnalysis;
use crate::services::image_intake::{AcceptedType, IntakeFile};
use crate::services::prompts::IMAGE_ANALYSIS_PROMPT;

/// Request timeout for model calls
const MODEL_TIMEOUT: Duration = Duration::from_secs(60);

/// Live API key, updated by the settings endpoint
pub type SharedApiKey = Arc<RwLock<Option<String>>>;

/// Model transport errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model API key not configured")]
    MissingApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Model returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model response was empty")]
    EmptyResponse,

    #[error("Malformed model response: {0}")]
    Malformed(String),
}

/// Image analysis errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Unsupported image format: {0}")]
    UnsupportedType(String),

    #[error("Analysis failed: {0}")]
    Model(#[from] ModelError),

    #[error("Analysis failed: no JSON object in model response")]
    NoJson { raw: String },

    #[error("Analysis failed: invalid JSON in model response: {message}")]
    InvalidJson { message: String, raw: String },
}

/// Binary attachment sent alongside a prompt
#[derive(Debug, Clone)]
pub struct InlineData {
    pub mime_type: String,
    pub data: Bytes,
}

/// Opaque generative model: prompt + one attachment in, text out
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str, attachment: InlineData) -> Result<String, ModelError>;
}

/// `generateContent` REST client
pub struct GeminiModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: SharedApiKey,
    rate_limiter: governor::RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlinePayload },
}

#[derive(Serialize)]
struct InlinePayload {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiModel {
    pub fn new(
        base_url: &str,
        model: &str,
        requests_per_minute: u32,
        api_key: SharedApiKey,
    ) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .user_agent(homevault_common::config::get_user_agent())
            .timeout(MODEL_TIMEOUT)
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let per_minute = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl GenerativeModel for GeminiModel {
    async fn generate(&self, prompt: &str, attachment: InlineData) -> Result<String, ModelError> {
        let api_key = self
            .api_key
            .read()
            .await
            .clone()
            .ok_or(ModelError::MissingApiKey)?;

        self.rate_limiter.until_ready().await;

        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Text { text: prompt },
                    RequestPart::Inline {
                        inline_data: InlinePayload {
                            mime_type: attachment.mime_type,
                            data: base64::engine::general_purpose::STANDARD.encode(&attachment.data),
                        },
                    },
                ],
            }],
        };

        tracing::debug!(model = %self.model, "Calling generative model");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Extract the JSON object from free-form model text
///
/// Prefers a fenced ```json block; otherwise takes everything from the first
/// `{` to the last `}`.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let after = &text[start + "```json".len()..];
        if let Some(end) = after.find("```") {
            let fenced = after[..end].trim();
            if fenced.starts_with('{') && fenced.ends_with('}') {
                return Some(fenced);
            }
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Image → ItemAnalysis
#[derive(Clone)]
pub struct VisionClient {
    model: Arc<dyn GenerativeModel>,
}

impl VisionClient {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }

    pub async fn analyze(&self, file: &IntakeFile) -> Result<ItemAnalysis, AnalysisError> {
        let mime = file.effective_mime();
        let accepted = AcceptedType::from_mime(&mime).ok_or_else(|| {
            AnalysisError::UnsupportedType(if mime.is_empty() {
                "unknown".to_string()
            } else {
                mime.clone()
            })
        })?;

        let raw = self
            .model
            .generate(
                IMAGE_ANALYSIS_PROMPT,
                InlineData {
                    mime_type: accepted.mime_type.to_string(),
                    data: file.bytes.clone(),
                },
            )
            .await?;

        let json =
            extract_json_block(&raw).ok_or_else(|| AnalysisError::NoJson { raw: raw.clone() })?;

        let analysis: ItemAnalysis =
            serde_json::from_str(json).map_err(|e| AnalysisError::InvalidJson {
                message: e.to_string(),
                raw: raw.clone(),
            })?;

        tracing::debug!(
            file = %file.name,
            item = %analysis.name,
            category = %analysis.category,
            value = analysis.estimated_value.amount,
            "Image analyzed"
        );

        Ok(analysis)
    }
}
