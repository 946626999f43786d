use serde::Deserialize;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tracing::{error, info};

use crate::{
    error::PipelineError,
    models::GenerationRequest,
    transport::HttpTransport,
};

pub const DEFAULT_API_BASE: &str = "https://api.imagerouter.io";
pub const GENERATIONS_PATH: &str = "/v1/openai/images/generations";
pub const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(60);

fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...[{} chars]", &s[..idx], s.chars().count()),
        None => s.to_string(),
    }
}

pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(6).collect();
    format!("{prefix}***")
}

/// Client for the OpenAI-compatible generations endpoint of ImageRouter.
pub struct ImageRouterClient<T: HttpTransport> {
    transport: Arc<T>,
    base_url: String,
    timeout: Duration,
}

impl<T: HttpTransport> ImageRouterClient<T> {
    pub fn new(transport: Arc<T>, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
            timeout: DEFAULT_GENERATE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), GENERATIONS_PATH)
    }

    pub fn build_payload(request: &GenerationRequest) -> serde_json::Value {
        json!({
            "prompt": request.prompt(),
            "model": request.model().as_str(),
            "quality": "auto",
            "size": request.size(),
            "response_format": "url",
            "output_format": "png"
        })
    }

    /// Submits the prompt and returns the URL of the first generated image.
    pub async fn generate(&self, request: &GenerationRequest, api_key: &str) -> Result<String, PipelineError> {
        let url = self.endpoint();
        let payload = Self::build_payload(request);

        info!(
            "🔗 POST {} model={} size={} key={}",
            url,
            request.model(),
            request.size(),
            mask_key(api_key)
        );

        let reply = self
            .transport
            .post_json(&url, api_key, &payload, self.timeout)
            .await
            .map_err(|e| {
                error!("❌ Generation request failed: {}", e);
                PipelineError::from(e)
            })?;

        let body = reply.text();
        info!("📥 Response status: {}", reply.status);

        if !reply.is_success() {
            error!("❌ API Error response: {}", body);
            return Err(PipelineError::Remote(format!("status={} body={}", reply.status, body)));
        }

        info!("📥 Raw generation response: {}", truncate_for_log(&body, 1000));

        let value: serde_json::Value = serde_json::from_str(&body).map_err(|_| PipelineError::Remote(body.clone()))?;

        match extract_first_url(&value) {
            Some(image_url) => {
                info!("🖼️ Image URL received: {}", image_url);
                Ok(image_url)
            }
            None => {
                let pretty = serde_json::to_string_pretty(&value).unwrap_or(body);
                error!("⚠️ No image URL in response: {}", pretty);
                Err(PipelineError::Remote(pretty))
            }
        }
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GenerationsResponse {
    #[serde(default)]
    data: Vec<ImageEntry>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    #[serde(default)]
    url: Option<String>,
}

fn extract_first_url(value: &serde_json::Value) -> Option<String> {
    let parsed: GenerationsResponse = serde_json::from_value(value.clone()).ok()?;
    parsed
        .data
        .into_iter()
        .next()
        .and_then(|entry| entry.url)
        .filter(|url| !url.is_empty())
}
