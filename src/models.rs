use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use std::{fmt, path::PathBuf, str::FromStr};
use uuid::Uuid;

use crate::error::{ErrorDetail, SubmitError};

pub const MIN_DIMENSION: u32 = 512;
pub const MAX_DIMENSION: u32 = 1024;
pub const DIMENSION_STEP: u32 = 64;
pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 640;

/// Models offered by the ImageRouter free tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageModel {
    #[default]
    Flux2Klein4b,
    Flux1Schnell,
    SdxlTurbo,
    GptImage15,
    ZImageTurbo,
    HiDreamI1Full,
    Chroma,
    QwenImage,
}

impl ImageModel {
    pub const ALL: [ImageModel; 8] = [
        ImageModel::Flux2Klein4b,
        ImageModel::Flux1Schnell,
        ImageModel::SdxlTurbo,
        ImageModel::GptImage15,
        ImageModel::ZImageTurbo,
        ImageModel::HiDreamI1Full,
        ImageModel::Chroma,
        ImageModel::QwenImage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImageModel::Flux2Klein4b => "black-forest-labs/FLUX-2-klein-4b:free",
            ImageModel::Flux1Schnell => "black-forest-labs/FLUX-1-schnell:free",
            ImageModel::SdxlTurbo => "stabilityai/sdxl-turbo:free",
            ImageModel::GptImage15 => "openai/gpt-image-1.5:free",
            ImageModel::ZImageTurbo => "Tongyi-MAI/Z-Image-Turbo:free",
            ImageModel::HiDreamI1Full => "HiDream-ai/HiDream-I1-Full:free",
            ImageModel::Chroma => "lodestones/Chroma:free",
            ImageModel::QwenImage => "qwen/qwen-image:free",
        }
    }
}

impl fmt::Display for ImageModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ImageModel {
    type Err = SubmitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ImageModel::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| SubmitError::Validation(format!("unsupported model: {s}")))
    }
}

impl Serialize for ImageModel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One prompt-to-image request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    prompt: String,
    model: ImageModel,
    width: u32,
    height: u32,
}

impl GenerationRequest {
    /// Checks the model-independent bounds. Prompt emptiness is checked at submit.
    pub fn new(prompt: impl Into<String>, model: ImageModel, width: u32, height: u32) -> Result<Self, SubmitError> {
        check_dimension("width", width)?;
        check_dimension("height", height)?;
        Ok(Self { prompt: prompt.into().trim().to_string(), model, width, height })
    }

    pub fn prompt(&self) -> &str { &self.prompt }
    pub fn model(&self) -> ImageModel { self.model }
    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }

    pub fn size(&self) -> String { format!("{}x{}", self.width, self.height) }
}

fn check_dimension(name: &str, value: u32) -> Result<(), SubmitError> {
    if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) || (value - MIN_DIMENSION) % DIMENSION_STEP != 0 {
        return Err(SubmitError::Validation(format!(
            "{name} must be between {MIN_DIMENSION} and {MAX_DIMENSION} in steps of {DIMENSION_STEP}, got {value}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationResult {
    pub job_id: Uuid,
    pub path: PathBuf,
    pub byte_length: u64,
    pub source_url: String,
    pub request: GenerationRequest,
    pub completed_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub size: String,
    pub submitted_at: DateTime<Utc>,
}

/// Read-only copy of the controller's job slot.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub state: JobState,
    pub accepting: bool,
    pub active_job: Option<Uuid>,
    pub active_request: Option<GenerationRequest>,
    pub last_result: Option<GenerationResult>,
    pub last_error: Option<ErrorDetail>,
}

/// Lifecycle notifications. Exactly one of `Completed`/`Failed` follows each `Started`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GenerationEvent {
    Started { job_id: Uuid },
    Completed { job_id: Uuid, result: GenerationResult },
    Failed { job_id: Uuid, error: ErrorDetail },
}

// --- HTTP bodies ---

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateBody {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl GenerateBody {
    pub fn into_request(self) -> Result<GenerationRequest, SubmitError> {
        let model = match self.model.as_deref() {
            Some(m) => m.parse()?,
            None => ImageModel::default(),
        };
        GenerationRequest::new(
            self.prompt,
            model,
            self.width.unwrap_or(DEFAULT_WIDTH),
            self.height.unwrap_or(DEFAULT_HEIGHT),
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UpdateSettingsBody {
    pub api_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn size_string_is_width_by_height() {
        let req = GenerationRequest::new("a red fox", ImageModel::SdxlTurbo, 1024, 640).unwrap();
        assert_eq!(req.size(), "1024x640");
        assert_eq!(req.model().as_str(), "stabilityai/sdxl-turbo:free");
    }

    #[test]
    fn dimensions_must_be_in_range_and_on_step() {
        assert!(GenerationRequest::new("x", ImageModel::Chroma, 512, 1024).is_ok());
        for (w, h) in [(448, 640), (1088, 640), (1000, 640), (1024, 600)] {
            let err = GenerationRequest::new("x", ImageModel::Chroma, w, h).unwrap_err();
            assert!(matches!(err, SubmitError::Validation(_)), "{w}x{h}");
        }
    }

    #[test]
    fn prompt_is_trimmed() {
        let req = GenerationRequest::new("  lighthouse at dusk \n", ImageModel::QwenImage, 768, 768).unwrap();
        assert_eq!(req.prompt(), "lighthouse at dusk");
    }

    #[test]
    fn model_allow_list_round_trips_through_strings() {
        for model in ImageModel::ALL {
            assert_eq!(model.as_str().parse::<ImageModel>().unwrap(), model);
        }
        assert!("dall-e-3".parse::<ImageModel>().is_err());
    }

    #[test]
    fn generate_body_applies_defaults() {
        let body: GenerateBody = serde_json::from_str(r#"{"prompt":"a red fox"}"#).unwrap();
        let req = body.into_request().unwrap();
        assert_eq!(req.model(), ImageModel::Flux2Klein4b);
        assert_eq!(req.size(), "1024x640");
    }

    #[test]
    fn events_serialize_with_tag() {
        let id = Uuid::nil();
        let json = serde_json::to_value(GenerationEvent::Started { job_id: id }).unwrap();
        assert_eq!(json["event"], "started");
        assert_eq!(json["job_id"], id.to_string());
    }
}
