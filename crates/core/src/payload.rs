//! Generation payload model and validation.
//!
//! The payload is a closed set of tagged variants, one per supported
//! generation task. Dispatch is by matching on the enum — there is no
//! open-ended workflow registry. Parameters are immutable once a job
//! is enqueued.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Parameter bounds and defaults
// ---------------------------------------------------------------------------

/// Minimum output dimension in pixels.
pub const MIN_DIMENSION: u32 = 64;
/// Maximum output dimension in pixels.
pub const MAX_DIMENSION: u32 = 2048;
/// Maximum number of denoising steps.
pub const MAX_STEPS: u32 = 100;
/// Maximum classifier-free guidance scale.
pub const MAX_GUIDANCE_SCALE: f32 = 20.0;

/// Default output dimension in pixels.
pub const DEFAULT_DIMENSION: u32 = 512;
/// Default number of denoising steps.
pub const DEFAULT_STEPS: u32 = 20;
/// Default guidance scale.
pub const DEFAULT_GUIDANCE_SCALE: f32 = 8.0;
/// Default frame count for video generation.
pub const DEFAULT_NUM_FRAMES: u32 = 24;
/// Default frame rate for video generation.
pub const DEFAULT_FPS: u32 = 8;

fn default_dimension() -> u32 {
    DEFAULT_DIMENSION
}

fn default_steps() -> u32 {
    DEFAULT_STEPS
}

fn default_guidance_scale() -> f32 {
    DEFAULT_GUIDANCE_SCALE
}

fn default_num_frames() -> u32 {
    DEFAULT_NUM_FRAMES
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

// ---------------------------------------------------------------------------
// Payload variants
// ---------------------------------------------------------------------------

/// Parameters for a text-to-image generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TextToImageParams {
    /// Text description of the desired image. Required, non-blank.
    #[validate(custom(function = validate_prompt))]
    pub prompt: String,
    /// What to avoid in the image.
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Output width in pixels.
    #[serde(default = "default_dimension")]
    #[validate(range(min = 64, max = 2048))]
    pub width: u32,
    /// Output height in pixels.
    #[serde(default = "default_dimension")]
    #[validate(range(min = 64, max = 2048))]
    pub height: u32,
    /// Number of denoising steps.
    #[serde(default = "default_steps")]
    #[validate(range(min = 1, max = 100))]
    pub steps: u32,
    /// How closely the sampler follows the prompt.
    #[serde(default = "default_guidance_scale")]
    #[validate(range(min = 0.0, max = 20.0))]
    pub guidance_scale: f32,
    /// Seed for reproducibility. `None` lets the provider randomize.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Model identifier understood by the provider endpoint.
    #[serde(default)]
    pub model: Option<String>,
    /// Sampler/scheduler identifier understood by the provider.
    #[serde(default)]
    pub scheduler: Option<String>,
}

/// Parameters for a text-to-video generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TextToVideoParams {
    /// Text description of the desired clip. Required, non-blank.
    #[validate(custom(function = validate_prompt))]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_dimension")]
    #[validate(range(min = 64, max = 2048))]
    pub width: u32,
    #[serde(default = "default_dimension")]
    #[validate(range(min = 64, max = 2048))]
    pub height: u32,
    /// Number of frames to generate.
    #[serde(default = "default_num_frames")]
    #[validate(range(min = 1, max = 240))]
    pub num_frames: u32,
    /// Output frame rate.
    #[serde(default = "default_fps")]
    #[validate(range(min = 1, max = 60))]
    pub fps: u32,
    #[serde(default = "default_steps")]
    #[validate(range(min = 1, max = 100))]
    pub steps: u32,
    #[serde(default = "default_guidance_scale")]
    #[validate(range(min = 0.0, max = 20.0))]
    pub guidance_scale: f32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub model: Option<String>,
}

/// A validated generation request, one variant per supported task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationPayload {
    TextToImage(TextToImageParams),
    TextToVideo(TextToVideoParams),
}

/// The task a payload describes, without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    TextToImage,
    TextToVideo,
}

impl TaskKind {
    /// Stable string form, matching the payload's `type` tag.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::TextToImage => "text_to_image",
            TaskKind::TextToVideo => "text_to_video",
        }
    }

    /// File extension for artifacts produced by this task.
    pub fn artifact_ext(self) -> &'static str {
        match self {
            TaskKind::TextToImage => "png",
            TaskKind::TextToVideo => "mp4",
        }
    }
}

impl GenerationPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            GenerationPayload::TextToImage(_) => TaskKind::TextToImage,
            GenerationPayload::TextToVideo(_) => TaskKind::TextToVideo,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            GenerationPayload::TextToImage(p) => &p.prompt,
            GenerationPayload::TextToVideo(p) => &p.prompt,
        }
    }

    /// Validate all parameter bounds.
    ///
    /// A payload that fails here is rejected before enqueue and never
    /// retried.
    pub fn validate(&self) -> Result<(), CoreError> {
        let result = match self {
            GenerationPayload::TextToImage(p) => p.validate(),
            GenerationPayload::TextToVideo(p) => p.validate(),
        };
        result.map_err(|errors| CoreError::Validation(format_errors(&errors)))
    }
}

/// Reject empty or whitespace-only prompts.
fn validate_prompt(prompt: &str) -> Result<(), ValidationError> {
    if prompt.trim().is_empty() {
        return Err(ValidationError::new("prompt_blank")
            .with_message("prompt must not be empty".into()));
    }
    Ok(())
}

/// Flatten validator's nested error map into a single readable message.
fn format_errors(errors: &validator::ValidationErrors) -> String {
    let mut parts: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let detail = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{field}: {detail}")
        })
        .collect();
    parts.sort();
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_payload(prompt: &str) -> GenerationPayload {
        GenerationPayload::TextToImage(TextToImageParams {
            prompt: prompt.to_string(),
            negative_prompt: None,
            width: DEFAULT_DIMENSION,
            height: DEFAULT_DIMENSION,
            steps: DEFAULT_STEPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            seed: None,
            model: None,
            scheduler: None,
        })
    }

    #[test]
    fn valid_payload_passes() {
        assert!(image_payload("a red fox").validate().is_ok());
    }

    #[test]
    fn blank_prompt_is_rejected() {
        assert!(image_payload("   ").validate().is_err());
        assert!(image_payload("").validate().is_err());
    }

    #[test]
    fn out_of_range_steps_rejected() {
        let mut params = match image_payload("a red fox") {
            GenerationPayload::TextToImage(p) => p,
            _ => unreachable!(),
        };
        params.steps = 0;
        assert!(GenerationPayload::TextToImage(params.clone())
            .validate()
            .is_err());
        params.steps = 101;
        assert!(GenerationPayload::TextToImage(params).validate().is_err());
    }

    #[test]
    fn out_of_range_dimensions_rejected() {
        let mut params = match image_payload("a red fox") {
            GenerationPayload::TextToImage(p) => p,
            _ => unreachable!(),
        };
        params.width = 63;
        assert!(GenerationPayload::TextToImage(params.clone())
            .validate()
            .is_err());
        params.width = 512;
        params.height = 4096;
        assert!(GenerationPayload::TextToImage(params).validate().is_err());
    }

    #[test]
    fn defaults_apply_on_deserialize() {
        let payload: GenerationPayload =
            serde_json::from_value(serde_json::json!({
                "type": "text_to_image",
                "prompt": "a red fox",
            }))
            .unwrap();
        match payload {
            GenerationPayload::TextToImage(p) => {
                assert_eq!(p.width, DEFAULT_DIMENSION);
                assert_eq!(p.steps, DEFAULT_STEPS);
                assert_eq!(p.guidance_scale, DEFAULT_GUIDANCE_SCALE);
                assert_eq!(p.seed, None);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn tag_round_trips() {
        let json = serde_json::to_value(image_payload("fox")).unwrap();
        assert_eq!(json["type"], "text_to_image");
        let back: GenerationPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind().as_str(), "text_to_image");
    }

    #[test]
    fn artifact_extensions() {
        assert_eq!(TaskKind::TextToImage.artifact_ext(), "png");
        assert_eq!(TaskKind::TextToVideo.artifact_ext(), "mp4");
    }
}
