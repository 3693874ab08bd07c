//! Mapping from a [`GenerationPayload`] to the provider's input
//! document.
//!
//! The provider endpoint takes a flat JSON object under `"input"`;
//! optional fields are omitted rather than sent as `null` so endpoint
//! defaults apply.

use genflow_core::GenerationPayload;
use serde_json::{json, Map, Value};

/// Build the `"input"` document for a submission.
pub fn provider_input(payload: &GenerationPayload) -> Value {
    let mut input = Map::new();
    input.insert("task".into(), json!(payload.kind().as_str()));

    match payload {
        GenerationPayload::TextToImage(p) => {
            input.insert("prompt".into(), json!(p.prompt));
            input.insert("width".into(), json!(p.width));
            input.insert("height".into(), json!(p.height));
            input.insert("num_inference_steps".into(), json!(p.steps));
            input.insert("guidance_scale".into(), json!(p.guidance_scale));
            if let Some(negative) = &p.negative_prompt {
                input.insert("negative_prompt".into(), json!(negative));
            }
            if let Some(seed) = p.seed {
                input.insert("seed".into(), json!(seed));
            }
            if let Some(model) = &p.model {
                input.insert("model".into(), json!(model));
            }
            if let Some(scheduler) = &p.scheduler {
                input.insert("scheduler".into(), json!(scheduler));
            }
        }
        GenerationPayload::TextToVideo(p) => {
            input.insert("prompt".into(), json!(p.prompt));
            input.insert("width".into(), json!(p.width));
            input.insert("height".into(), json!(p.height));
            input.insert("num_frames".into(), json!(p.num_frames));
            input.insert("fps".into(), json!(p.fps));
            input.insert("num_inference_steps".into(), json!(p.steps));
            input.insert("guidance_scale".into(), json!(p.guidance_scale));
            if let Some(negative) = &p.negative_prompt {
                input.insert("negative_prompt".into(), json!(negative));
            }
            if let Some(seed) = p.seed {
                input.insert("seed".into(), json!(seed));
            }
            if let Some(model) = &p.model {
                input.insert("model".into(), json!(model));
            }
        }
    }

    Value::Object(input)
}
