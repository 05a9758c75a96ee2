use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};
use stylist_contracts::styles::edit_instruction;
use stylist_contracts::ImagePayload;

use crate::capability::{ImageCapability, ImageResult};
use crate::config::StylistConfig;
use crate::truncate_text;

/// Image capability backed by the Gemini `generateContent` endpoint.
pub struct GeminiCapability {
    api_base: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    http: HttpClient,
}

impl GeminiCapability {
    pub fn new(config: &StylistConfig) -> Self {
        Self {
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            model: config.image_model.clone(),
            timeout: config.request_timeout(),
            http: HttpClient::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint_for_model(&self) -> String {
        let trimmed = self.model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn build_payload(image: &ImagePayload, prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": image.mime_type,
                            "data": BASE64.encode(&image.bytes),
                        }
                    },
                    { "text": prompt },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            },
        })
    }

    fn generate_content(&self, image: &ImagePayload, prompt: &str) -> Result<ImageResult> {
        let Some(api_key) = self.api_key.as_deref() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model();
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .json(&Self::build_payload(image, prompt))
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        let payload = response_json_or_error(response)?;
        classify_response(&payload)
    }
}

impl ImageCapability for GeminiCapability {
    fn name(&self) -> &str {
        "gemini"
    }

    fn style_generate(&self, image: &ImagePayload, instruction: &str) -> Result<ImageResult> {
        self.generate_content(image, instruction)
    }

    fn edit(&self, image: &ImagePayload, instruction: &str) -> Result<ImageResult> {
        self.generate_content(image, &edit_instruction(instruction))
    }
}

fn response_json_or_error(response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .context("Gemini response body read failed")?;
    if !status.is_success() {
        bail!("Gemini request failed ({code}): {}", truncate_text(&body, 512));
    }
    serde_json::from_str(&body).context("Gemini returned invalid JSON payload")
}

/// Reads the first candidate: an inline image wins, then the first non-blank
/// text part (kept as sent), otherwise the answer is empty. Output images are always treated as PNG.
fn classify_response(payload: &Value) -> Result<ImageResult> {
    let parts = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for part in &parts {
        let data = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(|inline| inline.get("data"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .context("Gemini image base64 decode failed")?;
        return Ok(ImageResult::Success(ImagePayload::png(bytes)));
    }

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .find(|text| !text.trim().is_empty());
    if let Some(text) = text {
        return Ok(ImageResult::Refusal(text.to_string()));
    }

    Ok(ImageResult::Empty)
}
