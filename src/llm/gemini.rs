use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::{Config, SafetyProfile};
use crate::error::{parse_retry_after, ModelError};
use crate::llm::media::InlineImage;
use crate::llm::{GenerativeModel, ModelRequest};
use crate::utils::http::build_http_client;
use crate::utils::text::truncate_for_log;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    prompt_feedback: Option<GeminiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

/// Gemini `generateContent` client. One request per call, no retries; quota
/// failures come back as [`ModelError::RateLimited`] for the caller to report.
pub struct GeminiClient {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    top_k: i32,
    top_p: f32,
    max_output_tokens: i32,
    safety: SafetyProfile,
    default_retry_after_secs: u64,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = build_http_client(Duration::from_secs(config.model_timeout_seconds))?;
        Ok(GeminiClient {
            http,
            api_key: config.gemini_api_key.clone(),
            model: config.gemini_model.clone(),
            base_url: config.gemini_base_url.trim_end_matches('/').to_string(),
            temperature: config.gemini_temperature,
            top_k: config.gemini_top_k,
            top_p: config.gemini_top_p,
            max_output_tokens: config.gemini_max_output_tokens,
            safety: config.gemini_safety_settings,
            default_retry_after_secs: config.rate_limit_default_retry_seconds,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn redact(&self, text: &str) -> String {
        let key = self.api_key.trim();
        if key.is_empty() {
            return text.to_string();
        }
        text.replace(key, "[redacted]")
    }

    fn build_payload(&self, request: &ModelRequest) -> Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        if let Some(image) = &request.image {
            let image = gemini_compatible_image(image);
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": image.to_base64()
                }
            }));
        }

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": {
                "temperature": self.temperature,
                "topK": self.top_k,
                "topP": self.top_p,
                "maxOutputTokens": self.max_output_tokens,
            },
            "safetySettings": build_safety_settings(self.safety),
        })
    }

    async fn call_api(&self, payload: Value) -> Result<GeminiResponse, ModelError> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(target: "llm.gemini", model = %self.model, payload = %summarize_gemini_payload(&payload));
        }

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                let err_text = self.redact(&err.to_string());
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, status={:?})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    err.status()
                );
                ModelError::Transport(err_text)
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let body = self.redact(&body);
            let failure = classify_failure(status, &body, self.default_retry_after_secs);
            warn!(
                "Gemini API error: status={}, body={}",
                status,
                truncate_for_log(&body, 2000)
            );
            return Err(failure);
        }

        let value = response
            .json::<GeminiResponse>()
            .await
            .map_err(|err| ModelError::Decode(self.redact(&err.to_string())))?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!(target: "llm.gemini", model = %self.model, response = %summarize_gemini_response(&value));
        }
        Ok(value)
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: ModelRequest) -> Result<String, ModelError> {
        let payload = self.build_payload(&request);
        let metadata = json!({
            "has_image": request.image.is_some(),
            "prompt_chars": request.prompt.chars().count(),
        });

        log_llm_timing("gemini", &self.model, request.operation, Some(metadata), || async move {
            let response = self.call_api(payload).await?;
            if let Some(reason) = response
                .prompt_feedback
                .as_ref()
                .and_then(|feedback| feedback.block_reason.as_deref())
            {
                warn!("Gemini blocked the prompt: {}", reason);
            }
            let text = extract_text_from_response(response);
            if text.trim().is_empty() {
                return Err(ModelError::EmptyResponse);
            }
            Ok(text)
        })
        .await
    }
}

fn build_safety_settings(profile: SafetyProfile) -> Vec<Value> {
    let threshold = match profile {
        SafetyProfile::Standard => "BLOCK_MEDIUM_AND_ABOVE",
        SafetyProfile::Permissive => "OFF",
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
    ]
}

fn normalize_gemini_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" => "image/jpeg".to_string(),
        _ => lowered,
    }
}

fn gemini_supports_image_mime(mime_type: &str) -> bool {
    matches!(
        mime_type,
        "image/png" | "image/jpeg" | "image/webp" | "image/heic" | "image/heif"
    )
}

/// Gemini accepts a handful of image types; anything else is re-encoded as PNG.
fn gemini_compatible_image(image: &InlineImage) -> InlineImage {
    let mime_type = normalize_gemini_mime_type(&image.mime_type);
    if gemini_supports_image_mime(&mime_type) {
        return InlineImage {
            bytes: image.bytes.clone(),
            mime_type,
        };
    }

    match image::load_from_memory(&image.bytes)
        .map_err(|err| err.to_string())
        .and_then(|decoded| InlineImage::from_image(&decoded).map_err(|err| err.to_string()))
    {
        Ok(converted) => converted,
        Err(err) => {
            warn!(
                "Could not convert {} image for Gemini, sending as-is: {}",
                mime_type, err
            );
            InlineImage {
                bytes: image.bytes.clone(),
                mime_type,
            }
        }
    }
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

/// Reads `RetryInfo.retryDelay` (e.g. `"31s"`) from a Gemini error body.
fn retry_delay_from_body(body: &str) -> Option<u64> {
    let value = serde_json::from_str::<Value>(body.trim()).ok()?;
    let details = value.pointer("/error/details")?.as_array()?;
    details
        .iter()
        .filter_map(|detail| detail.get("retryDelay").and_then(|v| v.as_str()))
        .find_map(|delay| {
            let seconds = delay.trim().strip_suffix('s')?.parse::<f64>().ok()?;
            (seconds.is_finite() && seconds >= 0.0).then(|| seconds.trunc() as u64)
        })
}

fn classify_failure(status: StatusCode, body: &str, default_retry_secs: u64) -> ModelError {
    let (message, body_summary) = summarize_error_body(body);
    let detail = message.unwrap_or(body_summary);
    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS
        || body.contains("RESOURCE_EXHAUSTED")
        || detail.to_lowercase().contains("quota");

    if rate_limited {
        let retry_after_secs = parse_retry_after(&detail)
            .or_else(|| retry_delay_from_body(body))
            .unwrap_or(default_retry_secs);
        return ModelError::RateLimited {
            retry_after_secs,
            message: detail,
        };
    }

    ModelError::Status {
        status: status.as_u16(),
        message: detail,
    }
}

fn summarize_gemini_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let parts: Vec<Value> = contents
            .iter()
            .filter_map(|content| content.get("parts").and_then(|value| value.as_array()))
            .flatten()
            .map(|part| {
                if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                    json!({ "text": truncate_for_log(text, 200) })
                } else if let Some(inline_data) = part.get("inlineData") {
                    let mime_type = inline_data
                        .get("mimeType")
                        .and_then(|value| value.as_str())
                        .unwrap_or("unknown");
                    let data_len = inline_data
                        .get("data")
                        .and_then(|value| value.as_str())
                        .map(|value| value.len())
                        .unwrap_or(0);
                    json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
                } else {
                    json!({ "unknownPart": true })
                }
            })
            .collect();
        summary.insert("parts".to_string(), Value::Array(parts));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    Value::Object(summary)
}

fn summarize_gemini_response(response: &GeminiResponse) -> Value {
    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    let finish_reasons: Vec<&str> = candidates
        .iter()
        .filter_map(|candidate| candidate.finish_reason.as_deref())
        .collect();
    let text_preview = candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .filter_map(|content| content.parts.as_ref())
        .flatten()
        .filter_map(|part| part.text.as_deref())
        .find(|text| !text.trim().is_empty())
        .map(|text| truncate_for_log(text, 200));

    json!({
        "candidates": candidates.len(),
        "finishReasons": finish_reasons,
        "textPreview": text_preview,
    })
}

fn extract_text_from_response(response: GeminiResponse) -> String {
    let mut text_parts = Vec::new();
    for candidate in response.candidates.unwrap_or_default() {
        if let Some(parts) = candidate.content.and_then(|content| content.parts) {
            for part in parts {
                if let Some(text) = part.text {
                    if !text.trim().is_empty() {
                        text_parts.push(text);
                    }
                }
            }
        }
    }
    text_parts.join("\n")
}
