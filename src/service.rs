//! Request/response contract of the three pipeline operations.
//!
//! Every operation returns a [`ServiceReply`]: an HTTP-style status, an
//! optional `Retry-After` value and the `{success, data|error}` envelope.
//! Failures never escape as `Err`; they are rendered into the reply here.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::{classify_error_text, StylistError, QUOTA_EXCEEDED_MESSAGE};
use crate::models::{AnalysisResult, StylistContext, SuggestedOutfit, VisualizationItem, WardrobeItem};
use crate::state::AppState;
use crate::utils::timing::{complete_operation_timer, start_operation_timer, OperationTimer};
use crate::visualizer::encode_png_base64;

#[derive(Debug, Clone, Deserialize)]
pub struct ImageRequest {
    pub image_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StylistRequest {
    #[serde(flatten)]
    pub context: StylistContext,
    pub wardrobe: Vec<WardrobeItem>,
}

/// Which lookbook pipeline a visualization runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookbookMode {
    #[default]
    Precision,
    Simple,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisualizationRequest {
    pub outfit_name: String,
    pub items: Vec<VisualizationItem>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub lookbook_mode: LookbookMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionData {
    pub suggestions: Vec<SuggestedOutfit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisualizationData {
    pub image_base64: String,
    pub lookbook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ServiceReply<T> {
    pub status: u16,
    pub retry_after_header: Option<String>,
    pub body: ApiResponse<T>,
}

impl<T> ServiceReply<T> {
    pub fn ok(data: T) -> Self {
        ServiceReply {
            status: 200,
            retry_after_header: None,
            body: ApiResponse {
                success: true,
                data: Some(data),
                error: None,
                retry_after: None,
            },
        }
    }

    fn failure(status: u16, message: String, retry_after: Option<u64>) -> Self {
        ServiceReply {
            status,
            retry_after_header: retry_after.map(|secs| secs.to_string()),
            body: ApiResponse {
                success: false,
                data: None,
                error: Some(message),
                retry_after,
            },
        }
    }

    fn rate_limited(retry_after_secs: u64) -> Self {
        ServiceReply::failure(429, QUOTA_EXCEEDED_MESSAGE.to_string(), Some(retry_after_secs))
    }

    /// Typed quota errors map straight to 429. Errors that only carry text
    /// are classified by their message, as an upstream proxy may rewrite a
    /// quota failure into a plain status error.
    pub fn from_error(err: &StylistError, default_retry_secs: u64) -> Self {
        if let Some(retry_after) = err.retry_after() {
            return ServiceReply::rate_limited(retry_after);
        }
        match err {
            StylistError::InvalidImage(_) | StylistError::MalformedOutput { .. } => {
                ServiceReply::failure(err.status_code(), err.to_string(), None)
            }
            _ => ServiceReply::from_message(err.to_string(), default_retry_secs),
        }
    }

    pub fn from_message(message: String, default_retry_secs: u64) -> Self {
        match classify_error_text(&message, default_retry_secs) {
            Some(retry_after) => ServiceReply::rate_limited(retry_after),
            None => ServiceReply::failure(500, message, None),
        }
    }

    pub fn is_success(&self) -> bool {
        self.body.success
    }
}

fn finish<T>(
    operation: &str,
    timer: &mut OperationTimer,
    result: Result<T, StylistError>,
    default_retry_secs: u64,
) -> ServiceReply<T> {
    match result {
        Ok(data) => {
            complete_operation_timer(timer, "success", None);
            ServiceReply::ok(data)
        }
        Err(err) => {
            let reply = ServiceReply::from_error(&err, default_retry_secs);
            if reply.status == 429 {
                warn!("{} rate limited: {}", operation, err);
                complete_operation_timer(timer, "rate_limited", reply.retry_after_header.clone());
            } else {
                error!("{} failed: {}", operation, err);
                complete_operation_timer(timer, "error", Some(err.to_string()));
            }
            reply
        }
    }
}

pub async fn analyze(state: &AppState, request: ImageRequest) -> ServiceReply<AnalysisResult> {
    let mut timer = start_operation_timer(
        "analyze",
        format!("payload_chars={}", request.image_base64.len()),
    );
    let result = state.analyzer.analyze_item(&request.image_base64).await;
    finish(
        "analyze",
        &mut timer,
        result,
        state.config.rate_limit_default_retry_seconds,
    )
}

pub async fn suggest(state: &AppState, request: StylistRequest) -> ServiceReply<SuggestionData> {
    let mut timer = start_operation_timer(
        "suggest",
        format!(
            "wardrobe={} style={} occasion={}",
            request.wardrobe.len(),
            request.context.style,
            request.context.occasion
        ),
    );
    let result = state
        .stylist
        .suggest(&request.context, &request.wardrobe)
        .await
        .map(|suggestions| SuggestionData { suggestions });
    finish(
        "suggest",
        &mut timer,
        result,
        state.config.rate_limit_default_retry_seconds,
    )
}

pub async fn visualize(
    state: &AppState,
    request: VisualizationRequest,
) -> ServiceReply<VisualizationData> {
    let mut timer = start_operation_timer(
        "visualize",
        format!("outfit={} items={}", request.outfit_name, request.items.len()),
    );
    let visualization = match request.lookbook_mode {
        LookbookMode::Precision => {
            state
                .visualizer
                .visualize(&request.outfit_name, &request.items, &request.rationale)
                .await
        }
        LookbookMode::Simple => {
            state
                .visualizer
                .visualize_simple(&request.outfit_name, &request.items, &request.rationale)
                .await
        }
    };
    let result = encode_png_base64(&visualization.moodboard)
        .map(|image_base64| VisualizationData {
            image_base64,
            lookbook_url: visualization.lookbook_url,
        })
        .map_err(|err| StylistError::Internal(format!("Failed to encode moodboard: {err}")));
    finish(
        "visualize",
        &mut timer,
        result,
        state.config.rate_limit_default_retry_seconds,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use base64::{engine::general_purpose, Engine as _};
    use serde_json::json;

    use super::*;
    use crate::config::Config;
    use crate::error::ModelError;
    use crate::testing::{png_bytes, rate_limited, solid_image, ScriptedModel, StaticFetcher};

    fn state(responses: Vec<Result<String, ModelError>>) -> (Arc<ScriptedModel>, AppState) {
        let model = Arc::new(ScriptedModel::new(responses));
        let config = Config {
            describe_delay_ms: 0,
            ..Config::default()
        };
        let state =
            AppState::with_collaborators(config, model.clone(), Arc::new(StaticFetcher::default()));
        (model, state)
    }

    fn shirt_request() -> ImageRequest {
        let bytes = png_bytes(&solid_image(4, 4, [255, 255, 255, 255]));
        ImageRequest {
            image_base64: format!("data:image/jpeg;base64,{}", general_purpose::STANDARD.encode(bytes)),
        }
    }

    #[tokio::test]
    async fn analyze_wraps_result_in_envelope() {
        let (_, state) = state(vec![Ok(
            r#"{"category":"Áo","color":"Trắng","season":["Mùa Hạ"],"notes":"","tags":["basic"]}"#.to_string(),
        )]);
        let reply = analyze(&state, shirt_request()).await;
        assert_eq!(reply.status, 200);
        let body = serde_json::to_value(&reply.body).unwrap();
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["color"], json!(["Trắng"]));
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn invalid_image_is_a_client_error() {
        let (_, state) = state(vec![]);
        let reply = analyze(
            &state,
            ImageRequest {
                image_base64: "data:image/png;base64,???".to_string(),
            },
        )
        .await;
        assert_eq!(reply.status, 400);
        assert!(reply.body.error.unwrap().starts_with("Invalid image format"));
    }

    #[tokio::test]
    async fn quota_error_renders_retry_hint() {
        let (_, state) = state(vec![Err(rate_limited(12))]);
        let request: StylistRequest = serde_json::from_value(json!({
            "style": "casual",
            "occasion": "cafe",
            "weather": "nắng",
            "wardrobe": [{"id": "a", "name": "Áo thun", "category": "Áo", "color": ["Trắng"]}]
        }))
        .unwrap();
        assert_eq!(request.context.skin_tone, "tự nhiên");

        let reply = suggest(&state, request).await;
        assert_eq!(reply.status, 429);
        assert_eq!(reply.retry_after_header.as_deref(), Some("12"));
        assert_eq!(reply.body.retry_after, Some(12));
        assert_eq!(reply.body.error.as_deref(), Some(QUOTA_EXCEEDED_MESSAGE));
    }

    #[tokio::test]
    async fn malformed_suggestions_are_server_errors() {
        let (_, state) = state(vec![Ok("no json here".to_string())]);
        let request: StylistRequest = serde_json::from_value(json!({
            "style": "casual", "occasion": "cafe", "weather": "nắng", "wardrobe": []
        }))
        .unwrap();
        let reply = suggest(&state, request).await;
        assert_eq!(reply.status, 500);
        assert!(!reply.is_success());
        assert!(reply.retry_after_header.is_none());
    }

    #[test]
    fn textual_quota_errors_are_classified() {
        let err = StylistError::Model(ModelError::Status {
            status: 403,
            message: "429 upstream quota, retry in 3.9s".to_string(),
        });
        let reply = ServiceReply::<()>::from_error(&err, 60);
        assert_eq!(reply.status, 429);
        assert_eq!(reply.body.retry_after, Some(3));

        let reply = ServiceReply::<()>::from_message("Internal error: boom".to_string(), 60);
        assert_eq!(reply.status, 500);
        assert_eq!(reply.body.error.as_deref(), Some("Internal error: boom"));
    }

    #[tokio::test]
    async fn visualize_always_succeeds() {
        let (_, state) = state(vec![]);
        let request: VisualizationRequest = serde_json::from_value(json!({
            "outfit_name": "Đi biển",
            "items": [{"image_url": "https://img/broken.jpg", "category": "Váy"}]
        }))
        .unwrap();
        let reply = visualize(&state, request).await;
        assert_eq!(reply.status, 200);
        let data = reply.body.data.unwrap();
        let png = general_purpose::STANDARD.decode(data.image_base64).unwrap();
        let moodboard = image::load_from_memory(&png).unwrap();
        assert_eq!((moodboard.width(), moodboard.height()), (800, 1000));
        assert!(data.lookbook_url.unwrap().contains("Professional%20fashion%20photography"));
    }

    #[tokio::test]
    async fn simple_mode_skips_garment_descriptions() {
        let (model, state) = state(vec![Ok("Model in a summer dress".to_string())]);
        let request: VisualizationRequest = serde_json::from_value(json!({
            "outfit_name": "Đi biển",
            "items": [{"image_url": "https://img/dress.jpg", "category": "Váy"}],
            "rationale": "Mát mẻ",
            "lookbook_mode": "simple"
        }))
        .unwrap();
        let reply = visualize(&state, request).await;
        let url = reply.body.data.unwrap().lookbook_url.unwrap();
        assert!(url.contains("Model%20in%20a%20summer%20dress"));
        assert_eq!(model.operations(), vec!["lookbook_prompt"]);
    }
}
