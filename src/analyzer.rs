use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{ModelError, StylistError};
use crate::llm::extract::strip_code_fence;
use crate::llm::media::{decode_image_payload, InlineImage};
use crate::llm::{GenerativeModel, ModelRequest};
use crate::models::AnalysisResult;

pub const CATEGORIES: [&str; 6] = ["Áo", "Quần", "Váy", "Giày", "Túi xách", "Phụ kiện"];
pub const COLORS: [&str; 12] = [
    "Đen",
    "Trắng",
    "Vàng",
    "Đỏ",
    "Xanh dương",
    "Xanh lá",
    "Cam",
    "Hồng",
    "Tím",
    "Nâu",
    "Be",
    "Xám",
];
pub const SEASONS: [&str; 4] = ["Mùa Xuân", "Mùa Hạ", "Mùa Thu", "Mùa Đông"];

fn quoted_list(values: &[&str]) -> String {
    values
        .iter()
        .map(|value| format!("\"{value}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

fn analysis_prompt() -> String {
    format!(
        r#"You are an AI fashion expert. Analyze the garment in this image and answer with a single pure JSON object, without markdown code fences.

Required fields (values MUST come from the lists):
1. "category": exactly one of [{categories}].
2. "color": a list of matching colors from [{colors}].
3. "season": a list of suitable seasons from [{seasons}].
4. "notes": one short Vietnamese sentence with a styling tip.
5. "tags": a list of 3-5 English keywords.

Example (color and season are always lists):
{{"category": "Áo", "color": ["Trắng", "Xanh dương"], "season": ["Mùa Hạ", "Mùa Thu"], "notes": "Phù hợp mặc đi chơi, phối với quần jean.", "tags": ["casual", "streetwear"]}}"#,
        categories = quoted_list(&CATEGORIES),
        colors = quoted_list(&COLORS),
        seasons = quoted_list(&SEASONS),
    )
}

fn description_prompt(category_hint: &str) -> String {
    format!(
        "This image shows a single isolated garment (category: {category_hint}). \
Describe it in one or two English sentences for an image-generation prompt: \
material and texture, exact colors, pattern, silhouette and cut, and any distinguishing details. \
Answer with the description only."
    )
}

/// Stand-in used when a garment cannot be described from its photo.
pub fn generic_description(category: &str) -> String {
    let category = category.trim();
    if category.is_empty() {
        "a high quality garment".to_string()
    } else {
        format!("a high quality {category}")
    }
}

pub fn parse_analysis(raw: &str) -> Result<AnalysisResult, StylistError> {
    let cleaned = strip_code_fence(raw);
    if cleaned.is_empty() {
        return Err(StylistError::malformed("Model returned an empty analysis", raw));
    }

    let result: AnalysisResult = serde_json::from_str(cleaned).map_err(|err| {
        StylistError::malformed(format!("Failed to parse analysis JSON: {err}"), cleaned)
    })?;
    if !CATEGORIES.contains(&result.category.as_str()) {
        warn!("Model returned category outside the known set: {}", result.category);
    }
    Ok(result)
}

#[derive(Clone)]
pub struct VisionAnalyzer {
    model: Arc<dyn GenerativeModel>,
}

impl VisionAnalyzer {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        VisionAnalyzer { model }
    }

    /// Classifies one wardrobe photo. `image_payload` is base64, optionally
    /// data-URL prefixed. Every failure is returned to the caller.
    pub async fn analyze_item(&self, image_payload: &str) -> Result<AnalysisResult, StylistError> {
        let image = decode_image_payload(image_payload)?;
        info!(
            "Analyzing wardrobe item ({}, {} bytes) with {}",
            image.mime_type,
            image.bytes.len(),
            self.model.model_name()
        );

        let raw = self
            .model
            .generate(ModelRequest::with_image("analyze_item", analysis_prompt(), image))
            .await?;
        parse_analysis(&raw)
    }

    /// Free-text description of an isolated garment. Never fails: any problem
    /// degrades to [`generic_description`].
    pub async fn describe_item(&self, image: InlineImage, category_hint: &str) -> String {
        match self.try_describe(image, category_hint).await {
            Ok(description) => description,
            Err(err) => {
                warn!(
                    "Garment description failed for {}, using template: {}",
                    category_hint, err
                );
                generic_description(category_hint)
            }
        }
    }

    async fn try_describe(
        &self,
        image: InlineImage,
        category_hint: &str,
    ) -> Result<String, StylistError> {
        let raw = self
            .model
            .generate(ModelRequest::with_image(
                "describe_item",
                description_prompt(category_hint),
                image,
            ))
            .await?;
        let description = strip_code_fence(&raw);
        if description.is_empty() {
            return Err(ModelError::EmptyResponse.into());
        }
        Ok(description.to_string())
    }
}
