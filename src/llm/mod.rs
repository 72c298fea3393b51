pub mod extract;
pub mod gemini;
pub mod media;

use async_trait::async_trait;

use crate::error::ModelError;
use media::InlineImage;

pub use gemini::GeminiClient;

/// One single-turn generation request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub operation: &'static str,
    pub prompt: String,
    pub image: Option<InlineImage>,
}

impl ModelRequest {
    pub fn text(operation: &'static str, prompt: String) -> Self {
        ModelRequest {
            operation,
            prompt,
            image: None,
        }
    }

    pub fn with_image(operation: &'static str, prompt: String, image: InlineImage) -> Self {
        ModelRequest {
            operation,
            prompt,
            image: Some(image),
        }
    }
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the model's free-text answer. Empty answers are an error.
    async fn generate(&self, request: ModelRequest) -> Result<String, ModelError>;
}
