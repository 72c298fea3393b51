//! Scripted collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::io::Cursor;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;

use crate::error::ModelError;
use crate::imaging::ImageFetcher;
use crate::llm::{GenerativeModel, ModelRequest};

pub fn solid_image(width: u32, height: u32, rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(rgba))
}

pub fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("png encoding");
    buffer.into_inner()
}

/// Answers requests from a queue, recording every request it sees.
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<Result<String, ModelError>>) -> Self {
        ScriptedModel {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }

    pub fn operations(&self) -> Vec<&'static str> {
        self.requests.lock().iter().map(|request| request.operation).collect()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: ModelRequest) -> Result<String, ModelError> {
        self.requests.lock().push(request);
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Transport("no scripted response".to_string())))
    }
}

pub fn rate_limited(retry_after_secs: u64) -> ModelError {
    ModelError::RateLimited {
        retry_after_secs,
        message: format!("429 quota exceeded, retry in {retry_after_secs}s"),
    }
}

/// Serves fixed bytes per URL; unknown URLs fail like a network error.
#[derive(Default)]
pub struct StaticFetcher {
    responses: HashMap<String, std::result::Result<Vec<u8>, String>>,
}

impl StaticFetcher {
    pub fn serve(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.responses.insert(url.to_string(), Ok(bytes));
        self
    }

    pub fn fail(mut self, url: &str, message: &str) -> Self {
        self.responses
            .insert(url.to_string(), Err(message.to_string()));
        self
    }
}

#[async_trait]
impl ImageFetcher for StaticFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        match self.responses.get(url) {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Err(anyhow!("connection refused: {url}")),
        }
    }
}
