use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::analyzer::VisionAnalyzer;
use crate::config::Config;
use crate::imaging::{HttpImageFetcher, ImageFetcher};
use crate::llm::{GeminiClient, GenerativeModel};
use crate::stylist::SuggestionEngine;
use crate::visualizer::Visualizer;

/// Process-wide pipeline components, built once at startup and read-only
/// afterwards. Every component shares the same model client.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub analyzer: VisionAnalyzer,
    pub stylist: Arc<SuggestionEngine>,
    pub visualizer: Arc<Visualizer>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let model: Arc<dyn GenerativeModel> = Arc::new(GeminiClient::new(&config)?);
        let fetcher: Arc<dyn ImageFetcher> = Arc::new(HttpImageFetcher::new(Duration::from_secs(
            config.image_fetch_timeout_seconds,
        ))?);
        Ok(AppState::with_collaborators(config, model, fetcher))
    }

    pub fn with_collaborators(
        config: Config,
        model: Arc<dyn GenerativeModel>,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        let analyzer = VisionAnalyzer::new(model.clone());
        let stylist = SuggestionEngine::new(model.clone(), config.strict_item_ids);
        let visualizer = Visualizer::new(model, analyzer.clone(), fetcher, &config);
        AppState {
            config: Arc::new(config),
            analyzer,
            stylist: Arc::new(stylist),
            visualizer: Arc::new(visualizer),
        }
    }
}
