pub mod lookbook;
pub mod moodboard;

use std::sync::Arc;

use image::RgbImage;
use tracing::info;

use crate::analyzer::VisionAnalyzer;
use crate::config::Config;
use crate::imaging::ImageFetcher;
use crate::llm::GenerativeModel;
use crate::models::VisualizationItem;
pub use lookbook::LookbookGenerator;
pub use moodboard::{compose_moodboard, encode_png_base64};

/// Best-effort artifacts for one outfit. Neither half can fail the request.
pub struct Visualization {
    pub moodboard: RgbImage,
    pub lookbook_url: Option<String>,
}

pub struct Visualizer {
    fetcher: Arc<dyn ImageFetcher>,
    lookbook: LookbookGenerator,
    moodboard_width: u32,
    moodboard_height: u32,
}

impl Visualizer {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        analyzer: VisionAnalyzer,
        fetcher: Arc<dyn ImageFetcher>,
        config: &Config,
    ) -> Self {
        Visualizer {
            lookbook: LookbookGenerator::new(model, analyzer, fetcher.clone(), config),
            fetcher,
            moodboard_width: config.moodboard_width,
            moodboard_height: config.moodboard_height,
        }
    }

    async fn moodboard(&self, items: &[VisualizationItem]) -> RgbImage {
        compose_moodboard(
            self.fetcher.as_ref(),
            items,
            self.moodboard_width,
            self.moodboard_height,
        )
        .await
    }

    /// Moodboard first, then the precision lookbook with its fallbacks.
    pub async fn visualize(
        &self,
        outfit_name: &str,
        items: &[VisualizationItem],
        rationale: &str,
    ) -> Visualization {
        let moodboard = self.moodboard(items).await;
        let lookbook_url = self
            .lookbook
            .generate_lookbook(outfit_name, items, rationale)
            .await;
        Self::finish(outfit_name, items, moodboard, lookbook_url)
    }

    /// Moodboard plus the category-only lookbook, skipping vision calls.
    pub async fn visualize_simple(
        &self,
        outfit_name: &str,
        items: &[VisualizationItem],
        rationale: &str,
    ) -> Visualization {
        let moodboard = self.moodboard(items).await;
        let lookbook_url = self
            .lookbook
            .generate_simple_lookbook(outfit_name, items, rationale)
            .await;
        Self::finish(outfit_name, items, moodboard, lookbook_url)
    }

    fn finish(
        outfit_name: &str,
        items: &[VisualizationItem],
        moodboard: RgbImage,
        lookbook_url: Option<String>,
    ) -> Visualization {
        info!(
            "Visualized '{}' ({} items, lookbook={})",
            outfit_name,
            items.len(),
            lookbook_url.is_some()
        );
        Visualization {
            moodboard,
            lookbook_url,
        }
    }
}
