use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use rand::Rng;
use tracing::{info, warn};
use url::Url;

use crate::analyzer::{generic_description, VisionAnalyzer};
use crate::config::Config;
use crate::error::{ModelError, StylistError};
use crate::imaging::fetch::try_fetch_image;
use crate::imaging::ImageFetcher;
use crate::llm::extract::strip_code_fence;
use crate::llm::media::InlineImage;
use crate::llm::{GenerativeModel, ModelRequest};
use crate::models::{AnalyzedItem, VisualizationItem};

/// Garments worth a detailed vision pass.
const PRIORITY_KEYWORDS: &[&str] = &[
    "áo", "quần", "váy", "đầm", "top", "shirt", "blouse", "pants", "jeans", "trousers", "shorts",
    "skirt", "dress",
];
const MAX_PRIORITY_ITEMS: usize = 2;

pub fn is_priority_category(category: &str) -> bool {
    let category = category.to_lowercase();
    PRIORITY_KEYWORDS
        .iter()
        .any(|keyword| category.contains(keyword))
}

/// Indices of the first priority garments, in outfit order.
pub fn select_priority_items(items: &[VisualizationItem]) -> Vec<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| is_priority_category(&item.category))
        .map(|(index, _)| index)
        .take(MAX_PRIORITY_ITEMS)
        .collect()
}

pub fn template_prompt(outfit_name: &str) -> String {
    format!("Professional fashion photography of a model wearing {outfit_name}, high quality.")
}

fn category_line(items: &[VisualizationItem]) -> String {
    let categories: Vec<&str> = items
        .iter()
        .map(|item| item.category.trim())
        .filter(|category| !category.is_empty())
        .collect();
    if categories.is_empty() {
        "the outfit items".to_string()
    } else {
        categories.join(", ")
    }
}

fn analyzed_block(items: &[AnalyzedItem]) -> String {
    let mut block = String::new();
    for item in items {
        let _ = writeln!(block, "- {}: {}", item.category, item.vision_desc);
    }
    block
}

fn synthesis_instruction(outfit_name: &str, garments: &str, rationale: &str) -> String {
    format!(
        "You are a prompt engineer for fashion image generators. Write ONE English prompt \
for an illustration of the outfit below.\n\
- Outfit name: {outfit_name}\n\
- Garments:\n{garments}\n\
- Context and styling rationale: {rationale}\n\n\
Prompt requirements:\n\
1. Focus on a real model wearing exactly these garments, with the described colors, materials and details.\n\
2. Style: high-end fashion editorial, cinematic lighting, realistic 8k, professional photography.\n\
3. Return only the prompt paragraph, with no explanation."
    )
}

/// Fallback tiers, tried in order until one yields a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStrategy {
    /// Isolate and describe priority garments, then synthesize.
    Precision,
    /// Synthesize from the item categories alone.
    Simple,
    /// Fixed template from the outfit name.
    Template,
}

impl PromptStrategy {
    pub const FULL: [PromptStrategy; 3] = [
        PromptStrategy::Precision,
        PromptStrategy::Simple,
        PromptStrategy::Template,
    ];
    pub const SIMPLE: [PromptStrategy; 2] = [PromptStrategy::Simple, PromptStrategy::Template];

    fn uses_model(self) -> bool {
        !matches!(self, PromptStrategy::Template)
    }

    fn label(self) -> &'static str {
        match self {
            PromptStrategy::Precision => "precision",
            PromptStrategy::Simple => "simple",
            PromptStrategy::Template => "template",
        }
    }
}

pub struct LookbookGenerator {
    model: Arc<dyn GenerativeModel>,
    analyzer: VisionAnalyzer,
    fetcher: Arc<dyn ImageFetcher>,
    base_url: String,
    width: u32,
    height: u32,
    seed_max: u32,
    describe_delay: Duration,
}

impl LookbookGenerator {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        analyzer: VisionAnalyzer,
        fetcher: Arc<dyn ImageFetcher>,
        config: &Config,
    ) -> Self {
        LookbookGenerator {
            model,
            analyzer,
            fetcher,
            base_url: config.image_generation_base_url.clone(),
            width: config.lookbook_width,
            height: config.lookbook_height,
            seed_max: config.lookbook_seed_max,
            describe_delay: Duration::from_millis(config.describe_delay_ms),
        }
    }

    /// Precision mode with both fallbacks. Never fails: `None` means no tier
    /// produced a usable URL.
    pub async fn generate_lookbook(
        &self,
        outfit_name: &str,
        items: &[VisualizationItem],
        rationale: &str,
    ) -> Option<String> {
        self.run_strategies(&PromptStrategy::FULL, outfit_name, items, rationale)
            .await
    }

    /// Legacy mode: no per-item vision pass.
    pub async fn generate_simple_lookbook(
        &self,
        outfit_name: &str,
        items: &[VisualizationItem],
        rationale: &str,
    ) -> Option<String> {
        self.run_strategies(&PromptStrategy::SIMPLE, outfit_name, items, rationale)
            .await
    }

    async fn run_strategies(
        &self,
        strategies: &[PromptStrategy],
        outfit_name: &str,
        items: &[VisualizationItem],
        rationale: &str,
    ) -> Option<String> {
        let mut model_available = true;

        for &strategy in strategies {
            if strategy.uses_model() && !model_available {
                continue;
            }

            let prompt = match self.build_prompt(strategy, outfit_name, items, rationale).await {
                Ok(prompt) => prompt,
                Err(err) => {
                    if err.is_rate_limited() {
                        model_available = false;
                    }
                    warn!(
                        "Lookbook {} prompt failed for '{}': {}",
                        strategy.label(),
                        outfit_name,
                        err
                    );
                    continue;
                }
            };

            match self.image_url(&prompt) {
                Ok(url) => {
                    info!(
                        "Lookbook URL built for '{}' via {} prompt ({} chars)",
                        outfit_name,
                        strategy.label(),
                        prompt.chars().count()
                    );
                    return Some(url);
                }
                Err(err) => warn!("Lookbook URL construction failed: {:#}", err),
            }
        }

        warn!("No lookbook produced for '{}'", outfit_name);
        None
    }

    async fn build_prompt(
        &self,
        strategy: PromptStrategy,
        outfit_name: &str,
        items: &[VisualizationItem],
        rationale: &str,
    ) -> Result<String, StylistError> {
        match strategy {
            PromptStrategy::Precision => {
                let analyzed = self.analyze_items(items).await;
                self.synthesize(outfit_name, &analyzed_block(&analyzed), rationale)
                    .await
            }
            PromptStrategy::Simple => {
                self.synthesize(outfit_name, &category_line(items), rationale)
                    .await
            }
            PromptStrategy::Template => Ok(template_prompt(outfit_name)),
        }
    }

    /// One vision call at a time, spaced by `describe_delay`.
    async fn analyze_items(&self, items: &[VisualizationItem]) -> Vec<AnalyzedItem> {
        let priority = select_priority_items(items);
        let mut analyzed = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let vision_desc = if let Some(position) = priority.iter().position(|&p| p == index) {
                if position > 0 && !self.describe_delay.is_zero() {
                    tokio::time::sleep(self.describe_delay).await;
                }
                self.describe(item).await
            } else {
                generic_description(&item.category)
            };
            analyzed.push(AnalyzedItem {
                category: item.category.clone(),
                vision_desc,
            });
        }

        analyzed
    }

    async fn describe(&self, item: &VisualizationItem) -> String {
        let isolated = match try_fetch_image(self.fetcher.as_ref(), &item.image_url, true).await {
            Ok(image) => image,
            Err(err) => {
                warn!("Could not isolate {}: {:#}", item.image_url, err);
                return generic_description(&item.category);
            }
        };
        match InlineImage::from_image(&isolated) {
            Ok(inline) => self.analyzer.describe_item(inline, &item.category).await,
            Err(err) => {
                warn!("Could not encode isolated {}: {}", item.image_url, err);
                generic_description(&item.category)
            }
        }
    }

    async fn synthesize(
        &self,
        outfit_name: &str,
        garments: &str,
        rationale: &str,
    ) -> Result<String, StylistError> {
        let instruction = synthesis_instruction(outfit_name, garments, rationale);
        let raw = self
            .model
            .generate(ModelRequest::text("lookbook_prompt", instruction))
            .await?;
        let prompt = strip_code_fence(&raw).trim();
        if prompt.is_empty() {
            return Err(ModelError::EmptyResponse.into());
        }
        Ok(prompt.to_string())
    }

    /// `{base}/{encoded prompt}?width=..&height=..&nologo=true&seed=..`
    pub fn image_url(&self, prompt: &str) -> Result<String> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Image generation URL cannot take a path: {}", self.base_url))?
            .pop_if_empty()
            .push(prompt);

        let seed = rand::thread_rng().gen_range(0..self.seed_max.max(1));
        url.query_pairs_mut()
            .append_pair("width", &self.width.to_string())
            .append_pair("height", &self.height.to_string())
            .append_pair("nologo", "true")
            .append_pair("seed", &seed.to_string());
        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, rate_limited, solid_image, ScriptedModel, StaticFetcher};
    use image::Rgba;

    fn item(url: &str, category: &str) -> VisualizationItem {
        VisualizationItem {
            image_url: url.to_string(),
            category: category.to_string(),
        }
    }

    fn garment_png() -> Vec<u8> {
        let mut image = solid_image(30, 30, [255, 255, 255, 255]);
        for y in 5..25 {
            for x in 8..22 {
                image.put_pixel(x, y, Rgba([20, 40, 160, 255]));
            }
        }
        png_bytes(&image)
    }

    fn generator(
        responses: Vec<Result<String, ModelError>>,
        fetcher: StaticFetcher,
        base_url: &str,
    ) -> (Arc<ScriptedModel>, LookbookGenerator) {
        let config = Config {
            image_generation_base_url: base_url.to_string(),
            describe_delay_ms: 0,
            ..Config::default()
        };
        generator_with(config, responses, fetcher)
    }

    fn generator_with(
        config: Config,
        responses: Vec<Result<String, ModelError>>,
        fetcher: StaticFetcher,
    ) -> (Arc<ScriptedModel>, LookbookGenerator) {
        let model = Arc::new(ScriptedModel::new(responses));
        let generator = LookbookGenerator::new(
            model.clone(),
            VisionAnalyzer::new(model.clone()),
            Arc::new(fetcher),
            &config,
        );
        (model, generator)
    }

    const BASE: &str = "https://image.pollinations.ai/prompt";

    #[test]
    fn priority_selection_takes_first_two_garments() {
        let items = [
            item("a", "Giày"),
            item("b", "Áo"),
            item("c", "Phụ kiện"),
            item("d", "Quần"),
            item("e", "Váy"),
        ];
        assert_eq!(select_priority_items(&items), vec![1, 3]);
        assert!(is_priority_category("Denim Jeans"));
        assert!(!is_priority_category("Túi xách"));
    }

    #[test]
    fn url_embeds_encoded_prompt_and_parameters() {
        let (_, generator) = generator(vec![], StaticFetcher::default(), BASE);
        let url = generator.image_url("A model in a blue/white shirt").unwrap();
        assert!(url.starts_with("https://image.pollinations.ai/prompt/A%20model%20in%20a%20blue%2Fwhite%20shirt?"));

        let parsed = Url::parse(&url).unwrap();
        let query: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert!(query.contains(&("width".to_string(), "1024".to_string())));
        assert!(query.contains(&("height".to_string(), "1024".to_string())));
        assert!(query.contains(&("nologo".to_string(), "true".to_string())));
        let seed: u32 = query
            .iter()
            .find(|(key, _)| key == "seed")
            .map(|(_, value)| value.parse().unwrap())
            .unwrap();
        assert!(seed < 1000);
    }

    #[tokio::test]
    async fn precision_mode_describes_priority_garments() {
        let fetcher = StaticFetcher::default()
            .serve("https://img/shirt.png", garment_png())
            .fail("https://img/pants.png", "operation timed out");
        let (model, generator) = generator(
            vec![
                Ok("A navy oxford shirt with a button-down collar.".to_string()),
                Ok("Editorial photo of a model in a navy oxford shirt".to_string()),
            ],
            fetcher,
            BASE,
        );
        let items = [
            item("https://img/shirt.png", "Áo"),
            item("https://img/pants.png", "Quần"),
            item("https://img/shoes.png", "Giày"),
        ];

        let url = generator
            .generate_lookbook("Công sở", &items, "Lịch sự")
            .await
            .unwrap();
        assert!(url.contains("Editorial%20photo%20of%20a%20model"));

        assert_eq!(model.operations(), vec!["describe_item", "lookbook_prompt"]);
        let requests = model.requests();
        assert_eq!(requests[0].image.as_ref().unwrap().mime_type, "image/png");
        let instruction = &requests[1].prompt;
        assert!(instruction.contains("- Áo: A navy oxford shirt with a button-down collar."));
        assert!(instruction.contains("- Quần: a high quality Quần"));
        assert!(instruction.contains("- Giày: a high quality Giày"));
        assert!(instruction.contains("Công sở"));
    }

    #[tokio::test(start_paused = true)]
    async fn priority_descriptions_are_sequential_and_spaced() {
        let fetcher = StaticFetcher::default()
            .serve("https://img/shirt.png", garment_png())
            .serve("https://img/skirt.png", garment_png());
        let config = Config {
            describe_delay_ms: 750,
            ..Config::default()
        };
        let (model, generator) = generator_with(
            config,
            vec![
                Ok("A white linen shirt.".to_string()),
                Ok("A pleated navy skirt.".to_string()),
                Ok("Model in a linen shirt and pleated skirt".to_string()),
            ],
            fetcher,
        );
        let items = [
            item("https://img/shirt.png", "Áo"),
            item("https://img/skirt.png", "Chân váy"),
        ];

        let started = tokio::time::Instant::now();
        let url = generator.generate_lookbook("Thanh lịch", &items, "").await;
        assert!(url.is_some());
        assert_eq!(started.elapsed(), Duration::from_millis(750));
        assert_eq!(
            model.operations(),
            vec!["describe_item", "describe_item", "lookbook_prompt"]
        );
    }

    #[tokio::test]
    async fn failed_synthesis_falls_back_to_simple_mode() {
        let (model, generator) = generator(
            vec![
                Err(ModelError::Transport("connection reset".to_string())),
                Ok("```\nModel wearing a dress and heels\n```".to_string()),
            ],
            StaticFetcher::default(),
            BASE,
        );
        let items = [item("https://img/x", "Túi xách"), item("https://img/y", "Giày")];

        let url = generator.generate_lookbook("Dạ tiệc", &items, "").await.unwrap();
        assert!(url.contains("/prompt/Model%20wearing%20a%20dress%20and%20heels?"));
        assert_eq!(model.operations(), vec!["lookbook_prompt", "lookbook_prompt"]);
        assert!(model.requests()[1].prompt.contains("Túi xách, Giày"));
    }

    #[tokio::test]
    async fn rate_limit_skips_to_template() {
        let (model, generator) = generator(
            vec![Err(rate_limited(30)), Ok("never used".to_string())],
            StaticFetcher::default(),
            BASE,
        );
        let url = generator
            .generate_lookbook("Dạo phố", &[item("https://img/z", "Giày")], "")
            .await
            .unwrap();
        assert!(url.contains("Professional%20fashion%20photography%20of%20a%20model%20wearing%20D"));
        assert_eq!(model.operations(), vec!["lookbook_prompt"]);
    }

    #[tokio::test]
    async fn empty_prompts_fall_through_to_template() {
        let (_, generator) = generator(
            vec![Ok("  ".to_string()), Ok(String::new())],
            StaticFetcher::default(),
            BASE,
        );
        let url = generator.generate_lookbook("Basic", &[], "").await.unwrap();
        assert!(url.contains("Professional%20fashion%20photography"));
    }

    #[tokio::test]
    async fn broken_generator_url_yields_none() {
        let (_, generator) = generator(vec![], StaticFetcher::default(), "not a url");
        let items = [item("https://img/shirt.png", "Áo")];
        assert_eq!(generator.generate_lookbook("Any", &items, "").await, None);
        assert_eq!(generator.generate_simple_lookbook("Any", &items, "").await, None);
    }

    #[tokio::test]
    async fn simple_mode_skips_vision_calls() {
        let fetcher = StaticFetcher::default().serve("https://img/shirt.png", garment_png());
        let (model, generator) = generator(
            vec![Ok("Model in a shirt and sneakers".to_string())],
            fetcher,
            BASE,
        );
        let items = [
            item("https://img/shirt.png", "Áo"),
            item("https://img/shoes.png", "Giày"),
        ];
        let url = generator
            .generate_simple_lookbook("Cuối tuần", &items, "Thoải mái")
            .await
            .unwrap();
        assert!(url.contains("Model%20in%20a%20shirt"));
        assert_eq!(model.operations(), vec!["lookbook_prompt"]);
        assert!(model.requests()[0].prompt.contains("Áo, Giày"));
    }
}
