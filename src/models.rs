use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const DEFAULT_SKIN_TONE: &str = "tự nhiên";

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

/// Accepts either a bare scalar or a list and always yields a list. Models
/// sometimes answer `"color": "Trắng"` where a list was requested.
pub fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(values)) => values.into_iter().filter_map(scalar_to_string).collect(),
        Some(other) => scalar_to_string(other).into_iter().collect(),
    })
}

fn default_skin_tone() -> String {
    DEFAULT_SKIN_TONE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardrobeItem {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub color: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub category: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub color: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub season: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StylistPreferences {
    #[serde(default, deserialize_with = "one_or_many")]
    pub favorite_styles: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub favorite_colors: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub avoid_colors: Vec<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl StylistPreferences {
    pub fn bio_text(&self) -> Option<&str> {
        self.bio
            .as_deref()
            .map(str::trim)
            .filter(|bio| !bio.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.favorite_styles.is_empty()
            && self.favorite_colors.is_empty()
            && self.avoid_colors.is_empty()
            && self.bio_text().is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StylistContext {
    pub style: String,
    pub occasion: String,
    pub weather: String,
    #[serde(default = "default_skin_tone")]
    pub skin_tone: String,
    #[serde(default)]
    pub custom_context: Option<String>,
    #[serde(default)]
    pub preferences: Option<StylistPreferences>,
}

impl StylistContext {
    pub fn custom_context_text(&self) -> Option<&str> {
        self.custom_context
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn active_preferences(&self) -> Option<&StylistPreferences> {
        self.preferences.as_ref().filter(|prefs| !prefs.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedOutfit {
    pub outfit_name: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub item_ids: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationItem {
    pub image_url: String,
    #[serde(default)]
    pub category: String,
}

/// A garment with the text that stands in for it in a generation prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedItem {
    pub category: String,
    pub vision_desc: String,
}
