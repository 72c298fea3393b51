pub mod prompt;

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::StylistError;
use crate::llm::extract::extract_json;
use crate::llm::{GenerativeModel, ModelRequest};
use crate::models::{StylistContext, SuggestedOutfit, WardrobeItem};
use prompt::{suggestion_prompt, wardrobe_inventory};

/// Turns a repaired JSON value into outfits. A lone object is treated as a
/// one-element list.
pub fn parse_suggestions(raw: &str) -> Result<Vec<SuggestedOutfit>, StylistError> {
    let entries = match extract_json(raw)? {
        Value::Array(entries) => entries,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(StylistError::malformed(
                "Expected a JSON array of outfits",
                &other.to_string(),
            ))
        }
    };

    entries
        .into_iter()
        .map(|entry| {
            let snippet = entry.to_string();
            serde_json::from_value::<SuggestedOutfit>(entry).map_err(|err| {
                StylistError::malformed(format!("Outfit entry has the wrong shape: {err}"), &snippet)
            })
        })
        .collect()
}

/// Drops item ids the wardrobe does not contain, and outfits left empty.
pub fn retain_known_item_ids(
    outfits: Vec<SuggestedOutfit>,
    wardrobe: &[WardrobeItem],
) -> Vec<SuggestedOutfit> {
    let known: HashSet<&str> = wardrobe.iter().map(|item| item.id.as_str()).collect();

    outfits
        .into_iter()
        .filter_map(|mut outfit| {
            let before = outfit.item_ids.len();
            outfit.item_ids.retain(|id| known.contains(id.as_str()));
            if outfit.item_ids.len() != before {
                warn!(
                    "Dropped {} unknown item id(s) from outfit '{}'",
                    before - outfit.item_ids.len(),
                    outfit.outfit_name
                );
            }
            if outfit.item_ids.is_empty() {
                warn!(
                    "Discarding outfit '{}' with no valid wardrobe items",
                    outfit.outfit_name
                );
                return None;
            }
            Some(outfit)
        })
        .collect()
}

pub struct SuggestionEngine {
    model: Arc<dyn GenerativeModel>,
    strict_item_ids: bool,
}

impl SuggestionEngine {
    pub fn new(model: Arc<dyn GenerativeModel>, strict_item_ids: bool) -> Self {
        SuggestionEngine {
            model,
            strict_item_ids,
        }
    }

    /// One model turn per call. Malformed output and quota errors are returned
    /// to the caller; nothing is retried here.
    pub async fn suggest(
        &self,
        context: &StylistContext,
        wardrobe: &[WardrobeItem],
    ) -> Result<Vec<SuggestedOutfit>, StylistError> {
        let inventory = wardrobe_inventory(wardrobe)
            .map_err(|err| StylistError::Internal(format!("Failed to serialize wardrobe: {err}")))?;
        let prompt = suggestion_prompt(context, &inventory);
        info!(
            "Requesting outfit suggestions: wardrobe={} style={} occasion={}",
            wardrobe.len(),
            context.style,
            context.occasion
        );

        let raw = self
            .model
            .generate(ModelRequest::text("suggest_outfits", prompt))
            .await?;
        let outfits = parse_suggestions(&raw)?;

        let outfits = if self.strict_item_ids {
            retain_known_item_ids(outfits, wardrobe)
        } else {
            outfits
        };
        info!("Model proposed {} outfit(s)", outfits.len());
        Ok(outfits)
    }
}
