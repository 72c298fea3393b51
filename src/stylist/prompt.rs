use std::fmt::Write as _;

use crate::models::{StylistContext, StylistPreferences, WardrobeItem};

pub const OUTFIT_COUNT: usize = 3;

/// Pretty JSON inventory; Vietnamese names stay unescaped.
pub fn wardrobe_inventory(wardrobe: &[WardrobeItem]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(wardrobe)
}

fn preference_block(preferences: &StylistPreferences) -> String {
    let mut block = String::from("USER PREFERENCES:\n");
    if !preferences.favorite_styles.is_empty() {
        let _ = writeln!(
            block,
            "- Favorite styles: {}",
            preferences.favorite_styles.join(", ")
        );
    }
    if !preferences.favorite_colors.is_empty() {
        let _ = writeln!(
            block,
            "- Favorite colors: {}",
            preferences.favorite_colors.join(", ")
        );
    }
    if !preferences.avoid_colors.is_empty() {
        let _ = writeln!(
            block,
            "- Colors to avoid (never use): {}",
            preferences.avoid_colors.join(", ")
        );
    }
    if let Some(bio) = preferences.bio_text() {
        let _ = writeln!(block, "- About the user: {bio}");
    }
    block
}

pub fn suggestion_prompt(context: &StylistContext, inventory: &str) -> String {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "You are a professional AI stylist. Using only the user's wardrobe and context below, \
suggest the {OUTFIT_COUNT} most suitable outfits."
    );
    prompt.push('\n');

    prompt.push_str("USER CONTEXT:\n");
    let _ = writeln!(prompt, "- Requested style: {}", context.style);
    let _ = writeln!(prompt, "- Occasion: {}", context.occasion);
    let _ = writeln!(prompt, "- Weather: {}", context.weather);
    let _ = writeln!(prompt, "- Skin tone: {}", context.skin_tone);
    prompt.push('\n');

    if let Some(custom) = context.custom_context_text() {
        let _ = writeln!(prompt, "ADDITIONAL REQUEST FROM THE USER:\n{custom}\n");
    }

    if let Some(preferences) = context.active_preferences() {
        prompt.push_str(&preference_block(preferences));
        prompt.push('\n');
    }

    let _ = writeln!(prompt, "WARDROBE:\n{inventory}\n");

    let _ = write!(
        prompt,
        r#"REQUIREMENTS:
1. Suggest exactly {OUTFIT_COUNT} different outfits.
2. Every outfit must be complete (a top with bottoms, or a dress, plus matching shoes when available) and appropriate for the occasion and weather.
3. Use only items from the WARDROBE, referenced by their exact "id".
4. Harmonize colors and categories, and respect the user's preferences.
5. Answer with pure JSON only (no markdown fences) in exactly this shape:
[
  {{
    "outfit_name": "Short outfit name",
    "item_ids": ["id1", "id2", "id3"],
    "description": "Short description of the chosen items",
    "rationale": "Why this outfit fits the context and the user's skin tone"
  }}
]

NOTES:
- If the wardrobe is too small for {OUTFIT_COUNT} complete outfits, return the best outfits possible.
- Never invent item ids.
- Write outfit_name, description and rationale in Vietnamese."#
    );

    prompt
}
