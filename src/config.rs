use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyProfile {
    Standard,
    Permissive,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub logs_dir: PathBuf,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub gemini_temperature: f32,
    pub gemini_top_k: i32,
    pub gemini_top_p: f32,
    pub gemini_max_output_tokens: i32,
    pub gemini_safety_settings: SafetyProfile,
    pub model_timeout_seconds: u64,
    pub image_fetch_timeout_seconds: u64,
    pub image_generation_base_url: String,
    pub lookbook_width: u32,
    pub lookbook_height: u32,
    pub lookbook_seed_max: u32,
    pub describe_delay_ms: u64,
    pub moodboard_width: u32,
    pub moodboard_height: u32,
    pub rate_limit_default_retry_seconds: u64,
    pub strict_item_ids: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            logs_dir: PathBuf::from("logs"),
            gemini_api_key: String::new(),
            gemini_model: "gemini-flash-latest".to_string(),
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_temperature: 0.7,
            gemini_top_k: 40,
            gemini_top_p: 0.95,
            gemini_max_output_tokens: 2048,
            gemini_safety_settings: SafetyProfile::Standard,
            model_timeout_seconds: 90,
            image_fetch_timeout_seconds: 10,
            image_generation_base_url: "https://image.pollinations.ai/prompt".to_string(),
            lookbook_width: 1024,
            lookbook_height: 1024,
            lookbook_seed_max: 1000,
            describe_delay_ms: 1000,
            moodboard_width: 800,
            moodboard_height: 1000,
            rate_limit_default_retry_seconds: 60,
            strict_item_ids: true,
        }
    }
}

fn parse_bool(name: &str, value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        "" => default,
        _ => {
            warn!(
                "Unknown {} value '{}'; defaulting to {}.",
                name, value, default
            );
            default
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|value| parse_bool(name, &value, default))
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<i32>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn normalize_safety_settings(value: &str, default: SafetyProfile) -> SafetyProfile {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return default;
    }

    match trimmed.to_lowercase().as_str() {
        "permissive" | "off" | "none" => SafetyProfile::Permissive,
        "standard" => SafetyProfile::Standard,
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to standard.",
                value
            );
            SafetyProfile::Standard
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Config::default();

        let gemini_api_key = env_string("GEMINI_API_KEY", "");
        if gemini_api_key.trim().is_empty() {
            return Err(anyhow!("GEMINI_API_KEY is required"));
        }

        Ok(Config {
            log_level: env_string("LOG_LEVEL", &defaults.log_level).to_lowercase(),
            logs_dir: env::var("LOGS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.logs_dir),
            gemini_api_key: gemini_api_key.trim().to_string(),
            gemini_model: env_string("GEMINI_MODEL", &defaults.gemini_model),
            gemini_base_url: env_string("GEMINI_BASE_URL", &defaults.gemini_base_url),
            gemini_temperature: env_f32("GEMINI_TEMPERATURE", defaults.gemini_temperature),
            gemini_top_k: env_i32("GEMINI_TOP_K", defaults.gemini_top_k),
            gemini_top_p: env_f32("GEMINI_TOP_P", defaults.gemini_top_p),
            gemini_max_output_tokens: env_i32(
                "GEMINI_MAX_OUTPUT_TOKENS",
                defaults.gemini_max_output_tokens,
            ),
            gemini_safety_settings: normalize_safety_settings(
                &env_string("GEMINI_SAFETY_SETTINGS", ""),
                defaults.gemini_safety_settings,
            ),
            model_timeout_seconds: env_u64("MODEL_TIMEOUT_SECONDS", defaults.model_timeout_seconds)
                .max(1),
            image_fetch_timeout_seconds: env_u64(
                "IMAGE_FETCH_TIMEOUT_SECONDS",
                defaults.image_fetch_timeout_seconds,
            )
            .max(1),
            image_generation_base_url: env_string(
                "IMAGE_GENERATION_BASE_URL",
                &defaults.image_generation_base_url,
            ),
            lookbook_width: env_u32("LOOKBOOK_WIDTH", defaults.lookbook_width),
            lookbook_height: env_u32("LOOKBOOK_HEIGHT", defaults.lookbook_height),
            lookbook_seed_max: env_u32("LOOKBOOK_SEED_MAX", defaults.lookbook_seed_max).max(1),
            describe_delay_ms: env_u64("DESCRIBE_DELAY_MS", defaults.describe_delay_ms),
            moodboard_width: env_u32("MOODBOARD_WIDTH", defaults.moodboard_width),
            moodboard_height: env_u32("MOODBOARD_HEIGHT", defaults.moodboard_height),
            rate_limit_default_retry_seconds: env_u64(
                "RATE_LIMIT_DEFAULT_RETRY_SECONDS",
                defaults.rate_limit_default_retry_seconds,
            ),
            strict_item_ids: env_bool("STRICT_ITEM_IDS", defaults.strict_item_ids),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_settings_accept_aliases() {
        assert_eq!(
            normalize_safety_settings("OFF", SafetyProfile::Standard),
            SafetyProfile::Permissive
        );
        assert_eq!(
            normalize_safety_settings(" standard ", SafetyProfile::Permissive),
            SafetyProfile::Standard
        );
        assert_eq!(
            normalize_safety_settings("", SafetyProfile::Permissive),
            SafetyProfile::Permissive
        );
        assert_eq!(
            normalize_safety_settings("strictest", SafetyProfile::Permissive),
            SafetyProfile::Standard
        );
    }

    #[test]
    fn numeric_helpers_fall_back_on_garbage() {
        env::set_var("WARDROBE_STYLIST_TEST_U64", "not-a-number");
        assert_eq!(env_u64("WARDROBE_STYLIST_TEST_U64", 42), 42);
        env::set_var("WARDROBE_STYLIST_TEST_U32", " 640 ");
        assert_eq!(env_u32("WARDROBE_STYLIST_TEST_U32", 1), 640);
        assert!(!env_bool("WARDROBE_STYLIST_TEST_MISSING_BOOL", false));
    }

    #[test]
    fn boolean_flags_accept_common_spellings() {
        assert!(parse_bool("STRICT_ITEM_IDS", "1", false));
        assert!(parse_bool("STRICT_ITEM_IDS", " Yes ", false));
        assert!(!parse_bool("STRICT_ITEM_IDS", "off", true));
        assert!(!parse_bool("STRICT_ITEM_IDS", "FALSE", true));
        assert!(parse_bool("STRICT_ITEM_IDS", "maybe", true));
        assert!(!parse_bool("STRICT_ITEM_IDS", "", false));
    }

    // Only test that touches these variables.
    #[test]
    fn load_requires_api_key_and_falls_back_on_garbage() {
        env::set_var("GEMINI_API_KEY", "   ");
        let err = Config::load().unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY is required"));

        env::set_var("GEMINI_API_KEY", " test-key ");
        env::set_var("MOODBOARD_WIDTH", "640");
        env::set_var("LOOKBOOK_SEED_MAX", "lots");
        env::set_var("STRICT_ITEM_IDS", "0");
        let config = Config::load().unwrap();
        assert_eq!(config.gemini_api_key, "test-key");
        assert_eq!(config.moodboard_width, 640);
        assert_eq!(config.lookbook_seed_max, 1000);
        assert!(!config.strict_item_ids);

        for name in [
            "GEMINI_API_KEY",
            "MOODBOARD_WIDTH",
            "LOOKBOOK_SEED_MAX",
            "STRICT_ITEM_IDS",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn defaults_cover_pipeline_constants() {
        let config = Config::default();
        assert_eq!(config.image_fetch_timeout_seconds, 10);
        assert_eq!((config.moodboard_width, config.moodboard_height), (800, 1000));
        assert_eq!((config.lookbook_width, config.lookbook_height), (1024, 1024));
        assert_eq!(config.rate_limit_default_retry_seconds, 60);
    }
}
