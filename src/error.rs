use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub const QUOTA_EXCEEDED_MESSAGE: &str = "Gemini API quota exceeded. Please try again later.";

static RETRY_IN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)retry in ([\d.]+)s").expect("valid retry regex"));
static RATE_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\brate\b|rate[-_ ]?limit").expect("valid rate regex"));

/// Failures at the model-invocation boundary.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Gemini rate limit reached (retry after {retry_after_secs}s): {message}")]
    RateLimited {
        retry_after_secs: u64,
        message: String,
    },
    #[error("Gemini returned an empty response")]
    EmptyResponse,
    #[error("Gemini request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Gemini request failed: {0}")]
    Transport(String),
    #[error("Gemini response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum StylistError {
    #[error("Invalid image format: {0}")]
    InvalidImage(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("{reason}. Raw response: {snippet}")]
    MalformedOutput { reason: String, snippet: String },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StylistError {
    pub fn malformed(reason: impl Into<String>, raw: &str) -> Self {
        StylistError::MalformedOutput {
            reason: reason.into(),
            snippet: crate::utils::text::truncate_for_log(raw.trim(), 200),
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self {
            StylistError::Model(ModelError::RateLimited {
                retry_after_secs, ..
            }) => Some(*retry_after_secs),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.retry_after().is_some()
    }

    pub fn status_code(&self) -> u16 {
        match self {
            StylistError::InvalidImage(_) => 400,
            StylistError::Model(ModelError::RateLimited { .. }) => 429,
            _ => 500,
        }
    }
}

/// Parses the `retry in N s` hint Gemini embeds in quota errors, truncating
/// fractional seconds.
pub fn parse_retry_after(text: &str) -> Option<u64> {
    let captures = RETRY_IN_RE.captures(text)?;
    let seconds = captures.get(1)?.as_str().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(seconds.trunc() as u64)
}

pub fn looks_rate_limited(text: &str) -> bool {
    text.contains("429") || text.to_lowercase().contains("quota") || RATE_WORD_RE.is_match(text)
}

/// Classifies an error message that did not come through [`ModelError`].
/// Returns the retry-after seconds when the text reads like a quota failure.
pub fn classify_error_text(text: &str, default_retry_secs: u64) -> Option<u64> {
    if !looks_rate_limited(text) {
        return None;
    }
    Some(parse_retry_after(text).unwrap_or(default_retry_secs))
}
