// 🍳 Recipe Request Builder
//
// Turns the checked items into one natural-language prompt and relays it to a text
// generation collaborator. The generated text is returned untouched.

pub mod gemini;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

pub use gemini::GeminiGenerator;

/// Default bound on a single generation call
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no recipe generator is configured (set GEMINI_API_KEY)")]
    NotConfigured,

    #[error("the recipe service did not answer within {0:?}")]
    Timeout(Duration),

    #[error("the recipe service rejected the credentials: {0}")]
    Auth(String),

    #[error("the recipe service quota is exhausted: {0}")]
    Quota(String),

    #[error("the recipe service returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("the recipe service returned an unreadable response: {0}")]
    Malformed(String),

    #[error("could not reach the recipe service: {0}")]
    Transport(String),
}

#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("check at least one item before asking for a recipe")]
    EmptySelection,

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

// ============================================================================
// SEASON
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }

    pub fn of(date: NaiveDate) -> Self {
        Season::from_month(date.month())
    }

    /// Korean season name used in the prompt
    pub fn label(&self) -> &'static str {
        match self {
            Season::Spring => "봄",
            Season::Summer => "여름",
            Season::Autumn => "가을",
            Season::Winter => "겨울",
        }
    }

    /// What kind of dish suits the season
    pub fn mood(&self) -> &'static str {
        match self {
            Season::Spring => "봄에 어울리는 상큼한 요리",
            Season::Summer => "여름에 어울리는 시원한 요리",
            Season::Autumn => "가을과 어울리는 든든한 요리",
            Season::Winter => "추운 겨울에 먹으면 좋을 따뜻한 요리",
        }
    }
}

// ============================================================================
// PROMPT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptStyle {
    /// Mention today's date and season
    #[default]
    Seasonal,

    /// Ingredients only
    Plain,
}

/// Seasonal prompt for the selected item names
pub fn build_prompt<S: AsRef<str>>(names: &[S], when: NaiveDate) -> Result<String, RecipeError> {
    build_prompt_with(names, when, PromptStyle::Seasonal)
}

pub fn build_prompt_with<S: AsRef<str>>(
    names: &[S],
    when: NaiveDate,
    style: PromptStyle,
) -> Result<String, RecipeError> {
    let names: Vec<&str> = names
        .iter()
        .map(|name| name.as_ref().trim())
        .filter(|name| !name.is_empty())
        .collect();

    if names.is_empty() {
        return Err(RecipeError::EmptySelection);
    }

    let ingredients = names.join(", ");

    let prompt = match style {
        PromptStyle::Seasonal => {
            let season = Season::of(when);
            format!(
                "오늘 날짜는 {today}입니다. 한국은 지금 {season}입니다.\n\
                 {mood}가 필요한 시기입니다.\n\n\
                 선택된 재료들({ingredients})을 주재료로 하여, {season} 날씨에 가족들이 \
                 가장 맛있게 먹을 수 있는 요리와 레시피를 한국어로 알려줘.",
                today = when.format("%Y년 %m월 %d일"),
                season = season.label(),
                mood = season.mood(),
                ingredients = ingredients,
            )
        }
        PromptStyle::Plain => format!(
            "선택된 재료들({})을 주재료로 하여, 가족들이 가장 맛있게 먹을 수 있는 \
             요리와 레시피를 한국어로 알려줘.",
            ingredients
        ),
    };

    Ok(prompt)
}

// ============================================================================
// GENERATION
// ============================================================================

/// Text generation collaborator: one prompt in, one text out
#[async_trait]
pub trait Generator: Send + Sync {
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Forward `prompt` to the generator, bounded by `timeout`
#[instrument(skip(generator, prompt), fields(model = %generator.model(), prompt_len = prompt.len()))]
pub async fn request_recipe(
    generator: &dyn Generator,
    prompt: &str,
    timeout: Duration,
) -> Result<String, RecipeError> {
    match tokio::time::timeout(timeout, generator.generate(prompt)).await {
        Ok(Ok(text)) => {
            info!(chars = text.chars().count(), "Recipe generated");
            Ok(text)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Recipe generation failed");
            Err(e.into())
        }
        Err(_) => {
            warn!(?timeout, "Recipe generation timed out");
            Err(GenerationError::Timeout(timeout).into())
        }
    }
}

/// Build the prompt and request a recipe. Nothing is sent when the selection is empty.
pub async fn suggest<S: AsRef<str>>(
    generator: Option<&Arc<dyn Generator>>,
    names: &[S],
    when: NaiveDate,
    timeout: Duration,
) -> Result<String, RecipeError> {
    let prompt = build_prompt(names, when)?;
    let generator = generator.ok_or(GenerationError::NotConfigured)?;
    request_recipe(generator.as_ref(), &prompt, timeout).await
}

// ============================================================================
// TESTS
// ============================================================================
