use anyhow::{Context, Result};
use std::env;
use std::time::Duration;
use url::Url;

use crate::domain::estimate::ShingleType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Credentials and endpoint for the generative model service.
///
/// Holding one of these is what enables analysis; code that receives `None`
/// skips the model call instead of failing.
#[derive(Clone)]
pub struct GeminiCapability {
    pub api_key: String,
    pub model: String,
    pub base_url: Url,
}

impl std::fmt::Debug for GeminiCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiCapability")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl GeminiCapability {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: Url) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url,
        }
    }
}

/// Upper bounds for every network-bound step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub image_fetch: Duration,
    pub vision: Duration,
    pub narrative: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            image_fetch: Duration::from_secs(20),
            vision: Duration::from_secs(90),
            narrative: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,

    // Database
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Model service
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: Url,

    // Timeouts
    pub timeouts: Timeouts,

    // Estimating
    pub shingle_type: ShingleType,
}

impl Settings {
    /// Load `.env` (if present) and then read the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));

        // Database
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
        let database_max_connections = parse_var("DATABASE_MAX_CONNECTIONS").unwrap_or(10);

        // Model service. A missing key is not an error: analysis is skipped.
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let gemini_model =
            env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());
        let gemini_base_url = env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string());
        let gemini_base_url = Url::parse(&gemini_base_url).context("GEMINI_BASE_URL is not a valid URL")?;

        // Timeouts
        let defaults = Timeouts::default();
        let timeouts = Timeouts {
            image_fetch: parse_var("IMAGE_FETCH_TIMEOUT_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.image_fetch),
            vision: parse_var("VISION_TIMEOUT_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.vision),
            narrative: parse_var("NARRATIVE_TIMEOUT_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.narrative),
        };

        let shingle_type = env::var("SHINGLE_TYPE")
            .ok()
            .and_then(|s| ShingleType::parse(&s))
            .unwrap_or_default();

        Ok(Settings {
            env,
            database_url,
            database_max_connections,
            gemini_api_key,
            gemini_model,
            gemini_base_url,
            timeouts,
            shingle_type,
        })
    }

    /// The model capability, present only when an API key is configured.
    pub fn gemini_capability(&self) -> Option<GeminiCapability> {
        self.gemini_api_key.as_ref().map(|key| {
            GeminiCapability::new(key.clone(), self.gemini_model.clone(), self.gemini_base_url.clone())
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse().ok())
}
