use anyhow::{anyhow, Context};
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_AI_URL: &str = "http://localhost:11434";
const DEFAULT_AI_MODEL: &str = "mistral";
const DEFAULT_AI_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_AI_URL.to_string(),
            model: DEFAULT_AI_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_AI_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub workspace: Option<PathBuf>,
    pub log_filter: String,
    pub ai: AiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            log_filter: "info".to_string(),
            ai: AiConfig::default(),
        }
    }
}

impl Config {
    /// Reads `CLASSBOOK_*` variables. Call after `dotenvy::dotenv()` so a
    /// local `.env` can supply them.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Config::default();

        let enabled = match get("CLASSBOOK_AI_ENABLED") {
            Some(v) => parse_bool(&v).ok_or_else(|| {
                anyhow!("CLASSBOOK_AI_ENABLED must be true/false, got {:?}", v)
            })?,
            None => defaults.ai.enabled,
        };
        let timeout = match get("CLASSBOOK_AI_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.parse::<u64>()
                    .with_context(|| format!("CLASSBOOK_AI_TIMEOUT_SECS is not a number: {v}"))?,
            ),
            None => defaults.ai.timeout,
        };

        Ok(Self {
            workspace: get("CLASSBOOK_WORKSPACE").map(PathBuf::from),
            log_filter: get("CLASSBOOK_LOG").unwrap_or(defaults.log_filter),
            ai: AiConfig {
                enabled,
                base_url: get("CLASSBOOK_AI_URL")
                    .map(|u| u.trim_end_matches('/').to_string())
                    .unwrap_or(defaults.ai.base_url),
                model: get("CLASSBOOK_AI_MODEL").unwrap_or(defaults.ai.model),
                timeout,
            },
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
