use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::prompts::default_temperature;
use crate::protocol::ActionKind;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

const DEFAULT_MAX_TOKENS: u32 = 500;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_FOLLOWUP_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_PANEL_HEIGHT_FRACTION: f64 = 0.45;
const DEFAULT_MAX_PANEL_HEIGHT_PX: f64 = 420.0;
const DEFAULT_SHARED_HEIGHT_RATIO: f64 = 0.5;

/// On-disk representation. Every field is optional; missing values fall back
/// to the defaults in [`Config`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConfigToml {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
    pub request_timeout_ms: Option<u64>,
    pub followup_poll_interval_ms: Option<u64>,
    pub panel_height_fraction: Option<f64>,
    pub max_panel_height_px: Option<f64>,
    /// Fraction of the key surface web content keeps when sharing space
    /// with the keyboard.
    pub shared_height_ratio: Option<f64>,
    #[serde(default)]
    pub temperatures: HashMap<ActionKind, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub request_timeout: Duration,
    pub followup_poll_interval: Duration,
    pub panel_height_fraction: f64,
    pub max_panel_height_px: f64,
    pub shared_height_ratio: f64,
    temperature_overrides: HashMap<ActionKind, f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            followup_poll_interval: Duration::from_millis(DEFAULT_FOLLOWUP_POLL_INTERVAL_MS),
            panel_height_fraction: DEFAULT_PANEL_HEIGHT_FRACTION,
            max_panel_height_px: DEFAULT_MAX_PANEL_HEIGHT_PX,
            shared_height_ratio: DEFAULT_SHARED_HEIGHT_RATIO,
            temperature_overrides: HashMap::new(),
        }
    }
}

impl Config {
    pub fn load_from_base_config(cfg: ConfigToml) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let panel_height_fraction = cfg
            .panel_height_fraction
            .unwrap_or(defaults.panel_height_fraction);
        check_fraction("panel_height_fraction", panel_height_fraction)?;

        let shared_height_ratio = cfg
            .shared_height_ratio
            .unwrap_or(defaults.shared_height_ratio);
        check_fraction("shared_height_ratio", shared_height_ratio)?;

        let max_panel_height_px = cfg
            .max_panel_height_px
            .unwrap_or(defaults.max_panel_height_px);
        if max_panel_height_px.is_nan() || max_panel_height_px <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "max_panel_height_px",
                reason: format!("must be positive, got {max_panel_height_px}"),
            });
        }

        let followup_poll_interval_ms = cfg
            .followup_poll_interval_ms
            .unwrap_or(DEFAULT_FOLLOWUP_POLL_INTERVAL_MS);
        if followup_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "followup_poll_interval_ms",
                reason: "must be positive".to_string(),
            });
        }

        for (kind, temperature) in &cfg.temperatures {
            if !(0.0..=2.0).contains(temperature) {
                return Err(ConfigError::Invalid {
                    key: "temperatures",
                    reason: format!("{kind:?} temperature {temperature} outside [0, 2]"),
                });
            }
        }

        let api_key = cfg
            .api_key
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(API_KEY_ENV_VAR).ok())
            .filter(|key| !key.trim().is_empty());

        Ok(Self {
            model: cfg.model.unwrap_or(defaults.model),
            base_url: cfg.base_url.unwrap_or(defaults.base_url),
            api_key,
            max_tokens: cfg.max_tokens.unwrap_or(defaults.max_tokens),
            request_timeout: cfg
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            followup_poll_interval: Duration::from_millis(followup_poll_interval_ms),
            panel_height_fraction,
            max_panel_height_px,
            shared_height_ratio,
            temperature_overrides: cfg.temperatures,
        })
    }

    /// Temperature for a kind: the configured override, else the kind's default.
    pub fn temperature_for(&self, kind: ActionKind) -> f64 {
        self.temperature_overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| default_temperature(kind))
    }
}

fn check_fraction(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: format!("must lie in (0, 1], got {value}"),
        })
    }
}

pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    let cfg: ConfigToml = toml::from_str(contents)?;
    Config::load_from_base_config(cfg)
}

/// Loads `path` if it exists; a missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_config(&contents),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Config::load_from_base_config(ConfigToml::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
