mod defaults;


use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::DoppelError;
use defaults::*;

/// Top-level Doppel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub doppel: GeneralConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub reply: ReplyConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

/// General agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// The tracked target and the latch policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Phone number of the tracked human. `TARGET_PHONE` env overrides.
    #[serde(default)]
    pub phone: String,
    /// Path to the exported contact book (durable identity record).
    #[serde(default = "default_contacts_path")]
    pub contacts_path: String,
    /// Prefix on a self-authored message that forces a latch + instant reply.
    #[serde(default = "default_trigger_prefix")]
    pub trigger_prefix: String,
    /// Bind an unknown alias-kind chat as the target's alias on first
    /// contact. Conservative default: off — latch manually instead.
    #[serde(default)]
    pub auto_link_alias: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            phone: String::new(),
            contacts_path: default_contacts_path(),
            trigger_prefix: default_trigger_prefix(),
            auto_link_alias: false,
        }
    }
}

/// Reply generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyConfig {
    /// Seconds between the last qualifying turn and generation firing.
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    /// Upper bound on one backend call.
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    /// How many trailing turns the generator sees.
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
    /// Last-turn word count above which the reply may run longer.
    #[serde(default = "default_brief_word_threshold")]
    pub brief_word_threshold: usize,
    /// Conversation goal. Empty = use the persona's goal section.
    #[serde(default)]
    pub goal: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            generation_timeout_secs: default_generation_timeout_secs(),
            max_context_turns: default_max_context_turns(),
            brief_word_threshold: default_brief_word_threshold(),
            goal: String::new(),
        }
    }
}

/// Channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    pub whatsapp: Option<WhatsAppConfig>,
}

/// WhatsApp channel config.
///
/// Session data is stored at `{data_dir}/whatsapp_session/session.db`.
/// Pairing is done by scanning a QR code (like WhatsApp Web).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_provider")]
    pub default: String,
    pub ollama: Option<OllamaConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default: default_provider(),
            ollama: Some(OllamaConfig::default()),
        }
    }
}

/// Ollama backend config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist. `TARGET_PHONE` in the
/// environment overrides the configured target phone either way.
pub fn load(path: &str) -> Result<Config, DoppelError> {
    let path = Path::new(path);
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DoppelError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| DoppelError::Config(format!("failed to parse config: {}", e)))?
    } else {
        tracing::info!("Config file not found at {}, using defaults", path.display());
        Config::default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Apply environment overrides on top of a parsed config.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(phone) = std::env::var("TARGET_PHONE") {
        if !phone.trim().is_empty() {
            config.target.phone = phone;
        }
    }
}
