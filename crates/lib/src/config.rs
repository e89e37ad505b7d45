//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.parla/config.json`) and environment.
//! Every field has a default, so an empty `{}` file (or no file at all) is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings (health endpoint and Telegram webhook).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (e.g. Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Language pair, backend selection and per-call timeouts.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Provider endpoints and credentials.
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 10000). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1"). Overridden by BIND env; "0.0.0.0" when PORT or
    /// WEBHOOK_HOST come from the environment and BIND is unset.
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    10000
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Per-channel config (e.g. Telegram bot token).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN (or BOT_TOKEN) env when set.
    pub bot_token: Option<String>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
}

/// Which translation provider backs the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslatorBackend {
    /// Google Translate public endpoint (translation + romanization).
    #[default]
    Google,
    /// OpenAI-compatible chat completions (OpenAI, OpenRouter, ...).
    Openai,
}

/// Which text-to-speech provider backs the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesizerBackend {
    /// Google Translate TTS endpoint (MP3).
    #[default]
    Google,
    /// OpenAI audio/speech.
    Openai,
    /// Audio disabled; only text replies are sent.
    None,
}

/// Conversion pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    #[serde(default = "default_source_language")]
    pub source_language: String,

    #[serde(default = "default_target_language")]
    pub target_language: String,

    #[serde(default)]
    pub translator_backend: TranslatorBackend,

    #[serde(default)]
    pub synthesizer_backend: SynthesizerBackend,

    /// Upper bound for one translation call, in milliseconds.
    #[serde(default = "default_per_call_timeout_ms")]
    pub per_call_timeout_ms: u64,

    /// Upper bound for one synthesis call. Defaults to perCallTimeoutMs + 3000.
    #[serde(default)]
    pub synthesis_timeout_ms: Option<u64>,

    /// Directory for generated audio (default: system temp dir + "parla").
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_language() -> String {
    "th".to_string()
}

fn default_per_call_timeout_ms() -> u64 {
    5000
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            target_language: default_target_language(),
            translator_backend: TranslatorBackend::default(),
            synthesizer_backend: SynthesizerBackend::default(),
            per_call_timeout_ms: default_per_call_timeout_ms(),
            synthesis_timeout_ms: None,
            scratch_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn translate_timeout(&self) -> Duration {
        Duration::from_millis(self.per_call_timeout_ms)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_millis(
            self.synthesis_timeout_ms
                .unwrap_or(self.per_call_timeout_ms.saturating_add(3000)),
        )
    }
}

/// Provider endpoints and credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersConfig {
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
}

/// Google Translate endpoints. Base URLs are overridable for proxies and tests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleConfig {
    /// Default "https://translate.googleapis.com".
    pub translate_base_url: Option<String>,
    /// Default "https://translate.google.com".
    pub tts_base_url: Option<String>,
}

/// OpenAI-compatible API settings. Point baseUrl at OpenRouter (or another compatible server) to use it instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiConfig {
    /// API key. Overridden by OPENAI_API_KEY env.
    pub api_key: Option<String>,
    /// Default "https://api.openai.com/v1".
    pub base_url: Option<String>,
    /// Chat model used for translation (default "gpt-4o-mini").
    pub model: Option<String>,
    /// Speech model (default "tts-1").
    pub tts_model: Option<String>,
    /// Speech voice (default "alloy").
    pub voice: Option<String>,
}

/// Read an env var, trimmed; None when unset or blank.
fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN, then BOT_TOKEN, override config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    env_non_empty("TELEGRAM_BOT_TOKEN")
        .or_else(|| env_non_empty("BOT_TOKEN"))
        .or_else(|| trimmed(config.channels.telegram.bot_token.as_ref()))
}

/// Resolve the webhook URL: config wins; otherwise derive `{WEBHOOK_HOST}/telegram/webhook` from env.
pub fn resolve_webhook_url(config: &Config) -> Option<String> {
    trimmed(config.channels.telegram.webhook_url.as_ref()).or_else(|| {
        env_non_empty("WEBHOOK_HOST")
            .map(|host| format!("{}/telegram/webhook", host.trim_end_matches('/')))
    })
}

/// Resolve the OpenAI API key: env OPENAI_API_KEY overrides config.
pub fn resolve_openai_api_key(config: &Config) -> Option<String> {
    env_non_empty("OPENAI_API_KEY").or_else(|| trimmed(config.providers.openai.api_key.as_ref()))
}

/// Resolve the listen port: env PORT overrides config (hosting platforms inject it).
pub fn resolve_port(config: &Config) -> u16 {
    match env_non_empty("PORT") {
        Some(p) => match p.parse() {
            Ok(port) => port,
            Err(_) => {
                log::warn!("ignoring invalid PORT value {:?}", p);
                config.gateway.port
            }
        },
        None => config.gateway.port,
    }
}

/// Resolve the listen address: env BIND wins; a hosted deployment (PORT or WEBHOOK_HOST set)
/// listens on all interfaces; otherwise config.
pub fn resolve_bind(config: &Config) -> String {
    resolve_bind_with(config, env_non_empty)
}

fn resolve_bind_with(config: &Config, env: impl Fn(&str) -> Option<String>) -> String {
    if let Some(bind) = env("BIND") {
        return bind;
    }
    if env("PORT").is_some() || env("WEBHOOK_HOST").is_some() {
        return "0.0.0.0".to_string();
    }
    config.gateway.bind.trim().to_string()
}

/// Resolve the scratch directory for generated audio.
pub fn resolve_scratch_dir(config: &Config) -> PathBuf {
    config
        .pipeline
        .scratch_dir
        .clone()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::env::temp_dir().join("parla"))
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PARLA_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".parla").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, else the default path (or PARLA_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 10000);
        assert_eq!(config.gateway.bind, "127.0.0.1");
        assert_eq!(config.pipeline.source_language, "en");
        assert_eq!(config.pipeline.target_language, "th");
        assert_eq!(config.pipeline.translator_backend, TranslatorBackend::Google);
        assert_eq!(config.pipeline.synthesizer_backend, SynthesizerBackend::Google);
        assert_eq!(config.pipeline.translate_timeout(), Duration::from_millis(5000));
        assert_eq!(config.pipeline.synthesis_timeout(), Duration::from_millis(8000));
    }

    #[test]
    fn empty_object_parses_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.pipeline.per_call_timeout_ms, 5000);
        assert!(config.channels.telegram.bot_token.is_none());
    }

    #[test]
    fn parses_camel_case_pipeline_fields() {
        let json = r#"{
            "pipeline": {
                "sourceLanguage": "de",
                "targetLanguage": "ja",
                "translatorBackend": "openai",
                "synthesizerBackend": "none",
                "perCallTimeoutMs": 2000,
                "synthesisTimeoutMs": 2500
            },
            "providers": { "openai": { "model": "gpt-4o", "baseUrl": "https://openrouter.ai/api/v1" } }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.pipeline.source_language, "de");
        assert_eq!(config.pipeline.target_language, "ja");
        assert_eq!(config.pipeline.translator_backend, TranslatorBackend::Openai);
        assert_eq!(config.pipeline.synthesizer_backend, SynthesizerBackend::None);
        assert_eq!(config.pipeline.translate_timeout(), Duration::from_millis(2000));
        assert_eq!(config.pipeline.synthesis_timeout(), Duration::from_millis(2500));
        assert_eq!(config.providers.openai.model.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn scratch_dir_override() {
        let mut config = Config::default();
        config.pipeline.scratch_dir = Some(PathBuf::from("/var/tmp/parla-audio"));
        assert_eq!(
            resolve_scratch_dir(&config),
            PathBuf::from("/var/tmp/parla-audio")
        );
    }

    #[test]
    fn configured_webhook_url_is_trimmed() {
        let mut config = Config::default();
        config.channels.telegram.webhook_url = Some("  https://bot.example.com/telegram/webhook ".into());
        assert_eq!(
            resolve_webhook_url(&config).as_deref(),
            Some("https://bot.example.com/telegram/webhook")
        );
    }

    #[test]
    fn huge_per_call_timeout_saturates() {
        let config: Config =
            serde_json::from_str(r#"{"pipeline":{"perCallTimeoutMs":18446744073709551615}}"#).unwrap();
        assert_eq!(config.pipeline.synthesis_timeout(), Duration::from_millis(u64::MAX));
        assert!(config.pipeline.synthesis_timeout() >= config.pipeline.translate_timeout());
    }

    fn env_from(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn bind_resolution() {
        let config = Config::default();
        assert_eq!(resolve_bind_with(&config, env_from(&[])), "127.0.0.1");
        assert_eq!(
            resolve_bind_with(
                &config,
                env_from(&[("PORT", "10000"), ("WEBHOOK_HOST", "https://x"), ("BOT_TOKEN", "t")])
            ),
            "0.0.0.0"
        );
        assert_eq!(resolve_bind_with(&config, env_from(&[("WEBHOOK_HOST", "https://x")])), "0.0.0.0");
        assert_eq!(
            resolve_bind_with(&config, env_from(&[("PORT", "8080"), ("BIND", "10.0.0.5")])),
            "10.0.0.5"
        );

        let mut config = Config::default();
        config.gateway.bind = "::1".into();
        assert_eq!(resolve_bind_with(&config, env_from(&[])), "::1");
    }

    #[test]
    fn load_config_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("parla-missing-{}.json", uuid::Uuid::new_v4()));
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.gateway.port, 10000);
    }
}
