//! Translator adapters: source text in, target-language text (and optional romanization) out.
//!
//! One trait, several providers. The backend is chosen from `pipeline.translatorBackend` at startup
//! and handed to the pipeline as `Arc<dyn Translator>`.

mod google;
mod openai;

pub use google::GoogleTranslator;
pub use openai::OpenAiTranslator;

use crate::config::{self, Config, TranslatorBackend};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Output of one translation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationResult {
    /// Target-language text. May be empty (empty input or provider returned nothing), never absent.
    pub target_text: String,
    /// Phonetic romanization of the target text, when the provider offers one.
    pub transliteration: Option<String>,
    /// The source text as sent to the provider.
    pub source_text: String,
}

impl TranslationResult {
    /// Result for blank input; no provider call is made for it.
    pub fn empty(source_text: &str) -> Self {
        Self {
            target_text: String::new(),
            transliteration: None,
            source_text: source_text.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("translation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("translation api error: {status} {message}")]
    Api { status: u16, message: String },
    #[error("unexpected translation response: {0}")]
    Malformed(String),
    #[error("translation timed out after {0:?}")]
    Timeout(Duration),
}

/// Source and target language codes (ISO 639-1, e.g. "en" -> "th").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePair {
    pub source: String,
    pub target: String,
}

impl LanguagePair {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.pipeline.source_language.trim(),
            config.pipeline.target_language.trim(),
        )
    }
}

/// A translation provider.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Short provider name for logs (e.g. "google").
    fn name(&self) -> &'static str;

    /// Translate `source_text`. Blank input yields an empty `target_text`, not an error.
    async fn translate(&self, source_text: &str) -> Result<TranslationResult, TranslationError>;
}

/// Build the configured translator. Fails when the backend needs credentials that are missing.
pub fn build_translator(config: &Config) -> anyhow::Result<Arc<dyn Translator>> {
    let languages = LanguagePair::from_config(config);
    let translator: Arc<dyn Translator> = match config.pipeline.translator_backend {
        TranslatorBackend::Google => Arc::new(GoogleTranslator::new(
            config.providers.google.translate_base_url.clone(),
            languages,
        )),
        TranslatorBackend::Openai => {
            let api_key = config::resolve_openai_api_key(config).ok_or_else(|| {
                anyhow::anyhow!(
                    "translatorBackend is \"openai\" but no API key is set (providers.openai.apiKey or OPENAI_API_KEY)"
                )
            })?;
            let openai = &config.providers.openai;
            Arc::new(OpenAiTranslator::new(
                openai.base_url.clone(),
                api_key,
                openai.model.clone(),
                languages,
            ))
        }
    };
    log::info!("translator backend: {}", translator.name());
    Ok(translator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_echoes_source() {
        let r = TranslationResult::empty("   ");
        assert_eq!(r.target_text, "");
        assert_eq!(r.source_text, "   ");
        assert!(r.transliteration.is_none());
    }

    #[test]
    fn default_config_builds_google() {
        let translator = build_translator(&Config::default()).unwrap();
        assert_eq!(translator.name(), "google");
    }

    #[test]
    fn openai_backend_with_configured_key_builds() {
        let mut config = Config::default();
        config.pipeline.translator_backend = TranslatorBackend::Openai;
        config.providers.openai.api_key = Some("sk-test".into());
        let translator = build_translator(&config).unwrap();
        assert_eq!(translator.name(), "openai");
    }
}
