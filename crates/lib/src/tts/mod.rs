//! Synthesizer adapters: target-language text in, an audio file on scratch storage out.
//!
//! Synthesis is an enrichment: blank text yields no artifact rather than an error.

mod google;
mod openai;

pub use google::GoogleSynthesizer;
pub use openai::OpenAiSynthesizer;

use crate::config::{self, Config, SynthesizerBackend};
use crate::scratch::{AudioArtifact, InvocationKey, ScratchDir};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("synthesis request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("synthesis api error: {status} {message}")]
    Api { status: u16, message: String },
    #[error("synthesis returned no audio")]
    EmptyAudio,
    #[error("writing audio: {0}")]
    Io(#[from] std::io::Error),
    #[error("synthesis timed out after {0:?}")]
    Timeout(Duration),
}

/// A text-to-speech provider.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Short provider name for logs (e.g. "google").
    fn name(&self) -> &'static str;

    /// Speak `text` into a new artifact keyed by `key`. Returns `Ok(None)` for blank text.
    async fn synthesize(
        &self,
        text: &str,
        key: &InvocationKey,
    ) -> Result<Option<AudioArtifact>, SynthesisError>;
}

/// Synthesizer used when audio is disabled.
pub struct NoopSynthesizer;

#[async_trait]
impl Synthesizer for NoopSynthesizer {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn synthesize(
        &self,
        _text: &str,
        _key: &InvocationKey,
    ) -> Result<Option<AudioArtifact>, SynthesisError> {
        Ok(None)
    }
}

/// Build the configured synthesizer, writing into `scratch`.
pub fn build_synthesizer(config: &Config, scratch: ScratchDir) -> anyhow::Result<Arc<dyn Synthesizer>> {
    let language = config.pipeline.target_language.trim().to_string();
    let synthesizer: Arc<dyn Synthesizer> = match config.pipeline.synthesizer_backend {
        SynthesizerBackend::Google => Arc::new(GoogleSynthesizer::new(
            config.providers.google.tts_base_url.clone(),
            language,
            scratch,
        )),
        SynthesizerBackend::Openai => {
            let api_key = config::resolve_openai_api_key(config).ok_or_else(|| {
                anyhow::anyhow!(
                    "synthesizerBackend is \"openai\" but no API key is set (providers.openai.apiKey or OPENAI_API_KEY)"
                )
            })?;
            let openai = &config.providers.openai;
            Arc::new(OpenAiSynthesizer::new(
                openai.base_url.clone(),
                api_key,
                openai.tts_model.clone(),
                openai.voice.clone(),
                scratch,
            ))
        }
        SynthesizerBackend::None => Arc::new(NoopSynthesizer),
    };
    log::info!("synthesizer backend: {}", synthesizer.name());
    Ok(synthesizer)
}

/// Fail with the provider's status and body when the response is not a success.
async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, SynthesisError> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(SynthesisError::Api {
        status: status.as_u16(),
        message: body,
    })
}

/// Stream a response body to the end of `file`. Returns the number of bytes written.
async fn append_body(res: reqwest::Response, file: &mut tokio::fs::File) -> Result<u64, SynthesisError> {
    let mut stream = res.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_never_produces_audio() {
        let s = NoopSynthesizer;
        let out = s.synthesize("สวัสดี", &InvocationKey::new("1")).await.unwrap();
        assert!(out.is_none());
    }

    #[test]
    fn backend_none_builds_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.pipeline.synthesizer_backend = SynthesizerBackend::None;
        let s = build_synthesizer(&config, ScratchDir::new(dir.path()).unwrap()).unwrap();
        assert_eq!(s.name(), "none");
    }
}
