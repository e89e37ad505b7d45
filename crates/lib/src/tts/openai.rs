//! OpenAI text-to-speech (`POST /audio/speech`), MP3 output.

use super::{append_body, check_status, SynthesisError, Synthesizer};
use crate::scratch::{AudioArtifact, InvocationKey, ScratchDir};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";

pub struct OpenAiSynthesizer {
    base_url: String,
    api_key: String,
    model: String,
    voice: String,
    scratch: ScratchDir,
    client: reqwest::Client,
}

impl OpenAiSynthesizer {
    pub fn new(
        base_url: Option<String>,
        api_key: String,
        model: Option<String>,
        voice: Option<String>,
        scratch: ScratchDir,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            voice: voice.unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            scratch,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Synthesizer for OpenAiSynthesizer {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn synthesize(
        &self,
        text: &str,
        key: &InvocationKey,
    ) -> Result<Option<AudioArtifact>, SynthesisError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": "mp3",
        });
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let res = check_status(res).await?;

        let (mut file, artifact) = self.scratch.create(key, "mp3", text)?;
        let written = append_body(res, &mut file).await?;
        file.flush().await?;
        if written == 0 {
            return Err(SynthesisError::EmptyAudio);
        }
        log::debug!(
            "openai tts: wrote {} bytes (voice={}, model={})",
            written,
            self.voice,
            self.model
        );
        Ok(Some(artifact))
    }
}
