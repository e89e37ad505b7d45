//! Conversion pipeline: one inbound text message in, a text reply and an optional audio clip out.
//!
//! Stages run strictly in order (`Received → Translating → Composing → Synthesizing →
//! Delivering → Done`). A translation failure ends the exchange with a fixed one-line message;
//! a synthesis failure only drops the audio. Text and audio delivery are independent, and the
//! audio file is released whatever happens to the sends.

use crate::channels::{ChannelHandle, InboundMessage};
use crate::compose::{compose, ComposedReply};
use crate::config::{self, Config, PipelineConfig};
use crate::scratch::{AudioArtifact, InvocationKey, ScratchDir};
use crate::translate::{build_translator, TranslationError, TranslationResult, Translator};
use crate::tts::{build_synthesizer, SynthesisError, Synthesizer};
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

/// The only error text a user ever sees.
pub const TRANSLATION_FAILED_MESSAGE: &str = "translation failed, try again";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Translating,
    Composing,
    Synthesizing,
    Delivering,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmptyInput,
    Translation,
    Synthesis,
    Delivery,
}

/// Result of converting one message (everything up to, not including, delivery).
#[derive(Debug)]
pub enum PipelineOutcome {
    /// `reply` is None only for blank input. `synthesis_failed` marks a recovered audio failure.
    Success {
        reply: Option<ComposedReply>,
        audio: Option<AudioArtifact>,
        synthesis_failed: bool,
    },
    /// Terminal failure; `message` is the fixed text to show the user.
    Failure {
        stage: Stage,
        kind: ErrorKind,
        message: &'static str,
    },
}

impl PipelineOutcome {
    fn no_op() -> Self {
        PipelineOutcome::Success {
            reply: None,
            audio: None,
            synthesis_failed: false,
        }
    }
}

/// What `handle` actually sent, and which stages went wrong.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub text_sent: bool,
    pub audio_sent: bool,
    pub failures: Vec<(Stage, ErrorKind)>,
}

/// Per-adapter call bounds.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub translate: Duration,
    pub synthesize: Duration,
}

impl Timeouts {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            translate: config.translate_timeout(),
            synthesize: config.synthesis_timeout(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Text to speak: the first non-empty line of the target text. Plain-text providers sometimes
/// bundle romanization or glosses on later lines; those are shown but not spoken.
pub fn speech_text(result: &TranslationResult) -> &str {
    result
        .target_text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}

/// The conversion pipeline. Holds its adapters; shares nothing mutable between invocations.
pub struct Pipeline {
    translator: Arc<dyn Translator>,
    synthesizer: Arc<dyn Synthesizer>,
    timeouts: Timeouts,
}

impl Pipeline {
    pub fn new(
        translator: Arc<dyn Translator>,
        synthesizer: Arc<dyn Synthesizer>,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            translator,
            synthesizer,
            timeouts,
        }
    }

    /// Build adapters from config (backend selection, credentials, scratch directory).
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let scratch_root = config::resolve_scratch_dir(config);
        let scratch = ScratchDir::new(&scratch_root)
            .with_context(|| format!("creating scratch directory {}", scratch_root.display()))?;
        log::info!("audio scratch directory: {}", scratch.root().display());
        let translator = build_translator(config)?;
        let synthesizer = build_synthesizer(config, scratch)?;
        Ok(Self::new(
            translator,
            synthesizer,
            Timeouts::from_config(&config.pipeline),
        ))
    }

    /// Translate, compose and synthesize. No messages are sent.
    pub async fn convert(&self, msg: &InboundMessage) -> PipelineOutcome {
        let text = msg.text.trim();
        if text.is_empty() {
            log::debug!("pipeline: blank message from {}, nothing to do", msg.conversation_id);
            return PipelineOutcome::no_op();
        }
        let key = InvocationKey::new(&msg.conversation_id);
        log::debug!("pipeline[{}]: {:?}", key.invocation_id, Stage::Translating);

        let result = match self.translate(text).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!(
                    "pipeline[{}]: {} translation failed: {}",
                    key.invocation_id,
                    self.translator.name(),
                    e
                );
                return PipelineOutcome::Failure {
                    stage: Stage::Translating,
                    kind: ErrorKind::Translation,
                    message: TRANSLATION_FAILED_MESSAGE,
                };
            }
        };

        log::debug!("pipeline[{}]: {:?}", key.invocation_id, Stage::Composing);
        let reply = compose(&result);

        let spoken = speech_text(&result);
        if spoken.is_empty() {
            log::info!("pipeline[{}]: empty translation, skipping synthesis", key.invocation_id);
            return PipelineOutcome::Success {
                reply: Some(reply),
                audio: None,
                synthesis_failed: false,
            };
        }

        log::debug!("pipeline[{}]: {:?}", key.invocation_id, Stage::Synthesizing);
        let (audio, synthesis_failed) = match self.synthesize(spoken, &key).await {
            Ok(audio) => (audio, false),
            Err(e) => {
                log::warn!(
                    "pipeline[{}]: {} synthesis failed, sending text only: {}",
                    key.invocation_id,
                    self.synthesizer.name(),
                    e
                );
                (None, true)
            }
        };
        PipelineOutcome::Success {
            reply: Some(reply),
            audio,
            synthesis_failed,
        }
    }

    /// Run one invocation end to end against `channel`: typing indicator, conversion, delivery, cleanup.
    pub async fn handle(&self, msg: &InboundMessage, channel: &dyn ChannelHandle) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        if msg.text.trim().is_empty() {
            return report;
        }
        if let Err(e) = channel.send_typing(&msg.conversation_id).await {
            log::debug!("pipeline: typing indicator failed: {}", e);
        }

        let conversation = msg.conversation_id.as_str();
        log::debug!("pipeline: {:?} message from {}", Stage::Received, conversation);
        match self.convert(msg).await {
            PipelineOutcome::Success {
                reply,
                audio,
                synthesis_failed,
            } => {
                if synthesis_failed {
                    report.failures.push((Stage::Synthesizing, ErrorKind::Synthesis));
                }
                if let Some(reply) = reply {
                    let sent = deliver_text(channel, conversation, &reply.display_text, &mut report).await;
                    report.text_sent = sent;
                }
                if let Some(artifact) = audio {
                    match channel
                        .send_audio(conversation, artifact.path(), artifact.title())
                        .await
                    {
                        Ok(()) => report.audio_sent = true,
                        Err(e) => {
                            log::warn!("pipeline: send_audio to {} failed: {}", conversation, e);
                            report.failures.push((Stage::Delivering, ErrorKind::Delivery));
                        }
                    }
                    if let Err(e) = artifact.release() {
                        log::warn!("pipeline: removing audio file failed: {}", e);
                    }
                }
            }
            PipelineOutcome::Failure { stage, kind, message } => {
                report.failures.push((stage, kind));
                let sent = deliver_text(channel, conversation, message, &mut report).await;
                report.text_sent = sent;
            }
        }
        log::debug!(
            "pipeline: {:?} for {} (text_sent={}, audio_sent={}, failures={:?})",
            Stage::Done,
            conversation,
            report.text_sent,
            report.audio_sent,
            report.failures
        );
        report
    }

    async fn translate(&self, text: &str) -> Result<TranslationResult, TranslationError> {
        tokio::time::timeout(self.timeouts.translate, self.translator.translate(text))
            .await
            .map_err(|_| TranslationError::Timeout(self.timeouts.translate))?
    }

    async fn synthesize(
        &self,
        text: &str,
        key: &InvocationKey,
    ) -> Result<Option<AudioArtifact>, SynthesisError> {
        tokio::time::timeout(self.timeouts.synthesize, self.synthesizer.synthesize(text, key))
            .await
            .map_err(|_| SynthesisError::Timeout(self.timeouts.synthesize))?
    }
}

async fn deliver_text(
    channel: &dyn ChannelHandle,
    conversation: &str,
    text: &str,
    report: &mut DeliveryReport,
) -> bool {
    match channel.send_message(conversation, text).await {
        Ok(()) => true,
        Err(e) => {
            log::warn!("pipeline: send_message to {} failed: {}", conversation, e);
            report.failures.push((Stage::Delivering, ErrorKind::Delivery));
            false
        }
    }
}
