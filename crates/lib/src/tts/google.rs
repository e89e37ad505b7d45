//! Google Translate TTS (`translate_tts`, `client=tw-ob`), MP3 output.
//! The endpoint accepts at most 100 characters per request; longer text is chunked and the
//! MP3 segments are appended to one file in order.

use super::{append_body, check_status, SynthesisError, Synthesizer};
use crate::scratch::{AudioArtifact, InvocationKey, ScratchDir};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

const DEFAULT_BASE_URL: &str = "https://translate.google.com";
const MAX_CHUNK_CHARS: usize = 100;

pub struct GoogleSynthesizer {
    base_url: String,
    language: String,
    scratch: ScratchDir,
    client: reqwest::Client,
}

impl GoogleSynthesizer {
    pub fn new(base_url: Option<String>, language: String, scratch: ScratchDir) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            language,
            scratch,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Synthesizer for GoogleSynthesizer {
    fn name(&self) -> &'static str {
        "google"
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
        let chunks = split_chunks(text, MAX_CHUNK_CHARS);
        let (mut file, artifact) = self.scratch.create(key, "mp3", text)?;
        let url = format!("{}/translate_tts", self.base_url);
        let total = chunks.len().to_string();
        let mut written = 0u64;
        for (idx, chunk) in chunks.iter().enumerate() {
            let idx = idx.to_string();
            let textlen = chunk.chars().count().to_string();
            let res = self
                .client
                .get(&url)
                .query(&[
                    ("ie", "UTF-8"),
                    ("client", "tw-ob"),
                    ("tl", self.language.as_str()),
                    ("q", chunk.as_str()),
                    ("total", total.as_str()),
                    ("idx", idx.as_str()),
                    ("textlen", textlen.as_str()),
                ])
                .send()
                .await?;
            let res = check_status(res).await?;
            written += append_body(res, &mut file).await?;
        }
        file.flush().await?;
        if written == 0 {
            return Err(SynthesisError::EmptyAudio);
        }
        log::debug!(
            "google tts: wrote {} bytes in {} chunk(s) to {}",
            written,
            chunks.len(),
            artifact.path().display()
        );
        Ok(Some(artifact))
    }
}

/// Split into chunks of at most `max` chars, preferring breaks after clause punctuation or
/// whitespace. Runs with no such break (unspaced Thai, long tokens) are cut between characters,
/// never before a combining mark or after a leading vowel.
fn split_chunks(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for piece in break_pieces(text) {
        let fits = current.chars().count() + piece.trim_end().chars().count() <= max;
        if fits {
            current.push_str(piece);
            continue;
        }
        push_trimmed(&mut chunks, std::mem::take(&mut current));
        if piece.trim_end().chars().count() <= max {
            current.push_str(piece.trim_start());
        } else {
            for part in hard_cut(piece.trim(), max) {
                push_trimmed(&mut chunks, part);
            }
        }
    }
    push_trimmed(&mut chunks, current);
    chunks
}

/// Pieces of `text`, each ending just after a whitespace or punctuation char (the last may not).
fn break_pieces(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() || is_break_punctuation(c) {
            let end = i + c.len_utf8();
            pieces.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn push_trimmed(chunks: &mut Vec<String>, chunk: String) {
    let t = chunk.trim();
    if !t.is_empty() {
        chunks.push(t.to_string());
    }
}

/// Cut a run with no natural break into pieces of at most `max` chars at safe positions.
fn hard_cut(run: &str, max: usize) -> Vec<String> {
    let chars: Vec<char> = run.chars().collect();
    let mut parts = Vec::new();
    let mut start = 0;
    while chars.len() - start > max {
        let limit = start + max;
        let cut = (start + 1..=limit)
            .rev()
            .find(|&i| can_cut_before(&chars, i))
            .unwrap_or(limit);
        parts.push(chars[start..cut].iter().collect());
        start = cut;
    }
    parts.push(chars[start..].iter().collect());
    parts
}

fn can_cut_before(chars: &[char], i: usize) -> bool {
    !is_combining(chars[i]) && !is_leading_vowel(chars[i - 1])
}

fn is_break_punctuation(c: char) -> bool {
    matches!(
        c,
        '.' | ',' | ';' | ':' | '!' | '?' | '\u{0E2F}' | '\u{0E46}' | '\u{0E5A}' | '\u{0E5B}'
            | '。' | '，' | '、' | '！' | '？'
    )
}

/// Marks that attach to the preceding character (Thai vowels above/below and tone marks,
/// general combining diacritics, joiners and variation selectors).
fn is_combining(c: char) -> bool {
    matches!(
        c,
        '\u{0E31}'
            | '\u{0E34}'..='\u{0E3A}'
            | '\u{0E47}'..='\u{0E4E}'
            | '\u{0300}'..='\u{036F}'
            | '\u{200C}'..='\u{200D}'
            | '\u{FE00}'..='\u{FE0F}'
    )
}

/// Thai vowels written before the consonant they belong to.
fn is_leading_vowel(c: char) -> bool {
    matches!(c, '\u{0E40}'..='\u{0E44}')
}
