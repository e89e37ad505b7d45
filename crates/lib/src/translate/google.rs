//! Google Translate client (public `translate_a/single` endpoint, `client=gtx`).
//! Requests translation segments (`dt=t`) and romanization (`dt=rm`) in one call.

use super::{LanguagePair, TranslationError, TranslationResult, Translator};
use async_trait::async_trait;
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://translate.googleapis.com";

/// Client for the Google Translate public endpoint.
#[derive(Clone)]
pub struct GoogleTranslator {
    base_url: String,
    languages: LanguagePair,
    client: reqwest::Client,
}

impl GoogleTranslator {
    pub fn new(base_url: Option<String>, languages: LanguagePair) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            languages,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    fn name(&self) -> &'static str {
        "google"
    }

    /// GET /translate_a/single — translation plus target romanization.
    async fn translate(&self, source_text: &str) -> Result<TranslationResult, TranslationError> {
        if source_text.trim().is_empty() {
            return Ok(TranslationResult::empty(source_text));
        }
        let url = format!("{}/translate_a/single", self.base_url);
        let res = self
            .client
            .get(&url)
            .query(&[
                ("client", "gtx"),
                ("sl", self.languages.source.as_str()),
                ("tl", self.languages.target.as_str()),
                ("dt", "t"),
                ("dt", "rm"),
                ("q", source_text),
            ])
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(TranslationError::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        let data: Value = res.json().await?;
        parse_single_response(&data, source_text)
    }
}

/// Parse the nested-array payload. `data[0]` holds rows: translation rows start with the
/// translated segment string; the romanization row starts with two nulls and carries the
/// target romanization at index 2.
fn parse_single_response(data: &Value, source_text: &str) -> Result<TranslationResult, TranslationError> {
    let rows = data
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| TranslationError::Malformed("missing sentence array".to_string()))?;

    let mut target_text = String::new();
    let mut transliteration = String::new();
    for row in rows {
        let Some(cells) = row.as_array() else {
            continue;
        };
        match cells.first() {
            Some(Value::String(segment)) => target_text.push_str(segment),
            Some(Value::Null) => {
                if let Some(Value::String(rm)) = cells.get(2) {
                    if !transliteration.is_empty() {
                        transliteration.push(' ');
                    }
                    transliteration.push_str(rm.trim());
                }
            }
            _ => {}
        }
    }

    let transliteration = Some(transliteration).filter(|t| !t.trim().is_empty());
    Ok(TranslationResult {
        target_text: target_text.trim().to_string(),
        transliteration,
        source_text: source_text.to_string(),
    })
}
