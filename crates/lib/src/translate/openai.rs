//! OpenAI-compatible chat translator (OpenAI, OpenRouter, or any /chat/completions server).
//!
//! The model is asked for a JSON object with `translation` and `transliteration`. Models that
//! ignore the format and answer in plain text still work: the whole answer becomes the target
//! text and the pipeline speaks only its first line.

use super::{LanguagePair, TranslationError, TranslationResult, Translator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Client for an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct OpenAiTranslator {
    base_url: String,
    api_key: String,
    model: String,
    languages: LanguagePair,
    client: reqwest::Client,
}

impl OpenAiTranslator {
    pub fn new(
        base_url: Option<String>,
        api_key: String,
        model: Option<String>,
        languages: LanguagePair,
    ) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = model
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self {
            base_url,
            api_key,
            model,
            languages,
            client: reqwest::Client::new(),
        }
    }

    fn system_prompt(&self) -> String {
        format!(
            "You translate from language code \"{}\" to language code \"{}\". \
             Reply with a JSON object only: {{\"translation\": \"...\", \"transliteration\": \"...\"}}. \
             \"transliteration\" is a Latin-alphabet phonetic reading of the translation; \
             use null when the target language is already written in Latin script.",
            self.languages.source, self.languages.target
        )
    }
}

#[async_trait]
impl Translator for OpenAiTranslator {
    fn name(&self) -> &'static str {
        "openai"
    }

    /// POST /chat/completions — non-streaming, temperature 0.
    async fn translate(&self, source_text: &str) -> Result<TranslationResult, TranslationError> {
        if source_text.trim().is_empty() {
            return Ok(TranslationResult::empty(source_text));
        }
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: source_text.to_string(),
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                typ: "json_object",
            },
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
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
        let data: ChatResponse = res.json().await?;
        let content = data
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TranslationError::Malformed("no choices in completion".to_string()))?;
        Ok(parse_content(&content, source_text))
    }
}

/// Structured answer when present; otherwise the raw content is the target text.
fn parse_content(content: &str, source_text: &str) -> TranslationResult {
    let stripped = strip_code_fence(content);
    if let Ok(s) = serde_json::from_str::<StructuredTranslation>(stripped) {
        return TranslationResult {
            target_text: s.translation.trim().to_string(),
            transliteration: s
                .transliteration
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            source_text: source_text.to_string(),
        };
    }
    log::debug!("openai translator: answer was not structured JSON, using raw text");
    TranslationResult {
        target_text: content.trim().to_string(),
        transliteration: None,
        source_text: source_text.to_string(),
    }
}

/// Some models wrap JSON in ```json fences despite the response format.
fn strip_code_fence(content: &str) -> &str {
    let t = content.trim();
    match t.strip_prefix("```") {
        Some(rest) => {
            let rest = rest.strip_prefix("json").unwrap_or(rest);
            rest.strip_suffix("```").unwrap_or(rest).trim()
        }
        None => t,
    }
}

// --- wire types ---

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    typ: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StructuredTranslation {
    translation: String,
    #[serde(default)]
    transliteration: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator(url: &str) -> OpenAiTranslator {
        OpenAiTranslator::new(
            Some(url.to_string()),
            "test-key".to_string(),
            None,
            LanguagePair::new("en", "th"),
        )
    }

    fn completion(content: &str) -> String {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string()
    }

    #[test]
    fn structured_answer_is_split_into_fields() {
        let r = parse_content(
            r#"{"translation": "ขอบคุณ", "transliteration": "khop khun"}"#,
            "Thank you",
        );
        assert_eq!(r.target_text, "ขอบคุณ");
        assert_eq!(r.transliteration.as_deref(), Some("khop khun"));
    }

    #[test]
    fn fenced_json_is_accepted() {
        let r = parse_content(
            "```json\n{\"translation\": \"ขอบคุณ\", \"transliteration\": null}\n```",
            "Thank you",
        );
        assert_eq!(r.target_text, "ขอบคุณ");
        assert!(r.transliteration.is_none());
    }

    #[test]
    fn plain_text_answer_becomes_target_text() {
        let r = parse_content("ขอบคุณ\nkhop khun\n(thank you)", "Thank you");
        assert_eq!(r.target_text, "ขอบคุณ\nkhop khun\n(thank you)");
        assert!(r.transliteration.is_none());
    }

    #[tokio::test]
    async fn translate_sends_bearer_and_parses_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("Authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o-mini",
                "response_format": { "type": "json_object" }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion(r#"{"translation":"สวัสดี","transliteration":"sawatdee"}"#))
            .create_async()
            .await;

        let r = translator(&server.url()).translate("Hello").await.unwrap();

        mock.assert_async().await;
        assert_eq!(r.target_text, "สวัสดี");
        assert_eq!(r.transliteration.as_deref(), Some("sawatdee"));
        assert_eq!(r.source_text, "Hello");
    }

    #[tokio::test]
    async fn unauthorized_maps_to_api_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{"error": "invalid api key"}"#)
            .create_async()
            .await;

        let err = translator(&server.url()).translate("Hello").await.unwrap_err();

        mock.assert_async().await;
        assert!(err.to_string().contains("401"), "error should mention status: {err}");
    }

    #[tokio::test]
    async fn empty_choices_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let err = translator(&server.url()).translate("Hello").await.unwrap_err();
        assert!(matches!(err, TranslationError::Malformed(_)));
    }
}
