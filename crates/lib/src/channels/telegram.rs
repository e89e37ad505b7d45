//! Telegram channel: long-poll getUpdates (or webhook) in; sendMessage, sendChatAction and
//! sendAudio out via the Bot API.

use crate::channels::inbound::InboundMessage;
use crate::channels::registry::ChannelHandle;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const LONG_POLL_TIMEOUT: u64 = 30;
/// Bound for every Bot API call except getUpdates, which is bounded by LONG_POLL_TIMEOUT plus slack.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

/// Telegram update payload (getUpdates result item or webhook POST body).
#[derive(Debug, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

impl TelegramUpdate {
    /// Inbound message for updates that carry text; None for everything else (stickers, edits, ...).
    pub fn into_inbound(self, channel_id: &str) -> Option<InboundMessage> {
        let msg = self.message?;
        let text = msg.text?;
        Some(InboundMessage {
            channel_id: channel_id.to_string(),
            conversation_id: msg.chat.id.to_string(),
            text,
        })
    }
}

/// Telegram channel connector: long-polls for updates and delivers replies.
pub struct TelegramChannel {
    id: String,
    token: Option<String>,
    api_base: String,
    running: AtomicBool,
    client: reqwest::Client,
    send_timeout: Duration,
}

impl TelegramChannel {
    pub fn new(token: Option<String>) -> Self {
        Self::with_api_base(token, telegram_api_base())
    }

    /// Use a custom Bot API base URL (local Bot API server, tests).
    pub fn with_api_base(token: Option<String>, api_base: String) -> Self {
        Self {
            id: "telegram".to_string(),
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
            running: AtomicBool::new(false),
            client: reqwest::Client::new(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Override the per-request bound for sends and webhook calls (default 30s).
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bot API URL for `method`. The token is part of the path, so never log the result.
    fn method_url(&self, method: &str) -> Result<String, String> {
        let token = self
            .token
            .as_ref()
            .ok_or("telegram bot token not configured")?;
        Ok(format!("{}/bot{}/{}", self.api_base, token, method))
    }

    /// Start the getUpdates long-poll loop and forward messages to the gateway. Returns a handle to await on shutdown.
    pub fn start_inbound(
        self: Arc<Self>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, inbound_tx).await;
        })
    }

    /// Call Telegram getUpdates (long poll). Returns (updates, next_offset).
    async fn get_updates(&self, offset: Option<i64>) -> Result<(Vec<TelegramUpdate>, Option<i64>), String> {
        let url = self.method_url("getUpdates")?;
        let mut query = vec![("timeout", LONG_POLL_TIMEOUT.to_string())];
        if let Some(off) = offset {
            query.push(("offset", off.to_string()));
        }
        let res = self
            .client
            .get(&url)
            .query(&query)
            .timeout(Duration::from_secs(LONG_POLL_TIMEOUT + 10))
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;
        let res = ensure_success(res, "getUpdates").await?;
        let data: GetUpdatesResponse = res.json().await.map_err(|e| e.without_url().to_string())?;
        if !data.ok {
            return Err("getUpdates returned ok: false".to_string());
        }
        let next_offset = data
            .result
            .iter()
            .map(|u| u.update_id)
            .max()
            .map(|id| id + 1);
        Ok((data.result, next_offset))
    }

    /// Set webhook URL (and optional secret). When set, Telegram POSTs updates to the URL instead of getUpdates.
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), String> {
        let api_url = self.method_url("setWebhook")?;
        let mut body = serde_json::json!({ "url": url, "allowed_updates": ["message"] });
        if let Some(s) = secret {
            body["secret_token"] = serde_json::Value::String(s.to_string());
        }
        let res = self
            .client
            .post(&api_url)
            .json(&body)
            .timeout(self.send_timeout)
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;
        ensure_success(res, "setWebhook").await?;
        Ok(())
    }

    /// Remove webhook so the bot can use getUpdates again.
    pub async fn delete_webhook(&self) -> Result<(), String> {
        let url = self.method_url("deleteWebhook")?;
        let res = self
            .client
            .post(&url)
            .timeout(self.send_timeout)
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;
        ensure_success(res, "deleteWebhook").await?;
        Ok(())
    }

    /// Send a text message to a chat via sendMessage API.
    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), String> {
        let url = self.method_url("sendMessage")?;
        let body = serde_json::json!({ "chat_id": chat_id, "text": text });
        let res = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.send_timeout)
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;
        ensure_success(res, "sendMessage").await?;
        Ok(())
    }

    /// Show a chat action (e.g. "typing") via sendChatAction API.
    pub async fn send_chat_action(&self, chat_id: &str, action: &str) -> Result<(), String> {
        let url = self.method_url("sendChatAction")?;
        let body = serde_json::json!({ "chat_id": chat_id, "action": action });
        let res = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.send_timeout)
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;
        ensure_success(res, "sendChatAction").await?;
        Ok(())
    }

    /// Upload an audio file to a chat via sendAudio API (multipart).
    pub async fn send_audio(&self, chat_id: &str, path: &Path, title: &str) -> Result<(), String> {
        let url = self.method_url("sendAudio")?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("reading {}: {}", path.display(), e))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| e.to_string())?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("title", title.to_string())
            .part("audio", part);
        let res = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(self.send_timeout)
            .send()
            .await
            .map_err(|e| e.without_url().to_string())?;
        ensure_success(res, "sendAudio").await?;
        Ok(())
    }
}

/// Map a non-success HTTP status to an error string with the response body.
async fn ensure_success(res: reqwest::Response, method: &str) -> Result<reqwest::Response, String> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(format!("{} failed: {} {}", method, status, body))
}

async fn run_get_updates_loop(channel: Arc<TelegramChannel>, inbound_tx: mpsc::Sender<InboundMessage>) {
    let mut offset: Option<i64> = None;
    while channel.running() {
        match channel.get_updates(offset).await {
            Ok((updates, next)) => {
                if next.is_some() {
                    offset = next;
                }
                for u in updates {
                    let Some(inbound) = u.into_inbound(&channel.id) else {
                        continue;
                    };
                    if inbound_tx.send(inbound).await.is_err() {
                        log::debug!("telegram: inbound channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e) => {
                log::debug!("telegram getUpdates error: {}", e);
                tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    async fn send_typing(&self, conversation_id: &str) -> Result<(), String> {
        self.send_chat_action(conversation_id, "typing").await
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), String> {
        TelegramChannel::send_message(self, conversation_id, text).await
    }

    async fn send_audio(&self, conversation_id: &str, path: &Path, title: &str) -> Result<(), String> {
        TelegramChannel::send_audio(self, conversation_id, path, title).await
    }
}

/// Resolve Telegram bot API base URL (TELEGRAM_API_BASE env, for local Bot API servers).
pub fn telegram_api_base() -> String {
    std::env::var("TELEGRAM_API_BASE").unwrap_or_else(|_| TELEGRAM_API_BASE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(url: &str) -> TelegramChannel {
        TelegramChannel::with_api_base(Some("123:abc".to_string()), url.to_string())
    }

    #[test]
    fn text_update_becomes_inbound() {
        let update: TelegramUpdate = serde_json::from_str(
            r#"{"update_id": 10, "message": {"chat": {"id": -1001}, "text": "Hello"}}"#,
        )
        .unwrap();
        let inbound = update.into_inbound("telegram").unwrap();
        assert_eq!(inbound.conversation_id, "-1001");
        assert_eq!(inbound.text, "Hello");
        assert_eq!(inbound.channel_id, "telegram");
    }

    #[test]
    fn non_text_update_is_skipped() {
        let update: TelegramUpdate =
            serde_json::from_str(r#"{"update_id": 11, "message": {"chat": {"id": 5}}}"#).unwrap();
        assert!(update.into_inbound("telegram").is_none());
        let update: TelegramUpdate = serde_json::from_str(r#"{"update_id": 12}"#).unwrap();
        assert!(update.into_inbound("telegram").is_none());
    }

    #[tokio::test]
    async fn missing_token_is_an_error() {
        let c = TelegramChannel::with_api_base(None, "http://127.0.0.1:9".into());
        let err = c.send_message("1", "hi").await.unwrap_err();
        assert!(err.contains("token not configured"));
    }

    #[tokio::test]
    async fn send_message_posts_chat_and_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "chat_id": "42",
                "text": "สวัสดี\nHello"
            })))
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {}}"#)
            .create_async()
            .await;

        channel(&server.url()).send_message("42", "สวัสดี\nHello").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_typing_uses_chat_action() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendChatAction")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "chat_id": "42",
                "action": "typing"
            })))
            .with_status(200)
            .with_body(r#"{"ok": true, "result": true}"#)
            .create_async()
            .await;

        ChannelHandle::send_typing(&channel(&server.url()), "42").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn send_audio_uploads_multipart() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bot123:abc/sendAudio")
            .match_header(
                "content-type",
                mockito::Matcher::Regex("multipart/form-data".to_string()),
            )
            .match_body(mockito::Matcher::Regex("name=\"audio\"".to_string()))
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {}}"#)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp3");
        std::fs::write(&path, b"ID3").unwrap();
        channel(&server.url()).send_audio("42", &path, "สวัสดี").await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn stalled_send_times_out() {
        // accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let c = channel(&url).with_send_timeout(Duration::from_millis(200));
        let res = tokio::time::timeout(Duration::from_secs(5), c.send_message("42", "hi"))
            .await
            .expect("send_message returned within 5s");
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn api_error_includes_method_and_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/bot123:abc/sendMessage")
            .with_status(403)
            .with_body(r#"{"ok": false, "description": "bot was blocked by the user"}"#)
            .create_async()
            .await;

        let err = channel(&server.url()).send_message("42", "hi").await.unwrap_err();
        assert!(err.starts_with("sendMessage failed: 403"), "{err}");
    }

    #[tokio::test]
    async fn get_updates_advances_offset() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/bot123:abc/getUpdates")
            .match_query(mockito::Matcher::UrlEncoded("timeout".into(), "30".into()))
            .with_status(200)
            .with_body(
                r#"{"ok": true, "result": [
                    {"update_id": 7, "message": {"chat": {"id": 1}, "text": "a"}},
                    {"update_id": 9, "message": {"chat": {"id": 2}, "text": "b"}}
                ]}"#,
            )
            .create_async()
            .await;

        let (updates, next) = channel(&server.url()).get_updates(None).await.unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(next, Some(10));
    }
}
