//! Integration tests: start the gateway on a free port and exercise the HTTP surface.
//! No Telegram token or provider is needed; server tasks are left running when a test ends.

use relay::channels::{ChannelRegistry, InboundMessage};
use relay::config::{Config, SynthesizerBackend};
use relay::gateway::{self, GatewayState};
use relay::pipeline::Pipeline;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn test_config(port: u16) -> (Config, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.pipeline.synthesizer_backend = SynthesizerBackend::None;
    config.pipeline.scratch_dir = Some(dir.path().join("scratch"));
    (config, dir)
}

#[tokio::test]
async fn gateway_health_http_responds_alive() {
    let port = free_port();
    let (config, _dir) = test_config(port);

    let gateway_handle = tokio::spawn(async move {
        let _ = gateway::run_gateway(config).await;
    });

    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let json: serde_json::Value = resp.json().await.expect("parse JSON");
                assert_eq!(json.get("status").and_then(|v| v.as_str()), Some("alive"));
                assert_eq!(json.get("service").and_then(|v| v.as_str()), Some("parla"));
                return;
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    gateway_handle.abort();
    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        url, last_err
    );
}

/// Serve the router on a free port with a controllable inbound queue.
async fn serve_webhook(secret: Option<&str>) -> (String, mpsc::Receiver<InboundMessage>, tempfile::TempDir) {
    let port = free_port();
    let (mut config, dir) = test_config(port);
    config.channels.telegram.webhook_secret = secret.map(str::to_string);
    let pipeline = Pipeline::from_config(&config).expect("pipeline");
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let state = GatewayState {
        config: Arc::new(config),
        pipeline: Arc::new(pipeline),
        inbound_tx,
        channel_registry: Arc::new(ChannelRegistry::new()),
        channel_tasks: Arc::new(tokio::sync::RwLock::new(Vec::new())),
    };
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("bind");
    tokio::spawn(async move {
        let _ = axum::serve(listener, gateway::router(state)).await;
    });
    (format!("http://127.0.0.1:{}/telegram/webhook", port), inbound_rx, dir)
}

#[tokio::test]
async fn webhook_queues_text_updates() {
    let (url, mut inbound_rx, _dir) = serve_webhook(None).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(&url)
        .body(r#"{"update_id": 1, "message": {"chat": {"id": 555}, "text": "Hello"}}"#)
        .send()
        .await
        .expect("post update");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let inbound = tokio::time::timeout(Duration::from_secs(2), inbound_rx.recv())
        .await
        .expect("inbound within 2s")
        .expect("channel open");
    assert_eq!(inbound.channel_id, "telegram");
    assert_eq!(inbound.conversation_id, "555");
    assert_eq!(inbound.text, "Hello");
}

#[tokio::test]
async fn webhook_ignores_non_text_and_rejects_garbage() {
    let (url, mut inbound_rx, _dir) = serve_webhook(None).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(&url)
        .body(r#"{"update_id": 2, "message": {"chat": {"id": 1}}}"#)
        .send()
        .await
        .expect("post sticker");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let resp = client.post(&url).body("not json").send().await.expect("post garbage");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    assert!(inbound_rx.try_recv().is_err());
}

#[tokio::test]
async fn webhook_secret_is_enforced() {
    let (url, mut inbound_rx, _dir) = serve_webhook(Some("s3cret")).await;
    let client = reqwest::Client::new();
    let update = r#"{"update_id": 3, "message": {"chat": {"id": 9}, "text": "Hi"}}"#;

    let resp = client.post(&url).body(update).send().await.expect("post without secret");
    assert_eq!(resp.status(), reqwest::StatusCode::FORBIDDEN);

    let resp = client
        .post(&url)
        .header("X-Telegram-Bot-Api-Secret-Token", "s3cret")
        .body(update)
        .send()
        .await
        .expect("post with secret");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let inbound = tokio::time::timeout(Duration::from_secs(2), inbound_rx.recv())
        .await
        .expect("inbound within 2s")
        .expect("channel open");
    assert_eq!(inbound.conversation_id, "9");
}
