//! Gateway HTTP server: health probe, Telegram webhook intake, and the inbound dispatcher.

use crate::channels::{ChannelHandle, ChannelRegistry, InboundMessage, TelegramChannel, TelegramUpdate};
use crate::config::{self, Config};
use crate::pipeline::Pipeline;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

const SERVICE_NAME: &str = "parla";

/// Shared state for the gateway (config, pipeline, channels).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    /// Sender for inbound channel messages (long-poll loop and webhook POSTs). Dispatcher task receives.
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    pub channel_registry: Arc<ChannelRegistry>,
    /// In-process channel connector tasks; awaited during graceful shutdown.
    pub channel_tasks: Arc<tokio::sync::RwLock<Vec<JoinHandle<()>>>>,
}

/// Greeting sent for /start.
fn start_greeting(config: &Config) -> String {
    format!(
        "👋 Send me any sentence in \"{}\" and I'll translate it to \"{}\" (with audio).",
        config.pipeline.source_language, config.pipeline.target_language
    )
}

/// Bot command name without the leading slash or @botname suffix; None for ordinary text.
fn command_name(text: &str) -> Option<&str> {
    let first = text.trim().split_whitespace().next()?;
    let cmd = first.strip_prefix('/')?;
    Some(cmd.split('@').next().unwrap_or(cmd))
}

/// Process one inbound message: /start gets the greeting, other commands are ignored,
/// everything else runs through the pipeline.
async fn process_inbound_message(state: GatewayState, msg: InboundMessage) {
    let Some(handle) = state.channel_registry.get(&msg.channel_id).await else {
        log::warn!("inbound: no channel registered for {}", msg.channel_id);
        return;
    };
    if let Some(cmd) = command_name(&msg.text) {
        if cmd.eq_ignore_ascii_case("start") {
            let greeting = start_greeting(&state.config);
            if let Err(e) = handle.send_message(&msg.conversation_id, &greeting).await {
                log::warn!("inbound: greeting send failed: {}", e);
            }
        } else {
            log::debug!("inbound: ignoring command /{}", cmd);
        }
        return;
    }
    let report = state.pipeline.handle(&msg, handle.as_ref()).await;
    if !report.failures.is_empty() {
        log::info!(
            "inbound: {} finished with {:?}",
            msg.conversation_id,
            report.failures
        );
    }
}

/// Receive inbound messages and run each in its own task; invocations are independent.
/// When `shutdown` fires the queue is closed, already-queued messages still run, and every
/// in-flight invocation is awaited before returning.
async fn run_dispatcher(
    state: GatewayState,
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tasks = JoinSet::new();
    loop {
        tokio::select! {
            msg = inbound_rx.recv() => match msg {
                Some(msg) => {
                    tasks.spawn(process_inbound_message(state.clone(), msg));
                }
                None => break,
            },
            Some(res) = tasks.join_next() => log_task_result(res),
            _ = shutdown.changed() => break,
        }
    }

    inbound_rx.close();
    while let Some(msg) = inbound_rx.recv().await {
        tasks.spawn(process_inbound_message(state.clone(), msg));
    }
    if !tasks.is_empty() {
        log::info!("inbound dispatcher: waiting for {} in-flight message(s)", tasks.len());
    }
    while let Some(res) = tasks.join_next().await {
        log_task_result(res);
    }
    log::debug!("inbound dispatcher stopped");
}

fn log_task_result(res: Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        log::warn!("inbound: message task failed: {}", e);
    }
}

/// Build the HTTP router (health + webhook) over `state`.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/telegram/webhook", post(telegram_webhook))
        .with_state(state)
}

/// Run the gateway; binds to config.gateway.bind:config.gateway.port and blocks until shutdown (Ctrl+C / SIGTERM).
/// Messages already accepted are answered before this returns.
/// Starts the Telegram connector when a bot token is configured: webhook mode when a webhook URL
/// resolves, long-poll otherwise. Without a token only the health endpoint is served.
pub async fn run_gateway(config: Config) -> Result<()> {
    let pipeline = Arc::new(Pipeline::from_config(&config)?);
    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(64);
    let channel_tasks = Arc::new(tokio::sync::RwLock::new(Vec::new()));

    let state = GatewayState {
        config: Arc::new(config.clone()),
        pipeline,
        inbound_tx: inbound_tx.clone(),
        channel_registry: Arc::new(ChannelRegistry::new()),
        channel_tasks: channel_tasks.clone(),
    };

    let (dispatcher_shutdown, dispatcher_shutdown_rx) = watch::channel(false);
    let dispatcher = tokio::spawn(run_dispatcher(state.clone(), inbound_rx, dispatcher_shutdown_rx));

    let telegram_webhook_for_shutdown: Option<Arc<TelegramChannel>> =
        match config::resolve_telegram_token(&config) {
            Some(token) => {
                let telegram = Arc::new(TelegramChannel::new(Some(token)));
                state
                    .channel_registry
                    .register(telegram.id().to_string(), telegram.clone())
                    .await;
                if let Some(url) = config::resolve_webhook_url(&config) {
                    let secret = config.channels.telegram.webhook_secret.as_deref();
                    if let Err(e) = telegram.set_webhook(&url, secret).await {
                        log::warn!("telegram set_webhook failed: {}", e);
                    } else {
                        log::info!("telegram channel registered (webhook mode): {}", url);
                    }
                    Some(telegram)
                } else {
                    if let Err(e) = telegram.delete_webhook().await {
                        log::debug!("telegram delete_webhook before long-poll: {}", e);
                    }
                    let handle = telegram.clone().start_inbound(inbound_tx);
                    channel_tasks.write().await.push(handle);
                    log::info!("telegram channel registered and getUpdates loop started");
                    None
                }
            }
            None => {
                log::warn!("no telegram bot token configured (TELEGRAM_BOT_TOKEN); serving health endpoint only");
                None
            }
        };

    let channel_registry = state.channel_registry.clone();
    let app = router(state);

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind((config.gateway.bind.trim(), config.gateway.port))
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            channel_registry,
            channel_tasks,
            telegram_webhook_for_shutdown,
        ))
        .await
        .context("gateway server exited");

    let _ = dispatcher_shutdown.send(true);
    if let Err(e) = dispatcher.await {
        log::warn!("inbound dispatcher failed: {}", e);
    }
    served?;
    log::info!("gateway stopped");
    Ok(())
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
/// Stops channel connectors, removes the Telegram webhook if used, then awaits in-process channel tasks.
async fn shutdown_signal(
    channel_registry: Arc<ChannelRegistry>,
    channel_tasks: Arc<tokio::sync::RwLock<Vec<JoinHandle<()>>>>,
    telegram_webhook: Option<Arc<TelegramChannel>>,
) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping channels");

    for id in channel_registry.ids().await {
        if let Some(handle) = channel_registry.get(&id).await {
            handle.stop();
        }
    }

    if let Some(t) = telegram_webhook {
        if let Err(e) = t.delete_webhook().await {
            log::debug!("telegram delete_webhook on shutdown: {}", e);
        }
    }

    let handles = {
        let mut g = channel_tasks.write().await;
        std::mem::take(&mut *g)
    };
    for h in handles {
        let _ = h.await;
    }
    log::info!("channel tasks finished");
}

/// POST /telegram/webhook — receives Telegram update JSON; verifies optional secret, pushes InboundMessage.
async fn telegram_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(ref expected) = state.config.channels.telegram.webhook_secret {
        let provided = headers
            .get("X-Telegram-Bot-Api-Secret-Token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if provided != expected.as_str() {
            return StatusCode::FORBIDDEN;
        }
    }
    let update: TelegramUpdate = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(_) => return StatusCode::BAD_REQUEST,
    };
    let Some(inbound) = update.into_inbound("telegram") else {
        return StatusCode::OK;
    };
    if state.inbound_tx.send(inbound).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

/// GET / returns a static liveness JSON (for hosting platform probes).
async fn health_http() -> Json<serde_json::Value> {
    Json(json!({
        "status": "alive",
        "service": SERVICE_NAME,
    }))
}
