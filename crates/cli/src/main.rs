use async_trait::async_trait;
use clap::{Parser, Subcommand};
use relay::channels::{ChannelHandle, InboundMessage};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "parla")]
#[command(about = "Parla: translate chat messages and reply with text and audio", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory, a default config file, and the scratch directory.
    Init {
        /// Config file path (default: PARLA_CONFIG_PATH or ~/.parla/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the relay: health endpoint plus the Telegram bot (webhook or long-poll).
    Gateway {
        /// Config file path (default: PARLA_CONFIG_PATH or ~/.parla/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default: PORT env, then config, then 10000)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Translate one message locally and print the reply that would be sent.
    Translate {
        /// Config file path (default: PARLA_CONFIG_PATH or ~/.parla/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Copy the generated audio here (otherwise it is discarded).
        #[arg(long, value_name = "PATH")]
        audio_out: Option<PathBuf>,

        /// Text to translate.
        text: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("parla {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Translate {
            config,
            audio_out,
            text,
        }) => match run_translate(config, audio_out, text).await {
            Ok(true) => {}
            Ok(false) => std::process::exit(1),
            Err(e) => {
                log::error!("translate failed: {:#}", e);
                std::process::exit(1);
            }
        },
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    let dir = relay::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

async fn run_gateway(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = relay::config::load_config(config_path)?;
    log::debug!("loaded config from {}", path.display());
    config.gateway.port = port.unwrap_or_else(|| relay::config::resolve_port(&config));
    config.gateway.bind = relay::config::resolve_bind(&config);
    log::info!(
        "starting gateway on {}:{} ({} -> {})",
        config.gateway.bind,
        config.gateway.port,
        config.pipeline.source_language,
        config.pipeline.target_language
    );
    relay::gateway::run_gateway(config).await
}

/// Prints replies to stdout and copies audio to `audio_out` when given.
struct StdoutChannel {
    audio_out: Option<PathBuf>,
}

#[async_trait]
impl ChannelHandle for StdoutChannel {
    fn id(&self) -> &str {
        "cli"
    }

    fn stop(&self) {}

    async fn send_message(&self, _conversation_id: &str, text: &str) -> Result<(), String> {
        println!("{}", text);
        Ok(())
    }

    async fn send_audio(&self, _conversation_id: &str, path: &Path, title: &str) -> Result<(), String> {
        match &self.audio_out {
            Some(out) => {
                tokio::fs::copy(path, out)
                    .await
                    .map_err(|e| format!("copying audio to {}: {}", out.display(), e))?;
                eprintln!("audio \"{}\" saved to {}", title, out.display());
            }
            None => eprintln!("audio generated (pass --audio-out to keep it)"),
        }
        Ok(())
    }
}

/// Returns false when the exchange failed (the user-facing message has already been printed).
async fn run_translate(
    config_path: Option<PathBuf>,
    audio_out: Option<PathBuf>,
    text: String,
) -> anyhow::Result<bool> {
    let (config, _) = relay::config::load_config(config_path)?;
    let pipeline = relay::pipeline::Pipeline::from_config(&config)?;
    let channel = StdoutChannel { audio_out };
    let msg = InboundMessage {
        channel_id: channel.id().to_string(),
        conversation_id: "cli".to_string(),
        text,
    };
    let report = pipeline.handle(&msg, &channel).await;
    let failed = report.failures.iter().any(|(_, kind)| {
        matches!(
            kind,
            relay::pipeline::ErrorKind::Translation | relay::pipeline::ErrorKind::Delivery
        )
    });
    Ok(!failed)
}
