use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use voice_relay::client::{self, ClientOptions};
use voice_relay::relay::{create_router, AppState};
use voice_relay::upstream::{LiveSpeechService, SpeechService};
use voice_relay::Config;

#[derive(Parser)]
#[command(name = "voice-relay", about = "Real-time duplex audio relay")]
struct Cli {
    /// Path to the config file (without extension)
    #[arg(long, default_value = "config/voice-relay")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay server
    Serve {
        /// Override the bind address
        #[arg(long)]
        bind: Option<String>,
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run the native voice client
    Client {
        /// Relay WebSocket URL
        #[arg(long, default_value = "ws://127.0.0.1:8080/ws")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;

    match cli.command {
        Command::Serve { bind, port } => {
            if let Some(bind) = bind {
                cfg.service.http.bind = bind;
            }
            if let Some(port) = port {
                cfg.service.http.port = port;
            }
            serve(cfg).await
        }
        Command::Client { url } => {
            client::run(ClientOptions {
                url,
                capture_sample_rate: cfg.audio.capture_sample_rate,
                playback_sample_rate: cfg.audio.playback_sample_rate,
                frame_samples: cfg.audio.frame_samples,
            })
            .await
        }
    }
}

async fn serve(cfg: Config) -> Result<()> {
    info!("voice-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Upstream speech service: {}", cfg.upstream.url);

    let service: Arc<dyn SpeechService> = Arc::new(LiveSpeechService::new(cfg.upstream.url.clone()));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let router = create_router(AppState::new(cfg, service));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}
