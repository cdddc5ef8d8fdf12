use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use voice_session::{
    create_router, AppState, BackendClient, Config, ConsoleEngine, ConversationHistory,
    MicrophoneConfig, NoopPlatform, SpeechTransport, TokenCache, VoiceSession,
    WavMicrophoneProvider,
};

#[derive(Parser)]
#[command(name = "voice-session", version, about = "Voice conversation orchestrator")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/voice-session")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the control API with the console speech engine
    Serve {
        /// WAV file replayed as the microphone tap for the visualizer
        #[arg(long)]
        mic_file: Option<PathBuf>,

        /// Simulated playback time per character
        #[arg(long, default_value_t = 60)]
        ms_per_char: u64,

        /// Start listening right away instead of waiting for a start request
        #[arg(long)]
        autostart: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Voice Session v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve {
            mic_file,
            ms_per_char,
            autostart,
        } => serve(cfg, mic_file, ms_per_char, autostart).await,
    }
}

async fn serve(cfg: Config, mic_file: Option<PathBuf>, ms_per_char: u64, autostart: bool) -> Result<()> {
    let session_config = cfg.session_config();

    let backend = Arc::new(
        BackendClient::new(
            cfg.backend.base_url.clone(),
            cfg.backend.auth_token.clone(),
            cfg.request_timeout(),
        )
        .context("Failed to create backend client")?,
    );
    let tokens = Arc::new(TokenCache::with_validity(
        backend.clone(),
        session_config.token_validity,
    ));

    let platform = Arc::new(NoopPlatform);
    let mut transport = SpeechTransport::new(
        session_config.transport.clone(),
        Arc::new(ConsoleEngine::new(ms_per_char)),
        tokens,
    )
    .with_platform(platform.clone());

    if let Some(path) = mic_file {
        let provider = WavMicrophoneProvider::open_file(&path, MicrophoneConfig::default())
            .with_context(|| format!("Failed to open microphone file {}", path.display()))?;
        transport = transport.with_microphone(Arc::new(provider));
    }

    let history = Arc::new(ConversationHistory::new());
    let session = VoiceSession::new(
        session_config,
        Arc::new(transport),
        backend,
        history,
        platform,
    );

    if autostart {
        session
            .start_session()
            .await
            .context("Failed to start voice session")?;
    }

    let app = create_router(AppState::new(session.clone()));
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    session.stop_session().await;
    Ok(())
}
