use crate::session::SessionConfig;
use crate::transport::TransportConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub session: SessionTuning,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    pub base_url: String,
    /// Bearer token for the assistant backend
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub recognition_language: String,
    pub synthesis_voice: String,
    pub token_validity_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        Self {
            recognition_language: transport.recognition_language,
            synthesis_voice: transport.synthesis_voice,
            token_validity_secs: 540,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionTuning {
    pub min_playback_timeout_ms: u64,
    pub playback_ms_per_char: u64,
    pub max_pending_turns: usize,
}

impl Default for SessionTuning {
    fn default() -> Self {
        Self {
            min_playback_timeout_ms: 5000,
            playback_ms_per_char: 80,
            max_pending_turns: 2,
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Config {
    /// Load `path` (extension optional) with `VOICE__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("VOICE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.request_timeout_secs)
    }

    /// Library-level session settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            transport: TransportConfig {
                recognition_language: self.speech.recognition_language.clone(),
                synthesis_voice: self.speech.synthesis_voice.clone(),
                min_playback_timeout: Duration::from_millis(self.session.min_playback_timeout_ms),
                playback_ms_per_char: self.session.playback_ms_per_char,
            },
            token_validity: Duration::from_secs(self.speech.token_validity_secs),
            max_pending_turns: self.session.max_pending_turns,
            ..SessionConfig::default()
        }
    }
}
