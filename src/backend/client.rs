use super::messages::{AssistantReply, ChatRequest, SpeechToken};
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Chat endpoint consumed by the "processing" transition
#[async_trait]
pub trait AssistantApi: Send + Sync {
    async fn send_message(&self, text: &str) -> VoiceResult<AssistantReply>;
}

/// Speech credential endpoint consumed by the token cache
#[async_trait]
pub trait SpeechTokenSource: Send + Sync {
    async fn fetch_speech_token(&self) -> VoiceResult<SpeechToken>;
}

/// REST client for the assistant backend
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl BackendClient {
    /// Create a client for `base_url` (e.g. `http://localhost:8000`)
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        request_timeout: Duration,
    ) -> VoiceResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        info!("Backend client configured for {}", base_url);

        Ok(Self {
            http,
            base_url,
            auth_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl AssistantApi for BackendClient {
    async fn send_message(&self, text: &str) -> VoiceResult<AssistantReply> {
        let url = format!("{}/api/chat", self.base_url);
        debug!("POST {}", url);

        let response = self
            .authorize(self.http.post(&url))
            .json(&ChatRequest {
                message: text.to_string(),
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(VoiceError::Backend(format!(
                "Failed to send message: HTTP {}",
                response.status()
            )));
        }

        Ok(response.json::<AssistantReply>().await?)
    }
}

#[async_trait]
impl SpeechTokenSource for BackendClient {
    async fn fetch_speech_token(&self) -> VoiceResult<SpeechToken> {
        let url = format!("{}/api/speech-token", self.base_url);
        debug!("GET {}", url);

        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| VoiceError::Credential(e.to_string()))?;

        if !response.status().is_success() {
            return Err(VoiceError::Credential(format!(
                "Failed to get speech token: HTTP {}",
                response.status()
            )));
        }

        response
            .json::<SpeechToken>()
            .await
            .map_err(|e| VoiceError::Credential(e.to_string()))
    }
}
