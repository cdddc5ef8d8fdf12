use super::client::SpeechTokenSource;
use super::messages::SpeechToken;
use crate::error::VoiceResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Server-side validity is 10 minutes; refresh one minute early.
pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::from_secs(9 * 60);

struct CachedToken {
    token: SpeechToken,
    expires_at: Instant,
}

/// Lazily refreshed speech credential
///
/// The slot lock is held across the fetch, so callers racing on an expired
/// credential wait for the single in-flight request instead of issuing their own.
pub struct TokenCache {
    source: Arc<dyn SpeechTokenSource>,
    validity: Duration,
    slot: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    pub fn new(source: Arc<dyn SpeechTokenSource>) -> Self {
        Self::with_validity(source, DEFAULT_TOKEN_VALIDITY)
    }

    pub fn with_validity(source: Arc<dyn SpeechTokenSource>, validity: Duration) -> Self {
        Self {
            source,
            validity,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached credential, fetching a fresh one once it has expired
    pub async fn get_token(&self) -> VoiceResult<SpeechToken> {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            if Instant::now() < cached.expires_at {
                return Ok(cached.token.clone());
            }
            debug!("Speech token expired");
        }

        let issued_at = Instant::now();
        let token = self.source.fetch_speech_token().await?;
        info!("Fetched speech token for region {}", token.region);

        *slot = Some(CachedToken {
            token: token.clone(),
            expires_at: issued_at + self.validity,
        });

        Ok(token)
    }

    /// Drop the cached credential so the next call refetches
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}
