//! Optional device capabilities
//!
//! Audio unlock, screen wake lock and haptics only exist on some platforms.
//! Every method defaults to a no-op, so [`NoopPlatform`] works everywhere.

use crate::error::VoiceResult;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Platform: Send + Sync {
    /// Resume a suspended audio context after a user gesture
    async fn unlock_audio(&self) -> VoiceResult<()> {
        Ok(())
    }

    /// Keep the screen awake for the duration of a session
    async fn acquire_wake_lock(&self) -> VoiceResult<()> {
        Ok(())
    }

    async fn release_wake_lock(&self) -> VoiceResult<()> {
        Ok(())
    }

    /// Vibrate with alternating on/off durations
    fn vibrate(&self, _pattern: &[Duration]) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlatform;

impl Platform for NoopPlatform {}
