use crate::error::VoiceResult;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Down-mix to mono `f32` samples in `[-1.0, 1.0]`
    pub fn to_mono_f32(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        self.samples
            .chunks(channels)
            .map(|chunk| {
                let sum: f32 = chunk.iter().map(|&s| s as f32 / 32768.0).sum();
                sum / chunk.len() as f32
            })
            .collect()
    }
}

/// Configuration for a microphone tap
#[derive(Debug, Clone)]
pub struct MicrophoneConfig {
    /// Buffer size in milliseconds (affects analyser latency)
    pub buffer_duration_ms: u64,
}

impl Default for MicrophoneConfig {
    fn default() -> Self {
        Self {
            buffer_duration_ms: 20,
        }
    }
}

/// Raw microphone tap feeding the frequency analyser
///
/// This is a separate stream from the one the speech engine records from.
#[async_trait]
pub trait MicrophoneSource: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> VoiceResult<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the device
    async fn stop(&mut self) -> VoiceResult<()>;

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Opens a fresh microphone tap each time listening starts
pub trait MicrophoneProvider: Send + Sync {
    fn open(&self) -> VoiceResult<Box<dyn MicrophoneSource>>;
}
