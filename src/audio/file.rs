use super::backend::{AudioFrame, MicrophoneConfig, MicrophoneProvider, MicrophoneSource};
use crate::error::{VoiceError, VoiceResult};
use async_trait::async_trait;
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Decoded WAV file
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> VoiceResult<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()?;

        if spec.sample_rate == 0 || spec.channels == 0 {
            return Err(VoiceError::AudioDevice(format!(
                "Invalid WAV format in {}",
                path.display()
            )));
        }

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Replays a WAV file in real time, looping, as the microphone tap
pub struct WavMicrophone {
    audio: Arc<AudioFile>,
    config: MicrophoneConfig,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavMicrophone {
    pub fn new(audio: Arc<AudioFile>, config: MicrophoneConfig) -> Self {
        Self {
            audio,
            config,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    fn frame_len(&self) -> usize {
        let per_channel =
            self.audio.sample_rate as u64 * self.config.buffer_duration_ms.max(1) / 1000;
        (per_channel.max(1) as usize) * self.audio.channels as usize
    }
}

#[async_trait]
impl MicrophoneSource for WavMicrophone {
    async fn start(&mut self) -> VoiceResult<mpsc::Receiver<AudioFrame>> {
        if self.audio.samples.is_empty() {
            return Err(VoiceError::AudioDevice(format!(
                "{} contains no samples",
                self.audio.path
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        let audio = Arc::clone(&self.audio);
        let capturing = Arc::clone(&self.capturing);
        let frame_len = self.frame_len();
        let interval = Duration::from_millis(self.config.buffer_duration_ms.max(1));

        capturing.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut timestamp_ms = 0u64;

            'replay: while capturing.load(Ordering::SeqCst) {
                for chunk in audio.samples.chunks(frame_len) {
                    ticker.tick().await;

                    let frame = AudioFrame {
                        samples: chunk.to_vec(),
                        sample_rate: audio.sample_rate,
                        channels: audio.channels,
                        timestamp_ms,
                    };
                    timestamp_ms += interval.as_millis() as u64;

                    if tx.send(frame).await.is_err() || !capturing.load(Ordering::SeqCst) {
                        break 'replay;
                    }
                }
            }

            capturing.store(false, Ordering::SeqCst);
        });

        self.task = Some(task);
        info!("Replaying {} as microphone input", self.audio.path);

        Ok(rx)
    }

    async fn stop(&mut self) -> VoiceResult<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}

impl Drop for WavMicrophone {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Opens a [`WavMicrophone`] over the same decoded file on every listen
pub struct WavMicrophoneProvider {
    audio: Arc<AudioFile>,
    config: MicrophoneConfig,
}

impl WavMicrophoneProvider {
    pub fn open_file(path: impl Into<PathBuf>, config: MicrophoneConfig) -> VoiceResult<Self> {
        let audio = AudioFile::open(path.into())?;
        Ok(Self {
            audio: Arc::new(audio),
            config,
        })
    }
}

impl MicrophoneProvider for WavMicrophoneProvider {
    fn open(&self) -> VoiceResult<Box<dyn MicrophoneSource>> {
        Ok(Box::new(WavMicrophone::new(
            Arc::clone(&self.audio),
            self.config.clone(),
        )))
    }
}
