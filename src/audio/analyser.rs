//! Microphone frequency analyser
//!
//! Mirrors the browser analyser node: a 128-sample Blackman-windowed FFT,
//! exponential smoothing between frames, and magnitudes mapped linearly from
//! the -100..-30 dB range onto bytes.

use super::backend::MicrophoneSource;
use crate::error::VoiceResult;
use parking_lot::Mutex;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const FFT_SIZE: usize = 128;
pub const FREQUENCY_BIN_COUNT: usize = FFT_SIZE / 2;

const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;
const SMOOTHING_TIME_CONSTANT: f32 = 0.8;

/// Latest byte magnitudes, shared between the tap task and readers
pub type SpectrumHandle = Arc<Mutex<Vec<u8>>>;

pub struct SpectrumAnalyser {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    time_domain: VecDeque<f32>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        let window = (0..FFT_SIZE)
            .map(|n| {
                let x = n as f32 / FFT_SIZE as f32;
                0.42 - 0.5 * (2.0 * PI * x).cos() + 0.08 * (4.0 * PI * x).cos()
            })
            .collect();

        Self {
            fft,
            window,
            time_domain: VecDeque::from(vec![0.0; FFT_SIZE]),
            smoothed: vec![0.0; FREQUENCY_BIN_COUNT],
        }
    }

    /// Append mono samples, keeping the most recent `FFT_SIZE`
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            if self.time_domain.len() == FFT_SIZE {
                self.time_domain.pop_front();
            }
            self.time_domain.push_back(sample);
        }
    }

    /// Analyse the current window and return one byte per frequency bin
    pub fn byte_frequency_data(&mut self) -> Vec<u8> {
        let mut buffer: Vec<Complex<f32>> = self
            .time_domain
            .iter()
            .zip(&self.window)
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();

        self.fft.process(&mut buffer);

        buffer
            .iter()
            .take(FREQUENCY_BIN_COUNT)
            .zip(self.smoothed.iter_mut())
            .map(|(bin, smoothed)| {
                let magnitude = bin.norm() / FFT_SIZE as f32;
                *smoothed = SMOOTHING_TIME_CONSTANT * *smoothed
                    + (1.0 - SMOOTHING_TIME_CONSTANT) * magnitude;
                to_byte(*smoothed)
            })
            .collect()
    }
}

impl Default for SpectrumAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

fn to_byte(magnitude: f32) -> u8 {
    if magnitude <= 0.0 {
        return 0;
    }
    let db = 20.0 * magnitude.log10();
    let scaled = 255.0 * (db - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
    scaled.clamp(0.0, 255.0) as u8
}

/// Analyser attached to a running microphone tap
pub struct FrequencyAnalyser {
    source: Box<dyn MicrophoneSource>,
    spectrum: SpectrumHandle,
    task: JoinHandle<()>,
}

impl FrequencyAnalyser {
    pub async fn start(mut source: Box<dyn MicrophoneSource>) -> VoiceResult<Self> {
        let mut frames = source.start().await?;
        let spectrum: SpectrumHandle = Arc::new(Mutex::new(vec![0; FREQUENCY_BIN_COUNT]));
        let shared = Arc::clone(&spectrum);

        let task = tokio::spawn(async move {
            let mut analyser = SpectrumAnalyser::new();
            while let Some(frame) = frames.recv().await {
                analyser.push_samples(&frame.to_mono_f32());
                let data = analyser.byte_frequency_data();
                *shared.lock() = data;
            }
            debug!("Microphone tap ended");
        });

        info!("Frequency analyser attached to {}", source.name());

        Ok(Self {
            source,
            spectrum,
            task,
        })
    }

    pub fn spectrum(&self) -> SpectrumHandle {
        Arc::clone(&self.spectrum)
    }

    /// Disconnect the analyser and release the microphone stream
    pub async fn stop(mut self) {
        self.task.abort();
        if let Err(e) = self.source.stop().await {
            warn!("Failed to stop microphone tap {}: {}", self.source.name(), e);
        }
        debug!("Frequency analyser detached");
    }
}

impl Drop for FrequencyAnalyser {
    fn drop(&mut self) {
        self.task.abort();
    }
}
