//! Speech engine capability interface
//!
//! The transport talks to a streaming speech-to-text / text-to-speech engine
//! only through these traits. Engine callbacks are delivered as channel
//! messages so the transport can own every handle the engine hands out.
//!
//! Implementations:
//! - [`console::ConsoleEngine`]: stdin utterances and timed simulated playback
//! - test fakes (see `tests/common`)

pub mod console;

pub use console::ConsoleEngine;

use crate::error::VoiceResult;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

/// Everything an engine needs to open a recognition or synthesis session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechSettings {
    pub token: String,
    pub region: String,
    pub recognition_language: String,
    pub synthesis_voice: String,
}

/// Raw recognition callbacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    /// Interim hypothesis for the utterance in progress
    Recognizing(String),
    /// Finalized utterance
    Recognized(String),
    /// Recognition was cancelled; `error` is set when the engine failed
    Canceled { error: Option<String> },
}

/// How a synthesis request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    /// Audio fully generated; playback may still be running
    Completed,
    Canceled,
    Failed(String),
}

/// Handles and completion signals for one synthesized utterance
pub struct Utterance {
    pub synthesizer: Box<dyn Synthesizer>,
    pub player: Box<dyn Player>,
    /// Synthesis result callback
    pub outcome: oneshot::Receiver<SynthesisOutcome>,
    /// Fires when the audio destination finished playing
    pub audio_end: oneshot::Receiver<()>,
}

/// Speech engine (recognizer and synthesizer factory)
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Open continuous recognition on the default microphone.
    ///
    /// Events are pushed to `events` until the returned recognizer is stopped.
    async fn start_recognition(
        &self,
        settings: &SpeechSettings,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> VoiceResult<Box<dyn Recognizer>>;

    /// Start synthesizing `text` into a fresh audio destination
    async fn synthesize(&self, settings: &SpeechSettings, text: &str) -> VoiceResult<Utterance>;

    /// Engine name for logging
    fn name(&self) -> &str;
}

/// Live continuous-recognition session
#[async_trait]
pub trait Recognizer: Send {
    async fn stop(&mut self) -> VoiceResult<()>;

    /// Stop delivering events while keeping the session and microphone open
    async fn pause(&mut self) -> VoiceResult<()>;

    async fn resume(&mut self) -> VoiceResult<()>;

    /// Release the underlying handle
    fn close(&mut self);
}

/// Synthesis handle
pub trait Synthesizer: Send {
    fn close(&mut self);
}

/// Per-utterance audio destination
pub trait Player: Send {
    fn pause(&mut self);
    fn close(&mut self);
}
