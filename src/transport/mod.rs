//! Transport adapter
//!
//! `SpeechTransport` hides the speech engine's callback style behind a few
//! async operations and owns every hardware handle: the recognizer, the
//! synthesizer and player of the current utterance, and the microphone tap
//! feeding the frequency analyser. At most one of each is alive at a time and
//! all of them are released on stop, error or interruption.
//!
//! Flags that callbacks and other tasks read (speaking, interrupted, muted)
//! are atomics so every reader sees the live value.

use crate::audio::{
    speaking_envelope, FrequencyAnalyser, MicrophoneProvider, SpectrumHandle, FREQUENCY_BIN_COUNT,
};
use crate::backend::TokenCache;
use crate::engine::{
    Player, RecognitionEvent, Recognizer, SpeechEngine, SpeechSettings, SynthesisOutcome,
    Synthesizer, Utterance,
};
use crate::error::{VoiceError, VoiceResult};
use crate::platform::{NoopPlatform, Platform};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Transport tuning
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub recognition_language: String,
    pub synthesis_voice: String,
    /// Lower bound of the playback fallback timeout
    pub min_playback_timeout: Duration,
    /// Fallback timeout budget per character of text
    pub playback_ms_per_char: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recognition_language: "it-IT".to_string(),
            synthesis_voice: "it-IT-ElsaNeural".to_string(),
            min_playback_timeout: Duration::from_millis(5000),
            playback_ms_per_char: 80,
        }
    }
}

impl TransportConfig {
    /// How long `speak` waits for the playback-ended signal before resolving anyway
    pub fn playback_timeout(&self, text: &str) -> Duration {
        let chars = text.chars().count() as u64;
        let scaled = Duration::from_millis(self.playback_ms_per_char.saturating_mul(chars));
        scaled.max(self.min_playback_timeout)
    }
}

/// Recognition output forwarded to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// Interim hypothesis for speech still in progress
    Partial(String),
    /// Transcript of a complete utterance
    Final(String),
    /// The recognizer stopped on its own and sends nothing more
    Ended { error: Option<String> },
}

impl TranscriptEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self::Partial(text.into())
    }

    pub fn final_text(text: impl Into<String>) -> Self {
        Self::Final(text.into())
    }
}

/// Position in the sequence of `stop_speaking` calls
///
/// Taken before deciding to speak; `speak_unless_stopped` plays nothing if
/// speech was stopped after the ticket was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechTicket(u64);

/// Why recognition events are being suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteReason {
    /// Mute toggle: the recognizer is paused and every event is dropped
    User,
    /// Assistant audio is playing: final transcripts are dropped so the device
    /// cannot answer itself. Partial transcripts that repeat the text being
    /// spoken are echo and dropped too; any other partial is the user talking
    /// over the assistant, passes for barge-in and lifts this mute.
    Playback,
}

#[derive(Default)]
struct TransportFlags {
    listening: AtomicBool,
    muted_by_user: AtomicBool,
    muted_for_playback: AtomicBool,
    speaking: AtomicBool,
    interrupted: AtomicBool,
}

/// Handles of the utterance currently being spoken
struct Playback {
    generation: u64,
    /// Normalized words of the text being spoken
    script: Vec<String>,
    synthesizer: Option<Box<dyn Synthesizer>>,
    player: Option<Box<dyn Player>>,
    done: Option<oneshot::Sender<()>>,
}

impl Playback {
    fn new(generation: u64, text: &str, done: oneshot::Sender<()>) -> Self {
        Self {
            generation,
            script: normalized_words(text),
            synthesizer: None,
            player: None,
            done: Some(done),
        }
    }

    /// Silence and close every handle, then unblock the waiting `speak`
    fn release(mut self) {
        if let Some(mut player) = self.player.take() {
            player.pause();
            player.close();
        }
        if let Some(mut synthesizer) = self.synthesizer.take() {
            synthesizer.close();
        }
        if let Some(done) = self.done.take() {
            let _ = done.send(());
        }
    }
}

#[derive(Default)]
struct TransportState {
    playback: Option<Playback>,
    next_generation: u64,
    /// Number of `stop_speaking` calls so far
    stops: u64,
    speaking_since: Option<Instant>,
    spectrum: Option<SpectrumHandle>,
    error: Option<String>,
    audio_unlocked: bool,
}

struct ActiveRecognition {
    recognizer: Box<dyn Recognizer>,
    forwarder: JoinHandle<()>,
    analyser: Option<FrequencyAnalyser>,
}

impl ActiveRecognition {
    async fn release(mut self) {
        if let Err(e) = self.recognizer.stop().await {
            error!("Error stopping recognition: {}", e);
        }
        self.recognizer.close();
        self.forwarder.abort();

        if let Some(analyser) = self.analyser.take() {
            analyser.stop().await;
        }
    }
}

pub struct SpeechTransport {
    config: TransportConfig,
    engine: Arc<dyn SpeechEngine>,
    tokens: Arc<TokenCache>,
    microphone: Option<Arc<dyn MicrophoneProvider>>,
    platform: Arc<dyn Platform>,
    flags: Arc<TransportFlags>,
    state: Arc<Mutex<TransportState>>,
    recognition: tokio::sync::Mutex<Option<ActiveRecognition>>,
}

impl SpeechTransport {
    pub fn new(config: TransportConfig, engine: Arc<dyn SpeechEngine>, tokens: Arc<TokenCache>) -> Self {
        Self {
            config,
            engine,
            tokens,
            microphone: None,
            platform: Arc::new(NoopPlatform),
            flags: Arc::new(TransportFlags::default()),
            state: Arc::new(Mutex::new(TransportState::default())),
            recognition: tokio::sync::Mutex::new(None),
        }
    }

    /// Attach a microphone tap for frequency analysis
    pub fn with_microphone(mut self, microphone: Arc<dyn MicrophoneProvider>) -> Self {
        self.microphone = Some(microphone);
        self
    }

    pub fn with_platform(mut self, platform: Arc<dyn Platform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    async fn speech_settings(&self) -> VoiceResult<SpeechSettings> {
        let token = self.tokens.get_token().await?;
        Ok(SpeechSettings {
            token: token.token,
            region: token.region,
            recognition_language: self.config.recognition_language.clone(),
            synthesis_voice: self.config.synthesis_voice.clone(),
        })
    }

    // ------------------------------------------------------------------
    // Recognition
    // ------------------------------------------------------------------

    /// Start continuous recognition, forwarding transcripts to `sink`
    ///
    /// A second call while a recognizer is active is a no-op; a recognizer that
    /// already ended on its own is released and replaced. On failure the error
    /// is recorded and listening stays off.
    pub async fn start_listening(&self, sink: mpsc::UnboundedSender<TranscriptEvent>) -> VoiceResult<()> {
        let mut slot = self.recognition.lock().await;
        if let Some(active) = slot.as_ref() {
            if !active.forwarder.is_finished() {
                info!("Already listening");
                return Ok(());
            }
        }
        if let Some(stale) = slot.take() {
            debug!("Releasing recognizer that ended on its own");
            stale.release().await;
        }

        self.state.lock().error = None;
        self.unlock_audio().await;

        let settings = match self.speech_settings().await {
            Ok(settings) => settings,
            Err(e) => return Err(self.listen_failed(e)),
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let recognizer = match self.engine.start_recognition(&settings, events_tx).await {
            Ok(recognizer) => recognizer,
            Err(e) => {
                self.tokens.invalidate().await;
                return Err(self.listen_failed(e));
            }
        };

        let analyser = self.open_analyser().await;
        self.state.lock().spectrum = analyser.as_ref().map(FrequencyAnalyser::spectrum);

        self.flags.muted_by_user.store(false, Ordering::SeqCst);
        self.flags.muted_for_playback.store(false, Ordering::SeqCst);
        self.flags.listening.store(true, Ordering::SeqCst);

        let forwarder = tokio::spawn(forward_recognition(
            events_rx,
            sink,
            Arc::clone(&self.flags),
            Arc::clone(&self.state),
        ));

        *slot = Some(ActiveRecognition {
            recognizer,
            forwarder,
            analyser,
        });

        info!("Started listening ({})", self.engine.name());
        Ok(())
    }

    fn listen_failed(&self, e: VoiceError) -> VoiceError {
        error!("Failed to start listening: {}", e);
        self.state.lock().error = Some(e.to_string());
        self.flags.listening.store(false, Ordering::SeqCst);
        e
    }

    async fn unlock_audio(&self) {
        let unlocked = self.state.lock().audio_unlocked;
        if unlocked {
            return;
        }
        match self.platform.unlock_audio().await {
            Ok(()) => {
                self.state.lock().audio_unlocked = true;
                debug!("Audio output unlocked");
            }
            Err(e) => warn!("Audio unlock failed: {}", e),
        }
    }

    async fn open_analyser(&self) -> Option<FrequencyAnalyser> {
        let provider = self.microphone.as_ref()?;
        let source = match provider.open() {
            Ok(source) => source,
            Err(e) => {
                warn!("Microphone tap unavailable: {}", e);
                return None;
            }
        };
        match FrequencyAnalyser::start(source).await {
            Ok(analyser) => Some(analyser),
            Err(e) => {
                warn!("Frequency analyser unavailable: {}", e);
                None
            }
        }
    }

    /// Stop recognition and release the recognizer, analyser and microphone tap
    pub async fn stop_listening(&self) {
        let active = self.recognition.lock().await.take();

        self.flags.listening.store(false, Ordering::SeqCst);
        self.flags.muted_by_user.store(false, Ordering::SeqCst);
        self.flags.muted_for_playback.store(false, Ordering::SeqCst);
        self.state.lock().spectrum = None;

        let Some(active) = active else {
            return;
        };

        active.release().await;
        info!("Stopped listening");
    }

    /// Suppress recognition events without tearing the recognizer down
    pub async fn pause_listening(&self, reason: MuteReason) {
        match reason {
            MuteReason::Playback => {
                self.flags.muted_for_playback.store(true, Ordering::SeqCst);
                debug!("Microphone muted for playback");
            }
            MuteReason::User => {
                let mut slot = self.recognition.lock().await;
                let Some(active) = slot.as_mut() else {
                    debug!("Not listening, nothing to pause");
                    return;
                };
                if self.flags.muted_by_user.swap(true, Ordering::SeqCst) {
                    return;
                }
                if let Err(e) = active.recognizer.pause().await {
                    warn!("Failed to pause recognizer: {}", e);
                }
                info!("Listening paused");
            }
        }
    }

    pub async fn resume_listening(&self, reason: MuteReason) {
        match reason {
            MuteReason::Playback => {
                if self.flags.muted_for_playback.swap(false, Ordering::SeqCst) {
                    debug!("Microphone unmuted after playback");
                }
            }
            MuteReason::User => {
                let mut slot = self.recognition.lock().await;
                let Some(active) = slot.as_mut() else {
                    debug!("Not listening, nothing to resume");
                    return;
                };
                if !self.flags.muted_by_user.swap(false, Ordering::SeqCst) {
                    return;
                }
                if let Err(e) = active.recognizer.resume().await {
                    warn!("Failed to resume recognizer: {}", e);
                }
                info!("Listening resumed");
            }
        }
    }

    // ------------------------------------------------------------------
    // Synthesis
    // ------------------------------------------------------------------

    /// Speak `text`, resolving once playback has ended
    ///
    /// Any utterance still playing is released first and its `speak` resolves.
    /// Interruption, cancellation and a missing playback-ended signal all
    /// resolve `Ok`; only a synthesis failure is an error.
    pub async fn speak(&self, text: &str) -> VoiceResult<()> {
        self.speak_checked(text, None).await
    }

    /// Like `speak`, but plays nothing if `stop_speaking` ran after `ticket`
    /// was taken
    pub async fn speak_unless_stopped(&self, text: &str, ticket: SpeechTicket) -> VoiceResult<()> {
        self.speak_checked(text, Some(ticket)).await
    }

    pub fn speech_ticket(&self) -> SpeechTicket {
        SpeechTicket(self.state.lock().stops)
    }

    async fn speak_checked(&self, text: &str, ticket: Option<SpeechTicket>) -> VoiceResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let (done_tx, done_rx) = oneshot::channel();
        let (generation, previous) = {
            let mut state = self.state.lock();
            if ticket.is_some_and(|ticket| ticket.0 != state.stops) {
                debug!("Speech stopped before it started, not speaking");
                return Ok(());
            }
            let previous = state.playback.take();
            state.next_generation += 1;
            let generation = state.next_generation;
            state.playback = Some(Playback::new(generation, text, done_tx));
            state.speaking_since = Some(Instant::now());
            (generation, previous)
        };

        if let Some(previous) = previous {
            debug!("Cancelling previous utterance");
            previous.release();
        }

        self.flags.speaking.store(true, Ordering::SeqCst);
        let _guard = PlaybackGuard {
            transport: self,
            generation,
        };

        let result = self.play(generation, text, done_rx).await;
        if let Err(e) = &result {
            error!("TTS error: {}", e);
            self.state.lock().error = Some(e.to_string());
        }
        result
    }

    async fn play(&self, generation: u64, text: &str, mut done: oneshot::Receiver<()>) -> VoiceResult<()> {
        let settings = tokio::select! {
            _ = &mut done => return Ok(()),
            settings = self.speech_settings() => settings?,
        };

        let utterance = tokio::select! {
            _ = &mut done => return Ok(()),
            utterance = self.engine.synthesize(&settings, text) => utterance?,
        };

        let Utterance {
            synthesizer,
            player,
            outcome,
            audio_end,
        } = utterance;

        let superseded = {
            let mut state = self.state.lock();
            match state.playback.as_mut() {
                Some(playback) if playback.generation == generation => {
                    playback.synthesizer = Some(synthesizer);
                    playback.player = Some(player);
                    None
                }
                _ => Some((synthesizer, player)),
            }
        };

        if let Some((mut synthesizer, mut player)) = superseded {
            debug!("Utterance superseded before playback started");
            player.close();
            synthesizer.close();
            return Ok(());
        }

        let timeout = self.config.playback_timeout(text);

        let playback_ended = async {
            if audio_end.await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        let synthesis = async {
            match outcome.await {
                Ok(SynthesisOutcome::Canceled) => Ok(()),
                Ok(SynthesisOutcome::Failed(details)) => Err(VoiceError::Synthesis(details)),
                // Completed: keep waiting for the player
                Ok(SynthesisOutcome::Completed) | Err(_) => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = done => {
                debug!("Speech interrupted");
                Ok(())
            }
            _ = playback_ended => {
                debug!("Playback finished");
                Ok(())
            }
            result = synthesis => result,
            _ = tokio::time::sleep(timeout) => {
                warn!("Playback end not reported after {:?}, resolving", timeout);
                Ok(())
            }
        }
    }

    fn finish_playback(&self, generation: u64) {
        let playback = {
            let mut state = self.state.lock();
            if state.playback.as_ref().map(|p| p.generation) != Some(generation) {
                return;
            }
            state.speaking_since = None;
            state.playback.take()
        };

        self.flags.speaking.store(false, Ordering::SeqCst);
        if let Some(playback) = playback {
            playback.release();
        }
    }

    /// Cut the current utterance off immediately and mark the turn interrupted
    ///
    /// Safe to call when nothing is playing.
    pub fn stop_speaking(&self) {
        self.flags.interrupted.store(true, Ordering::SeqCst);

        let playback = {
            let mut state = self.state.lock();
            state.stops += 1;
            state.speaking_since = None;
            state.playback.take()
        };
        self.flags.speaking.store(false, Ordering::SeqCst);

        if let Some(playback) = playback {
            info!("Interrupting TTS");
            playback.release();
        }
    }

    // ------------------------------------------------------------------
    // Read-only state
    // ------------------------------------------------------------------

    /// 64 byte magnitudes for the visualizer, `None` when idle
    pub fn get_frequency_data(&self) -> Option<Vec<u8>> {
        let state = self.state.lock();

        if self.flags.speaking.load(Ordering::SeqCst) {
            let elapsed = state
                .speaking_since
                .map(|since| since.elapsed())
                .unwrap_or_default();
            return Some(speaking_envelope(elapsed));
        }

        if !self.flags.listening.load(Ordering::SeqCst) {
            return None;
        }

        if self.flags.muted_by_user.load(Ordering::SeqCst) {
            return Some(vec![0; FREQUENCY_BIN_COUNT]);
        }

        Some(
            state
                .spectrum
                .as_ref()
                .map(|spectrum| spectrum.lock().clone())
                .unwrap_or_else(|| vec![0; FREQUENCY_BIN_COUNT]),
        )
    }

    pub fn check_is_speaking(&self) -> bool {
        self.flags.speaking.load(Ordering::SeqCst)
    }

    pub fn was_interrupted(&self) -> bool {
        self.flags.interrupted.load(Ordering::SeqCst)
    }

    pub fn clear_interrupted(&self) {
        self.flags.interrupted.store(false, Ordering::SeqCst);
    }

    /// Flag the current turn as interrupted without touching playback
    pub fn mark_interrupted(&self) {
        self.flags.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_listening(&self) -> bool {
        self.flags.listening.load(Ordering::SeqCst)
    }

    pub fn is_muted(&self) -> bool {
        self.flags.muted_by_user.load(Ordering::SeqCst)
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }
}

impl Drop for SpeechTransport {
    fn drop(&mut self) {
        if let Some(playback) = self.state.lock().playback.take() {
            playback.release();
        }
        if let Some(mut active) = self.recognition.get_mut().take() {
            active.recognizer.close();
            active.forwarder.abort();
        }
    }
}

/// Clears the speaking state when `speak` returns or its future is dropped
struct PlaybackGuard<'a> {
    transport: &'a SpeechTransport,
    generation: u64,
}

impl Drop for PlaybackGuard<'_> {
    fn drop(&mut self) {
        self.transport.finish_playback(self.generation);
    }
}

async fn forward_recognition(
    mut events: mpsc::UnboundedReceiver<RecognitionEvent>,
    sink: mpsc::UnboundedSender<TranscriptEvent>,
    flags: Arc<TransportFlags>,
    state: Arc<Mutex<TransportState>>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RecognitionEvent::Recognizing(text) => {
                let text = text.trim();
                if text.is_empty() || flags.muted_by_user.load(Ordering::SeqCst) {
                    continue;
                }
                if flags.muted_for_playback.load(Ordering::SeqCst) {
                    if is_echo(&state, text) {
                        debug!("Dropping echo of assistant speech: {}", text);
                        continue;
                    }
                    // The user is talking over the assistant: let the rest of
                    // the utterance through so its final transcript is not lost.
                    if flags.speaking.load(Ordering::SeqCst)
                        && flags.muted_for_playback.swap(false, Ordering::SeqCst)
                    {
                        debug!("Speech detected over playback, lifting playback mute");
                    }
                }
                if sink.send(TranscriptEvent::partial(text)).is_err() {
                    break;
                }
            }
            RecognitionEvent::Recognized(text) => {
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if flags.muted_by_user.load(Ordering::SeqCst)
                    || flags.muted_for_playback.load(Ordering::SeqCst)
                {
                    debug!("Muted, dropping transcript: {}", text);
                    continue;
                }
                if sink.send(TranscriptEvent::final_text(text)).is_err() {
                    break;
                }
            }
            RecognitionEvent::Canceled { error: details } => {
                match &details {
                    Some(details) => {
                        error!("STT Error: {}", details);
                        state.lock().error = Some(details.clone());
                    }
                    None => info!("Recognition canceled"),
                }
                flags.listening.store(false, Ordering::SeqCst);
                let _ = sink.send(TranscriptEvent::Ended { error: details });
                break;
            }
        }
    }

    debug!("Recognition forwarder stopped");
}

/// Whether `heard` repeats a run of the utterance currently playing
fn is_echo(state: &Mutex<TransportState>, heard: &str) -> bool {
    let state = state.lock();
    state
        .playback
        .as_ref()
        .is_some_and(|playback| repeats_script(&playback.script, heard))
}

fn normalized_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

/// Contiguous match of `heard` inside `script`; the last heard word may be
/// cut short, as interim hypotheses often are
fn repeats_script(script: &[String], heard: &str) -> bool {
    let heard = normalized_words(heard);
    let Some((last, leading)) = heard.split_last() else {
        return true;
    };
    if heard.len() > script.len() {
        return false;
    }
    script.windows(heard.len()).any(|window| {
        window[..leading.len()] == *leading && window[leading.len()].starts_with(last.as_str())
    })
}
