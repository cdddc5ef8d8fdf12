//! Scripted fakes shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use voice_session::engine::{Player, Recognizer, Synthesizer};
use voice_session::{
    AssistantApi, AssistantReply, ConversationHistory, Platform, RecognitionEvent, SessionConfig,
    SessionStatus, SpeechEngine, SpeechSettings, SpeechToken, SpeechTokenSource,
    SpeechTransport, SynthesisOutcome, TokenCache, TransportConfig, Utterance, VoiceError,
    VoiceResult, VoiceSession,
};

// ============================================================================
// Speech engine
// ============================================================================

struct UtteranceControl {
    text: String,
    outcome: Option<oneshot::Sender<SynthesisOutcome>>,
    audio_end: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct EngineState {
    log: Vec<String>,
    recognition_events: Option<mpsc::UnboundedSender<RecognitionEvent>>,
    utterances: Vec<UtteranceControl>,
    fail_recognition: bool,
    auto_end_playback: bool,
    live_players: usize,
    max_live_players: usize,
}

/// Speech engine driven by the test: recognition events and playback
/// completion are pushed by hand, every handle call is logged
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.state.lock().log.iter().filter(|e| *e == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.state.lock().log.iter().position(|e| e == entry)
    }

    pub fn fail_recognition(&self) {
        self.state.lock().fail_recognition = true;
    }

    /// Report playback end as soon as an utterance is synthesized
    pub fn auto_end_playback(&self) {
        self.state.lock().auto_end_playback = true;
    }

    fn emit(&self, event: RecognitionEvent) {
        let sender = self.state.lock().recognition_events.clone();
        let sender = sender.expect("no active recognition");
        sender.send(event).expect("recognition channel closed");
    }

    pub fn partial(&self, text: &str) {
        self.emit(RecognitionEvent::Recognizing(text.to_string()));
    }

    pub fn final_text(&self, text: &str) {
        self.emit(RecognitionEvent::Recognized(text.to_string()));
    }

    pub fn cancel_recognition(&self, error: Option<&str>) {
        self.emit(RecognitionEvent::Canceled {
            error: error.map(str::to_string),
        });
    }

    pub fn utterance_count(&self) -> usize {
        self.state.lock().utterances.len()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.state
            .lock()
            .utterances
            .iter()
            .map(|u| u.text.clone())
            .collect()
    }

    pub fn max_live_players(&self) -> usize {
        self.state.lock().max_live_players
    }

    fn send_outcome(&self, index: usize, outcome: SynthesisOutcome) {
        let sender = self.state.lock().utterances[index].outcome.take();
        if let Some(sender) = sender {
            let _ = sender.send(outcome);
        }
    }

    pub fn complete_synthesis(&self, index: usize) {
        self.send_outcome(index, SynthesisOutcome::Completed);
    }

    pub fn cancel_synthesis(&self, index: usize) {
        self.send_outcome(index, SynthesisOutcome::Canceled);
    }

    pub fn fail_synthesis(&self, index: usize, details: &str) {
        self.send_outcome(index, SynthesisOutcome::Failed(details.to_string()));
    }

    pub fn end_audio(&self, index: usize) {
        let sender = self.state.lock().utterances[index].audio_end.take();
        if let Some(sender) = sender {
            let _ = sender.send(());
        }
    }

    /// Synthesis completes, then the audio destination reports the end
    pub fn end_playback(&self, index: usize) {
        self.complete_synthesis(index);
        self.end_audio(index);
    }
}

#[async_trait]
impl SpeechEngine for FakeEngine {
    async fn start_recognition(
        &self,
        _settings: &SpeechSettings,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> VoiceResult<Box<dyn Recognizer>> {
        let mut state = self.state.lock();
        state.log.push("start_recognition".to_string());
        if state.fail_recognition {
            return Err(VoiceError::RecognitionStart(
                "microphone permission denied".to_string(),
            ));
        }
        state.recognition_events = Some(events);

        Ok(Box::new(FakeRecognizer {
            state: Arc::clone(&self.state),
        }))
    }

    async fn synthesize(&self, _settings: &SpeechSettings, text: &str) -> VoiceResult<Utterance> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (audio_end_tx, audio_end_rx) = oneshot::channel();

        let mut state = self.state.lock();
        state.log.push("synthesize".to_string());
        state.live_players += 1;
        state.max_live_players = state.max_live_players.max(state.live_players);

        let mut control = UtteranceControl {
            text: text.to_string(),
            outcome: Some(outcome_tx),
            audio_end: Some(audio_end_tx),
        };
        if state.auto_end_playback {
            if let Some(outcome) = control.outcome.take() {
                let _ = outcome.send(SynthesisOutcome::Completed);
            }
            if let Some(audio_end) = control.audio_end.take() {
                let _ = audio_end.send(());
            }
        }
        state.utterances.push(control);

        Ok(Utterance {
            synthesizer: Box::new(FakeSynthesizer {
                state: Arc::clone(&self.state),
            }),
            player: Box::new(FakePlayer {
                state: Arc::clone(&self.state),
                closed: false,
            }),
            outcome: outcome_rx,
            audio_end: audio_end_rx,
        })
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FakeRecognizer {
    state: Arc<Mutex<EngineState>>,
}

#[async_trait]
impl Recognizer for FakeRecognizer {
    async fn stop(&mut self) -> VoiceResult<()> {
        self.state.lock().log.push("recognizer.stop".to_string());
        Ok(())
    }

    async fn pause(&mut self) -> VoiceResult<()> {
        self.state.lock().log.push("recognizer.pause".to_string());
        Ok(())
    }

    async fn resume(&mut self) -> VoiceResult<()> {
        self.state.lock().log.push("recognizer.resume".to_string());
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.log.push("recognizer.close".to_string());
        state.recognition_events = None;
    }
}

struct FakeSynthesizer {
    state: Arc<Mutex<EngineState>>,
}

impl Synthesizer for FakeSynthesizer {
    fn close(&mut self) {
        self.state.lock().log.push("synthesizer.close".to_string());
    }
}

struct FakePlayer {
    state: Arc<Mutex<EngineState>>,
    closed: bool,
}

impl Player for FakePlayer {
    fn pause(&mut self) {
        self.state.lock().log.push("player.pause".to_string());
    }

    fn close(&mut self) {
        let mut state = self.state.lock();
        state.log.push("player.close".to_string());
        if !self.closed {
            self.closed = true;
            state.live_players -= 1;
        }
    }
}

// ============================================================================
// Backend
// ============================================================================

#[derive(Default)]
pub struct FakeTokenSource {
    fetches: AtomicUsize,
    fail: AtomicBool,
}

impl FakeTokenSource {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SpeechTokenSource for FakeTokenSource {
    async fn fetch_speech_token(&self) -> VoiceResult<SpeechToken> {
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(VoiceError::Credential("backend unreachable".to_string()));
        }
        Ok(SpeechToken {
            token: format!("token-{}", n),
            region: "westeurope".to_string(),
        })
    }
}

/// Assistant answering from a script; `hold` blocks the next request
#[derive(Default)]
pub struct FakeAssistant {
    replies: Mutex<VecDeque<Result<AssistantReply, String>>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    requests: Mutex<Vec<String>>,
}

impl FakeAssistant {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_reply(&self, text: &str, agent: &str) {
        self.replies.lock().push_back(Ok(AssistantReply {
            text: text.to_string(),
            agent: Some(agent.to_string()),
        }));
    }

    pub fn push_failure(&self, details: &str) {
        self.replies.lock().push_back(Err(details.to_string()));
    }

    /// The next request waits until the returned sender fires or is dropped
    pub fn hold(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock() = Some(rx);
        tx
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl AssistantApi for FakeAssistant {
    async fn send_message(&self, text: &str) -> VoiceResult<AssistantReply> {
        self.requests.lock().push(text.to_string());

        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(details)) => Err(VoiceError::Backend(details)),
            None => Err(VoiceError::Backend("no reply scripted".to_string())),
        }
    }
}

// ============================================================================
// Platform
// ============================================================================

#[derive(Default)]
pub struct RecordingPlatform {
    calls: Mutex<Vec<String>>,
}

impl RecordingPlatform {
    pub fn count(&self, call: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }
}

#[async_trait]
impl Platform for RecordingPlatform {
    async fn unlock_audio(&self) -> VoiceResult<()> {
        self.calls.lock().push("unlock_audio".to_string());
        Ok(())
    }

    async fn acquire_wake_lock(&self) -> VoiceResult<()> {
        self.calls.lock().push("acquire_wake_lock".to_string());
        Ok(())
    }

    async fn release_wake_lock(&self) -> VoiceResult<()> {
        self.calls.lock().push("release_wake_lock".to_string());
        Ok(())
    }

    fn vibrate(&self, _pattern: &[Duration]) {
        self.calls.lock().push("vibrate".to_string());
    }
}

// ============================================================================
// Harnesses
// ============================================================================

pub struct TransportHarness {
    pub engine: FakeEngine,
    pub tokens: Arc<FakeTokenSource>,
    pub platform: Arc<RecordingPlatform>,
    pub transport: Arc<SpeechTransport>,
}

pub fn transport() -> TransportHarness {
    transport_with(TransportConfig::default())
}

pub fn transport_with(config: TransportConfig) -> TransportHarness {
    let engine = FakeEngine::new();
    let tokens = Arc::new(FakeTokenSource::default());
    let platform = Arc::new(RecordingPlatform::default());

    let transport = SpeechTransport::new(
        config,
        Arc::new(engine.clone()),
        Arc::new(TokenCache::new(tokens.clone())),
    )
    .with_platform(platform.clone());

    TransportHarness {
        engine,
        tokens,
        platform,
        transport: Arc::new(transport),
    }
}

pub struct SessionHarness {
    pub engine: FakeEngine,
    pub assistant: Arc<FakeAssistant>,
    pub platform: Arc<RecordingPlatform>,
    pub history: Arc<ConversationHistory>,
    pub session: VoiceSession,
}

pub fn session() -> SessionHarness {
    let TransportHarness {
        engine,
        platform,
        transport,
        ..
    } = transport();

    let assistant = FakeAssistant::new();
    let history = Arc::new(ConversationHistory::new());
    let session = VoiceSession::new(
        SessionConfig::default(),
        transport,
        assistant.clone(),
        history.clone(),
        platform.clone(),
    );

    SessionHarness {
        engine,
        assistant,
        platform,
        history,
        session,
    }
}

// ============================================================================
// Waiting
// ============================================================================

/// Poll `condition` until it holds, failing the test after a few seconds
pub async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(3), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "timed out waiting for {}", what);
}

pub async fn next_status(statuses: &mut broadcast::Receiver<SessionStatus>) -> SessionStatus {
    tokio::time::timeout(Duration::from_secs(3), statuses.recv())
        .await
        .expect("timed out waiting for a status change")
        .expect("status channel closed")
}

/// Let spawned tasks drain their queues
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
