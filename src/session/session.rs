use super::config::SessionConfig;
use super::history::{ConversationHistory, Role};
use super::status::{SessionStatus, VoiceSnapshot};
use crate::backend::{AssistantApi, AssistantReply};
use crate::error::VoiceResult;
use crate::platform::Platform;
use crate::transport::{MuteReason, SpeechTransport, TranscriptEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const STATUS_CHANNEL_CAPACITY: usize = 64;
const TOGGLE_VIBRATION: Duration = Duration::from_millis(50);

/// A voice conversation: listens, asks the assistant, speaks the reply
///
/// Cloning is cheap; every clone drives the same session.
#[derive(Clone)]
pub struct VoiceSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    /// Session configuration
    config: SessionConfig,

    /// Speech engine adapter, owner of every audio resource
    transport: Arc<SpeechTransport>,

    /// Chat endpoint answering final transcripts
    assistant: Arc<dyn AssistantApi>,

    /// Messages exchanged so far
    history: Arc<ConversationHistory>,

    /// Wake lock and haptics
    platform: Arc<dyn Platform>,

    /// Mutable session state
    state: Mutex<SessionState>,

    /// Status change notifications
    status_tx: broadcast::Sender<SessionStatus>,

    /// Event loop and turn worker of the running session
    tasks: tokio::sync::Mutex<Option<SessionTasks>>,
}

#[derive(Default)]
struct SessionState {
    active: bool,
    /// The recognizer of this session is alive
    recognizing: bool,
    muted: bool,
    processing: bool,
    status: SessionStatus,
    /// Bumped on every start and stop; work from an older epoch is discarded
    epoch: u64,
    last_transcription: String,
    error: Option<String>,
}

impl SessionState {
    fn is_current(&self, epoch: u64) -> bool {
        self.active && self.epoch == epoch
    }

    fn resting_status(&self) -> SessionStatus {
        if !self.recognizing {
            SessionStatus::Idle
        } else if self.muted {
            SessionStatus::Muted
        } else {
            SessionStatus::Listening
        }
    }
}

struct SessionTasks {
    events: JoinHandle<()>,
    turns: JoinHandle<()>,
}

/// A final transcript waiting for the turn worker
struct Turn {
    epoch: u64,
    text: String,
}

impl VoiceSession {
    pub fn new(
        config: SessionConfig,
        transport: Arc<SpeechTransport>,
        assistant: Arc<dyn AssistantApi>,
        history: Arc<ConversationHistory>,
        platform: Arc<dyn Platform>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);

        info!("Creating voice session: {}", config.session_id);

        Self {
            inner: Arc::new(SessionInner {
                config,
                transport,
                assistant,
                history,
                platform,
                state: Mutex::new(SessionState::default()),
                status_tx,
                tasks: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn history(&self) -> &Arc<ConversationHistory> {
        &self.inner.history
    }

    pub fn transport(&self) -> &Arc<SpeechTransport> {
        &self.inner.transport
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.lock().status
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    /// Receive every status change from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SessionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Current UI status contract
    pub fn snapshot(&self) -> VoiceSnapshot {
        let state = self.inner.state.lock();
        let transport = &self.inner.transport;

        VoiceSnapshot {
            is_session_active: state.active,
            is_listening: transport.is_listening(),
            is_speaking: transport.check_is_speaking(),
            is_processing: state.processing,
            is_muted: state.muted,
            status: state.status,
            error: state.error.clone().or_else(|| transport.error()),
            last_transcription: state.last_transcription.clone(),
        }
    }

    /// Visualizer bins, `None` when no session is running
    pub fn get_frequency_data(&self) -> Option<Vec<u8>> {
        if !self.is_active() {
            return None;
        }
        self.inner.transport.get_frequency_data()
    }

    /// Start listening for the user
    ///
    /// A no-op when the session is already listening. A session whose
    /// recognizer failed is restarted with a fresh one. If the microphone or
    /// the recognizer cannot be acquired the session falls back to idle and the
    /// error is returned (and visible in the snapshot).
    pub async fn start_session(&self) -> VoiceResult<()> {
        let mut tasks = self.inner.tasks.lock().await;

        let (epoch, resuming) = {
            let mut state = self.inner.state.lock();
            if state.active && state.recognizing {
                debug!("Voice session already active");
                return Ok(());
            }
            let resuming = state.active;
            state.active = true;
            state.recognizing = true;
            state.muted = false;
            state.processing = false;
            state.epoch += 1;
            state.error = None;
            state.last_transcription.clear();
            (state.epoch, resuming)
        };

        let transport = &self.inner.transport;

        if resuming {
            info!("Restarting recognition: {}", self.inner.config.session_id);
            transport.stop_speaking();
            transport.stop_listening().await;
        } else {
            info!("Starting voice session: {}", self.inner.config.session_id);
        }
        self.set_status(SessionStatus::Listening);

        if !resuming {
            if let Err(e) = self.inner.platform.acquire_wake_lock().await {
                warn!("Wake lock unavailable: {}", e);
            }
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        if let Err(e) = transport.start_listening(events_tx).await {
            error!("Failed to start voice session: {}", e);
            {
                let mut state = self.inner.state.lock();
                state.active = false;
                state.recognizing = false;
                state.error = Some(e.to_string());
            }
            self.set_status(SessionStatus::Idle);
            self.release_wake_lock().await;
            return Err(e);
        }

        transport.clear_interrupted();

        let (turn_tx, turn_rx) = mpsc::channel(self.inner.config.max_pending_turns.max(1));
        let events = tokio::spawn(self.clone().run_event_loop(epoch, events_rx, turn_tx));
        let turns = tokio::spawn(self.clone().run_turns(turn_rx));

        // Tasks of a previous session whose turn worker was still draining
        if let Some(previous) = tasks.replace(SessionTasks { events, turns }) {
            previous.events.abort();
        }

        info!("Voice session started");
        Ok(())
    }

    /// Stop the session and release every audio resource
    ///
    /// Safe to call when nothing is running.
    pub async fn stop_session(&self) {
        let mut tasks = self.inner.tasks.lock().await;

        let was_active = {
            let mut state = self.inner.state.lock();
            let was_active = state.active;
            state.active = false;
            state.recognizing = false;
            state.muted = false;
            state.processing = false;
            state.epoch += 1;
            was_active
        };

        self.set_status(SessionStatus::Idle);

        let transport = &self.inner.transport;
        transport.stop_speaking();
        transport.stop_listening().await;
        transport.clear_interrupted();

        // The turn worker exits on its own once the event loop drops its queue;
        // the epoch bump keeps anything it still finishes out of history
        if let Some(tasks) = tasks.take() {
            tasks.events.abort();
            drop(tasks.turns);
        }

        if was_active {
            self.release_wake_lock().await;
            info!("Voice session stopped: {}", self.inner.config.session_id);
        }
    }

    pub async fn toggle_session(&self) -> VoiceResult<()> {
        self.inner.platform.vibrate(&[TOGGLE_VIBRATION]);

        let running = {
            let state = self.inner.state.lock();
            state.active && state.recognizing
        };

        if running {
            self.stop_session().await;
            Ok(())
        } else {
            self.start_session().await
        }
    }

    /// Mute or unmute the microphone, keeping the recognizer alive
    pub async fn toggle_mute(&self) {
        let muted = {
            let mut state = self.inner.state.lock();
            if !state.active || !state.recognizing {
                debug!("Not listening, ignoring mute toggle");
                return;
            }
            state.muted = !state.muted;
            state.muted
        };

        let transport = &self.inner.transport;
        if muted {
            transport.pause_listening(MuteReason::User).await;
        } else {
            transport.resume_listening(MuteReason::User).await;
        }

        let status = self.inner.state.lock().status;
        if matches!(status, SessionStatus::Listening | SessionStatus::Muted) {
            self.set_status(if muted {
                SessionStatus::Muted
            } else {
                SessionStatus::Listening
            });
        }
    }

    async fn release_wake_lock(&self) {
        if let Err(e) = self.inner.platform.release_wake_lock().await {
            warn!("Failed to release wake lock: {}", e);
        }
    }

    fn set_status(&self, status: SessionStatus) {
        let changed = {
            let mut state = self.inner.state.lock();
            let changed = state.status != status;
            state.status = status;
            changed
        };
        if changed {
            self.announce(status);
        }
    }

    /// Set the status only if `epoch` is still the running session
    fn set_status_for(&self, epoch: u64, status: SessionStatus) {
        {
            let mut state = self.inner.state.lock();
            if !state.is_current(epoch) || state.status == status {
                return;
            }
            state.status = status;
        }
        self.announce(status);
    }

    fn settle_status(&self, epoch: u64) {
        let status = self.inner.state.lock().resting_status();
        self.set_status_for(epoch, status);
    }

    fn announce(&self, status: SessionStatus) {
        info!("Voice status: {}", status);
        let _ = self.inner.status_tx.send(status);
    }

    fn is_processing(&self) -> bool {
        self.inner.state.lock().processing
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.inner.state.lock().is_current(epoch)
    }

    async fn run_event_loop(
        self,
        epoch: u64,
        mut events: mpsc::UnboundedReceiver<TranscriptEvent>,
        turns: mpsc::Sender<Turn>,
    ) {
        while let Some(event) = events.recv().await {
            if !self.is_current(epoch) {
                break;
            }

            match event {
                TranscriptEvent::Partial(text) => {
                    self.inner.state.lock().last_transcription = text;
                    self.on_partial_transcript(epoch).await;
                }
                TranscriptEvent::Final(text) => {
                    self.inner.state.lock().last_transcription = text.clone();
                    self.queue_turn(epoch, text, &turns);
                }
                TranscriptEvent::Ended { error } => {
                    self.on_recognition_ended(epoch, error);
                    break;
                }
            }
        }

        debug!("Transcript event loop ended");
    }

    /// The recognizer stopped on its own: show the session as not listening
    /// and release the dead recognizer. The session stays active; starting it
    /// again acquires a new recognizer.
    fn on_recognition_ended(&self, epoch: u64, error: Option<String>) {
        {
            let mut state = self.inner.state.lock();
            if !state.is_current(epoch) {
                return;
            }
            state.recognizing = false;
            state.muted = false;
            if let Some(error) = &error {
                state.error = Some(error.clone());
            }
        }

        match &error {
            Some(error) => warn!("Recognition failed, no longer listening: {}", error),
            None => info!("Recognition ended, no longer listening"),
        }

        if matches!(self.status(), SessionStatus::Listening | SessionStatus::Muted) {
            self.set_status_for(epoch, SessionStatus::Idle);
        }

        let session = self.clone();
        tokio::spawn(async move { session.release_recognizer(epoch).await });
    }

    async fn release_recognizer(&self, epoch: u64) {
        let _tasks = self.inner.tasks.lock().await;
        if !self.is_current(epoch) {
            return;
        }
        self.inner.transport.stop_listening().await;
    }

    fn queue_turn(&self, epoch: u64, text: String, turns: &mpsc::Sender<Turn>) {
        info!("Final transcript: {}", text);
        match turns.try_send(Turn { epoch, text }) {
            Ok(()) => {}
            Err(TrySendError::Full(turn)) => {
                warn!("Turn queue full, dropping transcript: {}", turn.text);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Turn worker gone, dropping transcript");
            }
        }
    }

    async fn on_partial_transcript(&self, epoch: u64) {
        let transport = &self.inner.transport;

        if transport.check_is_speaking() {
            info!("Barge-in detected, stopping speech");
            transport.stop_speaking();
            transport.resume_listening(MuteReason::Playback).await;
            self.settle_status(epoch);
        } else if self.is_processing() {
            debug!("User spoke while waiting for the assistant");
            transport.mark_interrupted();
        }
    }

    async fn run_turns(self, mut turns: mpsc::Receiver<Turn>) {
        while let Some(turn) = turns.recv().await {
            if !self.is_current(turn.epoch) {
                debug!("Discarding transcript from a stopped session");
                continue;
            }
            self.handle_final_transcript(turn).await;
        }
    }

    async fn handle_final_transcript(&self, turn: Turn) {
        let Turn { epoch, text } = turn;
        let transport = &self.inner.transport;

        transport.clear_interrupted();
        {
            let mut state = self.inner.state.lock();
            if !state.is_current(epoch) {
                return;
            }
            state.processing = true;
        }
        self.set_status_for(epoch, SessionStatus::Processing);
        self.inner.history.add_message(Role::User, text.as_str(), None);

        let reply = self.get_ai_response(&text).await;

        {
            let mut state = self.inner.state.lock();
            if state.is_current(epoch) {
                state.processing = false;
            }
        }

        let Some(reply) = reply else {
            self.settle_status(epoch);
            return;
        };

        // Any stop from here on cancels the reply's playback
        let ticket = transport.speech_ticket();

        if !self.is_current(epoch) {
            debug!("Session stopped while waiting for the assistant, dropping reply");
            return;
        }

        // Kept even when the reply is never spoken
        self.inner
            .history
            .add_message(Role::Assistant, reply.text.as_str(), reply.agent.clone());

        if transport.was_interrupted() {
            info!("Turn interrupted, reply not spoken");
            self.settle_status(epoch);
            return;
        }

        self.inner.history.set_active_agent(reply.agent.clone());

        transport.pause_listening(MuteReason::Playback).await;
        self.set_status_for(epoch, SessionStatus::Speaking);

        if let Err(e) = transport.speak_unless_stopped(&reply.text, ticket).await {
            error!("Failed to speak reply: {}", e);
        }

        if !self.is_current(epoch) {
            // A stop between the epoch check and the mute may have left it set
            if !transport.is_listening() {
                transport.resume_listening(MuteReason::Playback).await;
            }
            return;
        }

        transport.resume_listening(MuteReason::Playback).await;
        self.settle_status(epoch);
    }

    async fn get_ai_response(&self, text: &str) -> Option<AssistantReply> {
        match self.inner.assistant.send_message(text).await {
            Ok(reply) => {
                info!(
                    "Assistant replied ({})",
                    reply.agent.as_deref().unwrap_or("unknown agent")
                );
                Some(reply)
            }
            Err(e) => {
                error!("AI response failed: {}", e);
                self.inner.state.lock().error = Some(e.to_string());
                None
            }
        }
    }
}
