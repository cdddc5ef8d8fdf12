//! Text-mode speech engine
//!
//! Each stdin line is treated as one spoken utterance: word-by-word interim
//! results followed by the final result. Synthesis prints the text and holds the
//! "audio destination" open for a duration proportional to its length.

use super::{
    Player, RecognitionEvent, Recognizer, SpeechEngine, SpeechSettings, SynthesisOutcome,
    Synthesizer, Utterance,
};
use crate::error::VoiceResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct ConsoleEngine {
    /// Simulated playback time per character
    ms_per_char: u64,
}

impl ConsoleEngine {
    pub fn new(ms_per_char: u64) -> Self {
        Self { ms_per_char }
    }
}

impl Default for ConsoleEngine {
    fn default() -> Self {
        Self::new(60)
    }
}

#[async_trait]
impl SpeechEngine for ConsoleEngine {
    async fn start_recognition(
        &self,
        settings: &SpeechSettings,
        events: mpsc::UnboundedSender<RecognitionEvent>,
    ) -> VoiceResult<Box<dyn Recognizer>> {
        info!(
            "Console recognition started ({}), type an utterance and press enter",
            settings.recognition_language
        );

        let paused = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(read_utterances(events, Arc::clone(&paused)));

        Ok(Box::new(ConsoleRecognizer {
            task: Some(task),
            paused,
        }))
    }

    async fn synthesize(&self, settings: &SpeechSettings, text: &str) -> VoiceResult<Utterance> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (end_tx, end_rx) = oneshot::channel();
        let playback = Duration::from_millis(self.ms_per_char * text.chars().count() as u64);

        info!("[{}] {}", settings.synthesis_voice, text);

        let task = tokio::spawn(async move {
            let _ = outcome_tx.send(SynthesisOutcome::Completed);
            tokio::time::sleep(playback).await;
            let _ = end_tx.send(());
        });

        Ok(Utterance {
            synthesizer: Box::new(ConsoleSynthesizer),
            player: Box::new(ConsolePlayer { task: Some(task) }),
            outcome: outcome_rx,
            audio_end: end_rx,
        })
    }

    fn name(&self) -> &str {
        "console"
    }
}

async fn read_utterances(events: mpsc::UnboundedSender<RecognitionEvent>, paused: Arc<AtomicBool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if paused.load(Ordering::SeqCst) {
                    debug!("Recognizer paused, ignoring input");
                    continue;
                }

                let words: Vec<&str> = line.split_whitespace().collect();
                for n in 1..=words.len() {
                    if events
                        .send(RecognitionEvent::Recognizing(words[..n].join(" ")))
                        .is_err()
                    {
                        return;
                    }
                }

                if !words.is_empty()
                    && events
                        .send(RecognitionEvent::Recognized(words.join(" ")))
                        .is_err()
                {
                    return;
                }
            }
            Ok(None) => {
                info!("stdin closed, recognition ended");
                let _ = events.send(RecognitionEvent::Canceled { error: None });
                return;
            }
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                let _ = events.send(RecognitionEvent::Canceled {
                    error: Some(e.to_string()),
                });
                return;
            }
        }
    }
}

struct ConsoleRecognizer {
    task: Option<JoinHandle<()>>,
    paused: Arc<AtomicBool>,
}

#[async_trait]
impl Recognizer for ConsoleRecognizer {
    async fn stop(&mut self) -> VoiceResult<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    async fn pause(&mut self) -> VoiceResult<()> {
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&mut self) -> VoiceResult<()> {
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct ConsoleSynthesizer;

impl Synthesizer for ConsoleSynthesizer {
    fn close(&mut self) {}
}

struct ConsolePlayer {
    task: Option<JoinHandle<()>>,
}

impl Player for ConsolePlayer {
    fn pause(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn close(&mut self) {
        self.pause();
    }
}
