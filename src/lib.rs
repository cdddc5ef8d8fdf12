pub mod audio;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod platform;
pub mod session;
pub mod transport;

pub use audio::{
    AudioFile, AudioFrame, FrequencyAnalyser, MicrophoneConfig, MicrophoneProvider,
    MicrophoneSource, WavMicrophone, WavMicrophoneProvider, FREQUENCY_BIN_COUNT,
};
pub use backend::{AssistantApi, AssistantReply, BackendClient, SpeechToken, SpeechTokenSource, TokenCache};
pub use config::Config;
pub use engine::{ConsoleEngine, RecognitionEvent, SpeechEngine, SpeechSettings, SynthesisOutcome, Utterance};
pub use error::{VoiceError, VoiceResult};
pub use http::{create_router, AppState};
pub use platform::{NoopPlatform, Platform};
pub use session::{ChatMessage, ConversationHistory, Role, SessionConfig, SessionStatus, VoiceSession, VoiceSnapshot};
pub use transport::{MuteReason, SpeechTicket, SpeechTransport, TranscriptEvent, TransportConfig};
