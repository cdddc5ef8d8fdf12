pub mod analyser;
pub mod backend;
pub mod envelope;
pub mod file;

pub use analyser::{FrequencyAnalyser, SpectrumAnalyser, SpectrumHandle, FFT_SIZE, FREQUENCY_BIN_COUNT};
pub use backend::{AudioFrame, MicrophoneConfig, MicrophoneProvider, MicrophoneSource};
pub use envelope::speaking_envelope;
pub use file::{AudioFile, WavMicrophone, WavMicrophoneProvider};
