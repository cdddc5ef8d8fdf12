//! Synthetic spectrum shown while the assistant is talking.
//!
//! Synthesized audio is not tapped, so the visualizer gets superimposed
//! waves shaped by an exponential decay across bins: most energy sits in the
//! low bins, the way speech does.

use super::analyser::FREQUENCY_BIN_COUNT;
use std::time::Duration;

const DECAY_RATE: f32 = 3.0;

/// Deterministic envelope for `elapsed` time since speech started
pub fn speaking_envelope(elapsed: Duration) -> Vec<u8> {
    let t = elapsed.as_secs_f32();

    (0..FREQUENCY_BIN_COUNT)
        .map(|i| {
            let bin = i as f32;
            let decay = (-DECAY_RATE * bin / FREQUENCY_BIN_COUNT as f32).exp();
            let wave = 0.55
                + 0.20 * (t * 7.0 + bin * 0.30).sin()
                + 0.15 * (t * 11.0 - bin * 0.55).cos()
                + 0.10 * (t * 17.0 + bin * 0.90).sin();
            (255.0 * decay * wave.clamp(0.0, 1.0)).round() as u8
        })
        .collect()
}
