//! Direct-TX waveform scheduling.
//!
//! Encodes a batch of fragments into one contiguous audio buffer
//! partitioned into 15-second periods: each period carries a 606 720-sample
//! FT8 frame followed by 113 280 samples of silence.

use log::debug;

use crate::error::{ChatError, Result};
use crate::gfsk;
use crate::modem::ToneEncoder;
use crate::{ENCODER_MSG_LEN, SAMPLES_PER_FT8, SAMPLES_PER_PERIOD, SAMPLE_RATE};

/// Encode every fragment into `wave`, one full period per fragment, and
/// return the total symbol length the host modulator needs to play the
/// burst (the modulator consumes 4 × 1920 samples per reported symbol).
pub fn prepare_waveform(
    fragments: &[String],
    tx_freq: f64,
    encoder: &mut dyn ToneEncoder,
    wave: &mut [f32],
) -> Result<usize> {
    let needed = fragments.len() * SAMPLES_PER_PERIOD;
    if wave.len() < needed {
        return Err(ChatError::BufferTooSmall {
            needed,
            available: wave.len(),
        });
    }

    let mut offset = 0;
    for (i, fragment) in fragments.iter().enumerate() {
        let padded = format!("{:<width$}", fragment, width = ENCODER_MSG_LEN);
        let tones = encoder.encode(&padded)?;

        let period = &mut wave[offset..offset + SAMPLES_PER_PERIOD];
        gfsk::synthesize(&tones, tx_freq as f32, &mut period[..SAMPLES_PER_FT8])?;
        // Silence out the 2.36s gap completing the 15s slot.
        period[SAMPLES_PER_FT8..].fill(0.0);
        offset += SAMPLES_PER_PERIOD;

        debug!(
            "encoded fragment {}/{}: {:?} offset={}",
            i + 1,
            fragments.len(),
            fragment,
            offset
        );
    }

    let total_samples = fragments.len() * SAMPLES_PER_PERIOD;
    let total_symbols = total_samples.div_ceil(4 * 1920);
    debug!(
        "waveform ready: {} fragments, {} samples, {} symbols, {:.1}s",
        fragments.len(),
        total_samples,
        total_symbols,
        total_samples as f64 / SAMPLE_RATE as f64
    );
    Ok(total_symbols)
}
