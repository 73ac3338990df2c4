//! Phase-continuous 8-GFSK synthesis for direct transmission.
//!
//! Produces the standard FT8 waveform: 79 tones at 7680 samples per symbol
//! and 48 kHz, 6.25 Hz tone spacing, Gaussian frequency-pulse shaping with
//! BT = 2.0, and raised-cosine amplitude ramps over the first and last
//! eighth of a symbol.

use std::f32::consts::{LN_2, PI};

use crate::error::{ChatError, Result};
use crate::{FT8_NSPS, FT8_NSYM, GFSK_BT, SAMPLES_PER_FT8, SAMPLE_RATE};

/// Abramowitz & Stegun 7.1.26 polynomial approximation of erf(x).
/// Absolute error below 1.5e-7, plenty for pulse shaping.
fn erf(x: f32) -> f32 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = ((((1.061_405_4 * t - 1.453_152_1) * t + 1.421_413_7) * t - 0.284_496_74) * t
        + 0.254_829_6)
        * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Gaussian frequency pulse spanning three symbol periods, evaluated at
/// symbol-relative time `t` (in symbols, centred on the symbol).
fn gfsk_pulse(bt: f32, t: f32) -> f32 {
    let c = PI * (2.0 / LN_2).sqrt();
    0.5 * (erf(c * bt * (t + 0.5)) - erf(c * bt * (t - 0.5)))
}

/// Synthesize the 8-GFSK waveform for one 79-tone frame at carrier `f0`,
/// writing [`SAMPLES_PER_FT8`] real samples into the front of `out`.
///
/// The instantaneous frequency of tone `i` is `f0 + i * 6.25` Hz; phase is
/// continuous across symbol boundaries.
pub fn synthesize(tones: &[u8; FT8_NSYM], f0: f32, out: &mut [f32]) -> Result<()> {
    if out.len() < SAMPLES_PER_FT8 {
        return Err(ChatError::BufferTooSmall {
            needed: SAMPLES_PER_FT8,
            available: out.len(),
        });
    }
    if let Some(&bad) = tones.iter().find(|&&t| t > 7) {
        return Err(ChatError::InvalidTone(bad));
    }

    let nsps = FT8_NSPS;
    let fs = SAMPLE_RATE as f32;
    // Tone spacing equals the symbol rate: 48000 / 7680 = 6.25 Hz.
    let dphi_peak = 2.0 * PI / nsps as f32;

    // Pre-sample the frequency pulse across its three-symbol support.
    let mut pulse = vec![0.0f32; 3 * nsps];
    for (k, p) in pulse.iter_mut().enumerate() {
        *p = gfsk_pulse(GFSK_BT, k as f32 / nsps as f32 - 1.5);
    }

    // Per-sample phase increments over the frame plus one padding symbol on
    // each side, so the pulse tails of the edge symbols have room.
    let mut dphi = vec![2.0 * PI * f0 / fs; (FT8_NSYM + 2) * nsps];
    for (j, &tone) in tones.iter().enumerate() {
        let base = j * nsps;
        for (k, &p) in pulse.iter().enumerate() {
            dphi[base + k] += dphi_peak * tone as f32 * p;
        }
    }
    // Hold the first and last tones through the padding so the burst starts
    // and ends on a steady frequency.
    let first = tones[0] as f32;
    let last = tones[FT8_NSYM - 1] as f32;
    for k in 0..2 * nsps {
        dphi[k] += dphi_peak * first * pulse[k + nsps];
        dphi[FT8_NSYM * nsps + k] += dphi_peak * last * pulse[k];
    }

    let mut phi = 0.0f32;
    for (k, sample) in out[..SAMPLES_PER_FT8].iter_mut().enumerate() {
        *sample = phi.sin();
        phi = (phi + dphi[k + nsps]) % (2.0 * PI);
    }

    // Raised-cosine amplitude ramps keyed to one eighth of a symbol.
    let nramp = nsps / 8;
    for i in 0..nramp {
        let angle = PI * i as f32 / nramp as f32;
        out[i] *= (1.0 - angle.cos()) / 2.0;
        out[SAMPLES_PER_FT8 - nramp + i] *= (1.0 + angle.cos()) / 2.0;
    }

    Ok(())
}
