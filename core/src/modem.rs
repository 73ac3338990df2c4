//! The FT8 tone-encoder seam and a deterministic stand-in implementation.

use crate::error::Result;
use crate::{ENCODER_MSG_LEN, FT8_NSYM};

/// FT8 free-text alphabet in its canonical base-42 order.
const CHARSET: &[u8] = b" 0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ+-./?";

/// 7x7 Costas array used for the three FT8 synchronization blocks.
const COSTAS: [u8; 7] = [3, 1, 4, 0, 6, 5, 2];

/// Maps one space-padded 37-character slot text to the 79-tone FT8 symbol
/// sequence (tone indices 0-7).
///
/// This is the seam to the host's FT8 bit packer; the engine only requires
/// that 79 valid tones come back for each fragment it schedules.
pub trait ToneEncoder {
    fn encode(&mut self, message: &str) -> Result<[u8; FT8_NSYM]>;
}

/// Deterministic stand-in encoder.
///
/// Lays down the three Costas sync blocks at the standard symbol positions
/// (0-6, 36-42, 72-78) and fills the 58 data symbols from the alphabet
/// indices of the message characters. The output has the timing and
/// spectral footprint of a real FT8 frame, which is enough for waveform and
/// TX-chain work, but carries no LDPC coding and is not decodable on the
/// air.
#[derive(Debug, Default)]
pub struct StandinEncoder;

impl ToneEncoder for StandinEncoder {
    fn encode(&mut self, message: &str) -> Result<[u8; FT8_NSYM]> {
        let mut tones = [0u8; FT8_NSYM];
        for (i, &c) in COSTAS.iter().enumerate() {
            tones[i] = c;
            tones[36 + i] = c;
            tones[72 + i] = c;
        }

        let data: Vec<u8> = message
            .bytes()
            .take(ENCODER_MSG_LEN)
            .map(|b| (charset_index(b) % 8) as u8)
            .collect();
        for k in 0..58 {
            let slot = if k < 29 { 7 + k } else { 43 + (k - 29) };
            let tone = if data.is_empty() {
                0
            } else {
                data[k % data.len()]
            };
            tones[slot] = tone;
        }
        Ok(tones)
    }
}

fn charset_index(b: u8) -> usize {
    CHARSET.iter().position(|&c| c == b).unwrap_or(0)
}
