//! Chat protocol engine for FT8 free-text frames
//!
//! Fragments messages into 13-character FT8 free-text slots, runs
//! echo-acknowledged and broadcast sessions across 15-second transmit
//! windows, and schedules multi-frame direct-TX waveforms into a
//! host-supplied sample buffer.
//!
//! The engine is single-threaded and sans-I/O: the host pulls TX text once
//! per slot with [`ChatEngine::next_tx_text`], feeds decoded free-text in
//! with [`ChatEngine::process_incoming`], drives time through
//! [`ChatEngine::poll_timeout`]/[`ChatEngine::handle_timeout`] and drains
//! notifications with [`ChatEngine::poll_event`].

use std::time::Duration;

pub mod direct;
pub mod engine;
pub mod error;
pub mod event;
pub mod frame;
pub mod gfsk;
pub mod modem;
pub mod text;
pub mod timer;

pub use engine::ChatEngine;
pub use error::{ChatError, Result};
pub use event::{Event, State};
pub use modem::{StandinEncoder, ToneEncoder};

// Slot format
pub const SLOT_SIZE: usize = 13;
pub const HEADER_SIZE: usize = 5; // "XXYY " (4 digits + space)
pub const FIRST_PAYLOAD: usize = SLOT_SIZE - HEADER_SIZE; // 8 chars
pub const MAX_MESSAGE_LEN: usize = 99;
pub const END_OF_MESSAGE: &str = "/AR";

// Session limits
pub const MAX_RETRIES: u32 = 5;
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(90);
pub const RX_IDLE_TIMEOUT: Duration = Duration::from_secs(45);
pub const DIRECT_TICK_INTERVAL: Duration = Duration::from_millis(500);
pub const COMPLETE_LINGER: Duration = Duration::from_secs(2);
pub const SLOT_PERIOD: Duration = Duration::from_secs(15);

// Direct-TX audio configuration
pub const SAMPLE_RATE: usize = 48_000;
pub const FT8_NSYM: usize = 79;
pub const FT8_NSPS: usize = 4 * 1920; // 7680 samples/symbol at 48kHz
pub const SAMPLES_PER_FT8: usize = FT8_NSYM * FT8_NSPS; // 606720 (12.64s)
pub const SAMPLES_PER_PERIOD: usize = 15 * SAMPLE_RATE; // 720000 (15.0s)
pub const GFSK_BT: f32 = 2.0;

/// Width of the padded slot text handed to the tone encoder.
pub const ENCODER_MSG_LEN: usize = 37;
