//! The chat session state machine.
//!
//! One `ChatEngine` handles one session at a time, in one of three sender
//! modes (echo, broadcast, direct) or as a receiver. The host owns the
//! clock and the TX schedule: it pulls slot text with [`next_tx_text`]
//! once per 15-second window, feeds decoded free-text in with
//! [`process_incoming`] and fires due timers with [`handle_timeout`].
//!
//! [`next_tx_text`]: ChatEngine::next_tx_text
//! [`process_incoming`]: ChatEngine::process_incoming
//! [`handle_timeout`]: ChatEngine::handle_timeout

use std::collections::VecDeque;
use std::time::Instant;

use log::warn;

use crate::direct;
use crate::event::{Event, State};
use crate::frame;
use crate::modem::ToneEncoder;
use crate::text;
use crate::timer::{Timer, TimerTable};
use crate::{
    COMPLETE_LINGER, DIRECT_TICK_INTERVAL, MAX_RETRIES, RX_IDLE_TIMEOUT, SESSION_TIMEOUT,
};

pub struct ChatEngine {
    my_id: String,
    state: State,

    // Sender side: meaningful from send_* until the next reset.
    target_id: String,
    fragments: Vec<String>,
    frag_index: usize,
    last_sent: String,
    retry_count: u32,
    broadcast_mode: bool,

    // Receiver side: meaningful while a reception is in progress.
    rx_sender_id: String,
    echo_text: String,
    rx_payloads: Vec<String>,

    // Direct-TX progress tracking.
    direct_started_at: Option<Instant>,
    direct_current_frag: Option<usize>,

    timers: TimerTable,
    events: VecDeque<Event>,
}

impl Default for ChatEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatEngine {
    pub fn new() -> Self {
        Self {
            my_id: String::new(),
            state: State::Idle,
            target_id: String::new(),
            fragments: Vec::new(),
            frag_index: 0,
            last_sent: String::new(),
            retry_count: 0,
            broadcast_mode: false,
            rx_sender_id: String::new(),
            echo_text: String::new(),
            rx_payloads: Vec::new(),
            direct_started_at: None,
            direct_current_frag: None,
            timers: TimerTable::default(),
            events: VecDeque::new(),
        }
    }

    /// Configure our two-digit station ID.
    pub fn set_my_id(&mut self, id: &str) {
        self.my_id = text::normalize_id(id);
    }

    pub fn my_id(&self) -> &str {
        &self.my_id
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// 1-based index of the fragment currently in flight.
    pub fn current_fragment(&self) -> usize {
        self.frag_index + 1
    }

    pub fn total_fragments(&self) -> usize {
        self.fragments.len()
    }

    /// True while the current session is a broadcast or direct-TX send.
    pub fn is_broadcast(&self) -> bool {
        self.broadcast_mode
    }

    /// True iff a call to [`Self::next_tx_text`] would produce slot text.
    pub fn has_data_to_send(&self) -> bool {
        matches!(
            self.state,
            State::SendingFragment | State::EchoReady | State::Broadcasting
        )
    }

    /// Next queued notification, oldest first.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Earliest pending timer deadline. The host should call
    /// [`Self::handle_timeout`] once its clock reaches it.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.timers.next_timeout()
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            self.state = state;
            self.events.push_back(Event::StateChanged(state));
        }
    }

    fn status(&mut self, text: impl Into<String>) {
        self.events.push_back(Event::Status(text.into()));
    }

    /// Universal recovery: wipe both session roles, stop the timers, return
    /// to `Idle`. Always safe to call.
    fn reset(&mut self) {
        self.fragments.clear();
        self.frag_index = 0;
        self.last_sent.clear();
        self.retry_count = 0;
        self.broadcast_mode = false;
        self.target_id.clear();
        self.rx_sender_id.clear();
        self.echo_text.clear();
        self.rx_payloads.clear();
        self.timers.stop(Timer::Session);
        self.timers.stop(Timer::RxIdle);
        self.timers.stop(Timer::DirectTick);
        self.timers.stop(Timer::Linger);
        self.direct_started_at = None;
        self.direct_current_frag = None;
        self.set_state(State::Idle);
    }

    // ---------- sender ----------

    /// Begin an echo-mode session towards `target`. Replaces any session in
    /// progress. Does nothing if `text` filters down to nothing.
    pub fn send_message(&mut self, target: &str, message: &str, now: Instant) {
        self.reset();

        self.target_id = text::normalize_id(target);
        self.fragments = text::fragment_message(&self.my_id, &self.target_id, message);
        self.frag_index = 0;
        self.retry_count = 0;
        if self.fragments.is_empty() {
            return;
        }

        self.set_state(State::SendingFragment);
        self.timers.set(Timer::Session, now + SESSION_TIMEOUT);
        let total = self.fragments.len();
        self.status(format!(
            "Sending to {} ({} fragment(s))",
            self.target_id, total
        ));
    }

    /// Begin a broadcast session: continuous transmission, `/AR`-terminated,
    /// no echo expected.
    pub fn send_broadcast(&mut self, target: &str, message: &str, now: Instant) {
        self.reset();

        self.broadcast_mode = true;
        self.target_id = text::normalize_id(target);
        self.fragments = text::fragment_broadcast(&self.my_id, &self.target_id, message);
        self.frag_index = 0;
        if self.fragments.is_empty() {
            return;
        }

        self.set_state(State::Broadcasting);
        self.timers.set(Timer::Session, now + SESSION_TIMEOUT);
        let total = self.fragments.len();
        self.status(format!(
            "Broadcast to {} ({} fragment(s))",
            self.target_id, total
        ));
    }

    /// Pull the text to transmit in the next TX slot, advancing the state
    /// machine. Returns `None` when there is nothing to transmit.
    pub fn next_tx_text(&mut self, now: Instant) -> Option<String> {
        match self.state {
            State::SendingFragment => {
                if self.frag_index >= self.fragments.len() {
                    self.set_state(State::Idle);
                    return None;
                }
                self.last_sent = self.fragments[self.frag_index].clone();
                self.set_state(State::WaitingEcho);

                let current = self.frag_index + 1;
                let total = self.fragments.len();
                self.events.push_back(Event::FragmentProgress {
                    current,
                    total,
                    is_echo: false,
                });
                self.status(format!("TX fragment {current}/{total}"));
                Some(self.last_sent.clone())
            }
            State::Broadcasting => {
                if self.frag_index >= self.fragments.len() {
                    self.set_state(State::Idle);
                    return None;
                }
                let fragment = self.fragments[self.frag_index].clone();
                self.frag_index += 1;

                let current = self.frag_index;
                let total = self.fragments.len();
                self.events.push_back(Event::FragmentProgress {
                    current,
                    total,
                    is_echo: false,
                });
                self.status(format!("CQ {current}/{total}"));

                if self.frag_index >= self.fragments.len() {
                    self.timers.stop(Timer::Session);
                    self.set_state(State::Complete);
                    self.events.push_back(Event::MessageSentOk {
                        target: self.target_id.clone(),
                    });
                    self.status(format!("Broadcast finished to {}", self.target_id));
                    self.timers.set(Timer::Linger, now + COMPLETE_LINGER);
                }
                Some(fragment)
            }
            State::EchoReady => {
                // Receiver role: acknowledge by retransmitting verbatim.
                let echo = self.echo_text.clone();
                self.set_state(State::WaitingNext);
                self.timers.set(Timer::RxIdle, now + RX_IDLE_TIMEOUT);

                self.events.push_back(Event::FragmentProgress {
                    current: self.rx_payloads.len(),
                    total: 0,
                    is_echo: true,
                });
                self.status("Echo sent");
                Some(echo)
            }
            _ => None,
        }
    }

    // ---------- reception ----------

    /// Feed one decoded FT8 free-text into the engine.
    pub fn process_incoming(&mut self, free_text: &str, now: Instant) {
        let text = free_text.trim();
        if text.is_empty() {
            return;
        }

        // We are the sender, waiting for an echo.
        if self.state == State::WaitingEcho {
            self.handle_echo(text, now);
            return;
        }

        // A header frame addressed to us starts (or restarts) reception.
        if frame::is_header(text) {
            if frame::header_target(text) != Some(self.my_id.as_str()) {
                return;
            }
            let sender = frame::header_sender(text).unwrap_or_default().to_string();
            let payload = frame::header_payload(text).unwrap_or_default();

            self.rx_sender_id = sender.clone();
            self.rx_payloads.clear();

            if frame::ends_with_ar(payload) {
                // A broadcast that fits a single slot.
                self.rx_payloads.push(frame::strip_ar(payload));
                self.deliver_received_message();
                return;
            }

            self.rx_payloads.push(payload.to_string());
            self.echo_text = text.to_string();
            self.set_state(State::EchoReady);
            self.status(format!("Receiving from {sender}, echo queued"));
            return;
        }

        // Continuation fragment for an active receive session.
        if (self.state == State::WaitingNext || self.state == State::EchoReady)
            && !self.rx_sender_id.is_empty()
        {
            self.timers.stop(Timer::RxIdle);

            if frame::ends_with_ar(text) {
                self.rx_payloads.push(frame::strip_ar(text));
                self.deliver_received_message();
                return;
            }

            self.echo_text = text.to_string();
            self.rx_payloads.push(text.to_string());
            self.set_state(State::EchoReady);
            let sender = self.rx_sender_id.clone();
            self.status(format!("Continuation from {sender}, echo queued"));
        }

        // Anything else is noise for some other station.
    }

    fn handle_echo(&mut self, received: &str, now: Instant) {
        let expected = self.last_sent.trim();
        // The decoder may add or drop trailing spaces: compare over the
        // shorter of the two, so a received proper prefix still matches.
        let len = expected.len().min(received.len());
        let matched = expected.as_bytes()[..len] == received.as_bytes()[..len];

        if matched {
            let current = self.frag_index + 1;
            let total = self.fragments.len();
            self.status(format!("Echo OK for fragment {current}/{total}"));
            self.retry_count = 0;
            self.frag_index += 1;

            if self.frag_index >= self.fragments.len() {
                self.timers.stop(Timer::Session);
                self.set_state(State::Complete);
                self.events.push_back(Event::MessageSentOk {
                    target: self.target_id.clone(),
                });
                self.status(format!("Message delivered to {}", self.target_id));
                self.timers.set(Timer::Linger, now + COMPLETE_LINGER);
            } else {
                self.set_state(State::SendingFragment);
            }
        } else {
            self.retry_count += 1;
            if self.retry_count >= MAX_RETRIES {
                self.status("Too many retransmissions, giving up");
                self.reset();
                return;
            }
            self.status(format!(
                "Echo mismatch, retransmitting ({}/{})",
                self.retry_count, MAX_RETRIES
            ));
            // Same fragment goes out again on the next slot.
            self.set_state(State::SendingFragment);
        }
    }

    fn deliver_received_message(&mut self) {
        if self.rx_payloads.is_empty() {
            return;
        }
        let full = text::join_payloads(&self.rx_payloads);
        let sender = std::mem::take(&mut self.rx_sender_id);

        self.rx_payloads.clear();
        self.echo_text.clear();
        self.timers.stop(Timer::RxIdle);
        self.set_state(State::Idle);

        self.events.push_back(Event::MessageReceived {
            sender: sender.clone(),
            text: full,
        });
        self.status(format!("Complete message received from {sender}"));
    }

    // ---------- control ----------

    /// Abort any session unconditionally. Idempotent.
    pub fn halt_tx(&mut self) {
        self.reset();
        self.status("Transmission halted");
    }

    // ---------- direct TX ----------

    /// Encode an `/AR`-terminated fragment batch into `wave` for
    /// back-to-back playback. On success the engine enters `DirectTx` and
    /// emits [`Event::DirectTxReady`]; the buffer then belongs to the host
    /// modulator until [`Self::notify_direct_tx_complete`].
    pub fn send_direct(
        &mut self,
        target: &str,
        message: &str,
        tx_freq: f64,
        encoder: &mut dyn ToneEncoder,
        wave: &mut [f32],
    ) {
        self.reset();

        self.broadcast_mode = true;
        self.target_id = text::normalize_id(target);
        self.fragments = text::fragment_broadcast(&self.my_id, &self.target_id, message);
        if self.fragments.is_empty() {
            return;
        }

        let total_symbols =
            match direct::prepare_waveform(&self.fragments, tx_freq, encoder, wave) {
                Ok(symbols) if symbols > 0 => symbols,
                Ok(_) => {
                    self.status("FT8 encoding failed");
                    self.reset();
                    return;
                }
                Err(err) => {
                    warn!("direct TX preparation failed: {err}");
                    self.status("FT8 encoding failed");
                    self.reset();
                    return;
                }
            };

        self.set_state(State::DirectTx);
        let total = self.fragments.len();
        self.status(format!(
            "Direct TX to {} ({} fragment(s), {}s)",
            self.target_id,
            total,
            total * 15
        ));
        self.events.push_back(Event::FragmentProgress {
            current: 0,
            total,
            is_echo: false,
        });
        self.events.push_back(Event::DirectTxReady {
            total_symbols,
            num_fragments: total,
        });
    }

    /// Begin real-time progress reporting for a direct-TX burst. The first
    /// fragment is announced immediately.
    pub fn start_direct_tx_tracking(&mut self, now: Instant) {
        self.direct_current_frag = None;
        self.direct_started_at = Some(now);
        self.timers.set(Timer::DirectTick, now + DIRECT_TICK_INTERVAL);
        self.on_direct_tick(now);
    }

    /// Called by the host when the modulator exhausts the waveform buffer.
    pub fn notify_direct_tx_complete(&mut self, now: Instant) {
        self.timers.stop(Timer::DirectTick);

        if !self.fragments.is_empty() {
            let total = self.fragments.len();
            self.events.push_back(Event::DirectFragmentStarted {
                current: total,
                total,
                current_text: self.fragments[total - 1].clone(),
                next_text: None,
            });
            self.events.push_back(Event::FragmentProgress {
                current: total,
                total,
                is_echo: false,
            });
        }

        self.set_state(State::Complete);
        self.events.push_back(Event::MessageSentOk {
            target: self.target_id.clone(),
        });
        self.status(format!("Direct TX finished to {}", self.target_id));
        self.events.push_back(Event::DirectTxComplete);
        self.timers.set(Timer::Linger, now + COMPLETE_LINGER);
    }

    // ---------- timers ----------

    /// Fire every timer whose deadline has been reached.
    pub fn handle_timeout(&mut self, now: Instant) {
        if self.timers.take_expired(Timer::Session, now) {
            self.on_session_timeout();
        }
        if self.timers.take_expired(Timer::RxIdle, now) {
            self.on_rx_idle();
        }
        if self.timers.take_expired(Timer::DirectTick, now) {
            self.on_direct_tick(now);
            if self.state == State::DirectTx {
                self.timers.set(Timer::DirectTick, now + DIRECT_TICK_INTERVAL);
            }
        }
        if self.timers.take_expired(Timer::Linger, now) && self.state == State::Complete {
            self.set_state(State::Idle);
        }
    }

    fn on_session_timeout(&mut self) {
        if self.state != State::Idle && self.state != State::Complete {
            if self.state == State::Broadcasting {
                self.status("Timeout, broadcast abandoned");
            } else {
                self.status("Timeout, transmission abandoned");
            }
            self.reset();
        }
    }

    fn on_rx_idle(&mut self) {
        // A sender that stops transmitting is a clean end-of-message.
        if (self.state == State::WaitingNext || self.state == State::Idle)
            && !self.rx_payloads.is_empty()
        {
            self.deliver_received_message();
        }
    }

    fn on_direct_tick(&mut self, now: Instant) {
        if self.state != State::DirectTx || self.fragments.is_empty() {
            return;
        }
        let Some(started) = self.direct_started_at else {
            return;
        };

        let elapsed_ms = now.duration_since(started).as_millis() as u64;
        let index = ((elapsed_ms / 15_000) as usize).min(self.fragments.len() - 1);
        if self.direct_current_frag == Some(index) {
            return;
        }
        self.direct_current_frag = Some(index);

        let current = index + 1;
        let total = self.fragments.len();
        self.events.push_back(Event::DirectFragmentStarted {
            current,
            total,
            current_text: self.fragments[index].clone(),
            next_text: self.fragments.get(index + 1).cloned(),
        });
        self.events.push_back(Event::FragmentProgress {
            current,
            total,
            is_echo: false,
        });

        let secs_remaining =
            (total - current) * 15 + 15 - ((elapsed_ms % 15_000) / 1000) as usize;
        self.status(format!("Direct TX {current}/{total}, {secs_remaining}s remaining"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_engine_is_idle_with_no_deadlines() {
        let mut engine = ChatEngine::new();
        assert_eq!(engine.state(), State::Idle);
        assert_eq!(engine.poll_timeout(), None);
        assert_eq!(engine.poll_event(), None);
        assert!(!engine.has_data_to_send());
    }

    #[test]
    fn test_set_my_id_normalizes() {
        let mut engine = ChatEngine::new();
        engine.set_my_id("7");
        assert_eq!(engine.my_id(), "07");
        engine.set_my_id("1234");
        assert_eq!(engine.my_id(), "12");
    }

    #[test]
    fn test_empty_message_starts_nothing() {
        let mut engine = ChatEngine::new();
        engine.set_my_id("01");
        engine.send_message("02", "\t,;\n", Instant::now());
        assert_eq!(engine.state(), State::Idle);
        assert_eq!(engine.poll_event(), None);
        assert_eq!(engine.poll_timeout(), None);
    }

    #[test]
    fn test_has_data_to_send_tracks_states() {
        let now = Instant::now();
        let mut engine = ChatEngine::new();
        engine.set_my_id("01");
        engine.send_message("02", "HELLO", now);
        assert!(engine.has_data_to_send());
        engine.next_tx_text(now);
        // WaitingEcho: the slot already went out.
        assert!(!engine.has_data_to_send());
    }
}
