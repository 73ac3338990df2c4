//! Engine states and observable notifications.

/// Protocol session state. Exactly one state is active at a time; every
/// change is announced through [`Event::StateChanged`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum State {
    Idle,
    /// Sender, echo mode: fragment ready to transmit.
    SendingFragment,
    /// Sender, echo mode: fragment sent, waiting for the echo.
    WaitingEcho,
    /// Sender, broadcast mode: continuous transmission, no echo expected.
    Broadcasting,
    /// Sender, direct mode: concatenated FT8 frames playing out.
    DirectTx,
    /// Receiver: fragment received, echo queued for the next TX slot.
    EchoReady,
    /// Receiver: echo sent, waiting for the next fragment.
    WaitingNext,
    /// Transient terminal state; returns to `Idle` after a short delay.
    Complete,
}

/// Observable notifications, drained by the host through
/// [`crate::ChatEngine::poll_event`]. Purely informational: the engine
/// behaves identically whether or not anyone drains them.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StateChanged(State),
    /// A complete inbound message was reassembled.
    MessageReceived { sender: String, text: String },
    /// Every fragment of an outbound message was confirmed (echo mode) or
    /// transmitted (broadcast and direct modes).
    MessageSentOk { target: String },
    /// Human-readable progress line.
    Status(String),
    FragmentProgress {
        current: usize,
        total: usize,
        is_echo: bool,
    },
    /// The direct-TX waveform buffer is filled and ready for the modulator.
    DirectTxReady {
        total_symbols: usize,
        num_fragments: usize,
    },
    /// The host reported end-of-playback for the direct-TX burst.
    DirectTxComplete,
    /// A new fragment of the direct-TX burst started playing.
    DirectFragmentStarted {
        current: usize,
        total: usize,
        current_text: String,
        next_text: Option<String>,
    },
}
