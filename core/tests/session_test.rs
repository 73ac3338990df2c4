use std::time::{Duration, Instant};

use ft8chat_core::{
    ChatEngine, ChatError, Event, Result, StandinEncoder, State, ToneEncoder, FT8_NSYM,
    SAMPLES_PER_FT8, SAMPLES_PER_PERIOD,
};

fn drain(engine: &mut ChatEngine) -> Vec<Event> {
    std::iter::from_fn(|| engine.poll_event()).collect()
}

fn has_status(events: &[Event], needle: &str) -> bool {
    events.iter().any(|e| match e {
        Event::Status(s) => s.contains(needle),
        _ => false,
    })
}

struct FixedToneEncoder;

impl ToneEncoder for FixedToneEncoder {
    fn encode(&mut self, _message: &str) -> Result<[u8; FT8_NSYM]> {
        Ok([1u8; FT8_NSYM])
    }
}

struct BrokenEncoder;

impl ToneEncoder for BrokenEncoder {
    fn encode(&mut self, _message: &str) -> Result<[u8; FT8_NSYM]> {
        Err(ChatError::EncoderFailure)
    }
}

#[test]
fn test_short_echo_session() {
    let t0 = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("01");

    engine.send_message("02", "HELLO WORLD", t0);
    assert_eq!(engine.state(), State::SendingFragment);
    assert_eq!(engine.total_fragments(), 2);

    let tx1 = engine.next_tx_text(t0).expect("first slot");
    assert_eq!(tx1, "0102 HELLO WO");
    assert_eq!(engine.state(), State::WaitingEcho);

    // The far end echoes the slot back; we advance to the next fragment.
    engine.process_incoming(&tx1, t0 + Duration::from_secs(15));
    assert_eq!(engine.state(), State::SendingFragment);

    let tx2 = engine
        .next_tx_text(t0 + Duration::from_secs(30))
        .expect("second slot");
    assert_eq!(tx2, "RLD");

    let done_at = t0 + Duration::from_secs(45);
    engine.process_incoming(&tx2, done_at);
    assert_eq!(engine.state(), State::Complete);

    let events = drain(&mut engine);
    assert!(events.contains(&Event::MessageSentOk {
        target: "02".to_string()
    }));

    // The engine must settle back to Idle within 2.5s of wall clock.
    let linger = engine.poll_timeout().expect("linger deadline");
    assert!(linger <= done_at + Duration::from_millis(2500));
    engine.handle_timeout(linger);
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn test_garbled_echo_retransmits_same_fragment() {
    let t0 = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("01");
    engine.send_message("02", "HELLO WORLD", t0);

    let tx1 = engine.next_tx_text(t0).unwrap();
    engine.process_incoming("0102 HELLO XX", t0 + Duration::from_secs(15));

    let events = drain(&mut engine);
    assert!(has_status(&events, "retransmitting (1/5)"));
    assert_eq!(engine.state(), State::SendingFragment);
    assert_eq!(engine.current_fragment(), 1);

    // The same slot goes out again.
    let retx = engine.next_tx_text(t0 + Duration::from_secs(30)).unwrap();
    assert_eq!(retx, tx1);
}

#[test]
fn test_retry_limit_abandons_session() {
    let mut now = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("01");
    engine.send_message("02", "HELLO WORLD", now);

    for _ in 0..5 {
        now += Duration::from_secs(15);
        engine.next_tx_text(now);
        now += Duration::from_secs(15);
        engine.process_incoming("9999 GARBAGE", now);
    }

    let events = drain(&mut engine);
    assert!(has_status(&events, "Too many retransmissions"));
    assert_eq!(engine.state(), State::Idle);
    assert!(!engine.has_data_to_send());
}

#[test]
fn test_echo_accepts_received_prefix() {
    let t0 = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("01");
    engine.send_message("02", "HELLO WORLD", t0);

    engine.next_tx_text(t0);
    // The decoder dropped the tail; the comparison truncates to the shorter
    // of the two strings, so this still counts as a confirmation.
    engine.process_incoming("0102 HELLO", t0 + Duration::from_secs(15));
    assert_eq!(engine.state(), State::SendingFragment);
    assert_eq!(engine.current_fragment(), 2);
}

#[test]
fn test_session_timeout_resets() {
    let t0 = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("01");
    engine.send_message("02", "HELLO WORLD", t0);
    engine.next_tx_text(t0);

    let deadline = engine.poll_timeout().expect("session deadline");
    assert_eq!(deadline, t0 + Duration::from_secs(90));
    engine.handle_timeout(deadline);

    let events = drain(&mut engine);
    assert!(has_status(&events, "Timeout"));
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn test_broadcast_transmits_all_slots_without_echo() {
    let t0 = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("01");
    engine.send_broadcast("02", "HELLO WORLD A 73", t0);
    assert_eq!(engine.state(), State::Broadcasting);
    assert_eq!(engine.total_fragments(), 2);

    let tx1 = engine.next_tx_text(t0).unwrap();
    assert_eq!(tx1, "0102 HELLO WO");
    // Still broadcasting: decodes of other stations are ignored.
    engine.process_incoming("SOME NOISE", t0 + Duration::from_secs(5));
    assert_eq!(engine.state(), State::Broadcasting);

    let tx2 = engine.next_tx_text(t0 + Duration::from_secs(15)).unwrap();
    assert_eq!(tx2, "RLD A 73  /AR");
    assert_eq!(engine.state(), State::Complete);

    let events = drain(&mut engine);
    assert!(events.contains(&Event::MessageSentOk {
        target: "02".to_string()
    }));

    let linger = engine.poll_timeout().unwrap();
    engine.handle_timeout(linger);
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn test_single_slot_broadcast_is_delivered_immediately() {
    let t0 = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("02");

    engine.process_incoming("0102 HI /AR", t0);

    let events = drain(&mut engine);
    assert!(events.contains(&Event::MessageReceived {
        sender: "01".to_string(),
        text: "HI".to_string()
    }));
    // No echo, no state excursion: the engine never left Idle.
    assert!(!events
        .iter()
        .any(|e| matches!(e, Event::StateChanged(_))));
    assert_eq!(engine.state(), State::Idle);
    assert!(!engine.has_data_to_send());
}

#[test]
fn test_receive_echo_and_reassemble() {
    let t0 = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("02");

    engine.process_incoming("0102 HELLO WO", t0);
    assert_eq!(engine.state(), State::EchoReady);
    assert!(engine.has_data_to_send());

    // Our next TX slot carries the echo, verbatim.
    let echo = engine.next_tx_text(t0 + Duration::from_secs(15)).unwrap();
    assert_eq!(echo, "0102 HELLO WO");
    assert_eq!(engine.state(), State::WaitingNext);

    engine.process_incoming("RLD A 73  /AR", t0 + Duration::from_secs(30));

    let events = drain(&mut engine);
    assert!(events.contains(&Event::MessageReceived {
        sender: "01".to_string(),
        text: "HELLO WO RLD A 73".to_string()
    }));
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn test_receive_idle_timer_delivers_buffered_payloads() {
    let t0 = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("02");

    engine.process_incoming("0102 PART ONE", t0);
    let echo_at = t0 + Duration::from_secs(15);
    engine.next_tx_text(echo_at);
    assert_eq!(engine.state(), State::WaitingNext);

    // The sender goes quiet; 45s later the message is considered complete.
    let deadline = engine.poll_timeout().expect("rx idle deadline");
    assert_eq!(deadline, echo_at + Duration::from_secs(45));
    engine.handle_timeout(deadline);

    let events = drain(&mut engine);
    assert!(events.contains(&Event::MessageReceived {
        sender: "01".to_string(),
        text: "PART ONE".to_string()
    }));
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn test_header_for_someone_else_is_ignored() {
    let mut engine = ChatEngine::new();
    engine.set_my_id("03");
    engine.process_incoming("0102 HELLO WO", Instant::now());
    assert_eq!(engine.state(), State::Idle);
    assert_eq!(engine.poll_event(), None);
}

#[test]
fn test_header_mid_reception_restarts_with_new_sender() {
    let t0 = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("02");

    engine.process_incoming("0102 PART ONE", t0);
    engine.next_tx_text(t0 + Duration::from_secs(15));

    // Another station opens a session to us; the old payloads are dropped.
    engine.process_incoming("0302 NEW MSG", t0 + Duration::from_secs(30));
    engine.next_tx_text(t0 + Duration::from_secs(45));
    engine.process_incoming("DONE      /AR", t0 + Duration::from_secs(60));

    let events = drain(&mut engine);
    assert!(events.contains(&Event::MessageReceived {
        sender: "03".to_string(),
        text: "NEW MSG DONE".to_string()
    }));
}

#[test]
fn test_halt_is_idempotent() {
    let t0 = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("01");
    engine.send_message("02", "HELLO WORLD", t0);

    engine.halt_tx();
    let events = drain(&mut engine);
    assert!(events.contains(&Event::StateChanged(State::Idle)));
    assert!(has_status(&events, "halted"));
    assert_eq!(engine.poll_timeout(), None);

    // A second halt changes nothing but repeats the status line.
    engine.halt_tx();
    let events = drain(&mut engine);
    assert!(!events
        .iter()
        .any(|e| matches!(e, Event::StateChanged(_))));
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn test_direct_tx_full_flow() {
    let t0 = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("01");

    let mut wave = vec![0.0f32; 2 * SAMPLES_PER_PERIOD];
    engine.send_direct("02", "HELLO WORLD A 73", 1500.0, &mut FixedToneEncoder, &mut wave);
    assert_eq!(engine.state(), State::DirectTx);

    let events = drain(&mut engine);
    assert!(events.contains(&Event::DirectTxReady {
        total_symbols: 188,
        num_fragments: 2
    }));
    assert!(events.contains(&Event::FragmentProgress {
        current: 0,
        total: 2,
        is_echo: false
    }));

    // Audio in each frame window, silence in each inter-frame gap.
    assert!(wave[..SAMPLES_PER_FT8].iter().any(|&s| s != 0.0));
    assert!(wave[SAMPLES_PER_FT8..SAMPLES_PER_PERIOD]
        .iter()
        .all(|&s| s == 0.0));
    assert!(wave[SAMPLES_PER_PERIOD..SAMPLES_PER_PERIOD + SAMPLES_PER_FT8]
        .iter()
        .any(|&s| s != 0.0));

    // Progress tracking announces fragment 1 immediately.
    engine.start_direct_tx_tracking(t0);
    let events = drain(&mut engine);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::DirectFragmentStarted {
            current: 1,
            total: 2,
            ..
        }
    )));

    // 15s in, the tracker crosses into fragment 2.
    engine.handle_timeout(t0 + Duration::from_millis(15_200));
    let events = drain(&mut engine);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::DirectFragmentStarted {
            current: 2,
            total: 2,
            next_text: None,
            ..
        }
    )));

    engine.notify_direct_tx_complete(t0 + Duration::from_secs(30));
    assert_eq!(engine.state(), State::Complete);
    let events = drain(&mut engine);
    assert!(events.contains(&Event::DirectTxComplete));
    assert!(events.contains(&Event::MessageSentOk {
        target: "02".to_string()
    }));

    let linger = engine.poll_timeout().unwrap();
    engine.handle_timeout(linger);
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn test_direct_tx_encoder_failure_resets() {
    let mut engine = ChatEngine::new();
    engine.set_my_id("01");

    let mut wave = vec![0.0f32; SAMPLES_PER_PERIOD];
    engine.send_direct("02", "HI", 1500.0, &mut BrokenEncoder, &mut wave);

    let events = drain(&mut engine);
    assert!(has_status(&events, "FT8 encoding failed"));
    assert!(!events
        .iter()
        .any(|e| matches!(e, Event::DirectTxReady { .. })));
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn test_direct_tx_rejects_undersized_buffer() {
    let mut engine = ChatEngine::new();
    engine.set_my_id("01");

    // Two fragments need two periods; offer one.
    let mut wave = vec![0.0f32; SAMPLES_PER_PERIOD];
    engine.send_direct(
        "02",
        "HELLO WORLD A 73",
        1500.0,
        &mut StandinEncoder,
        &mut wave,
    );

    let events = drain(&mut engine);
    assert!(has_status(&events, "FT8 encoding failed"));
    assert_eq!(engine.state(), State::Idle);
}

#[test]
fn test_state_changes_are_announced_in_order() {
    let t0 = Instant::now();
    let mut engine = ChatEngine::new();
    engine.set_my_id("01");
    engine.send_message("02", "HI", t0);
    engine.next_tx_text(t0);
    engine.process_incoming("0102 HI", t0 + Duration::from_secs(15));

    let states: Vec<State> = drain(&mut engine)
        .into_iter()
        .filter_map(|e| match e {
            Event::StateChanged(s) => Some(s),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![State::SendingFragment, State::WaitingEcho, State::Complete]
    );
}
