//! Protocol timers, driven by the host clock.
//!
//! The engine never sleeps: it records deadlines in a [`TimerTable`] and
//! the host reports the passage of time through
//! [`crate::ChatEngine::handle_timeout`]. Tests control time by passing
//! explicit `Instant`s.

use std::time::Instant;

/// Kinds of timeouts needed to run the protocol logic.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Timer {
    /// Global session timeout: 90s without forward progress.
    Session = 0,
    /// Receive side: no new fragment while payloads are buffered.
    RxIdle = 1,
    /// Periodic direct-TX progress tick.
    DirectTick = 2,
    /// Short display delay before `Complete` returns to `Idle`.
    Linger = 3,
}

/// One optional deadline per timer kind.
#[derive(Debug, Default)]
pub struct TimerTable {
    data: [Option<Instant>; 4],
}

impl TimerTable {
    pub fn set(&mut self, timer: Timer, deadline: Instant) {
        self.data[timer as usize] = Some(deadline);
    }

    pub fn stop(&mut self, timer: Timer) {
        self.data[timer as usize] = None;
    }

    pub fn get(&self, timer: Timer) -> Option<Instant> {
        self.data[timer as usize]
    }

    /// Earliest pending deadline across all timers.
    pub fn next_timeout(&self) -> Option<Instant> {
        self.data.iter().flatten().min().copied()
    }

    /// If `timer` is due at `now`, clears it and returns true.
    pub fn take_expired(&mut self, timer: Timer, now: Instant) -> bool {
        match self.data[timer as usize] {
            Some(deadline) if deadline <= now => {
                self.data[timer as usize] = None;
                true
            }
            _ => false,
        }
    }
}
