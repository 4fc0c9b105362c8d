//! The four-state machine (spec §4.10): a single exclusive writer (the
//! dispatcher) mutates state, every other component only reads. Every
//! transition invokes a change hook — here, a `tokio::sync::watch`
//! channel tests and other observers can subscribe to.

use crate::types::State;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::sync::watch;
use tracing::info;

fn encode(state: State) -> u8 {
    match state {
        State::Idle => 0,
        State::Listening => 1,
        State::Processing => 2,
        State::Speaking => 3,
    }
}

fn decode(value: u8) -> State {
    match value {
        0 => State::Idle,
        1 => State::Listening,
        2 => State::Processing,
        _ => State::Speaking,
    }
}

/// Shared, lock-free state cell. `set` is idempotent-safe: setting the
/// current state again is a no-op and does not re-fire the hook.
pub struct SharedState {
    value: AtomicU8,
    tx: watch::Sender<State>,
}

impl SharedState {
    pub fn new(initial: State) -> (Self, watch::Receiver<State>) {
        let (tx, rx) = watch::channel(initial);
        (Self { value: AtomicU8::new(encode(initial)), tx }, rx)
    }

    pub fn get(&self) -> State {
        decode(self.value.load(Ordering::SeqCst))
    }

    pub fn set(&self, next: State) {
        let prev = self.get();
        if prev == next {
            return;
        }
        self.value.store(encode(next), Ordering::SeqCst);
        info!(from = %prev, to = %next, "state transition");
        let _ = self.tx.send(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_updates_value_and_is_idempotent() {
        let (state, mut rx) = SharedState::new(State::Idle);
        state.set(State::Listening);
        assert_eq!(state.get(), State::Listening);
        assert_eq!(*rx.borrow_and_update(), State::Listening);

        state.set(State::Listening);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn roundtrips_all_four_states() {
        for s in [State::Idle, State::Listening, State::Processing, State::Speaking] {
            assert_eq!(decode(encode(s)), s);
        }
    }
}
