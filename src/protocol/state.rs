use std::fmt;

use log::*;

/// The lifecycle state of a connection.
///
/// The numeric values follow the browser WebSocket API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// The opening handshake has not finished yet.
    Connecting = 0,
    /// The connection is open and messages flow both ways.
    Open = 1,
    /// A closing handshake is in progress or the channel failed.
    Closing = 2,
    /// The channel has been dropped. Nothing leaves this state.
    Closed = 3,
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadyState::Connecting => write!(f, "CONNECTING"),
            ReadyState::Open => write!(f, "OPEN"),
            ReadyState::Closing => write!(f, "CLOSING"),
            ReadyState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Enforces legal lifecycle transitions.
///
/// Every transition method returns `true` only when the state actually
/// changed; callers raise the matching notification on `true` alone, which
/// makes `open` and `close` one-shot no matter how often the transport repeats
/// itself.
#[derive(Debug, Clone, Copy)]
pub struct StateMachine {
    state: ReadyState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Start in `CONNECTING`.
    pub fn new() -> Self {
        StateMachine { state: ReadyState::Connecting }
    }

    /// The current state.
    pub fn state(&self) -> ReadyState {
        self.state
    }

    /// `CONNECTING → OPEN` on handshake completion.
    pub fn open(&mut self) -> bool {
        self.transition(ReadyState::Open, |s| s == ReadyState::Connecting)
    }

    /// `CONNECTING | OPEN → CLOSING` on a close request or a channel failure.
    pub fn start_closing(&mut self) -> bool {
        self.transition(ReadyState::Closing, |s| {
            matches!(s, ReadyState::Connecting | ReadyState::Open)
        })
    }

    /// `* → CLOSED` when the channel is dropped.
    pub fn close(&mut self) -> bool {
        self.transition(ReadyState::Closed, |s| s != ReadyState::Closed)
    }

    /// Tell whether inbound messages may still be delivered.
    pub fn accepts_messages(&self) -> bool {
        self.state != ReadyState::Closed
    }

    fn transition(&mut self, to: ReadyState, allowed: impl FnOnce(ReadyState) -> bool) -> bool {
        if allowed(self.state) {
            debug!("Connection state {} -> {}", self.state, to);
            self.state = to;
            true
        } else {
            trace!("Ignoring transition {} -> {}", self.state, to);
            false
        }
    }
}
