//! Per-stream RTSP state machine (RFC 2326 Appendix A).

use std::fmt;

use crate::rtsp::method::Method;
use crate::utils::random_alphanumeric;

/// Identifies one track's stream within an RTSP session. Streaming a movie
/// with separate audio and video tracks creates one stream id per track.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamUid(String);

impl StreamUid {
    /// Generates an 8-character stream identifier.
    pub fn generate() -> Self {
        StreamUid(random_alphanumeric(8))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The state of one track's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStateKind {
    /// No transport established
    Init,
    /// Transport established, not delivering
    Ready,
    /// Delivering to the client
    Playing,
    /// Receiving from the client
    Recording,
    /// An invalid transition was attempted; permanent for the stream
    Error,
}

impl StreamStateKind {
    /// The state reached by applying `method` in this state.
    ///
    /// Transitions follow the RFC 2326 server state table; every pair the
    /// table does not list lands in `Error`, and no method leaves `Error`.
    pub fn after(self, method: Method) -> StreamStateKind {
        use Method::*;
        use StreamStateKind::*;

        match (self, method) {
            (Init, Setup) => Ready,
            (Init, Teardown) => Init,

            (Ready, Setup) => Ready,
            (Ready, Play) => Playing,
            (Ready, Record) => Recording,
            (Ready, Teardown) => Init,

            (Playing, Setup) => Playing,
            (Playing, Play) => Playing,
            (Playing, Pause) => Ready,
            (Playing, Teardown) => Init,

            (Recording, Setup) => Recording,
            (Recording, Record) => Recording,
            (Recording, Pause) => Ready,
            (Recording, Teardown) => Init,

            _ => Error,
        }
    }

    /// Folds two stream states into the session-level aggregate.
    ///
    /// The fold is deliberately order-sensitive: `(Init, Ready)` stays
    /// `Init` (a session mid-SETUP reads as not yet established) while
    /// `(Ready, Init)` is `Error`. Callers fold in sorted track order so the
    /// result is stable.
    pub fn fold_pair(self, other: StreamStateKind) -> StreamStateKind {
        use StreamStateKind::*;

        match (self, other) {
            (Error, _) | (_, Error) => Error,
            (Init, Init) | (Init, Ready) => Init,
            (Ready, Ready) => Ready,
            (Playing, Playing) => Playing,
            (Recording, Recording) => Recording,
            _ => Error,
        }
    }
}

impl fmt::Display for StreamStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamStateKind::Init => "Init",
            StreamStateKind::Ready => "Ready",
            StreamStateKind::Playing => "Playing",
            StreamStateKind::Recording => "Recording",
            StreamStateKind::Error => "Error",
        };
        f.write_str(name)
    }
}

/// The stream state for one track of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamState {
    /// Current state
    pub state: StreamStateKind,
    /// The stream's identifier
    pub uid: StreamUid,
}

impl StreamState {
    /// A fresh stream in `Init` with a newly generated identifier.
    pub fn new() -> Self {
        StreamState {
            state: StreamStateKind::Init,
            uid: StreamUid::generate(),
        }
    }

    /// Applies `method` to the current state.
    pub fn advance(&mut self, method: Method) {
        self.state = self.state.after(method);
    }
}

impl Default for StreamState {
    fn default() -> Self {
        StreamState::new()
    }
}
