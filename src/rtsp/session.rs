//! RTSP sessions and the process-wide session registry.
//!
//! A [`Session`] exclusively owns the per-track stream states it was built
//! around; its tracks map sits behind a reader/writer lock. The
//! [`SessionRegistry`] maps session identifiers to live sessions behind its
//! own lock. Lock discipline: release the registry lock before taking any
//! session lock, and never hold two session locks at once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::media::{MediaUid, TrackId};
use crate::rtsp::method::Method;
use crate::rtsp::state::{StreamState, StreamStateKind, StreamUid};
use crate::utils::random_alphanumeric;

/// Server-generated session identifier.
///
/// 16 alphanumeric characters; RFC 2326 requires at least 8.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionUid(String);

impl SessionUid {
    /// Generates a fresh 16-character session identifier.
    pub fn generate() -> Self {
        SessionUid(random_alphanumeric(16))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionUid {
    fn from(s: &str) -> Self {
        SessionUid(s.to_string())
    }
}

impl fmt::Display for SessionUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One client's streaming session for one media.
#[derive(Debug)]
pub struct Session {
    /// Session identifier, generated at creation
    pub uid: SessionUid,
    /// Creation time (UTC)
    pub created_at: DateTime<Utc>,
    /// The media this session streams
    pub content_uid: MediaUid,
    tracks: RwLock<HashMap<TrackId, StreamState>>,
}

impl Session {
    /// A new session for `content_uid` with no tracks set up yet.
    pub fn new(content_uid: MediaUid) -> Self {
        Session {
            uid: SessionUid::generate(),
            created_at: Utc::now(),
            content_uid,
            tracks: RwLock::new(HashMap::new()),
        }
    }

    /// Adds or replaces the stream state for `track`.
    pub async fn insert_track(&self, track: TrackId, stream: StreamState) {
        self.tracks.write().await.insert(track, stream);
    }

    /// The stream state for `track`, if set up.
    pub async fn track_state(&self, track: &TrackId) -> Option<StreamState> {
        self.tracks.read().await.get(track).cloned()
    }

    /// All `(track, stream)` pairs in sorted track order.
    pub async fn tracks(&self) -> Vec<(TrackId, StreamState)> {
        let tracks = self.tracks.read().await;
        let mut pairs: Vec<_> = tracks
            .iter()
            .map(|(id, st)| (id.clone(), st.clone()))
            .collect();
        pairs.sort_by(|(a, _), (b, _)| a.cmp(b));
        pairs
    }

    /// Every live stream identifier owned by this session.
    pub async fn stream_uids(&self) -> Vec<StreamUid> {
        self.tracks
            .read()
            .await
            .values()
            .map(|st| st.uid.clone())
            .collect()
    }

    /// Applies `method` to the named track, returning the resulting state.
    pub async fn advance_track(&self, track: &TrackId, method: Method) -> Option<StreamStateKind> {
        let mut tracks = self.tracks.write().await;
        let stream = tracks.get_mut(track)?;
        stream.advance(method);
        Some(stream.state)
    }

    /// Reduces the per-track states into one session-level state.
    ///
    /// A session with no tracks is `Init`. One track reports its own state.
    /// Multiple tracks fold pairwise in sorted track order; any `Error`
    /// track makes the aggregate `Error`.
    pub async fn aggregate_state(&self) -> StreamStateKind {
        let tracks = self.tracks().await;

        let mut states = tracks.iter().map(|(_, st)| st.state);
        let Some(first) = states.next() else {
            return StreamStateKind::Init;
        };
        states.fold(first, StreamStateKind::fold_pair)
    }
}

/// Process-wide map of live sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionUid, Arc<Session>>>,
}

impl SessionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        SessionRegistry::default()
    }

    /// Registers `session` under its identifier.
    pub async fn add(&self, session: Arc<Session>) {
        self.sessions
            .write()
            .await
            .insert(session.uid.clone(), session);
    }

    /// Looks up a session by identifier.
    pub async fn get(&self, uid: &SessionUid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(uid).cloned()
    }

    /// Removes a session, returning true iff it was registered.
    pub async fn remove(&self, uid: &SessionUid) -> bool {
        self.sessions.write().await.remove(uid).is_some()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// True when no sessions are registered.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Removes every session, returning the drained set.
    pub async fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions.write().await.drain().map(|(_, s)| s).collect()
    }
}
