//! Session tracking: recognising the `system`/`init` message.
//!
//! The CLI announces the session with a `system` message whose subtype is
//! `init`. [`SessionTracker`] watches a stream's messages and records the
//! first such announcement as a [`Session`]; everything after that is
//! ignored, so the session id never changes mid-stream.

use chrono::{DateTime, Utc};

use crate::types::messages::Message;

/// A server-assigned session, as announced by the init message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Opaque session identifier.
    pub id: String,
    /// When the init message was observed locally.
    pub started_at: DateTime<Utc>,
    /// Model reported by the init message, if any.
    pub model: Option<String>,
    /// Working directory reported by the init message, if any.
    pub cwd: Option<String>,
}

impl Session {
    /// Build a session from an init message.
    ///
    /// Returns `None` if `message` is not `system`/`init` or carries no
    /// session id.
    #[must_use]
    pub fn from_init(message: &Message) -> Option<Self> {
        let Message::System(sys) = message else {
            return None;
        };
        if !message.is_init() {
            return None;
        }
        let id = sys.session_id.as_deref().filter(|id| !id.is_empty())?;
        Some(Self {
            id: id.to_owned(),
            started_at: Utc::now(),
            model: sys.model.clone(),
            cwd: sys.cwd.clone(),
        })
    }
}

/// Records the session of one stream, at most once.
#[derive(Debug, Default)]
pub struct SessionTracker {
    session: Option<Session>,
}

impl SessionTracker {
    /// A tracker that has not seen a session yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect one message.
    ///
    /// Returns the new session exactly once: for the first init message that
    /// carries a session id. Every other call returns `None`.
    pub fn observe(&mut self, message: &Message) -> Option<&Session> {
        if !message.is_init() {
            return None;
        }

        if let Some(current) = &self.session {
            if message.session_id() != Some(current.id.as_str()) {
                tracing::warn!(
                    session_id = %current.id,
                    other = ?message.session_id(),
                    "ignoring repeated init message with a different session id"
                );
            }
            return None;
        }

        match Session::from_init(message) {
            Some(session) => {
                tracing::debug!(session_id = %session.id, "session started");
                self.session = Some(session);
                self.session.as_ref()
            }
            None => {
                tracing::warn!("init message carried no session id");
                None
            }
        }
    }

    /// The recorded session, if one has been observed.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Consume the tracker, yielding the recorded session.
    #[must_use]
    pub fn into_session(self) -> Option<Session> {
        self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::builders::{assistant_text, result_success, system_init, system_status};

    #[test]
    fn first_init_creates_session() {
        let mut tracker = SessionTracker::new();
        let session = tracker.observe(&system_init("abc")).cloned().unwrap();
        assert_eq!(session.id, "abc");
        assert_eq!(tracker.session(), Some(&session));
    }

    #[test]
    fn repeated_init_is_ignored() {
        let mut tracker = SessionTracker::new();
        assert!(tracker.observe(&system_init("abc")).is_some());
        assert!(tracker.observe(&system_init("abc")).is_none());
        assert!(tracker.observe(&system_init("other")).is_none());
        assert_eq!(tracker.session().map(|s| s.id.as_str()), Some("abc"));
    }

    #[test]
    fn non_init_messages_never_create_a_session() {
        let mut tracker = SessionTracker::new();
        for msg in [
            system_status("abc"),
            assistant_text("hi"),
            result_success("abc"),
        ] {
            assert!(tracker.observe(&msg).is_none());
        }
        assert!(tracker.into_session().is_none());
    }

    #[test]
    fn init_without_session_id_is_skipped_until_a_valid_one() {
        let mut tracker = SessionTracker::new();
        let bare = Message::from_value(serde_json::json!({"type": "system", "subtype": "init"}))
            .unwrap();
        assert!(tracker.observe(&bare).is_none());
        assert!(tracker.observe(&system_init("late")).is_some());
        assert_eq!(tracker.into_session().unwrap().id, "late");
    }

    #[test]
    fn session_copies_init_details() {
        let session = Session::from_init(&system_init("s1")).unwrap();
        assert_eq!(session.model.as_deref(), Some("claude-3-5-haiku-20241022"));
        assert_eq!(session.cwd.as_deref(), Some("/tmp"));
        assert!(session.started_at <= Utc::now());
    }
}
