//! Watch session state management
//!
//! One `WatchSession` exists per (learner, video) pairing while a player
//! is mounted. The tracker owns `watched_seconds` writes, the resume
//! reconciler performs the one-time seek update, the persister maintains
//! `last_persisted_seconds`, and everyone else reads.

use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;
use watchgate_common::api::ProgressSnapshot;

use crate::gate::{self, GateInput, GateStatus, UnlockRule};

/// Shared per-mount session state
#[derive(Debug, Clone)]
pub struct WatchSession {
    video_id: Uuid,
    inner: Arc<RwLock<SessionInner>>,
}

#[derive(Debug)]
struct SessionInner {
    watched_seconds: u32,
    last_persisted_seconds: Option<u32>,
    duration_seconds: Option<u32>,
    minimum_watch_time: Option<u32>,
    unlock_rule: UnlockRule,
    has_resumed: bool,
    is_playing: bool,
    quiz_completed: bool,
    can_take_quiz: bool,
    /// Once the gate unlocks locally it stays unlocked for the session,
    /// even if the learner rewinds below the threshold. A server verdict
    /// resets this either way.
    unlock_latch: bool,
}

/// Read-only snapshot of session state, for call sites and diagnostics
#[derive(Debug, Clone, Copy)]
pub struct SessionView {
    pub watched_seconds: u32,
    pub last_persisted_seconds: Option<u32>,
    pub duration_seconds: Option<u32>,
    pub minimum_watch_time: Option<u32>,
    pub has_resumed: bool,
    pub is_playing: bool,
    pub quiz_completed: bool,
    pub can_take_quiz: bool,
}

impl WatchSession {
    /// Create a session seeded from the server's progress snapshot
    pub fn new(video_id: Uuid, snapshot: &ProgressSnapshot, unlock_rule: UnlockRule) -> Self {
        Self {
            video_id,
            inner: Arc::new(RwLock::new(SessionInner {
                watched_seconds: snapshot.watched_seconds,
                last_persisted_seconds: Some(snapshot.watched_seconds),
                duration_seconds: None,
                minimum_watch_time: None,
                unlock_rule,
                has_resumed: false,
                is_playing: false,
                quiz_completed: snapshot.quiz_completed,
                // A completed quiz keeps the gate open from the start;
                // everything else stays locked until duration is known
                can_take_quiz: snapshot.quiz_completed,
                unlock_latch: snapshot.quiz_completed,
            })),
        }
    }

    pub fn video_id(&self) -> Uuid {
        self.video_id
    }

    pub async fn watched_seconds(&self) -> u32 {
        self.inner.read().await.watched_seconds
    }

    pub async fn set_watched_seconds(&self, seconds: u32) {
        self.inner.write().await.watched_seconds = seconds;
    }

    pub async fn last_persisted_seconds(&self) -> Option<u32> {
        self.inner.read().await.last_persisted_seconds
    }

    pub async fn set_last_persisted(&self, seconds: u32) {
        self.inner.write().await.last_persisted_seconds = Some(seconds);
    }

    pub async fn duration_seconds(&self) -> Option<u32> {
        self.inner.read().await.duration_seconds
    }

    /// Record the duration and resolve the unlock threshold from it
    pub async fn set_duration(&self, duration_seconds: u32) {
        let mut inner = self.inner.write().await;
        inner.duration_seconds = Some(duration_seconds);
        inner.minimum_watch_time = inner.unlock_rule.resolve(Some(duration_seconds));
    }

    pub async fn minimum_watch_time(&self) -> Option<u32> {
        self.inner.read().await.minimum_watch_time
    }

    pub async fn is_playing(&self) -> bool {
        self.inner.read().await.is_playing
    }

    pub async fn set_is_playing(&self, playing: bool) {
        self.inner.write().await.is_playing = playing;
    }

    pub async fn has_resumed(&self) -> bool {
        self.inner.read().await.has_resumed
    }

    /// Flip the resume guard; returns false when already resumed
    pub async fn mark_resumed(&self) -> bool {
        let mut inner = self.inner.write().await;
        if inner.has_resumed {
            false
        } else {
            inner.has_resumed = true;
            true
        }
    }

    pub async fn can_take_quiz(&self) -> bool {
        self.inner.read().await.can_take_quiz
    }

    /// Recompute the gate from current state
    ///
    /// Synchronous with respect to the tracker tick: no I/O. Returns the
    /// new verdict when it changed, `None` when it held.
    pub async fn recompute_gate(&self) -> Option<bool> {
        let mut inner = self.inner.write().await;
        let status = gate::evaluate(GateInput {
            watched_seconds: inner.watched_seconds,
            minimum_watch_time: inner.minimum_watch_time,
            quiz_completed: inner.quiz_completed,
            duration_seconds: inner.duration_seconds,
        });

        let unlocked = status.unlocked || inner.unlock_latch;
        if unlocked {
            inner.unlock_latch = true;
        }

        if unlocked != inner.can_take_quiz {
            inner.can_take_quiz = unlocked;
            Some(unlocked)
        } else {
            None
        }
    }

    /// Apply the server's authoritative verdict from a write response
    ///
    /// The server value wins outright: it replaces the effective verdict
    /// and the latch, so a server "locked" survives until local state
    /// genuinely re-crosses the threshold.
    pub async fn apply_server_gate(&self, can_take_quiz: bool, quiz_completed: bool) -> bool {
        let mut inner = self.inner.write().await;
        inner.quiz_completed = quiz_completed;
        inner.unlock_latch = can_take_quiz;
        if inner.can_take_quiz != can_take_quiz {
            inner.can_take_quiz = can_take_quiz;
            true
        } else {
            false
        }
    }

    /// Gate status including the display-only unlock ratio
    pub async fn gate_status(&self) -> GateStatus {
        let inner = self.inner.read().await;
        GateStatus {
            unlocked: inner.can_take_quiz,
            unlock_ratio: gate::unlock_ratio(
                inner.watched_seconds,
                inner.minimum_watch_time,
                inner.duration_seconds,
            ),
        }
    }

    /// Consistent snapshot of the session
    pub async fn view(&self) -> SessionView {
        let inner = self.inner.read().await;
        SessionView {
            watched_seconds: inner.watched_seconds,
            last_persisted_seconds: inner.last_persisted_seconds,
            duration_seconds: inner.duration_seconds,
            minimum_watch_time: inner.minimum_watch_time,
            has_resumed: inner.has_resumed,
            is_playing: inner.is_playing,
            quiz_completed: inner.quiz_completed,
            can_take_quiz: inner.can_take_quiz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_min(minimum: Option<u32>, ratio: f64) -> WatchSession {
        WatchSession::new(
            Uuid::new_v4(),
            &ProgressSnapshot::empty(),
            UnlockRule::new(minimum, ratio),
        )
    }

    #[tokio::test]
    async fn gate_stays_locked_until_duration_is_known() {
        let session = session_with_min(Some(60), 1.0);
        session.set_watched_seconds(10_000).await;

        assert_eq!(session.recompute_gate().await, None);
        assert!(!session.can_take_quiz().await);

        session.set_duration(120).await;
        assert_eq!(session.recompute_gate().await, Some(true));
        assert!(session.can_take_quiz().await);
    }

    #[tokio::test]
    async fn gate_does_not_relock_on_rewind() {
        let session = session_with_min(Some(60), 1.0);
        session.set_duration(120).await;

        session.set_watched_seconds(60).await;
        assert_eq!(session.recompute_gate().await, Some(true));

        // Rewinding below the threshold keeps the session unlocked
        session.set_watched_seconds(30).await;
        assert_eq!(session.recompute_gate().await, None);
        assert!(session.can_take_quiz().await);
    }

    #[tokio::test]
    async fn server_verdict_overrides_local_latch() {
        let session = session_with_min(Some(60), 1.0);
        session.set_duration(120).await;
        session.set_watched_seconds(60).await;
        session.recompute_gate().await;
        assert!(session.can_take_quiz().await);

        // Server disagrees: its verdict replaces the latch
        assert!(session.apply_server_gate(false, false).await);
        assert!(!session.can_take_quiz().await);

        // With watched time below the threshold the gate stays locked
        session.set_watched_seconds(30).await;
        assert_eq!(session.recompute_gate().await, None);

        // Re-crossing the threshold genuinely unlocks again
        session.set_watched_seconds(61).await;
        assert_eq!(session.recompute_gate().await, Some(true));
    }

    #[tokio::test]
    async fn completed_quiz_opens_the_gate_immediately() {
        let snapshot = ProgressSnapshot {
            watched_seconds: 5,
            video_progress_percent: 4.0,
            quiz_completed: true,
            minimum_watch_time: Some(60),
        };
        let session =
            WatchSession::new(Uuid::new_v4(), &snapshot, UnlockRule::new(Some(60), 1.0));
        assert!(session.can_take_quiz().await);
    }

    #[tokio::test]
    async fn mark_resumed_flips_exactly_once() {
        let session = session_with_min(None, 0.5);
        assert!(session.mark_resumed().await);
        assert!(!session.mark_resumed().await);
        assert!(session.has_resumed().await);
    }
}
