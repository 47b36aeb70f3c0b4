//! Event types for the Watchgate event system
//!
//! Provides the shared event definitions and EventBus used by the engine
//! and its call sites (training player, mini-training player).

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Normalized playback state reported by a video source adapter
///
/// Transitions: `unstarted → playing ⇄ paused/buffering → ended`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Unstarted,
    Playing,
    Paused,
    Buffering,
    Ended,
}

impl PlaybackState {
    /// Whether the position tracker should be sampling in this state
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Unstarted => write!(f, "unstarted"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Ended => write!(f, "ended"),
        }
    }
}

/// Which path produced a persisted progress write
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WriteOrigin {
    /// Coalesced tracker emission (rate-limited path)
    Debounced,
    /// Learner paused playback
    Pause,
    /// Media reached its end
    Ended,
    /// Tab/document became hidden
    VisibilityHidden,
    /// Page unload/navigation (teardown-surviving transport)
    Unload,
    /// Player component unmount
    Teardown,
}

impl std::fmt::Display for WriteOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteOrigin::Debounced => write!(f, "debounced"),
            WriteOrigin::Pause => write!(f, "pause"),
            WriteOrigin::Ended => write!(f, "ended"),
            WriteOrigin::VisibilityHidden => write!(f, "visibility-hidden"),
            WriteOrigin::Unload => write!(f, "unload"),
            WriteOrigin::Teardown => write!(f, "teardown"),
        }
    }
}

/// Who computed a gate verdict
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GateOrigin {
    /// Optimistic client-side recomputation on a tracker emission
    Local,
    /// Authoritative value from a server write response
    Server,
}

/// Watchgate event types
///
/// Events are broadcast via the EventBus; call sites subscribe to drive
/// progress bars, the quiz button, and error notices rather than polling
/// engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WatchEvent {
    /// Playback state changed (as reported by the active source adapter)
    ///
    /// Triggers:
    /// - UI: update play/pause control
    /// - Persister: pause/ended transitions ride the immediate path
    PlaybackStateChanged {
        /// Video being watched
        video_id: Uuid,
        /// Playback state before change
        old_state: PlaybackState,
        /// Playback state after change
        new_state: PlaybackState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Watched-seconds sample produced by the position tracker
    ///
    /// Emitted once per tick while playing (default: 1000ms). Lossy:
    /// slow subscribers may miss samples, the next tick supersedes.
    ///
    /// Triggers:
    /// - UI: update progress bar
    PositionSampled {
        /// Video being watched
        video_id: Uuid,
        /// Floored watched position in seconds
        watched_seconds: u32,
        /// Total duration in seconds, once metadata is known
        duration_seconds: Option<u32>,
        /// Sample timestamp
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Quiz gate verdict changed
    ///
    /// Local verdicts are advisory; a Server verdict overrides until the
    /// next tracker emission recomputes.
    ///
    /// Triggers:
    /// - UI: enable/disable the quiz button
    GateChanged {
        /// Video whose gate changed
        video_id: Uuid,
        /// Whether the dependent quiz may be started
        can_take_quiz: bool,
        /// Who computed the verdict
        origin: GateOrigin,
        /// When the verdict changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Progress write accepted by the server
    ///
    /// Triggers:
    /// - UI: refresh authoritative quiz availability
    ProgressPersisted {
        /// Video whose progress was written
        video_id: Uuid,
        /// Watched seconds carried by the write
        watched_seconds: u32,
        /// Authoritative gate value from the server response
        can_take_quiz: bool,
        /// Which path produced the write
        origin: WriteOrigin,
        /// When the response arrived
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Progress write failed
    ///
    /// Transient failures self-heal on the next tick or lifecycle event;
    /// only transport-level failures warrant a user-visible notice.
    PersistFailed {
        /// Video whose progress write failed
        video_id: Uuid,
        /// True for transport-level failures (connection refused, DNS),
        /// false for ordinary HTTP errors (5xx)
        transport_failure: bool,
        /// Failure description for logs/notices
        message: String,
        /// When the failure was observed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Resume seek applied to restore a prior session's position
    ResumeApplied {
        /// Video being resumed
        video_id: Uuid,
        /// Position the playhead was moved to
        target_seconds: u32,
        /// When the seek was issued
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Video source backend failed (handshake timeout, load error,
    /// unsupported reference)
    ///
    /// Triggers:
    /// - UI: one-time notice, render the player non-interactive
    SourceFailed {
        /// Video whose backend failed
        video_id: Uuid,
        /// Failure description
        reason: String,
        /// When the failure was detected
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl WatchEvent {
    /// Event name for logging and metrics
    pub fn event_name(&self) -> &'static str {
        match self {
            WatchEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            WatchEvent::PositionSampled { .. } => "PositionSampled",
            WatchEvent::GateChanged { .. } => "GateChanged",
            WatchEvent::ProgressPersisted { .. } => "ProgressPersisted",
            WatchEvent::PersistFailed { .. } => "PersistFailed",
            WatchEvent::ResumeApplied { .. } => "ResumeApplied",
            WatchEvent::SourceFailed { .. } => "SourceFailed",
        }
    }

    /// Video the event concerns
    pub fn video_id(&self) -> Uuid {
        match self {
            WatchEvent::PlaybackStateChanged { video_id, .. }
            | WatchEvent::PositionSampled { video_id, .. }
            | WatchEvent::GateChanged { video_id, .. }
            | WatchEvent::ProgressPersisted { video_id, .. }
            | WatchEvent::PersistFailed { video_id, .. }
            | WatchEvent::ResumeApplied { video_id, .. }
            | WatchEvent::SourceFailed { video_id, .. } => *video_id,
        }
    }
}

/// Central event distribution bus
///
/// Wraps tokio::broadcast, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WatchEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns the subscriber count, or an error when no subscriber is
    /// listening (callers that care should log it).
    pub fn emit(
        &self,
        event: WatchEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<WatchEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, silently dropping it when nobody is subscribed
    ///
    /// Used for high-frequency events (position samples) where a missing
    /// subscriber is normal.
    pub fn emit_lossy(&self, event: WatchEvent) {
        let _ = self.tx.send(event);
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("receivers", &self.tx.receiver_count())
            .finish()
    }
}
