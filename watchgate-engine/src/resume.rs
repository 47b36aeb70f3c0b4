//! Resume reconciler
//!
//! Restores the playhead to the last persisted position, exactly once
//! per session: `NotResumed → Resuming → Resumed`, with `Resumed`
//! terminal. Arms at the first moment both a prior snapshot and a known
//! non-zero duration exist; the two backends surface "duration known" at
//! different moments (handshake callback vs. play click), so every
//! opportunity funnels through the same guarded transition and the race
//! is harmless.
//!
//! A saved position in the last stretch of the video (at or past the
//! cutoff ratio, default 95%) counts as already finished and is not
//! resumed; neither is a saved position of 0, which is indistinguishable
//! from "no progress".

use tokio::sync::Mutex;
use tracing::{debug, info};
use watchgate_common::events::{EventBus, WatchEvent};

use crate::session::WatchSession;
use crate::source::SourceAdapter;

/// Which moment is offering a chance to apply the resume seek
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOpportunity {
    /// The adapter (or a metadata hint) just reported a duration
    DurationKnown,
    /// Playback is about to start on learner request
    PrePlay,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ResumePhase {
    NotResumed,
    Resuming {
        target_seconds: u32,
        /// The first seek went out against a backend that had not
        /// confirmed readiness; re-assert it at the pre-play moment
        deferred: bool,
    },
    Resumed,
}

/// Per-session resume state machine
pub struct ResumeReconciler {
    prior_percent: f64,
    cutoff_ratio: f64,
    phase: Mutex<ResumePhase>,
}

impl ResumeReconciler {
    /// Build from the snapshot's progress percent and the configured
    /// "already finished" cutoff
    pub fn new(prior_percent: f64, cutoff_ratio: f64) -> Self {
        let prior_percent = if prior_percent.is_finite() {
            prior_percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            prior_percent,
            cutoff_ratio,
            phase: Mutex::new(ResumePhase::NotResumed),
        }
    }

    /// Whether the terminal phase has been reached
    pub async fn is_resumed(&self) -> bool {
        *self.phase.lock().await == ResumePhase::Resumed
    }

    /// Offer the reconciler a chance to apply (or re-assert) the seek
    pub async fn try_resume(
        &self,
        session: &WatchSession,
        adapter: &dyn SourceAdapter,
        bus: &EventBus,
        opportunity: ResumeOpportunity,
    ) {
        let mut phase = self.phase.lock().await;
        match *phase {
            ResumePhase::Resumed => {}
            ResumePhase::Resuming {
                target_seconds,
                deferred,
            } => {
                if opportunity == ResumeOpportunity::PrePlay {
                    if deferred {
                        // The queued seek may or may not have reached the
                        // player; asserting the same target again is the
                        // reliable moment for a late-handshake backend
                        debug!(
                            video_id = %session.video_id(),
                            target_seconds,
                            "Re-asserting resume seek before playback"
                        );
                        adapter.seek(target_seconds as f64);
                    }
                    *phase = ResumePhase::Resumed;
                    session.mark_resumed().await;
                }
            }
            ResumePhase::NotResumed => {
                let Some(duration) = session.duration_seconds().await else {
                    return;
                };
                if duration == 0 {
                    return;
                }

                let saved_position =
                    (self.prior_percent / 100.0 * duration as f64).floor() as u32;
                let cutoff = duration as f64 * self.cutoff_ratio;

                if saved_position == 0 || (saved_position as f64) >= cutoff {
                    // Nothing to restore: fresh start or already finished
                    debug!(
                        video_id = %session.video_id(),
                        saved_position,
                        duration,
                        "No resume seek applicable"
                    );
                    *phase = ResumePhase::Resumed;
                    session.mark_resumed().await;
                    return;
                }

                info!(
                    video_id = %session.video_id(),
                    saved_position,
                    duration,
                    "Resuming playback at saved position"
                );
                adapter.seek(saved_position as f64);
                session.set_watched_seconds(saved_position).await;
                bus.emit_lossy(WatchEvent::ResumeApplied {
                    video_id: session.video_id(),
                    target_seconds: saved_position,
                    timestamp: chrono::Utc::now(),
                });

                if opportunity == ResumeOpportunity::PrePlay {
                    *phase = ResumePhase::Resumed;
                    session.mark_resumed().await;
                } else {
                    *phase = ResumePhase::Resuming {
                        target_seconds: saved_position,
                        deferred: !adapter.is_ready(),
                    };
                }
            }
        }
    }

    /// Playback actually started: the resume window is closed for good
    pub async fn on_playing(&self, session: &WatchSession) {
        let mut phase = self.phase.lock().await;
        if matches!(*phase, ResumePhase::Resuming { .. }) {
            *phase = ResumePhase::Resumed;
            session.mark_resumed().await;
        }
    }
}
