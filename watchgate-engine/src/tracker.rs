//! Position tracker
//!
//! Converts backend-specific playback into the single `watched_seconds`
//! signal. One task per session owns the only sampling timer: it selects
//! over adapter notices and a fixed interval gated on a sampling flag,
//! so start/stop is idempotent by construction and no duplicate timers
//! can exist.
//!
//! Every sample synchronously recomputes the unlock gate (no network I/O
//! on that path) and feeds the persister's debounced path. Pause/ended
//! transitions ride the immediate path with the freshest position the
//! adapter will give.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};
use watchgate_common::api::types::validate_watched_seconds;
use watchgate_common::events::{EventBus, GateOrigin, WatchEvent, WriteOrigin};

use crate::persister::PersisterHandle;
use crate::resume::{ResumeOpportunity, ResumeReconciler};
use crate::session::WatchSession;
use crate::source::{SourceAdapter, SourceNotice};

/// Read the freshest position available: the adapter directly when it
/// has one, the last tracked value otherwise
///
/// Lifecycle flushes use this because the last tracker emission can be
/// up to one tick old.
pub(crate) async fn freshest_seconds(adapter: &dyn SourceAdapter, session: &WatchSession) -> u32 {
    if let Some(time) = adapter.current_time() {
        match validate_watched_seconds(time) {
            Ok(seconds) => return seconds,
            Err(e) => warn!(
                video_id = %session.video_id(),
                error = %e,
                "Adapter reported invalid position, using tracked value"
            ),
        }
    }
    session.watched_seconds().await
}

/// Spawn the tracker task for a session
pub fn spawn(
    session: WatchSession,
    adapter: Arc<dyn SourceAdapter>,
    persister: PersisterHandle,
    reconciler: Arc<ResumeReconciler>,
    bus: EventBus,
    tick_interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run(
        session,
        adapter,
        persister,
        reconciler,
        bus,
        tick_interval,
        shutdown,
    ))
}

async fn run(
    session: WatchSession,
    adapter: Arc<dyn SourceAdapter>,
    persister: PersisterHandle,
    reconciler: Arc<ResumeReconciler>,
    bus: EventBus,
    tick_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut notices = adapter.notices();
    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut sampling = adapter.state().is_playing();

    // Metadata may already be known (native element, config hint)
    if let Some(duration) = adapter.duration() {
        apply_duration(&session, adapter.as_ref(), &reconciler, &bus, duration).await;
    }

    info!(
        video_id = %session.video_id(),
        interval_ms = tick_interval.as_millis() as u64,
        "Position tracker started"
    );

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            notice = notices.recv() => match notice {
                Ok(SourceNotice::StateChanged { old, new }) => {
                    session.set_is_playing(new.is_playing()).await;
                    sampling = new.is_playing();
                    bus.emit_lossy(WatchEvent::PlaybackStateChanged {
                        video_id: session.video_id(),
                        old_state: old,
                        new_state: new,
                        timestamp: chrono::Utc::now(),
                    });

                    use watchgate_common::events::PlaybackState::*;
                    match new {
                        Playing => reconciler.on_playing(&session).await,
                        Paused => {
                            let seconds = freshest_seconds(adapter.as_ref(), &session).await;
                            session.set_watched_seconds(seconds).await;
                            persister.fire(seconds, WriteOrigin::Pause);
                        }
                        Ended => {
                            let seconds = freshest_seconds(adapter.as_ref(), &session).await;
                            session.set_watched_seconds(seconds).await;
                            persister.fire(seconds, WriteOrigin::Ended);
                        }
                        Unstarted | Buffering => {}
                    }
                }
                Ok(SourceNotice::DurationKnown(duration)) => {
                    apply_duration(&session, adapter.as_ref(), &reconciler, &bus, duration).await;
                }
                Ok(SourceNotice::Failed { reason }) => {
                    sampling = false;
                    session.set_is_playing(false).await;
                    bus.emit_lossy(WatchEvent::SourceFailed {
                        video_id: session.video_id(),
                        reason,
                        timestamp: chrono::Utc::now(),
                    });
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    debug!(
                        video_id = %session.video_id(),
                        missed,
                        "Tracker lagged behind adapter notices"
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },

            _ = ticker.tick(), if sampling => {
                let Some(time) = adapter.current_time() else {
                    continue;
                };
                let seconds = match validate_watched_seconds(time) {
                    Ok(seconds) => seconds,
                    Err(e) => {
                        debug!(
                            video_id = %session.video_id(),
                            error = %e,
                            "Dropping invalid position sample"
                        );
                        continue;
                    }
                };

                // Truth, not forward-only: an explicit rewind lowers the
                // reported position (only the gate latches)
                session.set_watched_seconds(seconds).await;
                if let Some(unlocked) = session.recompute_gate().await {
                    bus.emit_lossy(WatchEvent::GateChanged {
                        video_id: session.video_id(),
                        can_take_quiz: unlocked,
                        origin: GateOrigin::Local,
                        timestamp: chrono::Utc::now(),
                    });
                }
                bus.emit_lossy(WatchEvent::PositionSampled {
                    video_id: session.video_id(),
                    watched_seconds: seconds,
                    duration_seconds: session.duration_seconds().await,
                    timestamp: chrono::Utc::now(),
                });
                persister.debounced(seconds);
            }
        }
    }

    debug!(video_id = %session.video_id(), "Position tracker stopped");
}

/// Fold a newly known duration into the session and re-evaluate
/// everything that depends on it
async fn apply_duration(
    session: &WatchSession,
    adapter: &dyn SourceAdapter,
    reconciler: &ResumeReconciler,
    bus: &EventBus,
    duration: f64,
) {
    let Ok(duration_seconds) = validate_watched_seconds(duration) else {
        warn!(
            video_id = %session.video_id(),
            duration,
            "Ignoring invalid duration report"
        );
        return;
    };
    if duration_seconds == 0 {
        return;
    }

    session.set_duration(duration_seconds).await;
    reconciler
        .try_resume(session, adapter, bus, ResumeOpportunity::DurationKnown)
        .await;
    // The threshold may have just become known with enough watched time
    if let Some(unlocked) = session.recompute_gate().await {
        bus.emit_lossy(WatchEvent::GateChanged {
            video_id: session.video_id(),
            can_take_quiz: unlocked,
            origin: GateOrigin::Local,
            timestamp: chrono::Utc::now(),
        });
    }
}
