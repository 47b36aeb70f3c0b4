//! Progress persister
//!
//! Owns the two write paths of the engine:
//!
//! - **Debounced**: tracker emissions reset a pending window (default
//!   1000ms, last value wins). Deltas under the minimum against the last
//!   persisted value are suppressed as jitter before any timer is armed.
//! - **Immediate**: critical transitions (pause, ended, visibility
//!   hidden, teardown) cancel the pending window and write now, whatever
//!   the delta.
//!
//! A single task owns the only debounce slot, so "at most one in-flight
//! debounced timer per session" and "immediate supersedes debounced"
//! hold by construction. Write failures are logged and self-heal on the
//! next tick or lifecycle event; they never block playback.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, warn};
use watchgate_common::api::ProgressUpdate;
use watchgate_common::events::{EventBus, GateOrigin, WatchEvent, WriteOrigin};

use crate::session::WatchSession;
use crate::transport::{self, ProgressTransport};

enum Request {
    Debounced(u32),
    Immediate {
        seconds: u32,
        origin: WriteOrigin,
        ack: Option<oneshot::Sender<()>>,
    },
    Detached {
        seconds: u32,
        origin: WriteOrigin,
    },
}

/// Handle for submitting writes to the persister task
///
/// Dropping every handle shuts the task down; the engine performs its
/// final flush first.
#[derive(Clone)]
pub struct PersisterHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl PersisterHandle {
    /// Rate-limited path: schedule a write for the debounce window
    pub fn debounced(&self, seconds: u32) {
        let _ = self.tx.send(Request::Debounced(seconds));
    }

    /// Immediate path, fire-and-forget
    pub fn fire(&self, seconds: u32, origin: WriteOrigin) {
        let _ = self.tx.send(Request::Immediate {
            seconds,
            origin,
            ack: None,
        });
    }

    /// Immediate path, awaiting write completion
    ///
    /// Used by teardown so disposal can guarantee the final write went
    /// out (or failed) before the handle is discarded.
    pub async fn flush(&self, seconds: u32, origin: WriteOrigin) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .tx
            .send(Request::Immediate {
                seconds,
                origin,
                ack: Some(ack_tx),
            })
            .is_err()
        {
            return;
        }
        let _ = ack_rx.await;
    }

    /// Unload-safe path: cancel any pending window and hand the write to
    /// a task that survives engine teardown
    pub fn detached(&self, seconds: u32, origin: WriteOrigin) {
        let _ = self.tx.send(Request::Detached { seconds, origin });
    }
}

/// Spawn the persister task for a session
pub fn spawn(
    session: WatchSession,
    transport: Arc<dyn ProgressTransport>,
    bus: EventBus,
    debounce_window: Duration,
    min_delta_seconds: u32,
) -> (PersisterHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(
        session,
        transport,
        bus,
        debounce_window,
        min_delta_seconds,
        rx,
    ));
    (PersisterHandle { tx }, task)
}

fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(60 * 60 * 24 * 365)
}

async fn run(
    session: WatchSession,
    transport: Arc<dyn ProgressTransport>,
    bus: EventBus,
    debounce_window: Duration,
    min_delta_seconds: u32,
    mut rx: mpsc::UnboundedReceiver<Request>,
) {
    let mut pending: Option<u32> = None;
    let timer = sleep_until(far_future());
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;
            _ = &mut timer, if pending.is_some() => {
                if let Some(seconds) = pending.take() {
                    timer.as_mut().reset(far_future());
                    write(&session, transport.as_ref(), &bus, seconds, WriteOrigin::Debounced).await;
                }
            }
            request = rx.recv() => match request {
                None => break,
                Some(Request::Debounced(seconds)) => {
                    if let Some(last) = session.last_persisted_seconds().await {
                        if seconds.abs_diff(last) < min_delta_seconds {
                            debug!(
                                video_id = %session.video_id(),
                                seconds,
                                last_persisted = last,
                                "Suppressing sub-delta progress write"
                            );
                            continue;
                        }
                    }
                    // Classic debounce: the newest value replaces the
                    // pending one and the window starts over
                    pending = Some(seconds);
                    timer.as_mut().reset(Instant::now() + debounce_window);
                }
                Some(Request::Immediate { seconds, origin, ack }) => {
                    pending = None;
                    timer.as_mut().reset(far_future());
                    write(&session, transport.as_ref(), &bus, seconds, origin).await;
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
                Some(Request::Detached { seconds, origin }) => {
                    pending = None;
                    timer.as_mut().reset(far_future());
                    let is_playing = session.is_playing().await;
                    transport::store_detached(
                        Arc::clone(&transport),
                        bus.clone(),
                        session.video_id(),
                        ProgressUpdate {
                            watched_seconds: seconds,
                            is_playing,
                        },
                        origin,
                    );
                }
            },
            _ = &mut timer, if pending.is_some() => {
                if let Some(seconds) = pending.take() {
                    timer.as_mut().reset(far_future());
                    write(&session, transport.as_ref(), &bus, seconds, WriteOrigin::Debounced).await;
                }
            }
        }
    }
}

/// Perform one write and fold the server's response into the session
async fn write(
    session: &WatchSession,
    transport: &dyn ProgressTransport,
    bus: &EventBus,
    seconds: u32,
    origin: WriteOrigin,
) {
    let update = ProgressUpdate {
        watched_seconds: seconds,
        is_playing: session.is_playing().await,
    };

    match transport.store(session.video_id(), update).await {
        Ok(receipt) => {
            session.set_last_persisted(seconds).await;
            // The server's verdict is authoritative; the optimistic
            // client gate must never contradict it
            let gate_changed = session
                .apply_server_gate(receipt.can_take_quiz, receipt.quiz_completed)
                .await;

            debug!(
                video_id = %session.video_id(),
                watched_seconds = seconds,
                %origin,
                can_take_quiz = receipt.can_take_quiz,
                "Progress write accepted"
            );
            bus.emit_lossy(WatchEvent::ProgressPersisted {
                video_id: session.video_id(),
                watched_seconds: seconds,
                can_take_quiz: receipt.can_take_quiz,
                origin,
                timestamp: chrono::Utc::now(),
            });
            if gate_changed {
                bus.emit_lossy(WatchEvent::GateChanged {
                    video_id: session.video_id(),
                    can_take_quiz: receipt.can_take_quiz,
                    origin: GateOrigin::Server,
                    timestamp: chrono::Utc::now(),
                });
            }
        }
        Err(e) => {
            // Not retried here: the next tick or lifecycle event writes
            // a fresher value anyway
            warn!(
                video_id = %session.video_id(),
                watched_seconds = seconds,
                %origin,
                error = %e,
                "Progress write failed"
            );
            bus.emit_lossy(WatchEvent::PersistFailed {
                video_id: session.video_id(),
                transport_failure: e.is_transport_failure(),
                message: e.to_string(),
                timestamp: chrono::Utc::now(),
            });
        }
    }
}
