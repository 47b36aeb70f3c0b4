//! Watch engine: wiring and lifecycle
//!
//! One `WatchEngine` instance per mounted player. The same engine serves
//! both call sites (main training player, nested mini-training player);
//! only the [`EngineOptions`] differ. Mounting fetches the prior
//! progress snapshot, builds the session, spawns the tracker and
//! persister tasks, and arms the resume reconciler. Disposal cancels
//! every timer, detaches adapter listeners and performs exactly one
//! final immediate flush before the handle is discarded.

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use watchgate_common::api::ProgressSnapshot;
use watchgate_common::events::{EventBus, WatchEvent, WriteOrigin};
use watchgate_common::WatchParams;

use crate::error::{Error, Result};
use crate::gate::{GateStatus, UnlockRule};
use crate::persister::{self, PersisterHandle};
use crate::resume::{ResumeOpportunity, ResumeReconciler};
use crate::session::{SessionView, WatchSession};
use crate::source::{EmbedBridge, EmbeddedPlayer, NativeElement, SourceAdapter, VideoSource};
use crate::tracker;
use crate::transport::ProgressTransport;

/// Parameters distinguishing the two call sites
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Lesson/video identifier used by the progress contract
    pub video_id: Uuid,
    /// Raw video reference deciding the backend
    pub video_ref: String,
    /// Fallback unlock threshold as a fraction of duration, used when
    /// the server supplies no absolute minimum watch time
    pub unlock_ratio: f64,
    /// Duration metadata from the authoring system, when available
    /// before the adapter reports it
    pub duration_hint: Option<u32>,
    /// Engine timing parameters
    pub params: WatchParams,
}

impl EngineOptions {
    /// Main training player: the threshold is author-specified (server
    /// supplied); absent that, the whole video must be watched
    pub fn training(video_id: Uuid, video_ref: impl Into<String>, params: WatchParams) -> Self {
        Self {
            video_id,
            video_ref: video_ref.into(),
            unlock_ratio: 1.0,
            duration_hint: None,
            params,
        }
    }

    /// Nested mini-training player: half the video by default
    pub fn mini_training(
        video_id: Uuid,
        video_ref: impl Into<String>,
        params: WatchParams,
    ) -> Self {
        let unlock_ratio = params.mini_unlock_ratio;
        Self {
            video_id,
            video_ref: video_ref.into(),
            unlock_ratio,
            duration_hint: None,
            params,
        }
    }

    pub fn with_duration_hint(mut self, duration_seconds: u32) -> Self {
        self.duration_hint = Some(duration_seconds);
        self
    }
}

/// How the host connects the engine to a playback backend
pub enum SourceBinding {
    /// Channel bridge to an embedded third-party player
    Embedded(EmbedBridge),
    /// Locally owned native media element
    Native(NativeElement),
    /// Pre-built adapter (custom hosts, tests)
    Adapter(Arc<dyn SourceAdapter>),
}

/// Per-mount watch-progress engine
pub struct WatchEngine {
    video_id: Uuid,
    session: WatchSession,
    bus: EventBus,
    adapter: Option<Arc<dyn SourceAdapter>>,
    persister: Option<PersisterHandle>,
    reconciler: Arc<ResumeReconciler>,
    tracker_task: Option<JoinHandle<()>>,
    persister_task: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    disposed: bool,
}

impl WatchEngine {
    /// Mount the engine for a video
    ///
    /// Fetches the prior progress snapshot (failures degrade to "no
    /// prior progress" and are logged, never fatal), detects the
    /// backend, and starts the tracker/persister tasks. An unsupported
    /// video reference mounts a disabled engine: gate locked, no tasks,
    /// no writes, so the surrounding page stays usable.
    pub async fn mount(
        options: EngineOptions,
        binding: SourceBinding,
        transport: Arc<dyn ProgressTransport>,
    ) -> Result<Self> {
        let EngineOptions {
            video_id,
            video_ref,
            unlock_ratio,
            duration_hint,
            params,
        } = options;

        let snapshot = match transport.fetch(video_id).await {
            Ok(snapshot) => snapshot,
            Err(Error::NotFound(_)) => {
                debug!(video_id = %video_id, "No prior progress recorded");
                ProgressSnapshot::empty()
            }
            Err(e) => {
                warn!(
                    video_id = %video_id,
                    error = %e,
                    "Progress fetch failed, starting without prior progress"
                );
                ProgressSnapshot::empty()
            }
        };

        let bus = EventBus::new(params.event_capacity);
        let unlock_rule = UnlockRule::new(snapshot.minimum_watch_time, unlock_ratio);
        let session = WatchSession::new(video_id, &snapshot, unlock_rule);
        let reconciler = Arc::new(ResumeReconciler::new(
            snapshot.video_progress_percent,
            params.resume_cutoff_ratio,
        ));

        let adapter: Arc<dyn SourceAdapter> = match (VideoSource::parse(&video_ref), binding) {
            (VideoSource::Unsupported { raw }, _) => {
                warn!(video_id = %video_id, video_ref = %raw, "Unsupported video reference");
                bus.emit_lossy(WatchEvent::SourceFailed {
                    video_id,
                    reason: format!("unsupported video reference: {raw}"),
                    timestamp: chrono::Utc::now(),
                });
                return Ok(Self {
                    video_id,
                    session,
                    bus,
                    adapter: None,
                    persister: None,
                    reconciler,
                    tracker_task: None,
                    persister_task: None,
                    shutdown_tx: None,
                    disposed: false,
                });
            }
            (VideoSource::Embedded { embed_id }, SourceBinding::Embedded(bridge)) => {
                Arc::new(EmbeddedPlayer::connect(embed_id, bridge, &params))
            }
            (VideoSource::Native { .. }, SourceBinding::Native(element)) => Arc::new(element),
            (_, SourceBinding::Adapter(adapter)) => adapter,
            (source, _) => {
                return Err(Error::Config(format!(
                    "source binding does not match detected backend {source:?}"
                )));
            }
        };

        // Duration supplied by the authoring system arrives before any
        // adapter metadata; the reconciler may already be able to act
        if let Some(hint) = duration_hint.filter(|d| *d > 0) {
            session.set_duration(hint).await;
            reconciler
                .try_resume(
                    &session,
                    adapter.as_ref(),
                    &bus,
                    ResumeOpportunity::DurationKnown,
                )
                .await;
        }

        let (persister, persister_task) = persister::spawn(
            session.clone(),
            Arc::clone(&transport),
            bus.clone(),
            params.debounce_window(),
            params.min_persist_delta_seconds,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tracker_task = tracker::spawn(
            session.clone(),
            Arc::clone(&adapter),
            persister.clone(),
            Arc::clone(&reconciler),
            bus.clone(),
            params.tick_interval(),
            shutdown_rx,
        );

        info!(
            video_id = %video_id,
            video_ref = %video_ref,
            unlock_ratio,
            "Watch engine mounted"
        );

        Ok(Self {
            video_id,
            session,
            bus,
            adapter: Some(adapter),
            persister: Some(persister),
            reconciler,
            tracker_task: Some(tracker_task),
            persister_task: Some(persister_task),
            shutdown_tx: Some(shutdown_tx),
            disposed: false,
        })
    }

    pub fn video_id(&self) -> Uuid {
        self.video_id
    }

    /// Whether the engine mounted without a usable backend
    pub fn is_disabled(&self) -> bool {
        self.adapter.is_none()
    }

    /// Subscribe to engine events
    pub fn events(&self) -> broadcast::Receiver<WatchEvent> {
        self.bus.subscribe()
    }

    /// Start (or resume) playback
    ///
    /// Offers the reconciler its pre-play opportunity first, so a
    /// deferred resume seek is re-asserted at the moment the backend is
    /// most likely to honor it.
    pub async fn play(&self) {
        let Some(adapter) = &self.adapter else { return };
        self.reconciler
            .try_resume(
                &self.session,
                adapter.as_ref(),
                &self.bus,
                ResumeOpportunity::PrePlay,
            )
            .await;
        adapter.play();
    }

    pub fn pause(&self) {
        if let Some(adapter) = &self.adapter {
            adapter.pause();
        }
    }

    /// Learner-initiated seek; rewinding is allowed and reflected
    pub fn seek(&self, seconds: f64) {
        if let Some(adapter) = &self.adapter {
            adapter.seek(seconds);
        }
    }

    /// Current gate verdict and display ratio
    pub async fn gate_status(&self) -> GateStatus {
        self.session.gate_status().await
    }

    /// Read-only snapshot of session state
    pub async fn session_view(&self) -> SessionView {
        self.session.view().await
    }

    /// Lifecycle hook: the tab/document became hidden
    pub async fn notify_visibility_hidden(&self) {
        let (Some(adapter), Some(persister)) = (&self.adapter, &self.persister) else {
            return;
        };
        let seconds = tracker::freshest_seconds(adapter.as_ref(), &self.session).await;
        self.session.set_watched_seconds(seconds).await;
        persister.fire(seconds, WriteOrigin::VisibilityHidden);
    }

    /// Lifecycle hook: the page is unloading
    ///
    /// The write rides the teardown-surviving transport; control may be
    /// lost at any moment, so nothing awaits the outcome.
    pub async fn notify_page_unload(&self) {
        let (Some(adapter), Some(persister)) = (&self.adapter, &self.persister) else {
            return;
        };
        let seconds = tracker::freshest_seconds(adapter.as_ref(), &self.session).await;
        self.session.set_watched_seconds(seconds).await;
        persister.detached(seconds, WriteOrigin::Unload);
    }

    /// Lifecycle hook: the player component is unmounting
    ///
    /// Cancels the sampling timer and any pending debounced write,
    /// performs exactly one final immediate flush, then tears the tasks
    /// down. Nothing can fire after this returns.
    pub async fn dispose(mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some(shutdown) = self.shutdown_tx.take() {
            let _ = shutdown.send(true);
        }
        if let Some(task) = self.tracker_task.take() {
            let _ = task.await;
        }

        if let (Some(adapter), Some(persister)) = (&self.adapter, &self.persister) {
            let seconds = tracker::freshest_seconds(adapter.as_ref(), &self.session).await;
            self.session.set_watched_seconds(seconds).await;
            persister.flush(seconds, WriteOrigin::Teardown).await;
        }

        // Dropping the last handle closes the persister's channel
        self.persister = None;
        if let Some(task) = self.persister_task.take() {
            let _ = task.await;
        }

        if let Some(adapter) = self.adapter.take() {
            adapter.shutdown();
        }

        info!(video_id = %self.video_id, "Watch engine disposed");
    }
}

impl Drop for WatchEngine {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }
        // Dropped without dispose(): kill the timers so nothing fires
        // after the handle is gone. The final flush is lost, which is
        // exactly what dispose() exists to prevent.
        warn!(
            video_id = %self.video_id,
            "Watch engine dropped without dispose(), final flush skipped"
        );
        if let Some(task) = self.tracker_task.take() {
            task.abort();
        }
        if let Some(task) = self.persister_task.take() {
            task.abort();
        }
        if let Some(adapter) = self.adapter.take() {
            adapter.shutdown();
        }
    }
}
