//! Embedded third-party player backend
//!
//! The external player sits behind an asynchronous handshake: the host
//! page loads the provider script, constructs the player, and forwards
//! its callbacks over a channel bridge. Until the handshake completes,
//! control calls are queued and flushed by a bounded readiness poll
//! (every 100ms, giving up at a deadline) rather than failing.
//!
//! Position and duration arrive as notices from the player and are
//! cached; `current_time()` is unavailable until the first report.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};
use tracing::{debug, warn};
use watchgate_common::events::PlaybackState;
use watchgate_common::WatchParams;

use super::{SourceAdapter, SourceNotice};

const NOTICE_CAPACITY: usize = 64;

/// Handshake state of the external player handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedReadiness {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

/// Commands forwarded to the external player
#[derive(Debug, Clone, PartialEq)]
pub enum EmbedCommand {
    Play,
    Pause,
    Seek(f64),
}

/// Callbacks forwarded from the external player
#[derive(Debug, Clone)]
pub enum EmbedNotice {
    /// Handshake completed; the player accepts commands now
    Ready { duration_seconds: Option<f64> },
    /// Normalized playback state callback
    State(PlaybackState),
    /// Periodic playhead report in seconds
    Time(f64),
    /// Duration metadata report in seconds
    Duration(f64),
    /// Provider-side error
    Error(String),
}

/// Adapter half of the channel pair connecting the engine to the host's
/// player integration
pub struct EmbedBridge {
    commands_tx: mpsc::UnboundedSender<EmbedCommand>,
    notices_rx: mpsc::UnboundedReceiver<EmbedNotice>,
}

/// Host half of the channel pair: receives commands to forward to the
/// provider API and sends its callbacks back as notices
pub struct EmbedHost {
    pub commands: mpsc::UnboundedReceiver<EmbedCommand>,
    pub notices: mpsc::UnboundedSender<EmbedNotice>,
}

impl EmbedBridge {
    /// Create a connected bridge/host pair
    pub fn pair() -> (EmbedBridge, EmbedHost) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        (
            EmbedBridge {
                commands_tx,
                notices_rx,
            },
            EmbedHost {
                commands: commands_rx,
                notices: notices_tx,
            },
        )
    }
}

#[derive(Debug)]
struct Shared {
    readiness: EmbedReadiness,
    state: PlaybackState,
    last_time: Option<f64>,
    duration: Option<f64>,
}

struct Inner {
    embed_id: String,
    shared: RwLock<Shared>,
    pending: Mutex<VecDeque<EmbedCommand>>,
    commands: mpsc::UnboundedSender<EmbedCommand>,
    notices: broadcast::Sender<SourceNotice>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Embedded third-party player adapter
///
/// Cheap to clone; clones share the same player handle.
#[derive(Clone)]
pub struct EmbeddedPlayer {
    inner: Arc<Inner>,
}

impl EmbeddedPlayer {
    /// Connect to an external player through a host-provided bridge
    ///
    /// The handshake starts immediately: a pump task consumes player
    /// notices while a poll task waits for readiness and flushes queued
    /// commands, giving up after `embed_ready_deadline`.
    pub fn connect(embed_id: impl Into<String>, bridge: EmbedBridge, params: &WatchParams) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let player = Self {
            inner: Arc::new(Inner {
                embed_id: embed_id.into(),
                shared: RwLock::new(Shared {
                    readiness: EmbedReadiness::Loading,
                    state: PlaybackState::Unstarted,
                    last_time: None,
                    duration: None,
                }),
                pending: Mutex::new(VecDeque::new()),
                commands: bridge.commands_tx,
                notices,
                tasks: Mutex::new(Vec::new()),
            }),
        };

        let pump = tokio::spawn(pump_notices(player.clone(), bridge.notices_rx));
        let poll = tokio::spawn(poll_readiness(
            player.clone(),
            params.embed_poll_interval(),
            params.embed_ready_deadline(),
        ));
        {
            let mut tasks = player.inner.tasks.lock().unwrap();
            tasks.push(pump);
            tasks.push(poll);
        }

        player
    }

    /// Provider video id this player embeds
    pub fn embed_id(&self) -> &str {
        &self.inner.embed_id
    }

    /// Current handshake state
    pub fn readiness(&self) -> EmbedReadiness {
        self.inner.shared.read().unwrap().readiness
    }

    /// Queue or forward a command, depending on readiness
    fn send(&self, command: EmbedCommand) {
        match self.readiness() {
            EmbedReadiness::Ready => {
                // Preserve order: anything still queued goes out first
                self.flush_pending();
                if self.inner.commands.send(command).is_err() {
                    debug!(embed_id = %self.inner.embed_id, "Player bridge closed, dropping command");
                }
            }
            EmbedReadiness::Uninitialized | EmbedReadiness::Loading => {
                debug!(
                    embed_id = %self.inner.embed_id,
                    ?command,
                    "Player not ready, queuing command"
                );
                self.inner.pending.lock().unwrap().push_back(command);
            }
            EmbedReadiness::Failed => {
                warn!(
                    embed_id = %self.inner.embed_id,
                    ?command,
                    "Player handle failed, dropping command"
                );
            }
        }
    }

    fn flush_pending(&self) {
        let mut pending = self.inner.pending.lock().unwrap();
        while let Some(command) = pending.pop_front() {
            if self.inner.commands.send(command).is_err() {
                pending.clear();
                return;
            }
        }
    }

    fn fail(&self, reason: String) {
        {
            let mut shared = self.inner.shared.write().unwrap();
            if shared.readiness == EmbedReadiness::Failed {
                return;
            }
            shared.readiness = EmbedReadiness::Failed;
        }
        self.inner.pending.lock().unwrap().clear();
        warn!(embed_id = %self.inner.embed_id, reason = %reason, "Embedded player failed");
        let _ = self.inner.notices.send(SourceNotice::Failed { reason });
    }
}

/// Consume player callbacks and republish them as normalized notices
async fn pump_notices(player: EmbeddedPlayer, mut rx: mpsc::UnboundedReceiver<EmbedNotice>) {
    while let Some(notice) = rx.recv().await {
        match notice {
            EmbedNotice::Ready { duration_seconds } => {
                {
                    let mut shared = player.inner.shared.write().unwrap();
                    if shared.readiness == EmbedReadiness::Failed {
                        continue;
                    }
                    shared.readiness = EmbedReadiness::Ready;
                    if let Some(duration) = duration_seconds.filter(|d| d.is_finite() && *d > 0.0) {
                        shared.duration = Some(duration);
                    }
                }
                debug!(embed_id = %player.inner.embed_id, "Player handshake complete");
                if let Some(duration) = player.inner.shared.read().unwrap().duration {
                    let _ = player
                        .inner
                        .notices
                        .send(SourceNotice::DurationKnown(duration));
                }
                player.flush_pending();
            }
            EmbedNotice::State(new) => {
                let old = {
                    let mut shared = player.inner.shared.write().unwrap();
                    let old = shared.state;
                    shared.state = new;
                    old
                };
                if old != new {
                    let _ = player
                        .inner
                        .notices
                        .send(SourceNotice::StateChanged { old, new });
                }
            }
            EmbedNotice::Time(seconds) => {
                if seconds.is_finite() && seconds >= 0.0 {
                    player.inner.shared.write().unwrap().last_time = Some(seconds);
                } else {
                    debug!(
                        embed_id = %player.inner.embed_id,
                        seconds,
                        "Ignoring invalid time report"
                    );
                }
            }
            EmbedNotice::Duration(seconds) => {
                if seconds.is_finite() && seconds > 0.0 {
                    player.inner.shared.write().unwrap().duration = Some(seconds);
                    let _ = player.inner.notices.send(SourceNotice::DurationKnown(seconds));
                }
            }
            EmbedNotice::Error(message) => {
                player.fail(message);
            }
        }
    }

    // Bridge closed: the host tore the player down
    if player.readiness() != EmbedReadiness::Failed {
        player.fail("player bridge closed".into());
    }
}

/// Poll readiness on a fixed interval until the handshake completes or
/// the deadline passes
async fn poll_readiness(
    player: EmbeddedPlayer,
    poll_interval: tokio::time::Duration,
    deadline: tokio::time::Duration,
) {
    let started = Instant::now();
    let mut ticker = interval(poll_interval);

    loop {
        ticker.tick().await;
        match player.readiness() {
            EmbedReadiness::Ready => {
                player.flush_pending();
                return;
            }
            EmbedReadiness::Failed => return,
            EmbedReadiness::Uninitialized | EmbedReadiness::Loading => {
                if started.elapsed() >= deadline {
                    player.fail(format!(
                        "handshake timed out after {}ms",
                        deadline.as_millis()
                    ));
                    return;
                }
            }
        }
    }
}

impl SourceAdapter for EmbeddedPlayer {
    fn play(&self) {
        self.send(EmbedCommand::Play);
    }

    fn pause(&self) {
        self.send(EmbedCommand::Pause);
    }

    fn seek(&self, seconds: f64) {
        if !seconds.is_finite() || seconds < 0.0 {
            debug!(embed_id = %self.inner.embed_id, seconds, "Ignoring invalid seek");
            return;
        }
        self.send(EmbedCommand::Seek(seconds));
    }

    fn current_time(&self) -> Option<f64> {
        self.inner.shared.read().unwrap().last_time
    }

    fn duration(&self) -> Option<f64> {
        self.inner.shared.read().unwrap().duration
    }

    fn state(&self) -> PlaybackState {
        self.inner.shared.read().unwrap().state
    }

    fn is_ready(&self) -> bool {
        self.readiness() == EmbedReadiness::Ready
    }

    fn notices(&self) -> broadcast::Receiver<SourceNotice> {
        self.inner.notices.subscribe()
    }

    fn shutdown(&self) {
        for task in self.inner.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }
}
