//! Native media element backend
//!
//! The element is locally owned: duration is known synchronously once
//! metadata loads, and the playhead is derived from a playback clock
//! driven by play/pause/seek. `current_time()` legitimately reports 0
//! before any playback has happened.

use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};
use watchgate_common::events::PlaybackState;

use super::{SourceAdapter, SourceNotice};

/// Notice channel capacity; adapters publish at human-interaction rates
const NOTICE_CAPACITY: usize = 64;

/// Margin under which the playhead counts as having reached the end
const END_EPSILON: f64 = 0.010;

#[derive(Debug)]
struct Clock {
    state: PlaybackState,
    /// Playhead at the last play/pause/seek edge
    base_seconds: f64,
    /// Set while the clock is advancing
    playing_since: Option<Instant>,
    duration: Option<f64>,
}

impl Clock {
    fn position(&self) -> f64 {
        let mut position = self.base_seconds;
        if let Some(since) = self.playing_since {
            position += since.elapsed().as_secs_f64();
        }
        match self.duration {
            Some(duration) => position.min(duration),
            None => position,
        }
    }
}

struct Inner {
    url: String,
    clock: RwLock<Clock>,
    notices: broadcast::Sender<SourceNotice>,
    end_watch: Mutex<Option<JoinHandle<()>>>,
}

/// Native media element adapter
///
/// Cheap to clone; clones share the same element.
#[derive(Clone)]
pub struct NativeElement {
    inner: Arc<Inner>,
}

impl NativeElement {
    /// Create an element for a directly hosted media URL
    ///
    /// Duration stays unknown until [`NativeElement::load_metadata`].
    pub fn new(url: impl Into<String>) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                clock: RwLock::new(Clock {
                    state: PlaybackState::Unstarted,
                    base_seconds: 0.0,
                    playing_since: None,
                    duration: None,
                }),
                notices,
                end_watch: Mutex::new(None),
            }),
        }
    }

    /// Media URL this element plays
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Host callback: metadata loaded, duration is now known
    pub fn load_metadata(&self, duration_seconds: f64) {
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            warn!(
                url = %self.inner.url,
                duration = duration_seconds,
                "Ignoring invalid media duration"
            );
            return;
        }

        {
            let mut clock = self.inner.clock.write().unwrap();
            clock.duration = Some(duration_seconds);
        }
        let _ = self
            .inner
            .notices
            .send(SourceNotice::DurationKnown(duration_seconds));

        // Metadata can arrive mid-playback; arm the end watcher now
        if self.inner.clock.read().unwrap().state.is_playing() {
            self.spawn_end_watch();
        }
    }

    /// Host callback: the element stalled waiting for data
    pub fn buffering_started(&self) {
        let mut clock = self.inner.clock.write().unwrap();
        if clock.state == PlaybackState::Playing {
            clock.base_seconds = clock.position();
            clock.playing_since = None;
            self.transition(&mut clock, PlaybackState::Buffering);
            drop(clock);
            self.cancel_end_watch();
        }
    }

    /// Host callback: enough data arrived, playback resumed
    pub fn buffering_ended(&self) {
        let mut clock = self.inner.clock.write().unwrap();
        if clock.state == PlaybackState::Buffering {
            clock.playing_since = Some(Instant::now());
            self.transition(&mut clock, PlaybackState::Playing);
            drop(clock);
            self.spawn_end_watch();
        }
    }

    /// Record a state change and republish it; callers hold the lock
    fn transition(&self, clock: &mut Clock, new: PlaybackState) {
        let old = clock.state;
        if old == new {
            return;
        }
        clock.state = new;
        let _ = self
            .inner
            .notices
            .send(SourceNotice::StateChanged { old, new });
    }

    fn cancel_end_watch(&self) {
        if let Some(handle) = self.inner.end_watch.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Watch for the playhead reaching the media end while playing
    fn spawn_end_watch(&self) {
        self.cancel_end_watch();

        let element = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                let remaining = {
                    let clock = element.inner.clock.read().unwrap();
                    let (Some(duration), true) = (clock.duration, clock.state.is_playing()) else {
                        return;
                    };
                    duration - clock.position()
                };

                if remaining > END_EPSILON {
                    sleep(Duration::from_secs_f64(remaining.max(END_EPSILON))).await;
                    continue;
                }

                let mut clock = element.inner.clock.write().unwrap();
                // Re-check: a pause or seek may have raced the wakeup
                if !clock.state.is_playing() {
                    return;
                }
                if let Some(duration) = clock.duration {
                    if duration - clock.position() <= END_EPSILON {
                        clock.base_seconds = duration;
                        clock.playing_since = None;
                        element.transition(&mut clock, PlaybackState::Ended);
                        return;
                    }
                }
            }
        });

        *self.inner.end_watch.lock().unwrap() = Some(handle);
    }
}

impl SourceAdapter for NativeElement {
    fn play(&self) {
        {
            let mut clock = self.inner.clock.write().unwrap();
            match clock.state {
                PlaybackState::Playing | PlaybackState::Buffering => return,
                PlaybackState::Ended => {
                    // Replay restarts from the top unless a seek already
                    // moved the playhead off the end
                    if let Some(duration) = clock.duration {
                        if duration - clock.base_seconds <= END_EPSILON {
                            clock.base_seconds = 0.0;
                        }
                    }
                }
                PlaybackState::Unstarted | PlaybackState::Paused => {}
            }
            clock.playing_since = Some(Instant::now());
            self.transition(&mut clock, PlaybackState::Playing);
        }
        self.spawn_end_watch();
    }

    fn pause(&self) {
        let mut clock = self.inner.clock.write().unwrap();
        if matches!(clock.state, PlaybackState::Playing | PlaybackState::Buffering) {
            clock.base_seconds = clock.position();
            clock.playing_since = None;
            self.transition(&mut clock, PlaybackState::Paused);
            drop(clock);
            self.cancel_end_watch();
        }
    }

    fn seek(&self, seconds: f64) {
        if !seconds.is_finite() || seconds < 0.0 {
            debug!(url = %self.inner.url, seconds, "Ignoring invalid seek");
            return;
        }

        let restart_watch = {
            let mut clock = self.inner.clock.write().unwrap();
            let target = match clock.duration {
                Some(duration) => seconds.min(duration),
                None => seconds,
            };
            clock.base_seconds = target;
            if clock.playing_since.is_some() {
                clock.playing_since = Some(Instant::now());
            }
            clock.state.is_playing()
        };

        if restart_watch {
            self.spawn_end_watch();
        }
    }

    fn current_time(&self) -> Option<f64> {
        Some(self.inner.clock.read().unwrap().position())
    }

    fn duration(&self) -> Option<f64> {
        self.inner.clock.read().unwrap().duration
    }

    fn state(&self) -> PlaybackState {
        self.inner.clock.read().unwrap().state
    }

    fn is_ready(&self) -> bool {
        // The element is local; there is no handshake to wait for
        true
    }

    fn notices(&self) -> broadcast::Receiver<SourceNotice> {
        self.inner.notices.subscribe()
    }

    fn shutdown(&self) {
        self.cancel_end_watch();
    }
}
