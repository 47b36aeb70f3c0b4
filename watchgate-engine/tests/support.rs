//! Shared test infrastructure for engine integration tests
//!
//! Provides a recording transport (in-memory stand-in for the progress
//! endpoint), a spy adapter for observing engine → backend calls, and an
//! axum stub server for exercising the real HTTP transport.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

use watchgate_common::api::{progress_percent, ProgressReceipt, ProgressSnapshot, ProgressUpdate};
use watchgate_common::events::PlaybackState;
use watchgate_engine::error::{Error, Result};
use watchgate_engine::source::{SourceAdapter, SourceNotice};
use watchgate_engine::transport::ProgressTransport;

// ================================================================================================
// RecordingTransport
// ================================================================================================

/// In-memory progress endpoint that records every accepted write
///
/// Receipts compute `canTakeQuiz` server-side from a configurable
/// threshold, so tests can observe the authoritative override path.
pub struct RecordingTransport {
    snapshot: Mutex<ProgressSnapshot>,
    server_threshold: Option<u32>,
    duration_seconds: Option<u32>,
    writes: Mutex<Vec<ProgressUpdate>>,
    /// Highest watched value ever accepted; the server computes quiz
    /// availability from the persisted maximum, not the live position
    high_water: AtomicU32,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::with_snapshot(ProgressSnapshot::empty())
    }

    pub fn with_snapshot(snapshot: ProgressSnapshot) -> Self {
        let high_water = snapshot.watched_seconds;
        Self {
            snapshot: Mutex::new(snapshot),
            server_threshold: None,
            duration_seconds: None,
            writes: Mutex::new(Vec::new()),
            high_water: AtomicU32::new(high_water),
            attempts: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Make receipts compute `canTakeQuiz` from this threshold
    pub fn with_server_threshold(mut self, minimum: u32, duration: u32) -> Self {
        self.server_threshold = Some(minimum);
        self.duration_seconds = Some(duration);
        self
    }

    /// Force every write to fail with a 500 until cleared
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Accepted writes, in submission order
    pub fn writes(&self) -> Vec<ProgressUpdate> {
        self.writes.lock().unwrap().clone()
    }

    /// Watched-seconds values of accepted writes
    pub fn written_seconds(&self) -> Vec<u32> {
        self.writes().iter().map(|w| w.watched_seconds).collect()
    }

    /// Total store attempts, including failed ones
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressTransport for RecordingTransport {
    async fn fetch(&self, _video_id: Uuid) -> Result<ProgressSnapshot> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn store(&self, _video_id: Uuid, update: ProgressUpdate) -> Result<ProgressReceipt> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Server { status: 500 });
        }

        self.writes.lock().unwrap().push(update);
        let previous_high = self
            .high_water
            .fetch_max(update.watched_seconds, Ordering::SeqCst);
        let high_water = previous_high.max(update.watched_seconds);
        let quiz_completed = self.snapshot.lock().unwrap().quiz_completed;
        let can_take_quiz = quiz_completed
            || self
                .server_threshold
                .map(|minimum| high_water >= minimum)
                .unwrap_or(false);

        Ok(ProgressReceipt {
            watched_seconds: update.watched_seconds,
            video_progress_percent: progress_percent(update.watched_seconds, self.duration_seconds),
            can_take_quiz,
            quiz_completed,
        })
    }
}

// ================================================================================================
// SpyAdapter
// ================================================================================================

/// Source adapter spy: tests drive its state and observe engine calls
pub struct SpyAdapter {
    time: Mutex<Option<f64>>,
    duration: Mutex<Option<f64>>,
    state: Mutex<PlaybackState>,
    ready: AtomicBool,
    plays: AtomicUsize,
    pauses: AtomicUsize,
    seeks: Mutex<Vec<f64>>,
    shutdowns: AtomicUsize,
    notices: broadcast::Sender<SourceNotice>,
}

impl SpyAdapter {
    pub fn new() -> Arc<Self> {
        let (notices, _) = broadcast::channel(64);
        Arc::new(Self {
            time: Mutex::new(None),
            duration: Mutex::new(None),
            state: Mutex::new(PlaybackState::Unstarted),
            ready: AtomicBool::new(true),
            plays: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
            seeks: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
            notices,
        })
    }

    pub fn set_time(&self, seconds: f64) {
        *self.time.lock().unwrap() = Some(seconds);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Report a duration the way a backend would: cache + notice
    pub fn announce_duration(&self, seconds: f64) {
        *self.duration.lock().unwrap() = Some(seconds);
        let _ = self.notices.send(SourceNotice::DurationKnown(seconds));
    }

    /// Transition playback state the way a backend would
    pub fn announce_state(&self, new: PlaybackState) {
        let old = {
            let mut state = self.state.lock().unwrap();
            let old = *state;
            *state = new;
            old
        };
        let _ = self.notices.send(SourceNotice::StateChanged { old, new });
    }

    pub fn announce_failure(&self, reason: &str) {
        let _ = self.notices.send(SourceNotice::Failed {
            reason: reason.to_string(),
        });
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.seeks.lock().unwrap().clone()
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl SourceAdapter for SpyAdapter {
    fn play(&self) {
        self.plays.fetch_add(1, Ordering::SeqCst);
    }

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn seek(&self, seconds: f64) {
        self.seeks.lock().unwrap().push(seconds);
        self.set_time(seconds);
    }

    fn current_time(&self) -> Option<f64> {
        *self.time.lock().unwrap()
    }

    fn duration(&self) -> Option<f64> {
        *self.duration.lock().unwrap()
    }

    fn state(&self) -> PlaybackState {
        *self.state.lock().unwrap()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn notices(&self) -> broadcast::Receiver<SourceNotice> {
        self.notices.subscribe()
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

// ================================================================================================
// Stub progress server
// ================================================================================================

/// Server-side record held by the stub
#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub watched_seconds: u32,
    pub duration_seconds: u32,
    pub minimum_watch_time: Option<u32>,
    pub quiz_completed: bool,
}

/// Shared state of the stub progress server
#[derive(Clone, Default)]
pub struct StubState {
    records: Arc<Mutex<HashMap<Uuid, ServerRecord>>>,
    failing: Arc<AtomicBool>,
}

impl StubState {
    pub fn seed(&self, video_id: Uuid, record: ServerRecord) {
        self.records.lock().unwrap().insert(video_id, record);
    }

    pub fn record(&self, video_id: Uuid) -> Option<ServerRecord> {
        self.records.lock().unwrap().get(&video_id).cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

async fn get_progress(
    State(state): State<StubState>,
    Path(video_id): Path<Uuid>,
) -> Response {
    if state.failing.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    match state.record(video_id) {
        Some(record) => Json(ProgressSnapshot {
            watched_seconds: record.watched_seconds,
            video_progress_percent: progress_percent(
                record.watched_seconds,
                Some(record.duration_seconds),
            ),
            quiz_completed: record.quiz_completed,
            minimum_watch_time: record.minimum_watch_time,
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn post_progress(
    State(state): State<StubState>,
    Path(video_id): Path<Uuid>,
    Json(update): Json<ProgressUpdate>,
) -> Response {
    if state.failing.load(Ordering::SeqCst) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let mut records = state.records.lock().unwrap();
    let record = records.entry(video_id).or_insert(ServerRecord {
        watched_seconds: 0,
        duration_seconds: 0,
        minimum_watch_time: None,
        quiz_completed: false,
    });
    record.watched_seconds = update.watched_seconds;

    let can_take_quiz = record.quiz_completed
        || record
            .minimum_watch_time
            .map(|minimum| record.watched_seconds >= minimum)
            .unwrap_or(false);

    Json(ProgressReceipt {
        watched_seconds: record.watched_seconds,
        video_progress_percent: progress_percent(
            record.watched_seconds,
            Some(record.duration_seconds),
        ),
        can_take_quiz,
        quiz_completed: record.quiz_completed,
    })
    .into_response()
}

/// Spawn the stub server on an ephemeral port; returns its base URL
pub async fn spawn_stub_server() -> (String, StubState) {
    let state = StubState::default();
    let app = Router::new()
        .route("/progress/:video_id", get(get_progress).post(post_progress))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub server");
    let addr = listener.local_addr().expect("stub server addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });

    (format!("http://{addr}"), state)
}
