//! Teardown and lifecycle flush tests
//!
//! Unmounting mid-playback must produce exactly one final write with the
//! freshest position, cancel the sampling interval and any pending
//! debounced write, and leave no timer capable of firing afterwards.

mod support;

use std::sync::Arc;
use tokio::time::{advance, Duration};
use uuid::Uuid;

use support::{RecordingTransport, SpyAdapter};
use watchgate_common::events::PlaybackState;
use watchgate_common::WatchParams;
use watchgate_engine::{EngineOptions, SourceBinding, WatchEngine};

const VIDEO_REF: &str = "https://cdn.example.com/lessons/unit.mp4";

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn dispose_flushes_exactly_once_with_the_freshest_position() {
    let transport = Arc::new(RecordingTransport::new());
    let spy = SpyAdapter::new();
    let options = EngineOptions::training(Uuid::new_v4(), VIDEO_REF, WatchParams::default());

    let engine = WatchEngine::mount(
        options,
        SourceBinding::Adapter(spy.clone()),
        transport.clone(),
    )
    .await
    .unwrap();
    settle().await;

    spy.announce_state(PlaybackState::Playing);
    spy.set_time(37.0);
    settle().await;

    // A debounced write for 37 is pending; the adapter has since moved on
    spy.set_time(37.4);
    advance(Duration::from_millis(300)).await;

    engine.dispose().await;

    // Exactly one write: the teardown flush, carrying the adapter's live
    // position (floored), with the pending debounce cancelled
    assert_eq!(transport.written_seconds(), vec![37]);
    assert_eq!(spy.shutdowns(), 1);

    // Nothing fires after disposal
    advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(transport.written_seconds(), vec![37]);
}

#[tokio::test(start_paused = true)]
async fn visibility_hidden_flushes_the_live_position() {
    let transport = Arc::new(RecordingTransport::new());
    let spy = SpyAdapter::new();
    let options = EngineOptions::training(Uuid::new_v4(), VIDEO_REF, WatchParams::default());

    let engine = WatchEngine::mount(
        options,
        SourceBinding::Adapter(spy.clone()),
        transport.clone(),
    )
    .await
    .unwrap();
    settle().await;

    spy.announce_state(PlaybackState::Playing);
    spy.set_time(12.8);
    settle().await;

    engine.notify_visibility_hidden().await;
    settle().await;

    // The hook reads the adapter directly, not the (stale) last sample
    assert_eq!(transport.written_seconds(), vec![12]);

    engine.dispose().await;
}

#[tokio::test(start_paused = true)]
async fn page_unload_rides_the_detached_transport() {
    let transport = Arc::new(RecordingTransport::new());
    let spy = SpyAdapter::new();
    let options = EngineOptions::training(Uuid::new_v4(), VIDEO_REF, WatchParams::default());

    let engine = WatchEngine::mount(
        options,
        SourceBinding::Adapter(spy.clone()),
        transport.clone(),
    )
    .await
    .unwrap();
    settle().await;

    spy.announce_state(PlaybackState::Playing);
    spy.set_time(75.2);
    settle().await;

    engine.notify_page_unload().await;
    // The engine handle can disappear immediately after; the write still
    // goes out on its detached task
    engine.dispose().await;
    settle().await;

    let written = transport.written_seconds();
    assert!(
        written.contains(&75),
        "unload write missing from {written:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn dropping_without_dispose_kills_the_timers() {
    let transport = Arc::new(RecordingTransport::new());
    let spy = SpyAdapter::new();
    let options = EngineOptions::training(Uuid::new_v4(), VIDEO_REF, WatchParams::default());

    let engine = WatchEngine::mount(
        options,
        SourceBinding::Adapter(spy.clone()),
        transport.clone(),
    )
    .await
    .unwrap();
    settle().await;

    spy.announce_state(PlaybackState::Playing);
    spy.set_time(5.0);
    settle().await;

    drop(engine);
    settle().await;

    // No final flush, but also no stray timer activity
    let baseline = transport.written_seconds();
    advance(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(transport.written_seconds(), baseline);
    assert_eq!(spy.shutdowns(), 1);
}

#[tokio::test(start_paused = true)]
async fn pause_and_ended_ride_the_immediate_path() {
    let transport = Arc::new(RecordingTransport::new());
    let spy = SpyAdapter::new();
    let options = EngineOptions::training(Uuid::new_v4(), VIDEO_REF, WatchParams::default());

    let engine = WatchEngine::mount(
        options,
        SourceBinding::Adapter(spy.clone()),
        transport.clone(),
    )
    .await
    .unwrap();
    settle().await;

    spy.announce_state(PlaybackState::Playing);
    spy.set_time(20.0);
    settle().await;

    spy.announce_state(PlaybackState::Paused);
    settle().await;
    assert_eq!(transport.written_seconds(), vec![20]);

    spy.announce_state(PlaybackState::Playing);
    spy.set_time(30.0);
    settle().await;
    spy.announce_state(PlaybackState::Ended);
    settle().await;
    assert_eq!(transport.written_seconds(), vec![20, 30]);

    engine.dispose().await;
}
