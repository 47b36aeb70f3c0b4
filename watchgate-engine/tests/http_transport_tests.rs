//! HTTP transport tests against an in-process stub of the progress
//! endpoint

mod support;

use support::{spawn_stub_server, ServerRecord};
use uuid::Uuid;
use watchgate_common::api::ProgressUpdate;
use watchgate_engine::error::Error;
use watchgate_engine::transport::{HttpTransport, ProgressTransport};

#[tokio::test]
async fn fetch_and_store_round_trip() {
    let (base_url, state) = spawn_stub_server().await;
    let video_id = Uuid::new_v4();
    state.seed(
        video_id,
        ServerRecord {
            watched_seconds: 30,
            duration_seconds: 120,
            minimum_watch_time: Some(60),
            quiz_completed: false,
        },
    );

    let transport = HttpTransport::new(base_url.as_str()).unwrap();

    let snapshot = transport.fetch(video_id).await.unwrap();
    assert_eq!(snapshot.watched_seconds, 30);
    assert_eq!(snapshot.video_progress_percent, 25.0);
    assert_eq!(snapshot.minimum_watch_time, Some(60));
    assert!(!snapshot.quiz_completed);

    let receipt = transport
        .store(
            video_id,
            ProgressUpdate {
                watched_seconds: 60,
                is_playing: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(receipt.watched_seconds, 60);
    assert!(receipt.can_take_quiz, "server unlocks at its own threshold");

    let snapshot = transport.fetch(video_id).await.unwrap();
    assert_eq!(snapshot.watched_seconds, 60);
    assert_eq!(snapshot.video_progress_percent, 50.0);
}

#[tokio::test]
async fn missing_record_maps_to_not_found() {
    let (base_url, _state) = spawn_stub_server().await;
    let transport = HttpTransport::new(base_url.as_str()).unwrap();

    let result = transport.fetch(Uuid::new_v4()).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn server_failure_is_not_a_transport_failure() {
    let (base_url, state) = spawn_stub_server().await;
    state.set_failing(true);
    let transport = HttpTransport::new(base_url.as_str()).unwrap();

    let result = transport
        .store(
            Uuid::new_v4(),
            ProgressUpdate {
                watched_seconds: 10,
                is_playing: false,
            },
        )
        .await;

    match result {
        Err(e @ Error::Server { status: 500 }) => {
            assert!(!e.is_transport_failure());
        }
        other => panic!("expected a server error, got {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_endpoint_is_a_transport_failure() {
    // Nothing listens on this port
    let transport = HttpTransport::new("http://127.0.0.1:1").unwrap();

    let result = transport
        .store(
            Uuid::new_v4(),
            ProgressUpdate {
                watched_seconds: 10,
                is_playing: false,
            },
        )
        .await;

    match result {
        Err(e) => assert!(e.is_transport_failure()),
        Ok(_) => panic!("expected a connection failure"),
    }
}

#[tokio::test]
async fn trailing_slashes_in_the_base_url_are_tolerated() {
    let (base_url, state) = spawn_stub_server().await;
    let video_id = Uuid::new_v4();
    state.seed(
        video_id,
        ServerRecord {
            watched_seconds: 5,
            duration_seconds: 100,
            minimum_watch_time: None,
            quiz_completed: false,
        },
    );

    let transport = HttpTransport::new(format!("{base_url}/")).unwrap();
    let snapshot = transport.fetch(video_id).await.unwrap();
    assert_eq!(snapshot.watched_seconds, 5);
}
