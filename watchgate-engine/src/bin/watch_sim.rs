//! Headless watch-session simulator
//!
//! Mounts a watch engine over a native media element and scripts a
//! short session against a progress endpoint: play, watch, pause,
//! visibility change, teardown. Useful for exercising the engine's
//! timing, gating and persistence behavior without a UI; point it at a
//! real endpoint or watch the failure handling when there is none.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use watchgate_common::WatchParams;
use watchgate_engine::source::NativeElement;
use watchgate_engine::transport::HttpTransport;
use watchgate_engine::{EngineOptions, SourceBinding, WatchEngine};

/// Command-line arguments for watch-sim
#[derive(Parser, Debug)]
#[command(name = "watch-sim")]
#[command(about = "Headless watch-session simulator for the Watchgate engine")]
#[command(version)]
struct Args {
    /// Progress endpoint base URL
    #[arg(short, long, default_value = "http://127.0.0.1:5800", env = "WATCHGATE_ENDPOINT")]
    endpoint: String,

    /// Video id to report progress against (random when omitted)
    #[arg(long)]
    video_id: Option<Uuid>,

    /// Media URL for the simulated native element
    #[arg(long, default_value = "file:///var/lib/watchgate/demo.mp4")]
    media: String,

    /// Media duration in seconds
    #[arg(long, default_value = "120")]
    duration: u32,

    /// How long to play before pausing, in seconds
    #[arg(long, default_value = "10")]
    watch: u64,

    /// Engine params file (TOML)
    #[arg(short, long)]
    params: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watch_sim=info,watchgate_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let params = WatchParams::resolve(args.params.as_deref()).context("loading engine params")?;
    let video_id = args.video_id.unwrap_or_else(Uuid::new_v4);

    info!(endpoint = %args.endpoint, %video_id, "Starting watch session simulation");

    let transport =
        Arc::new(HttpTransport::new(args.endpoint.as_str()).context("building progress transport")?);

    let element = NativeElement::new(args.media.as_str());
    element.load_metadata(args.duration as f64);

    let options = EngineOptions::training(video_id, args.media.as_str(), params);
    let engine = WatchEngine::mount(options, SourceBinding::Native(element), transport)
        .await
        .context("mounting watch engine")?;

    // Narrate engine events while the script runs
    let mut events = engine.events();
    let narrator = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(event = event.event_name(), detail = ?event, "engine event");
        }
    });

    engine.play().await;
    info!(watch_seconds = args.watch, "Playing");
    tokio::time::sleep(Duration::from_secs(args.watch)).await;

    engine.pause();
    tokio::time::sleep(Duration::from_secs(1)).await;

    info!("Simulating tab switch");
    engine.notify_visibility_hidden().await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let view = engine.session_view().await;
    let gate = engine.gate_status().await;
    engine.dispose().await;
    narrator.abort();

    info!(
        watched_seconds = view.watched_seconds,
        last_persisted = ?view.last_persisted_seconds,
        minimum_watch_time = ?view.minimum_watch_time,
        can_take_quiz = view.can_take_quiz,
        unlock_ratio = gate.unlock_ratio,
        "Session complete"
    );

    Ok(())
}
