//! HTTP transport for the progress contract
//!
//! The engine is the client side of a simple contract:
//!
//! - `GET /progress/{videoRef}` → `ProgressSnapshot`
//! - `POST /progress/{videoRef}` with `ProgressUpdate` → `ProgressReceipt`
//!
//! `ProgressTransport` seams the engine from the network; integration
//! tests substitute a recording implementation. `store_detached` is the
//! unload-safe variant: the write rides a spawned task that outlives the
//! engine, mirroring a transport that keeps sending while the page
//! navigates away.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use watchgate_common::api::{ProgressReceipt, ProgressSnapshot, ProgressUpdate};
use watchgate_common::events::{EventBus, WatchEvent, WriteOrigin};

use crate::error::{Error, Result};

const USER_AGENT: &str = "Watchgate/0.1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client side of the progress contract
#[async_trait]
pub trait ProgressTransport: Send + Sync + 'static {
    /// Read the last persisted progress for a video
    async fn fetch(&self, video_id: Uuid) -> Result<ProgressSnapshot>;

    /// Write a progress update and return the server's receipt
    async fn store(&self, video_id: Uuid, update: ProgressUpdate) -> Result<ProgressReceipt>;
}

/// reqwest-backed transport against a progress endpoint
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build a transport for a base URL (e.g. `https://lms.example.com/api`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self { client, base_url })
    }

    fn progress_url(&self, video_id: Uuid) -> String {
        format!("{}/progress/{}", self.base_url, video_id)
    }
}

#[async_trait]
impl ProgressTransport for HttpTransport {
    async fn fetch(&self, video_id: Uuid) -> Result<ProgressSnapshot> {
        let url = self.progress_url(video_id);
        debug!(video_id = %video_id, url = %url, "Fetching progress snapshot");

        let response = self.client.get(&url).send().await?;
        let status = response.status();

        if status.as_u16() == 404 {
            return Err(Error::NotFound(video_id.to_string()));
        }
        if status.is_server_error() {
            return Err(Error::Server {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let snapshot: ProgressSnapshot = response.json().await?;
        info!(
            video_id = %video_id,
            watched_seconds = snapshot.watched_seconds,
            quiz_completed = snapshot.quiz_completed,
            "Loaded prior progress"
        );
        Ok(snapshot)
    }

    async fn store(&self, video_id: Uuid, update: ProgressUpdate) -> Result<ProgressReceipt> {
        let url = self.progress_url(video_id);
        debug!(
            video_id = %video_id,
            watched_seconds = update.watched_seconds,
            "Posting progress update"
        );

        let response = self.client.post(&url).json(&update).send().await?;
        let status = response.status();

        if status.is_server_error() {
            return Err(Error::Server {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let receipt: ProgressReceipt = response.json().await?;
        Ok(receipt)
    }
}

/// Fire a progress write on a task that survives engine teardown
///
/// Used by the page-unload hook: control is about to be lost, so nothing
/// awaits the outcome. Success and failure are still reported on the bus
/// for whoever is left listening.
pub fn store_detached(
    transport: Arc<dyn ProgressTransport>,
    bus: EventBus,
    video_id: Uuid,
    update: ProgressUpdate,
    origin: WriteOrigin,
) {
    tokio::spawn(async move {
        match transport.store(video_id, update).await {
            Ok(receipt) => {
                debug!(
                    video_id = %video_id,
                    watched_seconds = update.watched_seconds,
                    %origin,
                    "Detached progress write delivered"
                );
                bus.emit_lossy(WatchEvent::ProgressPersisted {
                    video_id,
                    watched_seconds: update.watched_seconds,
                    can_take_quiz: receipt.can_take_quiz,
                    origin,
                    timestamp: chrono::Utc::now(),
                });
            }
            Err(e) => {
                warn!(
                    video_id = %video_id,
                    watched_seconds = update.watched_seconds,
                    %origin,
                    error = %e,
                    "Detached progress write failed"
                );
                bus.emit_lossy(WatchEvent::PersistFailed {
                    video_id,
                    transport_failure: e.is_transport_failure(),
                    message: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    });
}
