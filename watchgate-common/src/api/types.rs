//! Wire types for the progress HTTP contract
//!
//! The contract is browser-facing, so field names ride as camelCase:
//!
//! - `GET /progress/{videoRef}` → [`ProgressSnapshot`]
//! - `POST /progress/{videoRef}` with [`ProgressUpdate`] → [`ProgressReceipt`]
//!
//! `watchedSeconds` is validated at the type boundary: negative, non-finite
//! or otherwise nonsensical values never reach the wire.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Last persisted progress for a (learner, video) pairing
///
/// Response body of `GET /progress/{videoRef}`. Read once at session
/// start to seed the watch session and the resume reconciler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Elapsed watched time in whole seconds
    pub watched_seconds: u32,
    /// Watched position as a percentage of duration (0.0 - 100.0)
    pub video_progress_percent: f64,
    /// Whether the dependent quiz has already been completed
    pub quiz_completed: bool,
    /// Author-specified minimum watch time in seconds, when configured
    pub minimum_watch_time: Option<u32>,
}

impl ProgressSnapshot {
    /// Snapshot for a learner with no prior progress
    pub fn empty() -> Self {
        Self {
            watched_seconds: 0,
            video_progress_percent: 0.0,
            quiz_completed: false,
            minimum_watch_time: None,
        }
    }
}

/// Progress write for a (learner, video) pairing
///
/// Request body of `POST /progress/{videoRef}`. Construct via
/// [`ProgressUpdate::from_seconds`] so adapter-supplied floats are
/// validated before a request can exist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    /// Elapsed watched time in whole seconds
    pub watched_seconds: u32,
    /// Whether playback was running when the write was produced
    pub is_playing: bool,
}

impl ProgressUpdate {
    /// Validate an adapter-reported position and build an update from it
    ///
    /// Rejects NaN, infinities and negative values; fractional seconds
    /// are floored. A misbehaving adapter gets its write dropped here
    /// rather than corrupting server state.
    pub fn from_seconds(seconds: f64, is_playing: bool) -> Result<Self> {
        let watched_seconds = validate_watched_seconds(seconds)?;
        Ok(Self {
            watched_seconds,
            is_playing,
        })
    }
}

/// Server response to a progress write
///
/// Carries the authoritative gate verdict: `canTakeQuiz` from a receipt
/// always overrides the client's optimistic computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReceipt {
    /// Watched seconds as recorded by the server
    pub watched_seconds: u32,
    /// Watched position as a percentage of duration (0.0 - 100.0)
    pub video_progress_percent: f64,
    /// Authoritative quiz availability
    pub can_take_quiz: bool,
    /// Whether the dependent quiz has been completed
    pub quiz_completed: bool,
}

/// Validate a floating-point watched position and floor it to seconds
pub fn validate_watched_seconds(seconds: f64) -> Result<u32> {
    if !seconds.is_finite() {
        return Err(Error::InvalidInput(format!(
            "watched seconds not finite: {seconds}"
        )));
    }
    if seconds < 0.0 {
        return Err(Error::InvalidInput(format!(
            "watched seconds negative: {seconds}"
        )));
    }
    if seconds > u32::MAX as f64 {
        return Err(Error::InvalidInput(format!(
            "watched seconds out of range: {seconds}"
        )));
    }
    Ok(seconds.floor() as u32)
}

/// Watched position as a percentage of duration, clamped to 0..=100
///
/// Returns 0.0 while duration is unknown or zero.
pub fn progress_percent(watched_seconds: u32, duration_seconds: Option<u32>) -> f64 {
    match duration_seconds {
        Some(duration) if duration > 0 => {
            (watched_seconds as f64 / duration as f64 * 100.0).clamp(0.0, 100.0)
        }
        _ => 0.0,
    }
}
