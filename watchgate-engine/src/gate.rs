//! Quiz unlock gate
//!
//! Pure decision logic, recomputed synchronously on every watched-seconds
//! update. The gate fails closed: while duration (and therefore the
//! minimum watch time) is unknown, the quiz stays locked. The client-side
//! verdict is advisory only; the server's `canTakeQuiz` always wins once
//! a write response has arrived.

use serde::{Deserialize, Serialize};

/// Inputs to a gate evaluation
#[derive(Debug, Clone, Copy)]
pub struct GateInput {
    /// Current best-known watched position in seconds
    pub watched_seconds: u32,
    /// Resolved unlock threshold; `None` while duration is unknown
    pub minimum_watch_time: Option<u32>,
    /// Whether the learner already completed the quiz
    pub quiz_completed: bool,
    /// Total duration in seconds, once metadata is known
    pub duration_seconds: Option<u32>,
}

/// Result of a gate evaluation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GateStatus {
    /// Whether the dependent quiz may be started
    pub unlocked: bool,
    /// Display-only progress toward the unlock threshold (0.0 - 1.0).
    /// Carries no authorization weight.
    pub unlock_ratio: f64,
}

/// Evaluate the gate
///
/// `canTakeQuiz = quizCompleted OR (watchedSeconds >= minimumWatchTime)`,
/// with the threshold term failing closed while unknown.
pub fn evaluate(input: GateInput) -> GateStatus {
    let threshold_met = match input.minimum_watch_time {
        Some(minimum) => input.watched_seconds >= minimum,
        None => false,
    };

    GateStatus {
        unlocked: input.quiz_completed || threshold_met,
        unlock_ratio: unlock_ratio(
            input.watched_seconds,
            input.minimum_watch_time,
            input.duration_seconds,
        ),
    }
}

/// Progress-bar ratio: `min(minimum, watched) / max(duration, 1)`
///
/// Zero while the threshold is unknown.
pub fn unlock_ratio(
    watched_seconds: u32,
    minimum_watch_time: Option<u32>,
    duration_seconds: Option<u32>,
) -> f64 {
    let Some(minimum) = minimum_watch_time else {
        return 0.0;
    };
    let duration = duration_seconds.unwrap_or(0).max(1);
    minimum.min(watched_seconds) as f64 / duration as f64
}

/// How the unlock threshold for a video is derived
///
/// `minimumWatchTime = serverSuppliedValue ?? floor(duration * ratio)`.
/// The ratio is call-site dependent: author-specified for main trainings,
/// 0.5 by default for nested mini-trainings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnlockRule {
    /// Absolute threshold supplied by the authoring system, when present
    pub server_value: Option<u32>,
    /// Fallback fraction of duration when no absolute value is supplied
    pub ratio: f64,
}

impl UnlockRule {
    pub fn new(server_value: Option<u32>, ratio: f64) -> Self {
        Self {
            server_value,
            ratio,
        }
    }

    /// Resolve the threshold for a known duration
    ///
    /// Returns `None` while duration is unknown (the gate then reports
    /// locked). The result is clamped into `0..=duration`.
    pub fn resolve(&self, duration_seconds: Option<u32>) -> Option<u32> {
        let duration = duration_seconds?;
        let raw = match self.server_value {
            Some(value) => value,
            None => (duration as f64 * self.ratio).floor() as u32,
        };
        Some(raw.min(duration))
    }
}
