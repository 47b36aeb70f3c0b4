//! Engine runtime parameters
//!
//! Timing windows and thresholds for the watch-progress engine, with
//! compiled defaults that can be overridden from a TOML file. Resolution
//! follows the usual priority order:
//!
//! 1. Explicit path (command-line argument, highest priority)
//! 2. `WATCHGATE_PARAMS` environment variable
//! 3. Platform config file (`<config dir>/watchgate/params.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A params file only needs the keys it overrides; everything else keeps
//! its default.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming a params file
pub const PARAMS_ENV_VAR: &str = "WATCHGATE_PARAMS";

/// Runtime parameters for the watch-progress engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WatchParams {
    /// Position sampling interval while playing, in milliseconds
    pub tick_interval_ms: u64,
    /// Debounce window for the rate-limited persist path, in milliseconds
    pub debounce_window_ms: u64,
    /// Minimum watched-seconds delta for a debounced write to be worth
    /// sending; smaller deltas are suppressed as jitter
    pub min_persist_delta_seconds: u32,
    /// Fraction of duration past which a saved position counts as
    /// "already finished" and is not resumed
    pub resume_cutoff_ratio: f64,
    /// Readiness poll interval for the embedded backend handshake,
    /// in milliseconds
    pub embed_poll_interval_ms: u64,
    /// Deadline after which the embedded backend handshake is abandoned,
    /// in milliseconds
    pub embed_ready_deadline_ms: u64,
    /// Unlock threshold for nested mini-trainings, as a fraction of
    /// duration, used when the server supplies no absolute value
    pub mini_unlock_ratio: f64,
    /// EventBus channel capacity
    pub event_capacity: usize,
}

impl Default for WatchParams {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            debounce_window_ms: 1000,
            min_persist_delta_seconds: 1,
            resume_cutoff_ratio: 0.95,
            embed_poll_interval_ms: 100,
            embed_ready_deadline_ms: 5000,
            mini_unlock_ratio: 0.5,
            event_capacity: 256,
        }
    }
}

impl WatchParams {
    /// Resolve parameters following the priority order documented on the
    /// module
    pub fn resolve(explicit_path: Option<&Path>) -> Result<Self> {
        // Priority 1: explicit path; a missing file here is an error,
        // the caller asked for it specifically
        if let Some(path) = explicit_path {
            let params = Self::load_file(path)?;
            info!(path = %path.display(), "Loaded engine params from explicit path");
            return Ok(params);
        }

        // Priority 2: environment variable
        if let Ok(path) = std::env::var(PARAMS_ENV_VAR) {
            let params = Self::load_file(Path::new(&path))?;
            info!(path = %path, "Loaded engine params from {}", PARAMS_ENV_VAR);
            return Ok(params);
        }

        // Priority 3: platform config file, if present
        if let Some(path) = default_params_path() {
            if path.exists() {
                let params = Self::load_file(&path)?;
                info!(path = %path.display(), "Loaded engine params from config dir");
                return Ok(params);
            }
        }

        // Priority 4: compiled defaults
        debug!("No params file found, using compiled defaults");
        Ok(Self::default())
    }

    /// Load and validate parameters from a TOML file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read params file {:?}: {}", path, e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate parameters from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let params: WatchParams = toml::from_str(contents)
            .map_err(|e| Error::Config(format!("Invalid params file: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::Config("tick_interval_ms must be > 0".into()));
        }
        if self.debounce_window_ms == 0 {
            return Err(Error::Config("debounce_window_ms must be > 0".into()));
        }
        if !(self.resume_cutoff_ratio > 0.0 && self.resume_cutoff_ratio <= 1.0) {
            return Err(Error::Config(
                "resume_cutoff_ratio must be in (0, 1]".into(),
            ));
        }
        if self.embed_poll_interval_ms == 0 {
            return Err(Error::Config("embed_poll_interval_ms must be > 0".into()));
        }
        if self.embed_ready_deadline_ms < self.embed_poll_interval_ms {
            return Err(Error::Config(
                "embed_ready_deadline_ms must be >= embed_poll_interval_ms".into(),
            ));
        }
        if !(self.mini_unlock_ratio > 0.0 && self.mini_unlock_ratio <= 1.0) {
            return Err(Error::Config("mini_unlock_ratio must be in (0, 1]".into()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be > 0".into()));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn embed_poll_interval(&self) -> Duration {
        Duration::from_millis(self.embed_poll_interval_ms)
    }

    pub fn embed_ready_deadline(&self) -> Duration {
        Duration::from_millis(self.embed_ready_deadline_ms)
    }
}

/// Default params file location: `<config dir>/watchgate/params.toml`
pub fn default_params_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("watchgate").join("params.toml"))
}
