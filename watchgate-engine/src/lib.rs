//! # Watchgate Engine
//!
//! Video watch-progress tracking and quiz-unlock gating engine.
//!
//! **Purpose:** track elapsed watched time across two structurally
//! different video backends, persist the position to a server without
//! flooding it, reconcile a resume position on load/replay, and gate a
//! dependent quiz behind a minimum watched time.
//!
//! **Architecture:** one parameterized [`engine::WatchEngine`] per
//! mounted player, shared by both call sites (main training player and
//! nested mini-training player). Adapter notices drive a tracker task;
//! the tracker feeds a persister task with debounced and immediate
//! write paths; lifecycle hooks converge on the immediate path.

pub mod engine;
pub mod error;
pub mod gate;
pub mod persister;
pub mod resume;
pub mod session;
pub mod source;
pub mod tracker;
pub mod transport;

pub use engine::{EngineOptions, SourceBinding, WatchEngine};
pub use error::{Error, Result};
