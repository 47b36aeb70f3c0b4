//! # Watchgate Common Library
//!
//! Shared code for the watch-progress engine:
//! - Event types (`WatchEvent` enum) and the `EventBus`
//! - Wire types for the progress HTTP contract
//! - Runtime parameter loading
//! - Common error type

pub mod api;
pub mod error;
pub mod events;
pub mod params;

pub use error::{Error, Result};
pub use params::WatchParams;
