//! Shared HTTP API functionality for the progress contract
//!
//! Contains only pure types and validation helpers; the engine wraps them
//! with its reqwest transport, and test harnesses wrap them with a stub
//! server. No HTTP framework dependencies live here.

pub mod types;

pub use types::{progress_percent, ProgressReceipt, ProgressSnapshot, ProgressUpdate};
