//! Foundational utilities shared across taskgram crates.
//!
//! Provides the atomic file-write helper used by the identity store and
//! unix-time helpers used for temp-file naming and diagnostics.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
