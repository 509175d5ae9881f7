//! Event input sources
//!
//! The daemon consumes application activity as JSONL: one serialized
//! `ActivityEvent` per line, appended by the application's request layer.

pub mod file_tailer;

pub use file_tailer::{AsyncEventTailer, EventTailer};
