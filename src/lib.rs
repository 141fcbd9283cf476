//! logship - tail log files, join multi-line events and ship them to sinks.

pub mod config;
pub mod engine;
pub mod event;
pub mod sink;
pub mod watcher;
