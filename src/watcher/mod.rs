//! Watcher module for tailed log files.
//!
//! Provides directory watching, per-file tail state and multi-line event
//! assembly.

mod assembler;
mod error;
mod registry;
mod tracker;

pub use assembler::{EventAssembler, DEFAULT_MAX_PENDING_LINES};
pub use error::WatcherError;
pub use registry::{
    canonical_path, translate, ChangeKind, FsChange, WatchRegistry, DEFAULT_DEBOUNCE,
};
pub use tracker::{FileState, TrackedFile};
