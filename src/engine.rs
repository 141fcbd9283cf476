//! Dispatch loop tying file watching, event assembly and sinks together.
//!
//! The [`Engine`] owns the watch registry, one [`TrackedFile`] per input and
//! the ordered list of sinks. Notifications are handled one at a time on a
//! single task; every event is delivered to all sinks before the next
//! notification is looked at.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, InputConfig, ShipperConfig};
use crate::event::{local_hostname, EventRecord, EventSource};
use crate::sink::{OutputSink, Sink};
use crate::watcher::{
    canonical_path, ChangeKind, EventAssembler, FsChange, TrackedFile, WatchRegistry,
    WatcherError, DEFAULT_DEBOUNCE, DEFAULT_MAX_PENDING_LINES,
};

/// Error type for engine setup.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// None of the configured inputs could be opened.
    #[error("No usable inputs")]
    NoUsableInputs,
    /// None of the configured outputs could be created.
    #[error("No usable outputs")]
    NoUsableOutputs,
    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The file watcher could not be created.
    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherError),
}

/// Runtime settings for the engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Debounce interval for filesystem notifications.
    pub debounce: Duration,
    /// Maximum physical lines per multi-line event.
    pub multiline_max_lines: usize,
    /// Value of the `host` field on every event.
    pub host: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            multiline_max_lines: DEFAULT_MAX_PENDING_LINES,
            host: local_hostname(),
        }
    }
}

impl From<&ShipperConfig> for EngineOptions {
    fn from(config: &ShipperConfig) -> Self {
        Self {
            debounce: Duration::from_millis(config.debounce_ms),
            multiline_max_lines: config.multiline_max_lines,
            ..Default::default()
        }
    }
}

/// Tails every configured input and fans events out to the sinks.
#[derive(Debug)]
pub struct Engine<S: Sink = OutputSink> {
    registry: WatchRegistry,
    files: HashMap<PathBuf, TrackedFile>,
    sinks: Vec<S>,
    host: String,
}

impl<S: Sink> Engine<S> {
    /// Open every input at end-of-file and start watching it.
    ///
    /// Inputs that cannot be opened or watched are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if no input or no sink is usable, a multiline
    /// pattern is invalid, or the file watcher cannot be created.
    pub async fn new(
        inputs: &[InputConfig],
        sinks: Vec<S>,
        options: &EngineOptions,
    ) -> Result<Self, EngineError> {
        if sinks.is_empty() {
            return Err(EngineError::NoUsableOutputs);
        }

        let mut registry = WatchRegistry::new(options.debounce)?;
        let mut files = HashMap::new();

        for input in inputs {
            let continuation = input.continuation_pattern()?;
            let path = match canonical_path(&input.path) {
                Ok(path) => path,
                Err(e) => {
                    tracing::error!(path = %input.path.display(), error = %e, "Skipping input");
                    continue;
                }
            };
            if files.contains_key(&path) {
                tracing::warn!(path = %path.display(), "Skipping duplicate input");
                continue;
            }

            let source = EventSource::new(path.clone(), input.kind.clone())
                .with_extra_fields(input.add_field.clone());
            let assembler = EventAssembler::new(continuation)
                .with_max_pending_lines(options.multiline_max_lines);

            let tracked = match TrackedFile::open(source, assembler).await {
                Ok(tracked) => tracked,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Skipping input");
                    continue;
                }
            };
            if let Err(e) = registry.register(&path) {
                tracing::error!(path = %path.display(), error = %e, "Skipping input");
                continue;
            }

            tracing::info!(
                path = %path.display(),
                kind = %input.kind,
                offset = tracked.cursor(),
                "Tailing file"
            );
            files.insert(path, tracked);
        }

        if files.is_empty() {
            return Err(EngineError::NoUsableInputs);
        }

        Ok(Self {
            registry,
            files,
            sinks,
            host: options.host.clone(),
        })
    }

    /// Tracker for a path, if tracked.
    #[must_use]
    pub fn tracked(&self, path: &Path) -> Option<&TrackedFile> {
        self.files.get(path)
    }

    /// Paths of all tracked files.
    pub fn tracked_paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    /// Configured sinks, in delivery order.
    #[must_use]
    pub fn sinks(&self) -> &[S] {
        &self.sinks
    }

    /// Process notifications until `cancel` fires or the watcher stops.
    pub async fn run(&mut self, cancel: CancellationToken) {
        tracing::info!(
            files = self.files.len(),
            sinks = self.sinks.len(),
            "Watching for changes"
        );

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                batch = self.registry.next_batch() => {
                    let Some(changes) = batch else {
                        tracing::warn!("File watcher stopped");
                        break;
                    };
                    self.handle_batch(&changes).await;
                }
            }
        }
    }

    /// Process a batch of changes in order. Returns the number of events emitted.
    pub async fn handle_batch(&mut self, changes: &[FsChange]) -> usize {
        let mut emitted = 0;
        for change in changes {
            emitted += self.handle_change(change).await;
        }
        emitted
    }

    /// Route one change to its tracker and deliver resulting events.
    ///
    /// Returns the number of events emitted. Changes to untracked paths are
    /// ignored.
    pub async fn handle_change(&mut self, change: &FsChange) -> usize {
        let Some(file) = self.files.get_mut(&change.path) else {
            return 0;
        };
        tracing::trace!(path = %change.path.display(), kind = ?change.kind, "File change");

        let messages = match change.kind {
            ChangeKind::Created => {
                if let Err(e) = file.on_created().await {
                    log_access_error(&change.path, &e);
                }
                Vec::new()
            }
            ChangeKind::Removed => {
                file.on_removed();
                Vec::new()
            }
            ChangeKind::Modified => file.on_modified().await.unwrap_or_else(|e| {
                log_access_error(&change.path, &e);
                Vec::new()
            }),
        };

        let records: Vec<EventRecord> = messages
            .into_iter()
            .map(|message| EventRecord::new(message, file.source(), &self.host))
            .collect();

        for record in &records {
            dispatch(&mut self.sinks, record).await;
        }
        records.len()
    }

    /// Release every file handle and drop buffered event data.
    ///
    /// Trackers stay registered; a later create or modify reopens them.
    pub fn close_files(&mut self) {
        for file in self.files.values_mut() {
            file.close();
        }
    }

    /// Close every handle and stop watching.
    pub fn shutdown(mut self) {
        self.close_files();
        self.registry.stop();
        tracing::info!("Stopped");
    }
}

/// Deliver a record to every sink in order; failures do not stop delivery.
async fn dispatch<S: Sink>(sinks: &mut [S], record: &EventRecord) {
    for sink in sinks.iter_mut() {
        if let Err(e) = sink.log(record).await {
            tracing::error!(
                sink = sink.name(),
                path = %record.source_path().display(),
                error = %e,
                "Failed to deliver event"
            );
        }
    }
}

fn log_access_error(path: &Path, err: &WatcherError) {
    if err.is_not_found() {
        tracing::debug!(path = %path.display(), "File not present, waiting for it to appear");
    } else {
        tracing::warn!(path = %path.display(), error = %err, "Cannot access file");
    }
}
