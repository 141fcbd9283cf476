//! Per-file tail state.
//!
//! A [`TrackedFile`] owns the read handle of one configured input and reacts
//! to create, delete and modify notifications for its path. New bytes are
//! handed to the file's [`EventAssembler`].

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::assembler::EventAssembler;
use super::error::WatcherError;
use crate::event::EventSource;

/// Handle state of a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// No handle is held; the file is absent or was deleted.
    Closed,
    /// A handle is held and the read cursor is valid.
    Open,
}

/// Tail state for one configured input.
#[derive(Debug)]
pub struct TrackedFile {
    source: EventSource,
    handle: Option<File>,
    /// Offset of the next unread byte.
    cursor: u64,
    assembler: EventAssembler,
}

impl TrackedFile {
    /// Create a closed tracker.
    #[must_use]
    pub fn new(source: EventSource, assembler: EventAssembler) -> Self {
        Self {
            source,
            handle: None,
            cursor: 0,
            assembler,
        }
    }

    /// Create a tracker and open its file positioned at end-of-file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or inspected.
    pub async fn open(source: EventSource, assembler: EventAssembler) -> Result<Self, WatcherError> {
        let mut tracked = Self::new(source, assembler);
        tracked.open_at_end().await?;
        Ok(tracked)
    }

    /// Static metadata of this input.
    #[must_use]
    pub fn source(&self) -> &EventSource {
        &self.source
    }

    /// Path of the tracked file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.source.path
    }

    /// Current handle state.
    #[must_use]
    pub fn state(&self) -> FileState {
        if self.handle.is_some() {
            FileState::Open
        } else {
            FileState::Closed
        }
    }

    /// Offset of the next unread byte.
    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Lines buffered for an unfinished multi-line event.
    #[must_use]
    pub fn pending_lines(&self) -> &[String] {
        self.assembler.pending_lines()
    }

    /// Handle a create notification: the path now names a fresh file.
    ///
    /// Any held handle is replaced and the cursor moves to the new end-of-file,
    /// so content present at creation time is not emitted.
    ///
    /// # Errors
    ///
    /// Returns an error if the new file cannot be opened; the tracker is
    /// left closed in that case.
    pub async fn on_created(&mut self) -> Result<(), WatcherError> {
        self.close();
        self.open_at_end().await?;
        tracing::info!(
            path = %self.path().display(),
            offset = self.cursor,
            "Reopened file"
        );
        Ok(())
    }

    /// Handle a delete notification.
    pub fn on_removed(&mut self) {
        if self.handle.is_some() {
            tracing::info!(path = %self.path().display(), "File removed, closing handle");
        }
        self.close();
    }

    /// Handle a modify notification and return completed event messages.
    ///
    /// A closed tracker reopens at end-of-file and emits nothing. A file that
    /// shrank below the cursor is treated as truncated: the cursor resets to
    /// 0 and nothing is read until the next notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be inspected or read. A file that
    /// vanished is not an error; the tracker closes instead.
    pub async fn on_modified(&mut self) -> Result<Vec<String>, WatcherError> {
        let current = tokio::fs::metadata(self.path()).await;
        let metadata = match current {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path().display(), "Modified file no longer exists");
                self.on_removed();
                return Ok(Vec::new());
            }
            Err(e) => return Err(WatcherError::from_io(self.path(), e)),
        };

        let Some(handle) = self.handle.as_ref() else {
            self.open_at_end().await?;
            tracing::debug!(
                path = %self.path().display(),
                offset = self.cursor,
                "Opened previously closed file at end"
            );
            return Ok(Vec::new());
        };

        if is_replaced(handle, &metadata).await? {
            self.on_created().await?;
            return Ok(Vec::new());
        }

        let size = metadata.len();
        if size < self.cursor {
            tracing::info!(
                path = %self.path().display(),
                old_offset = self.cursor,
                new_len = size,
                "File truncated, resetting offset to 0"
            );
            self.cursor = 0;
            self.assembler.reset();
            return Ok(Vec::new());
        }

        if size == self.cursor {
            return Ok(Vec::new());
        }

        let bytes = self.read_to(size).await?;
        Ok(self.assembler.feed(&bytes))
    }

    /// Release the handle and drop any buffered event data.
    pub fn close(&mut self) {
        self.handle = None;
        self.assembler.reset();
    }

    async fn open_at_end(&mut self) -> Result<(), WatcherError> {
        let file = File::open(self.path())
            .await
            .map_err(|e| WatcherError::from_io(self.path(), e))?;
        let size = file.metadata().await?.len();

        self.handle = Some(file);
        self.cursor = size;
        Ok(())
    }

    /// Read `[cursor, size)` and advance the cursor past what was read.
    async fn read_to(&mut self, size: u64) -> Result<Vec<u8>, WatcherError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(Vec::new());
        };

        handle.seek(SeekFrom::Start(self.cursor)).await?;
        let mut bytes = Vec::new();
        handle
            .take(size - self.cursor)
            .read_to_end(&mut bytes)
            .await?;

        self.cursor += bytes.len() as u64;
        Ok(bytes)
    }
}

/// Whether the path now names a different file than the held handle.
#[cfg(unix)]
async fn is_replaced(handle: &File, current: &std::fs::Metadata) -> Result<bool, WatcherError> {
    use std::os::unix::fs::MetadataExt;

    let held = handle.metadata().await?;
    Ok(held.ino() != current.ino() || held.dev() != current.dev())
}

#[cfg(not(unix))]
#[allow(clippy::unused_async)]
async fn is_replaced(_handle: &File, _current: &std::fs::Metadata) -> Result<bool, WatcherError> {
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use regex::Regex;
    use tempfile::TempDir;

    fn append(path: &Path, content: &str) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    async fn tracked(path: &Path, pattern: Option<&str>) -> TrackedFile {
        let pattern = pattern.map(|p| Regex::new(p).unwrap());
        TrackedFile::open(EventSource::new(path, "test"), EventAssembler::new(pattern))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_seeks_to_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "old line\n");

        let mut file = tracked(&path, None).await;
        assert_eq!(file.state(), FileState::Open);
        assert_eq!(file.cursor(), 9);
        assert!(file.on_modified().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let result = TrackedFile::open(
            EventSource::new(dir.path().join("missing.log"), "test"),
            EventAssembler::new(None),
        )
        .await;
        assert!(matches!(result, Err(WatcherError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_reads_only_appended_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "before\n");

        let mut file = tracked(&path, None).await;
        append(&path, "one\ntwo\n");

        assert_eq!(file.on_modified().await.unwrap(), vec!["one", "two"]);
        assert_eq!(file.cursor(), 15);

        // Nothing new: idempotent
        assert!(file.on_modified().await.unwrap().is_empty());
        assert_eq!(file.cursor(), 15);
    }

    #[tokio::test]
    async fn test_truncation_resets_cursor_and_defers_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "a fairly long first line\n");

        let mut file = tracked(&path, None).await;
        std::fs::write(&path, "x\n").unwrap();

        assert!(file.on_modified().await.unwrap().is_empty());
        assert_eq!(file.cursor(), 0);

        assert_eq!(file.on_modified().await.unwrap(), vec!["x"]);
        assert_eq!(file.cursor(), 2);
    }

    #[tokio::test]
    async fn test_remove_then_create_reopens_at_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "old\n");

        let mut file = tracked(&path, None).await;
        std::fs::remove_file(&path).unwrap();
        file.on_removed();
        assert_eq!(file.state(), FileState::Closed);

        append(&path, "A\n");
        file.on_created().await.unwrap();
        assert_eq!(file.state(), FileState::Open);
        assert_eq!(file.cursor(), 2);
        assert!(file.on_modified().await.unwrap().is_empty());

        append(&path, "B\n");
        assert_eq!(file.on_modified().await.unwrap(), vec!["B"]);
    }

    #[tokio::test]
    async fn test_modify_after_delete_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "old\n");

        let mut file = tracked(&path, None).await;
        std::fs::remove_file(&path).unwrap();

        assert!(file.on_modified().await.unwrap().is_empty());
        assert_eq!(file.state(), FileState::Closed);
    }

    #[tokio::test]
    async fn test_modify_on_closed_file_reopens_at_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "old\n");

        let mut file = tracked(&path, None).await;
        file.on_removed();
        append(&path, "missed\n");

        assert!(file.on_modified().await.unwrap().is_empty());
        assert_eq!(file.state(), FileState::Open);
        assert_eq!(file.cursor(), 11);

        append(&path, "seen\n");
        assert_eq!(file.on_modified().await.unwrap(), vec!["seen"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_replaced_file_is_reopened_on_modify() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "old\n");

        let mut file = tracked(&path, None).await;
        std::fs::rename(&path, dir.path().join("app.log.1")).unwrap();
        append(&path, "fresh\n");

        assert!(file.on_modified().await.unwrap().is_empty());
        assert_eq!(file.cursor(), 6);

        append(&path, "next\n");
        assert_eq!(file.on_modified().await.unwrap(), vec!["next"]);
    }

    #[tokio::test]
    async fn test_remove_discards_pending_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        append(&path, "");

        let mut file = tracked(&path, Some(r"^\s+")).await;
        append(&path, "  orphan\n");
        assert!(file.on_modified().await.unwrap().is_empty());
        assert_eq!(file.pending_lines().len(), 1);

        file.on_removed();
        assert!(file.pending_lines().is_empty());
    }
}
