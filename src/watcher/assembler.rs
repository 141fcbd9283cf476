//! Multi-line event assembly.
//!
//! Turns raw bytes read from a tracked file into logical event messages.
//! Physical lines matching the continuation pattern are merged into the
//! surrounding logical event instead of starting a new one.

use regex::Regex;

/// Default cap on the number of physical lines in one logical event.
pub const DEFAULT_MAX_PENDING_LINES: usize = 500;

/// Splits byte chunks into lines and joins continuation lines into events.
///
/// An event opened by a regular line stays open until the next regular line
/// or the end of the current chunk. Continuation lines seen while no event is
/// open are retained until a regular line closes them.
#[derive(Debug, Clone)]
pub struct EventAssembler {
    /// Pattern marking a line as a continuation of the previous event.
    continuation: Option<Regex>,
    /// Lines of the currently open logical event.
    pending: Vec<String>,
    /// Whether `pending` starts with a regular (non-continuation) line.
    has_head: bool,
    /// Trailing bytes without a line terminator yet.
    partial: Vec<u8>,
    /// Maximum lines buffered before a forced flush.
    max_pending_lines: usize,
}

impl EventAssembler {
    /// Create an assembler. `None` disables multi-line joining.
    #[must_use]
    pub fn new(continuation: Option<Regex>) -> Self {
        Self {
            continuation,
            pending: Vec::new(),
            has_head: false,
            partial: Vec::new(),
            max_pending_lines: DEFAULT_MAX_PENDING_LINES,
        }
    }

    /// Set the maximum number of lines buffered for one logical event.
    #[must_use]
    pub fn with_max_pending_lines(mut self, max_pending_lines: usize) -> Self {
        self.max_pending_lines = max_pending_lines.max(1);
        self
    }

    /// Lines buffered for the currently open logical event.
    #[must_use]
    pub fn pending_lines(&self) -> &[String] {
        &self.pending
    }

    /// Whether bytes without a trailing newline are being held back.
    #[must_use]
    pub fn has_partial_line(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Discard all buffered state (pending lines and partial line).
    pub fn reset(&mut self) {
        if !self.pending.is_empty() || !self.partial.is_empty() {
            tracing::debug!(
                pending_lines = self.pending.len(),
                partial_bytes = self.partial.len(),
                "Discarding buffered event data"
            );
        }
        self.pending.clear();
        self.has_head = false;
        self.partial.clear();
    }

    /// Consume a chunk of newly read bytes and return completed messages.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(bytes);

        let Some(last_newline) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.partial.drain(..=last_newline).collect();
        let text = String::from_utf8_lossy(&complete);

        let mut messages = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            self.push_line(line, &mut messages);
        }

        // Nothing else is readable right now, so an event with a head is done.
        if self.has_head {
            messages.push(self.take_pending());
        }

        messages
    }

    fn is_continuation(&self, line: &str) -> bool {
        self.continuation
            .as_ref()
            .is_some_and(|pattern| pattern.is_match(line))
    }

    fn push_line(&mut self, line: &str, messages: &mut Vec<String>) {
        if self.is_continuation(line) {
            if self.pending.len() >= self.max_pending_lines {
                tracing::warn!(
                    lines = self.pending.len(),
                    "Multi-line event reached line limit, flushing"
                );
                messages.push(self.take_pending());
                // Overflow lines form their own event.
                self.has_head = true;
            }
            self.pending.push(line.to_string());
            return;
        }

        if self.has_head {
            messages.push(self.take_pending());
            self.pending.push(line.to_string());
            self.has_head = true;
        } else if self.pending.is_empty() {
            self.pending.push(line.to_string());
            self.has_head = true;
        } else {
            // Head-less continuation lines are closed by this line.
            self.pending.push(line.to_string());
            messages.push(self.take_pending());
        }
    }

    fn take_pending(&mut self) -> String {
        self.has_head = false;
        let message = self.pending.join("\n");
        self.pending.clear();
        message
    }
}
